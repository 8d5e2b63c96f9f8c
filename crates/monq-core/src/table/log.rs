//! The `log` table: the monitoring history, newest entries first.
//!
//! The time window and class set derived from the filter decide which
//! files are opened and which entry classes are loaded at all.

use crate::column::{Column, extract_fn};
use crate::core::ExecContext;
use crate::logcache::LogCache;
use crate::logcache::entry::{LogClasses, LogEntry};
use crate::logcache::logfile::LogRestrictions;
use crate::query::Query;
use crate::row::{LogRow, RowRef};
use crate::table::{ColumnSet, Table, commands, contacts, hosts, lookup_column, services};
use crate::user::User;
use crate::value::{ColumnType, Value};

fn log_col<F>(set: &mut ColumnSet, name: &str, description: &str, ty: ColumnType, f: F)
where
    F: for<'a> Fn(&'a LogEntry, &ExecContext<'a>) -> Value + Send + Sync + 'static,
{
    set.add(Column::new(
        name,
        description,
        ty,
        extract_fn(move |row, ctx| match row {
            RowRef::Log(r) => f(r.entry, ctx),
            _ => ty.default_value(),
        }),
    ));
}

fn project_log_host<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::Log(r) => r.host.map(RowRef::Host),
        _ => None,
    }
}

fn project_log_service<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::Log(r) => r.service.map(RowRef::Service),
        _ => None,
    }
}

fn project_log_contact<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::Log(r) => r.contact.map(RowRef::Contact),
        _ => None,
    }
}

fn project_log_command<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::Log(r) => r.command.as_ref().map(RowRef::Command),
        _ => None,
    }
}

pub fn add_columns(set: &mut ColumnSet) {
    log_col(set, "time", "Time of the log event (UNIX timestamp)", ColumnType::Time, |e, _| {
        Value::Time(e.time())
    });
    log_col(set, "lineno", "The number of the line in the log file", ColumnType::Int, |e, _| {
        Value::Int(e.lineno() as i64)
    });
    log_col(
        set,
        "class",
        "The class of the message as integer (0: info, 1: alert, 2: program, 3: notification, 4: passive, 5: command, 6: state)",
        ColumnType::Int,
        |e, _| Value::Int(e.class() as i64),
    );
    log_col(
        set,
        "message",
        "The complete message line including the timestamp",
        ColumnType::String,
        |e, _| Value::Str(e.message().to_string()),
    );
    log_col(
        set,
        "type",
        "The type of the message (text before the colon), the message itself for info messages",
        ColumnType::String,
        |e, _| Value::Str(e.type_name().to_string()),
    );
    log_col(set, "options", "The part of the message after the ':'", ColumnType::String, |e, _| {
        Value::Str(e.options().to_string())
    });
    log_col(
        set,
        "comment",
        "A comment field used in various message types",
        ColumnType::String,
        |e, _| Value::Str(e.comment().to_string()),
    );
    log_col(
        set,
        "plugin_output",
        "The output of the check, if any is associated with the message",
        ColumnType::String,
        |e, _| Value::Str(e.plugin_output().to_string()),
    );
    log_col(
        set,
        "long_plugin_output",
        "The complete output of the check, if any is associated with the message",
        ColumnType::String,
        |e, _| Value::Str(e.long_plugin_output()),
    );
    log_col(set, "state", "The state of the host or service in question", ColumnType::Int, |e, _| {
        Value::Int(e.state())
    });
    log_col(
        set,
        "state_type",
        "The type of the state (varies on different log classes)",
        ColumnType::String,
        |e, _| Value::Str(e.state_type().to_string()),
    );
    log_col(set, "attempt", "The number of the check attempt", ColumnType::Int, |e, _| {
        Value::Int(e.attempt())
    });
    log_col(
        set,
        "service_description",
        "The description of the service log entry is about (might be empty)",
        ColumnType::String,
        |e, _| Value::Str(e.service_description().to_string()),
    );
    log_col(
        set,
        "host_name",
        "The name of the host the log entry is about (might be empty)",
        ColumnType::String,
        |e, _| Value::Str(e.host_name().to_string()),
    );
    log_col(
        set,
        "contact_name",
        "The name of the contact the log entry is about (might be empty)",
        ColumnType::String,
        |e, _| Value::Str(e.contact_name().to_string()),
    );
    log_col(
        set,
        "command_name",
        "The name of the command of the log entry (e.g. for notifications)",
        ColumnType::String,
        |e, _| Value::Str(e.command_name().to_string()),
    );
}

pub struct TableLog {
    columns: ColumnSet,
}

impl TableLog {
    pub fn new() -> TableLog {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns);
        hosts::add_columns(&mut columns, "current_host_", project_log_host);
        services::add_columns(&mut columns, "current_service_", project_log_service, false);
        contacts::add_columns(&mut columns, "current_contact_", project_log_contact);
        commands::add_columns(&mut columns, "current_command_", project_log_command);
        TableLog { columns }
    }
}

impl Default for TableLog {
    fn default() -> Self {
        TableLog::new()
    }
}

/// Entries of these classes do not refer to a host at all; with an
/// `AuthUser` they stay visible even though no host authorizes them.
fn row_without_host(entry: &LogEntry) -> bool {
    matches!(
        entry.class(),
        crate::logcache::entry::LogClass::Info
            | crate::logcache::entry::LogClass::Program
            | crate::logcache::entry::LogClass::ExtCommand
    )
}

pub(crate) struct LogQueryWindow {
    pub since: i64,
    pub until: i64,
    pub classes: LogClasses,
}

impl LogQueryWindow {
    /// Derive the window from the filter: `time` bounds limit the files to
    /// scan, the `class` value set the entry classes to load. The upper
    /// bound is inclusive in the filter, so the half-open window adds one.
    pub(crate) fn from_query(query: &Query<'_>) -> LogQueryWindow {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        LogQueryWindow {
            since: query.greatest_lower_bound("time").unwrap_or(0),
            until: query.least_upper_bound("time").unwrap_or(now) + 1,
            classes: query
                .value_set_least_upper_bound("class")
                .map(LogClasses::from_value_set)
                .unwrap_or(LogClasses::all()),
        }
    }
}

impl Table for TableLog {
    fn name(&self) -> &'static str {
        "log"
    }

    fn prefix(&self) -> &'static str {
        "log_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn column(&self, name: &str) -> Result<std::sync::Arc<Column>, String> {
        // joined current-data columns carry a `current_` prefix to keep
        // them apart from the historic fields of the same name
        lookup_column(self.name(), self.prefix(), &self.columns, name)
            .or_else(|_| lookup_column(self.name(), self.prefix(), &self.columns, &format!("current_{name}")))
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let window = LogQueryWindow::from_query(query);
        if window.classes.is_empty() {
            return;
        }
        let restrictions = LogRestrictions {
            max_lines_per_log_file: ctx.core.limits().max_lines_per_log_file,
            classes: window.classes,
        };
        let log_cache: &LogCache = ctx.log_cache;
        log_cache.apply(ctx.core, |files| {
            let graph = ctx.graph();
            // newest file first; skip files that start after the window
            for key in files.keys().into_iter().rev() {
                if key >= window.until {
                    continue;
                }
                let Some(entries) = files.entries(key, &restrictions) else {
                    continue;
                };
                for (_, entry) in entries.iter().rev() {
                    if entry.time() >= window.until
                        || !window.classes.contains(entry.class().as_mask())
                    {
                        continue;
                    }
                    if entry.time() < window.since {
                        return;
                    }
                    let row = LogRow {
                        entry,
                        host: graph.find_host(entry.host_name()),
                        service: graph.find_service(entry.host_name(), entry.service_description()),
                        contact: graph.find_contact(entry.contact_name()),
                        command: ctx.core.find_command(entry.command_name()),
                    };
                    let authorized = user.is_authorized_for_object(
                        row.host,
                        row.service,
                        row_without_host(entry),
                    );
                    if authorized && !query.process_row(RowRef::Log(&row), ctx) {
                        return;
                    }
                }
            }
        });
    }
}

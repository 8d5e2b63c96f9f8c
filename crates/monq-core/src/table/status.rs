//! The one-row `status` table: program numbers, limits and counters.

use crate::column::{Column, extract_fn};
use crate::core::ExecContext;
use crate::counters::Counter;
use crate::query::Query;
use crate::row::RowRef;
use crate::table::{ColumnSet, Table};
use crate::user::User;
use crate::value::{ColumnType, Value};

fn status_col<F>(set: &mut ColumnSet, name: &str, description: &str, ty: ColumnType, f: F)
where
    F: for<'a> Fn(&ExecContext<'a>) -> Value + Send + Sync + 'static,
{
    set.add(Column::new(
        name,
        description,
        ty,
        extract_fn(move |row, ctx| match row {
            RowRef::Status => f(ctx),
            _ => ty.default_value(),
        }),
    ));
}

fn counter_cols(set: &mut ColumnSet, name: &'static str, description: &str, which: Counter) {
    status_col(
        set,
        name,
        &format!("The number of {description} since program start"),
        ColumnType::Double,
        move |ctx| Value::Double(ctx.counters.value(which)),
    );
    status_col(
        set,
        &format!("{name}_rate"),
        &format!("The averaged number of {description} per second"),
        ColumnType::Double,
        move |ctx| Value::Double(ctx.counters.rate(which)),
    );
}

pub struct TableStatus {
    columns: ColumnSet,
}

impl TableStatus {
    pub fn new() -> TableStatus {
        let mut set = ColumnSet::new();
        status_col(
            &mut set,
            "program_version",
            "The version of the monitoring daemon",
            ColumnType::String,
            |ctx| Value::Str(ctx.core.status().program_version),
        );
        status_col(
            &mut set,
            "program_start",
            "The time of the last program start (UNIX timestamp)",
            ColumnType::Time,
            |ctx| Value::Time(ctx.core.status().program_start),
        );
        status_col(
            &mut set,
            "nagios_pid",
            "The process ID of the monitoring core",
            ColumnType::Int,
            |ctx| Value::Int(ctx.core.status().pid),
        );
        status_col(
            &mut set,
            "last_command_check",
            "The time of the last check for a command as UNIX timestamp",
            ColumnType::Time,
            |ctx| Value::Time(ctx.core.status().last_command_check),
        );
        status_col(
            &mut set,
            "last_log_rotation",
            "The time of the last log file rotation",
            ColumnType::Time,
            |ctx| Value::Time(ctx.core.status().last_log_rotation),
        );
        status_col(
            &mut set,
            "interval_length",
            "The default interval length",
            ColumnType::Int,
            |ctx| Value::Int(ctx.core.status().interval_length),
        );
        status_col(
            &mut set,
            "num_hosts",
            "The total number of hosts",
            ColumnType::Int,
            |ctx| Value::Int(ctx.graph().hosts().len() as i64),
        );
        status_col(
            &mut set,
            "num_services",
            "The total number of services",
            ColumnType::Int,
            |ctx| Value::Int(ctx.graph().services().len() as i64),
        );
        for (name, desc, get) in [
            (
                "enable_notifications",
                "Whether notifications are enabled in general (0/1)",
                (|s: &crate::core::ProgramStatus| s.enable_notifications) as fn(&crate::core::ProgramStatus) -> bool,
            ),
            (
                "execute_service_checks",
                "Whether active service checks are activated in general (0/1)",
                |s| s.execute_service_checks,
            ),
            (
                "execute_host_checks",
                "Whether host checks are executed in general (0/1)",
                |s| s.execute_host_checks,
            ),
            (
                "accept_passive_service_checks",
                "Whether passive service checks are activated in general (0/1)",
                |s| s.accept_passive_service_checks,
            ),
            (
                "accept_passive_host_checks",
                "Whether passive host checks are accepted in general (0/1)",
                |s| s.accept_passive_host_checks,
            ),
            (
                "enable_event_handlers",
                "Whether event handlers are activated in general (0/1)",
                |s| s.enable_event_handlers,
            ),
            (
                "enable_flap_detection",
                "Whether flap detection is activated in general (0/1)",
                |s| s.enable_flap_detection,
            ),
            (
                "process_performance_data",
                "Whether processing of performance data is activated in general (0/1)",
                |s| s.process_performance_data,
            ),
        ] {
            status_col(&mut set, name, desc, ColumnType::Int, move |ctx| {
                Value::from_bool(get(&ctx.core.status()))
            });
        }
        status_col(
            &mut set,
            "edition",
            "The edition of the monitoring system",
            ColumnType::String,
            |ctx| Value::Str(ctx.core.status().edition),
        );
        status_col(
            &mut set,
            "num_queued_notifications",
            "The number of queued notifications",
            ColumnType::Int,
            |ctx| Value::Int(ctx.core.status().num_queued_notifications),
        );
        status_col(
            &mut set,
            "num_queued_alerts",
            "The number of queued alerts",
            ColumnType::Int,
            |ctx| Value::Int(ctx.core.status().num_queued_alerts),
        );
        status_col(
            &mut set,
            "max_cached_messages",
            "The maximum number of log messages kept in memory",
            ColumnType::Int,
            |ctx| Value::Int(ctx.core.limits().max_cached_messages as i64),
        );
        status_col(
            &mut set,
            "max_lines_per_logfile",
            "The maximum number of lines loaded from one log file",
            ColumnType::Int,
            |ctx| Value::Int(ctx.core.limits().max_lines_per_log_file as i64),
        );
        status_col(
            &mut set,
            "max_response_size",
            "The maximum response size in bytes",
            ColumnType::Int,
            |ctx| Value::Int(ctx.core.limits().max_response_size as i64),
        );
        status_col(
            &mut set,
            "cached_log_messages",
            "The current number of log messages kept in memory",
            ColumnType::Int,
            |ctx| Value::Int(ctx.log_cache.num_cached_messages(ctx.core) as i64),
        );
        counter_cols(&mut set, "connections", "client connections", Counter::Connections);
        counter_cols(&mut set, "requests", "requests", Counter::Requests);
        counter_cols(&mut set, "external_commands", "external commands", Counter::Commands);
        counter_cols(&mut set, "log_messages", "new log messages", Counter::LogMessages);
        counter_cols(&mut set, "forks", "process creations", Counter::Forks);
        TableStatus { columns: set }
    }
}

impl Default for TableStatus {
    fn default() -> Self {
        TableStatus::new()
    }
}

impl Table for TableStatus {
    fn name(&self) -> &'static str {
        "status"
    }

    fn prefix(&self) -> &'static str {
        "status_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, _user: &User<'_>, ctx: &ExecContext<'_>) {
        query.process_row(RowRef::Status, ctx);
    }

    fn default_row<'a>(&self, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
        Some(RowRef::Status)
    }
}

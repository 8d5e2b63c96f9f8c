//! The `downtimes` table: every scheduled downtime joined with its host
//! and service.

use crate::column::{Column, extract_fn};
use crate::core::ExecContext;
use crate::query::Query;
use crate::row::{DowntimeRow, RowRef};
use crate::table::{ColumnSet, Table, hosts, services};
use crate::user::User;
use crate::value::{ColumnType, Value};

fn downtime_col<F>(
    set: &mut ColumnSet,
    prefix: &str,
    name: &str,
    description: &str,
    ty: ColumnType,
    f: F,
) where
    F: for<'a> Fn(DowntimeRow<'a>, &ExecContext<'a>) -> Value + Send + Sync + 'static,
{
    set.add(Column::new(
        format!("{prefix}{name}"),
        description,
        ty,
        extract_fn(move |row, ctx| match row {
            RowRef::Downtime(d) => f(d, ctx),
            _ => ty.default_value(),
        }),
    ));
}

fn project_host<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::Downtime(d) => Some(RowRef::Host(d.host)),
        _ => None,
    }
}

fn project_service<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::Downtime(d) => d.service.map(RowRef::Service),
        _ => None,
    }
}

pub fn add_columns(set: &mut ColumnSet, prefix: &str) {
    downtime_col(set, prefix, "id", "The id of the downtime", ColumnType::Int, |d, _| {
        Value::Int(d.downtime.id as i64)
    });
    downtime_col(
        set,
        prefix,
        "author",
        "The contact that scheduled the downtime",
        ColumnType::String,
        |d, _| Value::Str(d.downtime.author.clone()),
    );
    downtime_col(set, prefix, "comment", "A comment text", ColumnType::String, |d, _| {
        Value::Str(d.downtime.comment.clone())
    });
    downtime_col(
        set,
        prefix,
        "entry_time",
        "The time the entry was made as UNIX timestamp",
        ColumnType::Time,
        |d, _| Value::Time(d.downtime.entry_time),
    );
    downtime_col(
        set,
        prefix,
        "start_time",
        "The start time of the downtime as UNIX timestamp",
        ColumnType::Time,
        |d, _| Value::Time(d.downtime.start_time),
    );
    downtime_col(
        set,
        prefix,
        "end_time",
        "The end time of the downtime as UNIX timestamp",
        ColumnType::Time,
        |d, _| Value::Time(d.downtime.end_time),
    );
    downtime_col(
        set,
        prefix,
        "fixed",
        "A 1 if the downtime is fixed, a 0 if it is flexible",
        ColumnType::Int,
        |d, _| Value::from_bool(d.downtime.fixed),
    );
    downtime_col(
        set,
        prefix,
        "duration",
        "The duration of the downtime in seconds",
        ColumnType::Int,
        |d, _| Value::Int(d.downtime.duration),
    );
    downtime_col(
        set,
        prefix,
        "triggered_by",
        "The id of the downtime this downtime was triggered by or 0 if it was not triggered by another downtime",
        ColumnType::Int,
        |d, _| Value::Int(d.downtime.triggered_by as i64),
    );
    downtime_col(
        set,
        prefix,
        "is_pending",
        "1 if the downtime is currently pending (not active), 0 if it is active",
        ColumnType::Int,
        |d, _| Value::from_bool(d.downtime.is_pending),
    );
    downtime_col(
        set,
        prefix,
        "is_service",
        "0, if this entry is for a host, 1 if it is for a service",
        ColumnType::Int,
        |d, _| Value::from_bool(d.service.is_some()),
    );
}

pub struct TableDowntimes {
    columns: ColumnSet,
}

impl TableDowntimes {
    pub fn new() -> TableDowntimes {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "");
        hosts::add_columns(&mut columns, "host_", project_host);
        services::add_columns(&mut columns, "service_", project_service, false);
        TableDowntimes { columns }
    }
}

impl Default for TableDowntimes {
    fn default() -> Self {
        TableDowntimes::new()
    }
}

impl Table for TableDowntimes {
    fn name(&self) -> &'static str {
        "downtimes"
    }

    fn prefix(&self) -> &'static str {
        "downtime_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        let mut snapshot = Vec::new();
        ctx.core.with_downtimes(&mut |downtimes| {
            snapshot.extend(downtimes.values().cloned());
        });
        for downtime in &snapshot {
            let host = graph.host(downtime.host);
            let service = downtime.service.map(|id| graph.service(id));
            let authorized = match service {
                Some(svc) => user.is_authorized_for_service(svc),
                None => user.is_authorized_for_host(host),
            };
            if !authorized {
                continue;
            }
            let row = DowntimeRow {
                downtime,
                host,
                service,
            };
            if !query.process_row(RowRef::Downtime(row), ctx) {
                return;
            }
        }
    }
}

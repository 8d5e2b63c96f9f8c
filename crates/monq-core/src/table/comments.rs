//! The `comments` table: every comment joined with its host and service.

use crate::column::{Column, extract_fn};
use crate::core::ExecContext;
use crate::query::Query;
use crate::row::{CommentRow, RowRef};
use crate::table::{ColumnSet, Table, hosts, services};
use crate::user::User;
use crate::value::{ColumnType, Value};

fn comment_col<F>(
    set: &mut ColumnSet,
    prefix: &str,
    name: &str,
    description: &str,
    ty: ColumnType,
    f: F,
) where
    F: for<'a> Fn(CommentRow<'a>, &ExecContext<'a>) -> Value + Send + Sync + 'static,
{
    set.add(Column::new(
        format!("{prefix}{name}"),
        description,
        ty,
        extract_fn(move |row, ctx| match row {
            RowRef::Comment(c) => f(c, ctx),
            _ => ty.default_value(),
        }),
    ));
}

fn project_host<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::Comment(c) => Some(RowRef::Host(c.host)),
        _ => None,
    }
}

fn project_service<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::Comment(c) => c.service.map(RowRef::Service),
        _ => None,
    }
}

pub fn add_columns(set: &mut ColumnSet, prefix: &str) {
    comment_col(set, prefix, "id", "The id of the comment", ColumnType::Int, |c, _| {
        Value::Int(c.comment.id as i64)
    });
    comment_col(set, prefix, "author", "The contact that entered the comment", ColumnType::String, |c, _| {
        Value::Str(c.comment.author.clone())
    });
    comment_col(set, prefix, "comment", "A comment text", ColumnType::String, |c, _| {
        Value::Str(c.comment.comment.clone())
    });
    comment_col(
        set,
        prefix,
        "entry_time",
        "The time the entry was made as UNIX timestamp",
        ColumnType::Time,
        |c, _| Value::Time(c.comment.entry_time),
    );
    comment_col(
        set,
        prefix,
        "entry_type",
        "The type of the comment: 1 is user, 2 is downtime, 3 is flapping and 4 is acknowledgement",
        ColumnType::Int,
        |c, _| Value::Int(c.comment.entry_type),
    );
    comment_col(
        set,
        prefix,
        "persistent",
        "Whether this comment is persistent (0/1)",
        ColumnType::Int,
        |c, _| Value::from_bool(c.comment.persistent),
    );
    comment_col(
        set,
        prefix,
        "expires",
        "Whether this comment expires",
        ColumnType::Int,
        |c, _| Value::from_bool(c.comment.expires),
    );
    comment_col(
        set,
        prefix,
        "expire_time",
        "Time of expiry of this comment as a UNIX timestamp",
        ColumnType::Time,
        |c, _| Value::Time(c.comment.expire_time),
    );
    comment_col(
        set,
        prefix,
        "is_service",
        "0, if this entry is for a host, 1 if it is for a service",
        ColumnType::Int,
        |c, _| Value::from_bool(c.service.is_some()),
    );
}

pub struct TableComments {
    columns: ColumnSet,
}

impl TableComments {
    pub fn new() -> TableComments {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "");
        hosts::add_columns(&mut columns, "host_", project_host);
        services::add_columns(&mut columns, "service_", project_service, false);
        TableComments { columns }
    }
}

impl Default for TableComments {
    fn default() -> Self {
        TableComments::new()
    }
}

impl Table for TableComments {
    fn name(&self) -> &'static str {
        "comments"
    }

    fn prefix(&self) -> &'static str {
        "comment_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        // one locked snapshot per query; rows borrow from it
        let mut snapshot = Vec::new();
        ctx.core.with_comments(&mut |comments| {
            snapshot.extend(comments.values().cloned());
        });
        for comment in &snapshot {
            let host = graph.host(comment.host);
            let service = comment.service.map(|id| graph.service(id));
            let authorized = match service {
                Some(svc) => user.is_authorized_for_service(svc),
                None => user.is_authorized_for_host(host),
            };
            if !authorized {
                continue;
            }
            let row = CommentRow {
                comment,
                host,
                service,
            };
            if !query.process_row(RowRef::Comment(row), ctx) {
                return;
            }
        }
    }
}

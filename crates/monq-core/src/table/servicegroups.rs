//! The `servicegroups` table.

use crate::core::ExecContext;
use crate::model::ServiceGroup;
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::hosts::service_badness;
use crate::table::{ColumnSet, Table, entity_column_adder, indexed_restriction};
use crate::user::User;
use crate::value::{ColumnType, Value};

entity_column_adder!(service_group_col, ServiceGroup, crate::model::ServiceGroup);

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection) {
    service_group_col(
        set,
        prefix,
        project,
        "name",
        "Name of the service group",
        ColumnType::String,
        |g, _| Value::Str(g.name.clone()),
    );
    service_group_col(
        set,
        prefix,
        project,
        "alias",
        "An alias of the service group",
        ColumnType::String,
        |g, _| Value::Str(g.alias.clone()),
    );
    service_group_col(
        set,
        prefix,
        project,
        "notes",
        "Optional additional notes about the service group",
        ColumnType::String,
        |g, _| Value::Str(g.notes.clone()),
    );
    service_group_col(
        set,
        prefix,
        project,
        "notes_url",
        "An optional URL to further notes on the service group",
        ColumnType::String,
        |g, _| Value::Str(g.notes_url.clone()),
    );
    service_group_col(
        set,
        prefix,
        project,
        "action_url",
        "An optional URL to custom notes or actions on the service group",
        ColumnType::String,
        |g, _| Value::Str(g.action_url.clone()),
    );
    service_group_col(
        set,
        prefix,
        project,
        "members",
        "A list of all members of the service group as host/service pairs",
        ColumnType::List,
        |g, ctx| {
            Value::Sublists(
                g.members
                    .iter()
                    .map(|id| {
                        let svc = ctx.graph().service(*id);
                        vec![
                            Value::Str(ctx.graph().host(svc.host).name.clone()),
                            Value::Str(svc.description.clone()),
                        ]
                    })
                    .collect(),
            )
        },
    );
    service_group_col(
        set,
        prefix,
        project,
        "members_with_state",
        "A list of all members of the service group with state and has_been_checked",
        ColumnType::List,
        |g, ctx| {
            Value::Sublists(
                g.members
                    .iter()
                    .map(|id| {
                        let svc = ctx.graph().service(*id);
                        vec![
                            Value::Str(ctx.graph().host(svc.host).name.clone()),
                            Value::Str(svc.description.clone()),
                            Value::Int(svc.state),
                            Value::from_bool(svc.has_been_checked),
                        ]
                    })
                    .collect(),
            )
        },
    );
    service_group_col(
        set,
        prefix,
        project,
        "num_services",
        "The total number of services in the group",
        ColumnType::Int,
        |g, _| Value::Int(g.members.len() as i64),
    );
    for (name, desc, wanted) in [
        ("num_services_ok", "The number of services in the group that are OK", 0),
        ("num_services_warn", "The number of services in the group that are WARN", 1),
        ("num_services_crit", "The number of services in the group that are CRIT", 2),
        ("num_services_unknown", "The number of services in the group that are UNKNOWN", 3),
    ] {
        service_group_col(set, prefix, project, name, desc, ColumnType::Int, move |g, ctx| {
            Value::Int(
                g.members
                    .iter()
                    .filter(|id| {
                        let svc = ctx.graph().service(**id);
                        svc.has_been_checked && svc.state == wanted
                    })
                    .count() as i64,
            )
        });
    }
    service_group_col(
        set,
        prefix,
        project,
        "num_services_pending",
        "The number of services in the group that are pending",
        ColumnType::Int,
        |g, ctx| {
            Value::Int(
                g.members
                    .iter()
                    .filter(|id| !ctx.graph().service(**id).has_been_checked)
                    .count() as i64,
            )
        },
    );
    service_group_col(
        set,
        prefix,
        project,
        "worst_service_state",
        "The worst state of all of the group's services",
        ColumnType::Int,
        |g, ctx| {
            Value::Int(
                g.members
                    .iter()
                    .map(|id| ctx.graph().service(*id).state)
                    .max_by_key(|s| service_badness(*s))
                    .unwrap_or(0),
            )
        },
    );
}

pub struct TableServiceGroups {
    columns: ColumnSet,
}

impl TableServiceGroups {
    pub fn new() -> TableServiceGroups {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self);
        TableServiceGroups { columns }
    }
}

impl Default for TableServiceGroups {
    fn default() -> Self {
        TableServiceGroups::new()
    }
}

impl Table for TableServiceGroups {
    fn name(&self) -> &'static str {
        "servicegroups"
    }

    fn prefix(&self) -> &'static str {
        "servicegroup_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        if let Some(name) = indexed_restriction(query, "servicegroups", "name") {
            if let Some(group) = graph.find_service_group(&name) {
                if user.is_authorized_for_service_group(group) {
                    query.process_row(RowRef::ServiceGroup(group), ctx);
                }
            }
            return;
        }
        for group in graph.service_groups() {
            if user.is_authorized_for_service_group(group)
                && !query.process_row(RowRef::ServiceGroup(group), ctx)
            {
                return;
            }
        }
    }

    fn get_row<'a>(&self, key: &str, ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
        ctx.graph().find_service_group(key).map(RowRef::ServiceGroup)
    }
}

//! The `hostgroups` table.

use crate::core::ExecContext;
use crate::model::HostGroup;
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::{ColumnSet, Table, entity_column_adder, indexed_restriction};
use crate::user::User;
use crate::value::{ColumnType, Value};

entity_column_adder!(host_group_col, HostGroup, crate::model::HostGroup);

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection) {
    host_group_col(set, prefix, project, "name", "Name of the host group", ColumnType::String, |g, _| {
        Value::Str(g.name.clone())
    });
    host_group_col(
        set,
        prefix,
        project,
        "alias",
        "An alias of the host group",
        ColumnType::String,
        |g, _| Value::Str(g.alias.clone()),
    );
    host_group_col(
        set,
        prefix,
        project,
        "notes",
        "Optional additional notes about the host group",
        ColumnType::String,
        |g, _| Value::Str(g.notes.clone()),
    );
    host_group_col(
        set,
        prefix,
        project,
        "notes_url",
        "An optional URL to further notes on the host group",
        ColumnType::String,
        |g, _| Value::Str(g.notes_url.clone()),
    );
    host_group_col(
        set,
        prefix,
        project,
        "action_url",
        "An optional URL to custom actions or information about the host group",
        ColumnType::String,
        |g, _| Value::Str(g.action_url.clone()),
    );
    host_group_col(
        set,
        prefix,
        project,
        "members",
        "A list of all host names that are members of the host group",
        ColumnType::List,
        |g, ctx| {
            Value::List(
                g.members
                    .iter()
                    .map(|id| ctx.graph().host(*id).name.clone())
                    .collect(),
            )
        },
    );
    host_group_col(
        set,
        prefix,
        project,
        "members_with_state",
        "A list of all members of the host group with state and has_been_checked",
        ColumnType::List,
        |g, ctx| {
            Value::Sublists(
                g.members
                    .iter()
                    .map(|id| {
                        let host = ctx.graph().host(*id);
                        vec![
                            Value::Str(host.name.clone()),
                            Value::Int(host.state),
                            Value::from_bool(host.has_been_checked),
                        ]
                    })
                    .collect(),
            )
        },
    );
    host_group_col(
        set,
        prefix,
        project,
        "num_hosts",
        "The total number of hosts in the group",
        ColumnType::Int,
        |g, _| Value::Int(g.members.len() as i64),
    );
    for (name, desc, wanted) in [
        ("num_hosts_up", "The number of hosts in the group that are up", 0),
        ("num_hosts_down", "The number of hosts in the group that are down", 1),
        ("num_hosts_unreach", "The number of hosts in the group that are unreachable", 2),
    ] {
        host_group_col(set, prefix, project, name, desc, ColumnType::Int, move |g, ctx| {
            Value::Int(
                g.members
                    .iter()
                    .filter(|id| {
                        let host = ctx.graph().host(**id);
                        host.has_been_checked && host.state == wanted
                    })
                    .count() as i64,
            )
        });
    }
    host_group_col(
        set,
        prefix,
        project,
        "num_hosts_pending",
        "The number of hosts in the group that are pending",
        ColumnType::Int,
        |g, ctx| {
            Value::Int(
                g.members
                    .iter()
                    .filter(|id| !ctx.graph().host(**id).has_been_checked)
                    .count() as i64,
            )
        },
    );
    host_group_col(
        set,
        prefix,
        project,
        "num_services",
        "The total number of services of hosts in this group",
        ColumnType::Int,
        |g, ctx| {
            Value::Int(
                g.members
                    .iter()
                    .map(|id| ctx.graph().host(*id).services.len() as i64)
                    .sum(),
            )
        },
    );
    host_group_col(
        set,
        prefix,
        project,
        "worst_host_state",
        "The worst state of all of the group's hosts",
        ColumnType::Int,
        |g, ctx| {
            Value::Int(
                g.members
                    .iter()
                    .map(|id| ctx.graph().host(*id).state)
                    // unreachable ranks between up and down
                    .max_by_key(|s| if *s == 2 { 5 } else { s * 10 })
                    .unwrap_or(0),
            )
        },
    );
}

pub struct TableHostGroups {
    columns: ColumnSet,
}

impl TableHostGroups {
    pub fn new() -> TableHostGroups {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self);
        TableHostGroups { columns }
    }
}

impl Default for TableHostGroups {
    fn default() -> Self {
        TableHostGroups::new()
    }
}

impl Table for TableHostGroups {
    fn name(&self) -> &'static str {
        "hostgroups"
    }

    fn prefix(&self) -> &'static str {
        "hostgroup_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        if let Some(name) = indexed_restriction(query, "hostgroups", "name") {
            if let Some(group) = graph.find_host_group(&name) {
                if user.is_authorized_for_host_group(group) {
                    query.process_row(RowRef::HostGroup(group), ctx);
                }
            }
            return;
        }
        for group in graph.host_groups() {
            if user.is_authorized_for_host_group(group)
                && !query.process_row(RowRef::HostGroup(group), ctx)
            {
                return;
            }
        }
    }

    fn get_row<'a>(&self, key: &str, ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
        ctx.graph().find_host_group(key).map(RowRef::HostGroup)
    }
}

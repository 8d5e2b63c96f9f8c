//! The `hosts` table.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::attrs::{AttributeKind, attribute_names, attribute_values, attributes};
use crate::column::{Column, extract_fn};
use crate::core::ExecContext;
use crate::model::Host;
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::{ColumnSet, Table, entity_column_adder, indexed_restriction};
use crate::user::User;
use crate::value::{ColumnType, Value};

entity_column_adder!(host_col, Host, crate::model::Host);

/// Badness order of service states: unknown ranks between warning and
/// critical.
pub(crate) fn service_badness(state: i64) -> i64 {
    match state {
        3 => 15,
        s => s * 10,
    }
}

/// Guarded read of a host-keyed file below `dir`. Rejects anything that
/// could escape the directory.
pub(crate) fn read_host_file(dir: &Path, host_name: &str, rel: Option<&str>) -> Vec<u8> {
    if dir.as_os_str().is_empty() || host_name.contains('/') || host_name.contains("..") {
        return Vec::new();
    }
    let mut path: PathBuf = dir.join(host_name);
    if let Some(rel) = rel {
        if rel.starts_with('/') || rel.contains("..") {
            return Vec::new();
        }
        path = path.join(rel);
    }
    std::fs::read(&path).unwrap_or_default()
}

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection) {
    host_col(set, prefix, project, "name", "Host name", ColumnType::String, |h, _| {
        Value::Str(h.name.clone())
    });
    host_col(
        set,
        prefix,
        project,
        "display_name",
        "Optional display name",
        ColumnType::String,
        |h, _| Value::Str(h.display_name.clone()),
    );
    host_col(set, prefix, project, "alias", "An alias name for the host", ColumnType::String, |h, _| {
        Value::Str(h.alias.clone())
    });
    host_col(set, prefix, project, "address", "IP address", ColumnType::String, |h, _| {
        Value::Str(h.address.clone())
    });
    host_col(
        set,
        prefix,
        project,
        "state",
        "The current state of the host (0: up, 1: down, 2: unreachable)",
        ColumnType::Int,
        |h, _| Value::Int(h.state),
    );
    host_col(
        set,
        prefix,
        project,
        "state_type",
        "Type of the current state (0: soft, 1: hard)",
        ColumnType::Int,
        |h, _| Value::Int(h.state_type),
    );
    host_col(
        set,
        prefix,
        project,
        "has_been_checked",
        "Whether the host has already been checked (0/1)",
        ColumnType::Int,
        |h, _| Value::from_bool(h.has_been_checked),
    );
    host_col(
        set,
        prefix,
        project,
        "last_check",
        "Time of the last check (UNIX timestamp)",
        ColumnType::Time,
        |h, _| Value::Time(h.last_check),
    );
    host_col(
        set,
        prefix,
        project,
        "next_check",
        "Scheduled time for the next check (UNIX timestamp)",
        ColumnType::Time,
        |h, _| Value::Time(h.next_check),
    );
    host_col(
        set,
        prefix,
        project,
        "last_state_change",
        "Time of the last state change (UNIX timestamp)",
        ColumnType::Time,
        |h, _| Value::Time(h.last_state_change),
    );
    host_col(
        set,
        prefix,
        project,
        "last_hard_state_change",
        "Time of the last hard state change (UNIX timestamp)",
        ColumnType::Time,
        |h, _| Value::Time(h.last_hard_state_change),
    );
    host_col(
        set,
        prefix,
        project,
        "last_hard_state",
        "Last hard state",
        ColumnType::Int,
        |h, _| Value::Int(h.last_hard_state),
    );
    host_col(
        set,
        prefix,
        project,
        "plugin_output",
        "Output of the last check",
        ColumnType::String,
        |h, _| Value::Str(h.plugin_output.clone()),
    );
    host_col(
        set,
        prefix,
        project,
        "long_plugin_output",
        "Long (extra) output of the last check",
        ColumnType::String,
        |h, _| Value::Str(h.long_plugin_output.clone()),
    );
    host_col(
        set,
        prefix,
        project,
        "perf_data",
        "Performance data of the last check",
        ColumnType::String,
        |h, _| Value::Str(h.perf_data.clone()),
    );
    host_col(
        set,
        prefix,
        project,
        "check_command",
        "Logical command name for active checks",
        ColumnType::String,
        |h, _| Value::Str(h.check_command.clone()),
    );
    host_col(
        set,
        prefix,
        project,
        "current_attempt",
        "Number of the current check attempt",
        ColumnType::Int,
        |h, _| Value::Int(h.current_attempt),
    );
    host_col(
        set,
        prefix,
        project,
        "max_check_attempts",
        "Maximum attempts for active checks",
        ColumnType::Int,
        |h, _| Value::Int(h.max_check_attempts),
    );
    host_col(
        set,
        prefix,
        project,
        "latency",
        "Time difference between scheduled check time and actual check time",
        ColumnType::Double,
        |h, _| Value::Double(h.latency),
    );
    host_col(
        set,
        prefix,
        project,
        "execution_time",
        "Time the check needed for execution",
        ColumnType::Double,
        |h, _| Value::Double(h.execution_time),
    );
    host_col(
        set,
        prefix,
        project,
        "acknowledged",
        "Whether the current problem has been acknowledged (0/1)",
        ColumnType::Int,
        |h, _| Value::from_bool(h.acknowledged),
    );
    host_col(
        set,
        prefix,
        project,
        "scheduled_downtime_depth",
        "The number of downtimes this host is currently in",
        ColumnType::Int,
        |h, _| Value::Int(h.scheduled_downtime_depth),
    );
    host_col(
        set,
        prefix,
        project,
        "is_flapping",
        "Whether the host state is flapping (0/1)",
        ColumnType::Int,
        |h, _| Value::from_bool(h.is_flapping),
    );
    host_col(
        set,
        prefix,
        project,
        "checks_enabled",
        "Whether checks of the host are enabled (0/1)",
        ColumnType::Int,
        |h, _| Value::from_bool(h.checks_enabled),
    );
    host_col(
        set,
        prefix,
        project,
        "accept_passive_checks",
        "Whether passive host checks are accepted (0/1)",
        ColumnType::Int,
        |h, _| Value::from_bool(h.accept_passive_checks),
    );
    host_col(
        set,
        prefix,
        project,
        "notifications_enabled",
        "Whether notifications of the host are enabled (0/1)",
        ColumnType::Int,
        |h, _| Value::from_bool(h.notifications_enabled),
    );
    host_col(
        set,
        prefix,
        project,
        "notification_period",
        "Time period in which problems of this host will be notified",
        ColumnType::String,
        |h, _| Value::Str(h.notification_period.clone()),
    );
    host_col(
        set,
        prefix,
        project,
        "service_period",
        "Time period during which the host is expected to be available",
        ColumnType::String,
        |h, _| Value::Str(h.service_period.clone()),
    );
    host_col(
        set,
        prefix,
        project,
        "check_period",
        "Time period in which this host will be checked",
        ColumnType::String,
        |h, _| Value::Str(h.check_period.clone()),
    );
    host_col(set, prefix, project, "notes", "Optional notes for this host", ColumnType::String, |h, _| {
        Value::Str(h.notes.clone())
    });
    host_col(
        set,
        prefix,
        project,
        "notes_url",
        "An optional URL with further information about the host",
        ColumnType::String,
        |h, _| Value::Str(h.notes_url.clone()),
    );
    host_col(
        set,
        prefix,
        project,
        "action_url",
        "An optional URL to custom actions or information about this host",
        ColumnType::String,
        |h, _| Value::Str(h.action_url.clone()),
    );
    host_col(
        set,
        prefix,
        project,
        "icon_image",
        "The name of an image file to be used in the web pages",
        ColumnType::String,
        |h, _| Value::Str(h.icon_image.clone()),
    );
    host_col(
        set,
        prefix,
        project,
        "in_notification_period",
        "Whether this host is currently in its notification period (0/1)",
        ColumnType::Int,
        |h, ctx| {
            Value::from_bool(
                ctx.graph()
                    .find_timeperiod(&h.notification_period)
                    .map(|tp| tp.active)
                    .unwrap_or(true),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "in_service_period",
        "Whether this host is currently in its service period (0/1)",
        ColumnType::Int,
        |h, ctx| {
            Value::from_bool(
                ctx.graph()
                    .find_timeperiod(&h.service_period)
                    .map(|tp| tp.active)
                    .unwrap_or(true),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "parents",
        "The direct parents of the host",
        ColumnType::List,
        |h, ctx| {
            Value::List(
                h.parents
                    .iter()
                    .map(|id| ctx.graph().host(*id).name.clone())
                    .collect(),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "childs",
        "The direct children of the host",
        ColumnType::List,
        |h, ctx| {
            Value::List(
                h.childs
                    .iter()
                    .map(|id| ctx.graph().host(*id).name.clone())
                    .collect(),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "groups",
        "A list of all host groups this host is in",
        ColumnType::List,
        |h, ctx| {
            Value::List(
                h.groups
                    .iter()
                    .map(|id| ctx.graph().host_group(*id).name.clone())
                    .collect(),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "contacts",
        "A list of all contacts of this host",
        ColumnType::List,
        |h, ctx| {
            Value::List(
                h.contacts
                    .iter()
                    .map(|id| ctx.graph().contact(*id).name.clone())
                    .collect(),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "contact_groups",
        "A list of all contact groups this host is in",
        ColumnType::List,
        |h, ctx| {
            Value::List(
                h.contact_groups
                    .iter()
                    .map(|id| ctx.graph().contact_group(*id).name.clone())
                    .collect(),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "services",
        "A list of all services of the host",
        ColumnType::List,
        |h, ctx| {
            Value::List(
                h.services
                    .iter()
                    .map(|id| ctx.graph().service(*id).description.clone())
                    .collect(),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "services_with_state",
        "A list of all services of the host together with state and has_been_checked",
        ColumnType::List,
        |h, ctx| {
            Value::Sublists(
                h.services
                    .iter()
                    .map(|id| {
                        let svc = ctx.graph().service(*id);
                        vec![
                            Value::Str(svc.description.clone()),
                            Value::Int(svc.state),
                            Value::from_bool(svc.has_been_checked),
                        ]
                    })
                    .collect(),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "num_services",
        "The total number of services of the host",
        ColumnType::Int,
        |h, _| Value::Int(h.services.len() as i64),
    );
    for (name, desc, wanted) in [
        ("num_services_ok", "The number of the host's services with the state OK", 0),
        ("num_services_warn", "The number of the host's services with the state WARN", 1),
        ("num_services_crit", "The number of the host's services with the state CRIT", 2),
        ("num_services_unknown", "The number of the host's services with the state UNKNOWN", 3),
    ] {
        host_col(set, prefix, project, name, desc, ColumnType::Int, move |h, ctx| {
            Value::Int(
                h.services
                    .iter()
                    .filter(|id| {
                        let svc = ctx.graph().service(**id);
                        svc.has_been_checked && svc.state == wanted
                    })
                    .count() as i64,
            )
        });
    }
    host_col(
        set,
        prefix,
        project,
        "num_services_pending",
        "The number of the host's services which have not been checked yet",
        ColumnType::Int,
        |h, ctx| {
            Value::Int(
                h.services
                    .iter()
                    .filter(|id| !ctx.graph().service(**id).has_been_checked)
                    .count() as i64,
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "worst_service_state",
        "The worst state of all of the host's services",
        ColumnType::Int,
        |h, ctx| {
            Value::Int(
                h.services
                    .iter()
                    .map(|id| ctx.graph().service(*id).state)
                    .max_by_key(|s| service_badness(*s))
                    .unwrap_or(0),
            )
        },
    );
    host_col(
        set,
        prefix,
        project,
        "custom_variable_names",
        "A list of the names of the custom variables",
        ColumnType::List,
        |h, _| Value::List(attribute_names(&h.custom_variables, AttributeKind::CustomVariables)),
    );
    host_col(
        set,
        prefix,
        project,
        "custom_variable_values",
        "A list of the values of the custom variables",
        ColumnType::List,
        |h, _| Value::List(attribute_values(&h.custom_variables, AttributeKind::CustomVariables)),
    );
    host_col(
        set,
        prefix,
        project,
        "custom_variables",
        "A dictionary of the custom variables",
        ColumnType::DictStr,
        |h, _| Value::DictStr(attributes(&h.custom_variables, AttributeKind::CustomVariables)),
    );
    host_col(
        set,
        prefix,
        project,
        "tags",
        "A dictionary of the tags",
        ColumnType::DictStr,
        |h, _| Value::DictStr(attributes(&h.custom_variables, AttributeKind::Tags)),
    );
    host_col(
        set,
        prefix,
        project,
        "labels",
        "A dictionary of the labels",
        ColumnType::DictStr,
        |h, _| Value::DictStr(attributes(&h.custom_variables, AttributeKind::Labels)),
    );
    host_col(
        set,
        prefix,
        project,
        "label_sources",
        "A dictionary of the label sources",
        ColumnType::DictStr,
        |h, _| Value::DictStr(attributes(&h.custom_variables, AttributeKind::LabelSources)),
    );
    host_col(
        set,
        prefix,
        project,
        "comments",
        "A list of the ids of all comments of this host",
        ColumnType::List,
        |h, ctx| {
            let mut ids = Vec::new();
            ctx.core.with_comments(&mut |comments| {
                ids.extend(
                    comments
                        .values()
                        .filter(|c| c.host == h.id && c.service.is_none())
                        .map(|c| c.id.to_string()),
                );
            });
            Value::List(ids)
        },
    );
    host_col(
        set,
        prefix,
        project,
        "comments_with_info",
        "A list of all comments of the host with id, author and comment",
        ColumnType::List,
        |h, ctx| {
            let mut records = Vec::new();
            ctx.core.with_comments(&mut |comments| {
                records.extend(
                    comments
                        .values()
                        .filter(|c| c.host == h.id && c.service.is_none())
                        .map(|c| {
                            vec![
                                Value::Int(c.id as i64),
                                Value::Str(c.author.clone()),
                                Value::Str(c.comment.clone()),
                            ]
                        }),
                );
            });
            Value::Sublists(records)
        },
    );
    host_col(
        set,
        prefix,
        project,
        "downtimes",
        "A list of the ids of all scheduled downtimes of this host",
        ColumnType::List,
        |h, ctx| {
            let mut ids = Vec::new();
            ctx.core.with_downtimes(&mut |downtimes| {
                ids.extend(
                    downtimes
                        .values()
                        .filter(|d| d.host == h.id && d.service.is_none())
                        .map(|d| d.id.to_string()),
                );
            });
            Value::List(ids)
        },
    );
    host_col(
        set,
        prefix,
        project,
        "downtimes_with_info",
        "A list of all scheduled downtimes of the host with id, author and comment",
        ColumnType::List,
        |h, ctx| {
            let mut records = Vec::new();
            ctx.core.with_downtimes(&mut |downtimes| {
                records.extend(
                    downtimes
                        .values()
                        .filter(|d| d.host == h.id && d.service.is_none())
                        .map(|d| {
                            vec![
                                Value::Int(d.id as i64),
                                Value::Str(d.author.clone()),
                                Value::Str(d.comment.clone()),
                            ]
                        }),
                );
            });
            Value::Sublists(records)
        },
    );
    host_col(
        set,
        prefix,
        project,
        "mk_inventory",
        "The file content of the inventory",
        ColumnType::Blob,
        |h, ctx| Value::Blob(read_host_file(&ctx.core.paths().inventory_directory, &h.name, None)),
    );
    host_col(
        set,
        prefix,
        project,
        "structured_status",
        "The file content of the structured status",
        ColumnType::Blob,
        |h, ctx| {
            Value::Blob(read_host_file(
                &ctx.core.paths().structured_status_directory,
                &h.name,
                None,
            ))
        },
    );
}

pub struct TableHosts {
    columns: ColumnSet,
}

impl TableHosts {
    pub fn new() -> TableHosts {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self);
        columns.add_dynamic(
            "mk_logwatch_file",
            Box::new(|column_name: &str, args: &str| {
                let rel = args.to_string();
                Ok(Column::new(
                    column_name,
                    "The content of one logwatch file",
                    ColumnType::Blob,
                    extract_fn(move |row, ctx| match row {
                        RowRef::Host(h) => Value::Blob(read_host_file(
                            &ctx.core.paths().logwatch_directory,
                            &h.name,
                            Some(&rel),
                        )),
                        _ => Value::Blob(Vec::new()),
                    }),
                ))
            }),
        );
        TableHosts { columns }
    }
}

impl Default for TableHosts {
    fn default() -> Self {
        TableHosts::new()
    }
}

impl Table for TableHosts {
    fn name(&self) -> &'static str {
        "hosts"
    }

    fn prefix(&self) -> &'static str {
        "host_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        if let Some(name) = indexed_restriction(query, "hosts", "name") {
            if let Some(host) = graph.find_host(&name) {
                if user.is_authorized_for_host(host) {
                    query.process_row(RowRef::Host(host), ctx);
                }
            }
            return;
        }
        if let Some(group_name) = indexed_restriction(query, "hosts", "groups") {
            if let Some(group) = graph.find_host_group(&group_name) {
                for id in &group.members {
                    let host = graph.host(*id);
                    if user.is_authorized_for_host(host) && !query.process_row(RowRef::Host(host), ctx)
                    {
                        return;
                    }
                }
            }
            return;
        }
        debug!(table = "hosts", "full scan");
        for host in graph.hosts() {
            if user.is_authorized_for_host(host) && !query.process_row(RowRef::Host(host), ctx) {
                return;
            }
        }
    }

    fn get_row<'a>(&self, key: &str, ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
        ctx.graph().host_by_designation(key).map(RowRef::Host)
    }
}

pub(crate) fn project_host_of_service<'a>(
    row: RowRef<'a>,
    ctx: &ExecContext<'a>,
) -> Option<RowRef<'a>> {
    match row {
        RowRef::Service(s) => Some(RowRef::Host(ctx.graph().host(s.host))),
        _ => None,
    }
}

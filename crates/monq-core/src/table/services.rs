//! The `services` table. Every row carries the full column set of its
//! host under the `host_` prefix.

use tracing::debug;

use crate::attrs::{AttributeKind, attribute_names, attribute_values, attributes};
use crate::core::ExecContext;
use crate::model::Service;
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::{ColumnSet, Table, entity_column_adder, hosts, indexed_restriction};
use crate::user::User;
use crate::value::{ColumnType, Value};

entity_column_adder!(service_col, Service, crate::model::Service);

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection, with_host: bool) {
    service_col(
        set,
        prefix,
        project,
        "description",
        "Service description",
        ColumnType::String,
        |s, _| Value::Str(s.description.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "display_name",
        "Optional display name",
        ColumnType::String,
        |s, _| Value::Str(s.display_name.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "state",
        "The current state of the service (0: OK, 1: WARN, 2: CRIT, 3: UNKNOWN)",
        ColumnType::Int,
        |s, _| Value::Int(s.state),
    );
    service_col(
        set,
        prefix,
        project,
        "state_type",
        "Type of the current state (0: soft, 1: hard)",
        ColumnType::Int,
        |s, _| Value::Int(s.state_type),
    );
    service_col(
        set,
        prefix,
        project,
        "has_been_checked",
        "Whether the service has already been checked (0/1)",
        ColumnType::Int,
        |s, _| Value::from_bool(s.has_been_checked),
    );
    service_col(
        set,
        prefix,
        project,
        "last_check",
        "Time of the last check (UNIX timestamp)",
        ColumnType::Time,
        |s, _| Value::Time(s.last_check),
    );
    service_col(
        set,
        prefix,
        project,
        "next_check",
        "Scheduled time for the next check (UNIX timestamp)",
        ColumnType::Time,
        |s, _| Value::Time(s.next_check),
    );
    service_col(
        set,
        prefix,
        project,
        "last_state_change",
        "Time of the last state change (UNIX timestamp)",
        ColumnType::Time,
        |s, _| Value::Time(s.last_state_change),
    );
    service_col(
        set,
        prefix,
        project,
        "last_hard_state_change",
        "Time of the last hard state change (UNIX timestamp)",
        ColumnType::Time,
        |s, _| Value::Time(s.last_hard_state_change),
    );
    service_col(
        set,
        prefix,
        project,
        "last_hard_state",
        "Last hard state",
        ColumnType::Int,
        |s, _| Value::Int(s.last_hard_state),
    );
    service_col(
        set,
        prefix,
        project,
        "plugin_output",
        "Output of the last check",
        ColumnType::String,
        |s, _| Value::Str(s.plugin_output.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "long_plugin_output",
        "Long (extra) output of the last check",
        ColumnType::String,
        |s, _| Value::Str(s.long_plugin_output.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "perf_data",
        "Performance data of the last check",
        ColumnType::String,
        |s, _| Value::Str(s.perf_data.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "check_command",
        "Logical command name for active checks",
        ColumnType::String,
        |s, _| Value::Str(s.check_command.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "current_attempt",
        "Number of the current check attempt",
        ColumnType::Int,
        |s, _| Value::Int(s.current_attempt),
    );
    service_col(
        set,
        prefix,
        project,
        "max_check_attempts",
        "Maximum attempts for active checks",
        ColumnType::Int,
        |s, _| Value::Int(s.max_check_attempts),
    );
    service_col(
        set,
        prefix,
        project,
        "latency",
        "Time difference between scheduled check time and actual check time",
        ColumnType::Double,
        |s, _| Value::Double(s.latency),
    );
    service_col(
        set,
        prefix,
        project,
        "execution_time",
        "Time the check needed for execution",
        ColumnType::Double,
        |s, _| Value::Double(s.execution_time),
    );
    service_col(
        set,
        prefix,
        project,
        "acknowledged",
        "Whether the current problem has been acknowledged (0/1)",
        ColumnType::Int,
        |s, _| Value::from_bool(s.acknowledged),
    );
    service_col(
        set,
        prefix,
        project,
        "scheduled_downtime_depth",
        "The number of downtimes this service is currently in",
        ColumnType::Int,
        |s, _| Value::Int(s.scheduled_downtime_depth),
    );
    service_col(
        set,
        prefix,
        project,
        "is_flapping",
        "Whether the service is flapping (0/1)",
        ColumnType::Int,
        |s, _| Value::from_bool(s.is_flapping),
    );
    service_col(
        set,
        prefix,
        project,
        "checks_enabled",
        "Whether checks of the service are enabled (0/1)",
        ColumnType::Int,
        |s, _| Value::from_bool(s.checks_enabled),
    );
    service_col(
        set,
        prefix,
        project,
        "accept_passive_checks",
        "Whether passive service checks are accepted (0/1)",
        ColumnType::Int,
        |s, _| Value::from_bool(s.accept_passive_checks),
    );
    service_col(
        set,
        prefix,
        project,
        "notifications_enabled",
        "Whether notifications of the service are enabled (0/1)",
        ColumnType::Int,
        |s, _| Value::from_bool(s.notifications_enabled),
    );
    service_col(
        set,
        prefix,
        project,
        "notification_period",
        "Time period in which problems of this service will be notified",
        ColumnType::String,
        |s, _| Value::Str(s.notification_period.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "service_period",
        "Time period during which the service is expected to be available",
        ColumnType::String,
        |s, _| Value::Str(s.service_period.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "check_period",
        "Time period in which this service will be checked",
        ColumnType::String,
        |s, _| Value::Str(s.check_period.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "notes",
        "Optional notes about the service",
        ColumnType::String,
        |s, _| Value::Str(s.notes.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "notes_url",
        "An optional URL with further information about the service",
        ColumnType::String,
        |s, _| Value::Str(s.notes_url.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "action_url",
        "An optional URL for actions or custom information about the service",
        ColumnType::String,
        |s, _| Value::Str(s.action_url.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "icon_image",
        "The name of an image file to be used in the web pages",
        ColumnType::String,
        |s, _| Value::Str(s.icon_image.clone()),
    );
    service_col(
        set,
        prefix,
        project,
        "in_notification_period",
        "Whether the service is currently in its notification period (0/1)",
        ColumnType::Int,
        |s, ctx| {
            Value::from_bool(
                ctx.graph()
                    .find_timeperiod(&s.notification_period)
                    .map(|tp| tp.active)
                    .unwrap_or(true),
            )
        },
    );
    service_col(
        set,
        prefix,
        project,
        "in_service_period",
        "Whether the service is currently in its service period (0/1)",
        ColumnType::Int,
        |s, ctx| {
            Value::from_bool(
                ctx.graph()
                    .find_timeperiod(&s.service_period)
                    .map(|tp| tp.active)
                    .unwrap_or(true),
            )
        },
    );
    service_col(
        set,
        prefix,
        project,
        "groups",
        "A list of all service groups this service is in",
        ColumnType::List,
        |s, ctx| {
            Value::List(
                s.groups
                    .iter()
                    .map(|id| ctx.graph().service_group(*id).name.clone())
                    .collect(),
            )
        },
    );
    service_col(
        set,
        prefix,
        project,
        "contacts",
        "A list of all contacts of this service",
        ColumnType::List,
        |s, ctx| {
            Value::List(
                s.contacts
                    .iter()
                    .map(|id| ctx.graph().contact(*id).name.clone())
                    .collect(),
            )
        },
    );
    service_col(
        set,
        prefix,
        project,
        "contact_groups",
        "A list of all contact groups this service is in",
        ColumnType::List,
        |s, ctx| {
            Value::List(
                s.contact_groups
                    .iter()
                    .map(|id| ctx.graph().contact_group(*id).name.clone())
                    .collect(),
            )
        },
    );
    service_col(
        set,
        prefix,
        project,
        "custom_variable_names",
        "A list of the names of the custom variables",
        ColumnType::List,
        |s, _| Value::List(attribute_names(&s.custom_variables, AttributeKind::CustomVariables)),
    );
    service_col(
        set,
        prefix,
        project,
        "custom_variable_values",
        "A list of the values of the custom variables",
        ColumnType::List,
        |s, _| Value::List(attribute_values(&s.custom_variables, AttributeKind::CustomVariables)),
    );
    service_col(
        set,
        prefix,
        project,
        "custom_variables",
        "A dictionary of the custom variables",
        ColumnType::DictStr,
        |s, _| Value::DictStr(attributes(&s.custom_variables, AttributeKind::CustomVariables)),
    );
    service_col(
        set,
        prefix,
        project,
        "tags",
        "A dictionary of the tags",
        ColumnType::DictStr,
        |s, _| Value::DictStr(attributes(&s.custom_variables, AttributeKind::Tags)),
    );
    service_col(
        set,
        prefix,
        project,
        "labels",
        "A dictionary of the labels",
        ColumnType::DictStr,
        |s, _| Value::DictStr(attributes(&s.custom_variables, AttributeKind::Labels)),
    );
    service_col(
        set,
        prefix,
        project,
        "label_sources",
        "A dictionary of the label sources",
        ColumnType::DictStr,
        |s, _| Value::DictStr(attributes(&s.custom_variables, AttributeKind::LabelSources)),
    );
    service_col(
        set,
        prefix,
        project,
        "comments",
        "A list of the ids of all comments of this service",
        ColumnType::List,
        |s, ctx| {
            let mut ids = Vec::new();
            ctx.core.with_comments(&mut |comments| {
                ids.extend(
                    comments
                        .values()
                        .filter(|c| c.service == Some(s.id))
                        .map(|c| c.id.to_string()),
                );
            });
            Value::List(ids)
        },
    );
    service_col(
        set,
        prefix,
        project,
        "downtimes",
        "A list of the ids of all scheduled downtimes of this service",
        ColumnType::List,
        |s, ctx| {
            let mut ids = Vec::new();
            ctx.core.with_downtimes(&mut |downtimes| {
                ids.extend(
                    downtimes
                        .values()
                        .filter(|d| d.service == Some(s.id))
                        .map(|d| d.id.to_string()),
                );
            });
            Value::List(ids)
        },
    );

    if with_host {
        hosts::add_columns(set, &format!("{prefix}host_"), hosts::project_host_of_service);
    }
}

pub struct TableServices {
    columns: ColumnSet,
}

impl TableServices {
    pub fn new() -> TableServices {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self, true);
        TableServices { columns }
    }
}

impl Default for TableServices {
    fn default() -> Self {
        TableServices::new()
    }
}

impl Table for TableServices {
    fn name(&self) -> &'static str {
        "services"
    }

    fn prefix(&self) -> &'static str {
        "service_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        let host_name = indexed_restriction(query, "services", "host_name");
        if let Some(host_name) = &host_name {
            if let Some(description) = indexed_restriction(query, "services", "description") {
                if let Some(service) = graph.find_service(host_name, &description) {
                    if user.is_authorized_for_service(service) {
                        query.process_row(RowRef::Service(service), ctx);
                    }
                }
                return;
            }
            if let Some(host) = graph.find_host(host_name) {
                for id in &host.services {
                    let service = graph.service(*id);
                    if user.is_authorized_for_service(service)
                        && !query.process_row(RowRef::Service(service), ctx)
                    {
                        return;
                    }
                }
            }
            return;
        }
        if let Some(group_name) = indexed_restriction(query, "services", "groups") {
            if let Some(group) = graph.find_service_group(&group_name) {
                for id in &group.members {
                    let service = graph.service(*id);
                    if user.is_authorized_for_service(service)
                        && !query.process_row(RowRef::Service(service), ctx)
                    {
                        return;
                    }
                }
            }
            return;
        }
        debug!(table = "services", "full scan");
        for service in graph.services() {
            if user.is_authorized_for_service(service)
                && !query.process_row(RowRef::Service(service), ctx)
            {
                return;
            }
        }
    }

    fn get_row<'a>(&self, key: &str, ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
        // WaitObject keys are "host;description" (older clients use a
        // space instead)
        let (host, description) = key.split_once(';').or_else(|| key.split_once(' '))?;
        ctx.graph()
            .find_service(host, description)
            .map(RowRef::Service)
    }
}

//! The `contacts` table.

use crate::attrs::{AttributeKind, attribute_names, attribute_values, attributes};
use crate::core::ExecContext;
use crate::model::Contact;
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::{ColumnSet, Table, entity_column_adder, indexed_restriction};
use crate::user::User;
use crate::value::{ColumnType, Value};

entity_column_adder!(contact_col, Contact, crate::model::Contact);

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection) {
    contact_col(set, prefix, project, "name", "The login name of the contact person", ColumnType::String, |c, _| {
        Value::Str(c.name.clone())
    });
    contact_col(
        set,
        prefix,
        project,
        "alias",
        "The full name of the contact",
        ColumnType::String,
        |c, _| Value::Str(c.alias.clone()),
    );
    contact_col(set, prefix, project, "email", "The email address of the contact", ColumnType::String, |c, _| {
        Value::Str(c.email.clone())
    });
    contact_col(set, prefix, project, "pager", "The pager address of the contact", ColumnType::String, |c, _| {
        Value::Str(c.pager.clone())
    });
    contact_col(
        set,
        prefix,
        project,
        "host_notification_period",
        "Time period in which the contact will be notified about host problems",
        ColumnType::String,
        |c, _| Value::Str(c.host_notification_period.clone()),
    );
    contact_col(
        set,
        prefix,
        project,
        "service_notification_period",
        "Time period in which the contact will be notified about service problems",
        ColumnType::String,
        |c, _| Value::Str(c.service_notification_period.clone()),
    );
    contact_col(
        set,
        prefix,
        project,
        "host_notifications_enabled",
        "Whether the contact will be notified about host problems (0/1)",
        ColumnType::Int,
        |c, _| Value::from_bool(c.host_notifications_enabled),
    );
    contact_col(
        set,
        prefix,
        project,
        "service_notifications_enabled",
        "Whether the contact will be notified about service problems (0/1)",
        ColumnType::Int,
        |c, _| Value::from_bool(c.service_notifications_enabled),
    );
    contact_col(
        set,
        prefix,
        project,
        "in_host_notification_period",
        "Whether the contact is currently in his/her host notification period (0/1)",
        ColumnType::Int,
        |c, ctx| {
            Value::from_bool(
                ctx.graph()
                    .find_timeperiod(&c.host_notification_period)
                    .map(|tp| tp.active)
                    .unwrap_or(true),
            )
        },
    );
    contact_col(
        set,
        prefix,
        project,
        "in_service_notification_period",
        "Whether the contact is currently in his/her service notification period (0/1)",
        ColumnType::Int,
        |c, ctx| {
            Value::from_bool(
                ctx.graph()
                    .find_timeperiod(&c.service_notification_period)
                    .map(|tp| tp.active)
                    .unwrap_or(true),
            )
        },
    );
    contact_col(
        set,
        prefix,
        project,
        "custom_variable_names",
        "A list of the names of the custom variables",
        ColumnType::List,
        |c, _| Value::List(attribute_names(&c.custom_variables, AttributeKind::CustomVariables)),
    );
    contact_col(
        set,
        prefix,
        project,
        "custom_variable_values",
        "A list of the values of the custom variables",
        ColumnType::List,
        |c, _| Value::List(attribute_values(&c.custom_variables, AttributeKind::CustomVariables)),
    );
    contact_col(
        set,
        prefix,
        project,
        "custom_variables",
        "A dictionary of the custom variables",
        ColumnType::DictStr,
        |c, _| Value::DictStr(attributes(&c.custom_variables, AttributeKind::CustomVariables)),
    );
}

pub struct TableContacts {
    columns: ColumnSet,
}

impl TableContacts {
    pub fn new() -> TableContacts {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self);
        TableContacts { columns }
    }
}

impl Default for TableContacts {
    fn default() -> Self {
        TableContacts::new()
    }
}

impl Table for TableContacts {
    fn name(&self) -> &'static str {
        "contacts"
    }

    fn prefix(&self) -> &'static str {
        "contact_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, _user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        if let Some(name) = indexed_restriction(query, "contacts", "name") {
            if let Some(contact) = graph.find_contact(&name) {
                query.process_row(RowRef::Contact(contact), ctx);
            }
            return;
        }
        for contact in graph.contacts() {
            if !query.process_row(RowRef::Contact(contact), ctx) {
                return;
            }
        }
    }

    fn get_row<'a>(&self, key: &str, ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
        ctx.graph().find_contact(key).map(RowRef::Contact)
    }
}

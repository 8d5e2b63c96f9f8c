//! The `contactgroups` table.

use crate::core::ExecContext;
use crate::model::ContactGroup;
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::{ColumnSet, Table, entity_column_adder, indexed_restriction};
use crate::user::User;
use crate::value::{ColumnType, Value};

entity_column_adder!(contact_group_col, ContactGroup, crate::model::ContactGroup);

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection) {
    contact_group_col(
        set,
        prefix,
        project,
        "name",
        "Name of the contact group",
        ColumnType::String,
        |g, _| Value::Str(g.name.clone()),
    );
    contact_group_col(
        set,
        prefix,
        project,
        "alias",
        "An alias of the contact group",
        ColumnType::String,
        |g, _| Value::Str(g.alias.clone()),
    );
    contact_group_col(
        set,
        prefix,
        project,
        "members",
        "A list of all members of this contact group",
        ColumnType::List,
        |g, ctx| {
            Value::List(
                g.members
                    .iter()
                    .map(|id| ctx.graph().contact(*id).name.clone())
                    .collect(),
            )
        },
    );
}

pub struct TableContactGroups {
    columns: ColumnSet,
}

impl TableContactGroups {
    pub fn new() -> TableContactGroups {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self);
        TableContactGroups { columns }
    }
}

impl Default for TableContactGroups {
    fn default() -> Self {
        TableContactGroups::new()
    }
}

impl Table for TableContactGroups {
    fn name(&self) -> &'static str {
        "contactgroups"
    }

    fn prefix(&self) -> &'static str {
        "contactgroup_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, _user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        if let Some(name) = indexed_restriction(query, "contactgroups", "name") {
            if let Some(group) = graph.find_contact_group(&name) {
                query.process_row(RowRef::ContactGroup(group), ctx);
            }
            return;
        }
        for group in graph.contact_groups() {
            if !query.process_row(RowRef::ContactGroup(group), ctx) {
                return;
            }
        }
    }

    fn get_row<'a>(&self, key: &str, ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
        ctx.graph().find_contact_group(key).map(RowRef::ContactGroup)
    }
}

//! The `labels` table: one row per distinct label across hosts and
//! services.

use std::collections::BTreeSet;

use crate::attrs::{AttributeKind, attributes};
use crate::core::ExecContext;
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::{ColumnSet, Table, entity_column_adder};
use crate::user::User;
use crate::value::{ColumnType, Value};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LabelRow {
    pub name: String,
    pub value: String,
}

entity_column_adder!(label_col, Label, LabelRow);

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection) {
    label_col(set, prefix, project, "name", "The name of the label", ColumnType::String, |l, _| {
        Value::Str(l.name.clone())
    });
    label_col(set, prefix, project, "value", "The value of the label", ColumnType::String, |l, _| {
        Value::Str(l.value.clone())
    });
}

pub struct TableLabels {
    columns: ColumnSet,
}

impl TableLabels {
    pub fn new() -> TableLabels {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self);
        TableLabels { columns }
    }
}

impl Default for TableLabels {
    fn default() -> Self {
        TableLabels::new()
    }
}

impl Table for TableLabels {
    fn name(&self) -> &'static str {
        "labels"
    }

    fn prefix(&self) -> &'static str {
        "label_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        let mut labels: BTreeSet<LabelRow> = BTreeSet::new();
        for host in graph.hosts() {
            if !user.is_authorized_for_host(host) {
                continue;
            }
            for (name, value) in attributes(&host.custom_variables, AttributeKind::Labels) {
                labels.insert(LabelRow { name, value });
            }
        }
        for service in graph.services() {
            if !user.is_authorized_for_service(service) {
                continue;
            }
            for (name, value) in attributes(&service.custom_variables, AttributeKind::Labels) {
                labels.insert(LabelRow { name, value });
            }
        }
        for label in &labels {
            if !query.process_row(RowRef::Label(label), ctx) {
                return;
            }
        }
    }
}

//! The `timeperiods` table.

use crate::core::ExecContext;
use crate::model::Timeperiod;
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::{ColumnSet, Table, entity_column_adder};
use crate::user::User;
use crate::value::{ColumnType, Value};

entity_column_adder!(timeperiod_col, Timeperiod, crate::model::Timeperiod);

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection) {
    timeperiod_col(set, prefix, project, "name", "The name of the time period", ColumnType::String, |tp, _| {
        Value::Str(tp.name.clone())
    });
    timeperiod_col(set, prefix, project, "alias", "The alias of the time period", ColumnType::String, |tp, _| {
        Value::Str(tp.alias.clone())
    });
    timeperiod_col(
        set,
        prefix,
        project,
        "in",
        "Whether we are currently in the time period (0/1)",
        ColumnType::Int,
        |tp, _| Value::from_bool(tp.active),
    );
    timeperiod_col(
        set,
        prefix,
        project,
        "num_transitions",
        "The total number of state transitions of the time period",
        ColumnType::Int,
        |tp, _| Value::Int(tp.num_transitions),
    );
}

pub struct TableTimeperiods {
    columns: ColumnSet,
}

impl TableTimeperiods {
    pub fn new() -> TableTimeperiods {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self);
        TableTimeperiods { columns }
    }
}

impl Default for TableTimeperiods {
    fn default() -> Self {
        TableTimeperiods::new()
    }
}

impl Table for TableTimeperiods {
    fn name(&self) -> &'static str {
        "timeperiods"
    }

    fn prefix(&self) -> &'static str {
        "timeperiod_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, _user: &User<'_>, ctx: &ExecContext<'_>) {
        for timeperiod in ctx.graph().timeperiods() {
            if !query.process_row(RowRef::Timeperiod(timeperiod), ctx) {
                return;
            }
        }
    }
}

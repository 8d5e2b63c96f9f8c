//! The `columns` meta table: one row per installed column of every table.

use crate::core::ExecContext;
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::{ColumnSet, Table, entity_column_adder};
use crate::user::User;
use crate::value::{ColumnType, Value};

/// Description of one column of one table.
#[derive(Debug, Clone)]
pub struct ColumnMetaRow {
    pub table: String,
    pub name: String,
    pub description: String,
    pub column_type: ColumnType,
}

entity_column_adder!(column_meta_col, ColumnMeta, ColumnMetaRow);

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection) {
    column_meta_col(
        set,
        prefix,
        project,
        "table",
        "The name of the table",
        ColumnType::String,
        |m, _| Value::Str(m.table.clone()),
    );
    column_meta_col(
        set,
        prefix,
        project,
        "name",
        "The name of the column within the table",
        ColumnType::String,
        |m, _| Value::Str(m.name.clone()),
    );
    column_meta_col(
        set,
        prefix,
        project,
        "description",
        "A description of the column",
        ColumnType::String,
        |m, _| Value::Str(m.description.clone()),
    );
    column_meta_col(
        set,
        prefix,
        project,
        "type",
        "The data type of the column (int, float, string, list)",
        ColumnType::String,
        |m, _| Value::Str(m.column_type.as_str().to_string()),
    );
}

pub struct TableColumns {
    columns: ColumnSet,
    rows: Vec<ColumnMetaRow>,
}

impl TableColumns {
    /// Built last: `tables` are all other tables of the registry. The meta
    /// table lists its own four columns too.
    pub fn new(tables: &[&dyn Table]) -> TableColumns {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self);

        let mut rows = Vec::new();
        let mut describe = |name: &str, set: &ColumnSet| {
            for column in set.all() {
                rows.push(ColumnMetaRow {
                    table: name.to_string(),
                    name: column.name().to_string(),
                    description: column.description().to_string(),
                    column_type: column.column_type(),
                });
            }
        };
        describe("columns", &columns);
        for table in tables {
            describe(table.name(), table.column_set());
        }
        TableColumns { columns, rows }
    }
}

impl Table for TableColumns {
    fn name(&self) -> &'static str {
        "columns"
    }

    fn prefix(&self) -> &'static str {
        ""
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, _user: &User<'_>, ctx: &ExecContext<'_>) {
        for row in &self.rows {
            if !query.process_row(RowRef::ColumnMeta(row), ctx) {
                return;
            }
        }
    }
}

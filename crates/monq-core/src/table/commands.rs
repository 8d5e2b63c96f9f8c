//! The `commands` table: command definitions known to the core.

use crate::core::{CommandDef, ExecContext};
use crate::query::Query;
use crate::row::{Projection, RowRef, project_self};
use crate::table::{ColumnSet, Table, entity_column_adder};
use crate::user::User;
use crate::value::{ColumnType, Value};

entity_column_adder!(command_col, Command, crate::core::CommandDef);

pub fn add_columns(set: &mut ColumnSet, prefix: &str, project: Projection) {
    command_col(set, prefix, project, "name", "The name of the command", ColumnType::String, |c, _| {
        Value::Str(c.name.clone())
    });
    command_col(
        set,
        prefix,
        project,
        "line",
        "The shell command line",
        ColumnType::String,
        |c, _| Value::Str(c.command_line.clone()),
    );
}

pub struct TableCommands {
    columns: ColumnSet,
}

impl TableCommands {
    pub fn new() -> TableCommands {
        let mut columns = ColumnSet::new();
        add_columns(&mut columns, "", project_self);
        TableCommands { columns }
    }
}

impl Default for TableCommands {
    fn default() -> Self {
        TableCommands::new()
    }
}

impl Table for TableCommands {
    fn name(&self) -> &'static str {
        "commands"
    }

    fn prefix(&self) -> &'static str {
        "command_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, _user: &User<'_>, ctx: &ExecContext<'_>) {
        let commands: Vec<CommandDef> = ctx.core.commands();
        for command in &commands {
            if !query.process_row(RowRef::Command(command), ctx) {
                return;
            }
        }
    }
}

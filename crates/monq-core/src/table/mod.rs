//! Tables: named collections of typed columns plus a row source.

pub mod by_group;
pub mod columns;
pub mod commands;
pub mod comments;
pub mod contactgroups;
pub mod contacts;
pub mod downtimes;
pub mod hostgroups;
pub mod hosts;
pub mod labels;
pub mod log;
pub mod servicegroups;
pub mod services;
pub mod statehist;
pub mod status;
pub mod timeperiods;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::column::Column;
use crate::core::ExecContext;
use crate::query::Query;
use crate::row::RowRef;
use crate::user::User;

pub type DynamicColumnFactory =
    Box<dyn Fn(&str, &str) -> Result<Arc<Column>, String> + Send + Sync>;

/// The columns of one table. A `BTreeMap` keeps the implicit all-columns
/// order sorted by name, which clients rely on.
#[derive(Default)]
pub struct ColumnSet {
    columns: BTreeMap<String, Arc<Column>>,
    dynamic: HashMap<String, DynamicColumnFactory>,
}

impl ColumnSet {
    pub fn new() -> ColumnSet {
        ColumnSet::default()
    }

    /// Column names must be unique per table; a duplicate is a programming
    /// error caught at startup.
    pub fn add(&mut self, column: Arc<Column>) {
        let name = column.name().to_string();
        if self.columns.insert(name.clone(), column).is_some() {
            panic!("overwriting column '{name}'");
        }
    }

    pub fn add_dynamic(&mut self, name: &str, factory: DynamicColumnFactory) {
        self.dynamic.insert(name.to_string(), factory);
    }

    pub fn all(&self) -> Vec<Arc<Column>> {
        self.columns.values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Column>> {
        self.columns.get(name).cloned()
    }

    fn dynamic_column(
        &self,
        table: &str,
        name: &str,
        rest: &str,
    ) -> Result<Arc<Column>, String> {
        let factory = self
            .dynamic
            .get(name)
            .ok_or_else(|| format!("table '{table}' has no dynamic column '{name}'"))?;
        let sep = rest
            .find(':')
            .ok_or_else(|| format!("missing separator in dynamic column '{name}'"))?;
        let column_name = &rest[..sep];
        if column_name.is_empty() {
            return Err(format!("empty column name for dynamic column '{name}'"));
        }
        factory(column_name, &rest[sep + 1..])
    }
}

pub trait Table: Send + Sync {
    fn name(&self) -> &'static str;

    /// Redundant qualifier stripped from column references, e.g. `host_`
    /// so that `host_name` and `name` address the same column.
    fn prefix(&self) -> &'static str;

    fn column_set(&self) -> &ColumnSet;

    fn column(&self, name: &str) -> Result<Arc<Column>, String> {
        lookup_column(self.name(), self.prefix(), self.column_set(), name)
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>);

    /// Row a `WaitCondition` without `WaitObject` is evaluated against.
    fn default_row<'a>(&self, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
        None
    }

    /// Resolve a `WaitObject` key. Join tables have no natural primary key
    /// and keep the default.
    fn get_row<'a>(&self, _key: &str, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
        None
    }
}

pub fn lookup_column(
    table: &str,
    prefix: &str,
    set: &ColumnSet,
    name: &str,
) -> Result<Arc<Column>, String> {
    // strip a whole sequence of prefixes
    let mut colname = name;
    if !prefix.is_empty() {
        while let Some(rest) = colname.strip_prefix(prefix) {
            colname = rest;
        }
    }
    if let Some(sep) = colname.find(':') {
        return set.dynamic_column(table, &colname[..sep], &colname[sep + 1..]);
    }
    set.get(colname)
        .or_else(|| set.get(&format!("{prefix}{colname}")))
        .ok_or_else(|| format!("table '{table}' has no column '{name}'"))
}

/// Table answering for an unknown table name: no columns, no rows. The
/// request still parses so that `ResponseHeader:` takes effect.
pub struct TableDummy {
    columns: ColumnSet,
}

impl TableDummy {
    pub fn new() -> TableDummy {
        TableDummy {
            columns: ColumnSet::new(),
        }
    }
}

impl Default for TableDummy {
    fn default() -> Self {
        TableDummy::new()
    }
}

impl Table for TableDummy {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn prefix(&self) -> &'static str {
        ""
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn column(&self, name: &str) -> Result<Arc<Column>, String> {
        // every name resolves so header parsing can continue
        Ok(Column::null(name))
    }

    fn answer_query(&self, _query: &mut Query<'_>, _user: &User<'_>, _ctx: &ExecContext<'_>) {}
}

/// Generates the typed column-adder for a row variant that carries a plain
/// entity reference.
macro_rules! entity_column_adder {
    ($fn_name:ident, $variant:ident, $entity:ty) => {
        pub(crate) fn $fn_name<F>(
            set: &mut crate::table::ColumnSet,
            prefix: &str,
            project: crate::row::Projection,
            name: &str,
            description: &str,
            ty: crate::value::ColumnType,
            f: F,
        ) where
            F: for<'a> Fn(&'a $entity, &crate::core::ExecContext<'a>) -> crate::value::Value
                + Send
                + Sync
                + 'static,
        {
            set.add(crate::column::Column::new(
                format!("{prefix}{name}"),
                description,
                ty,
                crate::column::extract_fn(move |row, ctx| match project(row, ctx) {
                    Some(crate::row::RowRef::$variant(e)) => f(e, ctx),
                    _ => ty.default_value(),
                }),
            ));
        }
    };
}
pub(crate) use entity_column_adder;

/// Shared lookup for the secondary index tables consult before scanning:
/// logs the decision like the scan strategies do.
pub(crate) fn indexed_restriction(query: &Query<'_>, table: &str, column: &str) -> Option<String> {
    let restriction = query.string_value_restriction(column);
    match &restriction {
        Some(value) => {
            tracing::debug!(table, column, value = %value, "using index lookup");
        }
        None => {
            tracing::debug!(table, column, "column is unrestricted");
        }
    }
    restriction
}

//! Columns: named, typed value extractors over row handles.

use std::sync::Arc;

use crate::core::ExecContext;
use crate::row::RowRef;
use crate::value::{ColumnType, Value};

pub type ExtractFn = Box<dyn for<'a> Fn(RowRef<'a>, &ExecContext<'a>) -> Value + Send + Sync>;

pub struct Column {
    name: String,
    description: String,
    ty: ColumnType,
    extract: ExtractFn,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        ty: ColumnType,
        extract: ExtractFn,
    ) -> Arc<Column> {
        Arc::new(Column {
            name: name.into(),
            description: description.into(),
            ty,
            extract,
        })
    }

    /// Placeholder for a column name this site does not know. Kept so
    /// column lists stay positionally stable across site versions.
    pub fn null(name: impl Into<String>) -> Arc<Column> {
        Column::new(
            name,
            "non-existing column",
            ColumnType::Null,
            Box::new(|_, _| Value::Null),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn column_type(&self) -> ColumnType {
        self.ty
    }

    pub fn value<'a>(&self, row: RowRef<'a>, ctx: &ExecContext<'a>) -> Value {
        (self.extract)(row, ctx)
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("type", &self.ty)
            .finish()
    }
}

/// Funnel that lets closures with higher-ranked reference arguments coerce
/// into the boxed extractor type.
pub fn extract_fn<F>(f: F) -> ExtractFn
where
    F: for<'a> Fn(RowRef<'a>, &ExecContext<'a>) -> Value + Send + Sync + 'static,
{
    Box::new(f)
}

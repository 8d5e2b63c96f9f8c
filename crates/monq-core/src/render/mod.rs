//! Output renderers.
//!
//! All four formats implement one row/element protocol. The engine also
//! renders rows in *bare* mode (no row delimiters) to produce the group
//! fragments that key stats aggregation; a fragment is later re-emitted
//! verbatim as the first element of its group row.

mod broken_csv;
mod csv;
mod json;
mod python;

use crate::value::Value;

pub use broken_csv::BrokenCsvRenderer;
pub use csv::CsvRenderer;
pub use json::JsonRenderer;
pub use python::PythonRenderer;

/// Separators of the legacy CSV dialect, settable per query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSeparators {
    dataset: String,
    field: String,
    list: String,
    host_service: String,
}

impl Default for CsvSeparators {
    fn default() -> Self {
        CsvSeparators {
            dataset: "\n".to_string(),
            field: ";".to_string(),
            list: ",".to_string(),
            host_service: "|".to_string(),
        }
    }
}

impl CsvSeparators {
    pub fn from_bytes(dataset: u8, field: u8, list: u8, host_service: u8) -> CsvSeparators {
        let s = |b: u8| (b as char).to_string();
        CsvSeparators {
            dataset: s(dataset),
            field: s(field),
            list: s(list),
            host_service: s(host_service),
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn list(&self) -> &str {
        &self.list
    }

    pub fn host_service(&self) -> &str {
        &self.host_service
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// The legacy dialect: configurable separators, no quoting.
    BrokenCsv,
    /// RFC-flavoured CSV with on-demand quoting.
    Csv,
    Json,
    Python,
}

pub trait Renderer: Send {
    fn begin_query(&mut self, out: &mut Vec<u8>);
    fn begin_row(&mut self, out: &mut Vec<u8>);
    /// Emit one element. Time values are shifted by the query's timezone
    /// offset here, nowhere else.
    fn output(&mut self, out: &mut Vec<u8>, value: &Value, timezone_offset: i64);
    /// Emit a pre-rendered fragment as a single element.
    fn output_fragment(&mut self, out: &mut Vec<u8>, fragment: &[u8]);
    fn end_row(&mut self, out: &mut Vec<u8>);
    fn end_query(&mut self, out: &mut Vec<u8>);
}

pub fn make_renderer(
    format: OutputFormat,
    separators: &CsvSeparators,
    bare: bool,
) -> Box<dyn Renderer> {
    match format {
        OutputFormat::BrokenCsv => Box::new(BrokenCsvRenderer::new(separators.clone(), bare)),
        OutputFormat::Csv => Box::new(CsvRenderer::new(bare)),
        OutputFormat::Json => Box::new(JsonRenderer::new(bare)),
        OutputFormat::Python => Box::new(PythonRenderer::new(bare)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_rows(format: OutputFormat, rows: &[Vec<Value>]) -> String {
        let separators = CsvSeparators::default();
        let mut renderer = make_renderer(format, &separators, false);
        let mut out = Vec::new();
        renderer.begin_query(&mut out);
        for row in rows {
            renderer.begin_row(&mut out);
            for value in row {
                renderer.output(&mut out, value, 0);
            }
            renderer.end_row(&mut out);
        }
        renderer.end_query(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn broken_csv_row_shape() {
        let body = render_rows(
            OutputFormat::BrokenCsv,
            &[
                vec![Value::Str("foo".into()), Value::Int(2)],
                vec![Value::Str("bar".into()), Value::Int(0)],
            ],
        );
        assert_eq!(body, "foo;2\nbar;0\n");
    }

    #[test]
    fn broken_csv_lists_and_dicts() {
        let body = render_rows(
            OutputFormat::BrokenCsv,
            &[vec![
                Value::List(vec!["a".into(), "b".into()]),
                Value::DictStr(vec![("k".into(), "v".into()), ("x".into(), "y".into())]),
            ]],
        );
        assert_eq!(body, "a,b;k|v,x|y\n");
    }

    #[test]
    fn json_array_of_arrays() {
        let body = render_rows(
            OutputFormat::Json,
            &[vec![
                Value::Str("a\"b".into()),
                Value::Int(-1),
                Value::List(vec!["x".into()]),
                Value::Null,
            ]],
        );
        assert_eq!(body, "[[\"a\\\"b\",-1,[\"x\"],null]]\n");
    }

    #[test]
    fn json_time_is_shifted_by_the_timezone_offset() {
        let separators = CsvSeparators::default();
        let mut renderer = make_renderer(OutputFormat::Json, &separators, false);
        let mut out = Vec::new();
        renderer.begin_query(&mut out);
        renderer.begin_row(&mut out);
        renderer.output(&mut out, &Value::Time(1000), 1800);
        renderer.end_row(&mut out);
        renderer.end_query(&mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "[[2800]]\n");
    }

    #[test]
    fn python_uses_none_and_bytes_literals() {
        let body = render_rows(
            OutputFormat::Python,
            &[vec![Value::Null, Value::Blob(vec![0x41, 0x00])]],
        );
        assert_eq!(body, "[[None,b\"A\\x00\"]]\n");
    }

    #[test]
    fn rfc_csv_quotes_on_demand() {
        let body = render_rows(
            OutputFormat::Csv,
            &[vec![
                Value::Str("plain".into()),
                Value::Str("with,comma".into()),
                Value::Str("with\"quote".into()),
            ]],
        );
        assert_eq!(body, "plain,\"with,comma\",\"with\"\"quote\"\r\n");
    }

    #[test]
    fn custom_separators_change_the_broken_dialect() {
        let separators = CsvSeparators::from_bytes(10, 59, 44, 124);
        assert_eq!(separators, CsvSeparators::default());
        let tabbed = CsvSeparators::from_bytes(10, 9, 44, 124);
        let mut renderer = make_renderer(OutputFormat::BrokenCsv, &tabbed, false);
        let mut out = Vec::new();
        renderer.begin_query(&mut out);
        renderer.begin_row(&mut out);
        renderer.output(&mut out, &Value::Str("a".into()), 0);
        renderer.output(&mut out, &Value::Str("b".into()), 0);
        renderer.end_row(&mut out);
        renderer.end_query(&mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "a\tb\n");
    }

    #[test]
    fn fragment_counts_as_one_element() {
        let separators = CsvSeparators::default();
        let mut renderer = make_renderer(OutputFormat::BrokenCsv, &separators, false);
        let mut out = Vec::new();
        renderer.begin_query(&mut out);
        renderer.begin_row(&mut out);
        renderer.output_fragment(&mut out, b"grp;x");
        renderer.output(&mut out, &Value::Int(5), 0);
        renderer.end_row(&mut out);
        renderer.end_query(&mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "grp;x;5\n");
    }
}

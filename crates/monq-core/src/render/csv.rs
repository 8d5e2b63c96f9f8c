//! RFC-flavoured CSV: fixed separators, quoting on demand.

use super::Renderer;
use super::broken_csv::format_double;
use crate::value::Value;

const FIELD_SEPARATOR: &str = ",";
const DATASET_SEPARATOR: &str = "\r\n";
const LIST_SEPARATOR: &str = ",";
const HOST_SERVICE_SEPARATOR: &str = "|";

pub struct CsvRenderer {
    bare: bool,
    first_element: bool,
}

impl CsvRenderer {
    pub fn new(bare: bool) -> CsvRenderer {
        CsvRenderer {
            bare,
            first_element: true,
        }
    }

    fn separate(&mut self, out: &mut Vec<u8>) {
        if self.first_element {
            self.first_element = false;
        } else {
            out.extend_from_slice(FIELD_SEPARATOR.as_bytes());
        }
    }

    fn field(out: &mut Vec<u8>, raw: &str) {
        if raw.contains(['"', ',', '\r', '\n']) {
            out.push(b'"');
            for c in raw.bytes() {
                if c == b'"' {
                    out.push(b'"');
                }
                out.push(c);
            }
            out.push(b'"');
        } else {
            out.extend_from_slice(raw.as_bytes());
        }
    }

    fn render_value(value: &Value, timezone_offset: i64) -> String {
        match value {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => format_double(*d),
            Value::Time(t) => (t + timezone_offset).to_string(),
            Value::List(items) => items.join(LIST_SEPARATOR),
            Value::Sublists(records) => records
                .iter()
                .map(|record| {
                    record
                        .iter()
                        .map(|f| CsvRenderer::render_value(f, timezone_offset))
                        .collect::<Vec<_>>()
                        .join(HOST_SERVICE_SEPARATOR)
                })
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
            Value::DictStr(entries) => entries
                .iter()
                .map(|(k, v)| format!("{k}{HOST_SERVICE_SEPARATOR}{v}"))
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
            Value::DictDouble(entries) => entries
                .iter()
                .map(|(k, v)| format!("{k}{HOST_SERVICE_SEPARATOR}{}", format_double(*v)))
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
            Value::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::Null => String::new(),
        }
    }
}

impl Renderer for CsvRenderer {
    fn begin_query(&mut self, _out: &mut Vec<u8>) {}

    fn begin_row(&mut self, _out: &mut Vec<u8>) {
        self.first_element = true;
    }

    fn output(&mut self, out: &mut Vec<u8>, value: &Value, timezone_offset: i64) {
        self.separate(out);
        CsvRenderer::field(out, &CsvRenderer::render_value(value, timezone_offset));
    }

    fn output_fragment(&mut self, out: &mut Vec<u8>, fragment: &[u8]) {
        self.separate(out);
        out.extend_from_slice(fragment);
    }

    fn end_row(&mut self, out: &mut Vec<u8>) {
        if !self.bare {
            out.extend_from_slice(DATASET_SEPARATOR.as_bytes());
        }
    }

    fn end_query(&mut self, _out: &mut Vec<u8>) {}
}

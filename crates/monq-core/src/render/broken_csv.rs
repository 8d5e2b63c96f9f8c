//! The legacy CSV dialect: configurable separators, no quoting at all.
//!
//! Values containing a separator byte corrupt the table — that is the
//! historical behavior clients depend on, hence "broken".

use super::{CsvSeparators, Renderer};
use crate::value::Value;

pub struct BrokenCsvRenderer {
    separators: CsvSeparators,
    bare: bool,
    first_element: bool,
}

impl BrokenCsvRenderer {
    pub fn new(separators: CsvSeparators, bare: bool) -> BrokenCsvRenderer {
        BrokenCsvRenderer {
            separators,
            bare,
            first_element: true,
        }
    }

    fn separate(&mut self, out: &mut Vec<u8>) {
        if self.first_element {
            self.first_element = false;
        } else {
            out.extend_from_slice(self.separators.field().as_bytes());
        }
    }

    fn render_value(&self, out: &mut Vec<u8>, value: &Value, timezone_offset: i64) {
        match value {
            Value::Str(s) => out.extend_from_slice(s.as_bytes()),
            Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Value::Double(d) => out.extend_from_slice(format_double(*d).as_bytes()),
            Value::Time(t) => {
                out.extend_from_slice((t + timezone_offset).to_string().as_bytes())
            }
            Value::List(items) => {
                out.extend_from_slice(items.join(self.separators.list()).as_bytes())
            }
            Value::Sublists(records) => {
                for (i, record) in records.iter().enumerate() {
                    if i > 0 {
                        out.extend_from_slice(self.separators.list().as_bytes());
                    }
                    for (j, field) in record.iter().enumerate() {
                        if j > 0 {
                            out.extend_from_slice(self.separators.host_service().as_bytes());
                        }
                        self.render_value(out, field, timezone_offset);
                    }
                }
            }
            Value::DictStr(entries) => {
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.extend_from_slice(self.separators.list().as_bytes());
                    }
                    out.extend_from_slice(k.as_bytes());
                    out.extend_from_slice(self.separators.host_service().as_bytes());
                    out.extend_from_slice(v.as_bytes());
                }
            }
            Value::DictDouble(entries) => {
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.extend_from_slice(self.separators.list().as_bytes());
                    }
                    out.extend_from_slice(k.as_bytes());
                    out.extend_from_slice(self.separators.host_service().as_bytes());
                    out.extend_from_slice(format_double(*v).as_bytes());
                }
            }
            Value::Blob(bytes) => out.extend_from_slice(bytes),
            Value::Null => {}
        }
    }
}

pub(super) fn format_double(d: f64) -> String {
    format!("{d}")
}

impl Renderer for BrokenCsvRenderer {
    fn begin_query(&mut self, _out: &mut Vec<u8>) {}

    fn begin_row(&mut self, _out: &mut Vec<u8>) {
        self.first_element = true;
    }

    fn output(&mut self, out: &mut Vec<u8>, value: &Value, timezone_offset: i64) {
        self.separate(out);
        self.render_value(out, value, timezone_offset);
    }

    fn output_fragment(&mut self, out: &mut Vec<u8>, fragment: &[u8]) {
        self.separate(out);
        out.extend_from_slice(fragment);
    }

    fn end_row(&mut self, out: &mut Vec<u8>) {
        if !self.bare {
            out.extend_from_slice(self.separators.dataset().as_bytes());
        }
    }

    fn end_query(&mut self, _out: &mut Vec<u8>) {}
}

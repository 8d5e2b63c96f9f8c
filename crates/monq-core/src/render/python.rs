//! Python-literal output, structurally identical to JSON.
//!
//! JSON string escaping is valid Python source, so strings reuse it. The
//! differences: `None` instead of `null` and bytes literals for blobs.

use super::Renderer;
use crate::value::Value;

pub struct PythonRenderer {
    bare: bool,
    first_row: bool,
    first_element: bool,
}

impl PythonRenderer {
    pub fn new(bare: bool) -> PythonRenderer {
        PythonRenderer {
            bare,
            first_row: true,
            first_element: true,
        }
    }

    fn separate(&mut self, out: &mut Vec<u8>) {
        if self.first_element {
            self.first_element = false;
        } else {
            out.push(b',');
        }
    }

    fn string(out: &mut Vec<u8>, s: &str) {
        match serde_json::to_string(s) {
            Ok(quoted) => out.extend_from_slice(quoted.as_bytes()),
            Err(_) => out.extend_from_slice(b"\"\""),
        }
    }

    fn bytes_literal(out: &mut Vec<u8>, bytes: &[u8]) {
        out.extend_from_slice(b"b\"");
        for &b in bytes {
            match b {
                b'"' => out.extend_from_slice(b"\\\""),
                b'\\' => out.extend_from_slice(b"\\\\"),
                0x20..=0x7e => out.push(b),
                _ => out.extend_from_slice(format!("\\x{b:02x}").as_bytes()),
            }
        }
        out.push(b'"');
    }

    fn render_value(out: &mut Vec<u8>, value: &Value, timezone_offset: i64) {
        match value {
            Value::Str(s) => PythonRenderer::string(out, s),
            Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Value::Double(d) => {
                if d.is_finite() {
                    out.extend_from_slice(format!("{d}").as_bytes());
                } else {
                    out.extend_from_slice(b"None");
                }
            }
            Value::Time(t) => {
                out.extend_from_slice((t + timezone_offset).to_string().as_bytes())
            }
            Value::List(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    PythonRenderer::string(out, item);
                }
                out.push(b']');
            }
            Value::Sublists(records) => {
                out.push(b'[');
                for (i, record) in records.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    out.push(b'[');
                    for (j, field) in record.iter().enumerate() {
                        if j > 0 {
                            out.push(b',');
                        }
                        PythonRenderer::render_value(out, field, timezone_offset);
                    }
                    out.push(b']');
                }
                out.push(b']');
            }
            Value::DictStr(entries) => {
                out.push(b'{');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    PythonRenderer::string(out, k);
                    out.push(b':');
                    PythonRenderer::string(out, v);
                }
                out.push(b'}');
            }
            Value::DictDouble(entries) => {
                out.push(b'{');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    PythonRenderer::string(out, k);
                    out.push(b':');
                    out.extend_from_slice(format!("{v}").as_bytes());
                }
                out.push(b'}');
            }
            Value::Blob(bytes) => PythonRenderer::bytes_literal(out, bytes),
            Value::Null => out.extend_from_slice(b"None"),
        }
    }
}

impl Renderer for PythonRenderer {
    fn begin_query(&mut self, out: &mut Vec<u8>) {
        if !self.bare {
            out.push(b'[');
        }
    }

    fn begin_row(&mut self, out: &mut Vec<u8>) {
        if !self.bare {
            if self.first_row {
                self.first_row = false;
            } else {
                out.extend_from_slice(b",\n");
            }
            out.push(b'[');
        }
        self.first_element = true;
    }

    fn output(&mut self, out: &mut Vec<u8>, value: &Value, timezone_offset: i64) {
        self.separate(out);
        PythonRenderer::render_value(out, value, timezone_offset);
    }

    fn output_fragment(&mut self, out: &mut Vec<u8>, fragment: &[u8]) {
        self.separate(out);
        out.extend_from_slice(fragment);
    }

    fn end_row(&mut self, out: &mut Vec<u8>) {
        if !self.bare {
            out.push(b']');
        }
    }

    fn end_query(&mut self, out: &mut Vec<u8>) {
        if !self.bare {
            out.extend_from_slice(b"]\n");
        }
    }
}

//! JSON output: one array of row arrays.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::Renderer;
use crate::value::Value;

pub struct JsonRenderer {
    bare: bool,
    first_row: bool,
    first_element: bool,
}

impl JsonRenderer {
    pub fn new(bare: bool) -> JsonRenderer {
        JsonRenderer {
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
        // serde_json produces the escaping; strings are the only place it
        // is non-trivial
        match serde_json::to_string(s) {
            Ok(quoted) => out.extend_from_slice(quoted.as_bytes()),
            Err(_) => out.extend_from_slice(b"\"\""),
        }
    }

    fn number(out: &mut Vec<u8>, d: f64) {
        match serde_json::Number::from_f64(d) {
            Some(n) => out.extend_from_slice(n.to_string().as_bytes()),
            None => out.extend_from_slice(b"null"),
        }
    }

    fn render_value(out: &mut Vec<u8>, value: &Value, timezone_offset: i64) {
        match value {
            Value::Str(s) => JsonRenderer::string(out, s),
            Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Value::Double(d) => JsonRenderer::number(out, *d),
            Value::Time(t) => {
                out.extend_from_slice((t + timezone_offset).to_string().as_bytes())
            }
            Value::List(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    JsonRenderer::string(out, item);
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
                        JsonRenderer::render_value(out, field, timezone_offset);
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
                    JsonRenderer::string(out, k);
                    out.push(b':');
                    JsonRenderer::string(out, v);
                }
                out.push(b'}');
            }
            Value::DictDouble(entries) => {
                out.push(b'{');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    JsonRenderer::string(out, k);
                    out.push(b':');
                    JsonRenderer::number(out, *v);
                }
                out.push(b'}');
            }
            Value::Blob(bytes) => JsonRenderer::string(out, &BASE64.encode(bytes)),
            Value::Null => out.extend_from_slice(b"null"),
        }
    }
}

impl Renderer for JsonRenderer {
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
        JsonRenderer::render_value(out, value, timezone_offset);
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

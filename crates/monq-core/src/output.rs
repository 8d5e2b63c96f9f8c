//! Response assembly and framing.
//!
//! The whole response body is built in memory, then flushed in one go so
//! the optional fixed16 status line can carry the final length. Errors are
//! visible to the client only with `ResponseHeader: fixed16`; without it
//! the body is simply suppressed and the error logged, which is what
//! legacy clients expect.

use std::io::{self, Write};

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok = 200,
    InvalidHeader = 400,
    NotFound = 404,
    PayloadTooLarge = 413,
    IncompleteRequest = 451,
    InvalidRequest = 452,
    BadGateway = 502,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseHeaderMode {
    #[default]
    Off,
    Fixed16,
}

#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
    response_header: ResponseHeaderMode,
    error: Option<(ResponseCode, String)>,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        OutputBuffer::new()
    }
}

impl OutputBuffer {
    pub fn new() -> OutputBuffer {
        OutputBuffer {
            data: Vec::new(),
            response_header: ResponseHeaderMode::Off,
            error: None,
        }
    }

    pub fn set_response_header(&mut self, mode: ResponseHeaderMode) {
        self.response_header = mode;
    }

    /// Record an error. The first one wins; a query reports its parse
    /// error exactly once, before any rows.
    pub fn set_error(&mut self, code: ResponseCode, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some((code, message.into()));
        }
    }

    pub fn error(&self) -> Option<&(ResponseCode, String)> {
        self.error.as_ref()
    }

    pub fn data(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the framed response. Consumes nothing; a keep-alive
    /// connection reuses the buffer after `reset`.
    pub fn flush(&self, writer: &mut dyn Write) -> io::Result<()> {
        match (&self.error, self.response_header) {
            (None, ResponseHeaderMode::Off) => writer.write_all(&self.data),
            (None, ResponseHeaderMode::Fixed16) => {
                writer.write_all(fixed16(ResponseCode::Ok, self.data.len()).as_bytes())?;
                writer.write_all(&self.data)
            }
            (Some((code, message)), ResponseHeaderMode::Off) => {
                warn!(code = *code as u16, error = %message, "request failed");
                Ok(())
            }
            (Some((code, message)), ResponseHeaderMode::Fixed16) => {
                warn!(code = *code as u16, error = %message, "request failed");
                let body = format!("{message}\n");
                writer.write_all(fixed16(*code, body.len()).as_bytes())?;
                writer.write_all(body.as_bytes())
            }
        }
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.error = None;
        self.response_header = ResponseHeaderMode::Off;
    }
}

/// The 16-byte status line: three-digit code, space, width-11 length,
/// newline.
fn fixed16(code: ResponseCode, length: usize) -> String {
    format!("{:03} {:>11}\n", code as u16, length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed16_is_sixteen_bytes() {
        assert_eq!(fixed16(ResponseCode::Ok, 0).len(), 16);
        assert_eq!(fixed16(ResponseCode::PayloadTooLarge, 123456).len(), 16);
        assert_eq!(fixed16(ResponseCode::Ok, 17), "200          17\n");
    }

    #[test]
    fn first_error_wins() {
        let mut out = OutputBuffer::new();
        out.set_error(ResponseCode::InvalidRequest, "first");
        out.set_error(ResponseCode::NotFound, "second");
        let (code, message) = out.error().unwrap();
        assert_eq!(*code, ResponseCode::InvalidRequest);
        assert_eq!(message, "first");
    }

    #[test]
    fn flush_without_header_sends_raw_body() {
        let mut out = OutputBuffer::new();
        out.data().extend_from_slice(b"foo;2\n");
        let mut sink = Vec::new();
        out.flush(&mut sink).unwrap();
        assert_eq!(sink, b"foo;2\n");
    }

    #[test]
    fn flush_with_fixed16_frames_body_and_errors() {
        let mut out = OutputBuffer::new();
        out.set_response_header(ResponseHeaderMode::Fixed16);
        out.data().extend_from_slice(b"x\n");
        let mut sink = Vec::new();
        out.flush(&mut sink).unwrap();
        assert_eq!(String::from_utf8(sink).unwrap(), "200           2\nx\n");

        let mut out = OutputBuffer::new();
        out.set_response_header(ResponseHeaderMode::Fixed16);
        out.set_error(ResponseCode::NotFound, "no such table");
        let mut sink = Vec::new();
        out.flush(&mut sink).unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(text.starts_with("404 "));
        assert!(text.ends_with("no such table\n"));
    }

    #[test]
    fn error_without_fixed16_suppresses_the_body() {
        let mut out = OutputBuffer::new();
        out.data().extend_from_slice(b"partial");
        out.set_error(ResponseCode::PayloadTooLarge, "too big");
        let mut sink = Vec::new();
        out.flush(&mut sink).unwrap();
        assert!(sink.is_empty());
    }
}

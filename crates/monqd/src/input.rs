//! Request framing on a client connection.
//!
//! A request is one command line (`GET <table>`, `COMMAND <text>`)
//! followed by header lines, terminated by a blank line or EOF. Two
//! timeouts apply: the idle timeout between requests (expiry closes the
//! connection silently) and the query timeout while a request is being
//! read (expiry is an incomplete request).

use std::io::{self, BufRead, BufReader, Read};
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
pub enum Request {
    Get {
        table: String,
        headers: Vec<String>,
    },
    Command(String),
    /// The command line was not recognized at all.
    Invalid(String),
    /// Clean close or idle timeout: no reply, just hang up.
    Closed,
    /// The client stopped talking in the middle of a request.
    Incomplete,
}

/// Abstraction over the stream so the framing is testable without
/// sockets. `set_timeout` is a no-op for in-memory readers.
pub trait RequestStream: Read {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

pub struct InputBuffer<S: RequestStream> {
    reader: BufReader<S>,
    query_timeout: Duration,
    idle_timeout: Duration,
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

impl<S: RequestStream> InputBuffer<S> {
    pub fn new(stream: S, query_timeout: Duration, idle_timeout: Duration) -> InputBuffer<S> {
        InputBuffer {
            reader: BufReader::new(stream),
            query_timeout,
            idle_timeout,
        }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line.trim_end_matches(['\n', '\r']).to_string())),
            Err(e) => Err(e),
        }
    }

    /// Read one request. Empty lines between requests are skipped.
    pub fn read_request(&mut self) -> Request {
        self.reader
            .get_mut()
            .set_timeout(self.idle_timeout)
            .ok();
        let command_line = loop {
            match self.read_line() {
                Ok(None) => return Request::Closed,
                Ok(Some(line)) if line.is_empty() => continue,
                Ok(Some(line)) => break line,
                Err(e) if is_timeout(&e) => return Request::Closed,
                Err(_) => return Request::Closed,
            }
        };

        if let Some(rest) = command_line.strip_prefix("COMMAND ") {
            return Request::Command(rest.trim_start().to_string());
        }
        let table = match command_line.strip_prefix("GET") {
            Some(rest) => rest.trim().to_string(),
            None => return Request::Invalid(command_line),
        };

        self.reader
            .get_mut()
            .set_timeout(self.query_timeout)
            .ok();
        let mut headers = Vec::new();
        loop {
            match self.read_line() {
                // EOF is a valid request terminator
                Ok(None) => break,
                Ok(Some(line)) if line.is_empty() => break,
                Ok(Some(line)) => headers.push(line),
                Err(e) if is_timeout(&e) => return Request::Incomplete,
                Err(_) => return Request::Incomplete,
            }
        }
        Request::Get { table, headers }
    }
}

impl RequestStream for std::os::unix::net::UnixStream {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self.set_read_timeout(timeout)
    }
}

/// In-memory stream for tests.
#[cfg(test)]
pub struct MemoryStream(pub io::Cursor<Vec<u8>>);

#[cfg(test)]
impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

#[cfg(test)]
impl RequestStream for MemoryStream {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(text: &str) -> InputBuffer<MemoryStream> {
        InputBuffer::new(
            MemoryStream(io::Cursor::new(text.as_bytes().to_vec())),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn get_request_with_headers() {
        let mut input = buffer("GET hosts\nColumns: name\nLimit: 1\n\n");
        assert_eq!(
            input.read_request(),
            Request::Get {
                table: "hosts".to_string(),
                headers: vec!["Columns: name".to_string(), "Limit: 1".to_string()],
            }
        );
        assert_eq!(input.read_request(), Request::Closed);
    }

    #[test]
    fn eof_terminates_a_request_like_a_blank_line() {
        let mut input = buffer("GET hosts\nColumns: name");
        assert_eq!(
            input.read_request(),
            Request::Get {
                table: "hosts".to_string(),
                headers: vec!["Columns: name".to_string()],
            }
        );
    }

    #[test]
    fn command_requests_are_single_lines() {
        let mut input = buffer("COMMAND [1700000000] DISABLE_NOTIFICATIONS\n");
        assert_eq!(
            input.read_request(),
            Request::Command("[1700000000] DISABLE_NOTIFICATIONS".to_string())
        );
    }

    #[test]
    fn two_requests_on_one_connection() {
        let mut input = buffer("GET hosts\n\nGET services\n\n");
        assert!(matches!(input.read_request(), Request::Get { table, .. } if table == "hosts"));
        assert!(matches!(input.read_request(), Request::Get { table, .. } if table == "services"));
        assert_eq!(input.read_request(), Request::Closed);
    }

    #[test]
    fn unknown_methods_are_invalid() {
        let mut input = buffer("PUT hosts\n");
        assert_eq!(input.read_request(), Request::Invalid("PUT hosts".to_string()));
    }

    #[test]
    fn missing_table_name_still_parses() {
        let mut input = buffer("GET\n\n");
        assert_eq!(
            input.read_request(),
            Request::Get {
                table: String::new(),
                headers: Vec::new(),
            }
        );
    }
}

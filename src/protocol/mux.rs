//! Protocol multiplexer: one listening port, two protocols.
//!
//! The first chunk read from a connection decides: a leading HTTP method
//! token makes the whole connection a single HTTP exchange, anything else
//! starts a line-protocol session in which that chunk is the first input.

use std::io;
use std::path::PathBuf;

use log::debug;

use crate::app::service::CommandProcessor;
use crate::shutdown::Shutdown;

use super::transport::{Connection, is_timeout};
use super::{http, session};

const HTTP_METHODS: [&[u8]; 3] = [b"GET ", b"POST ", b"OPTIONS "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Line,
}

pub fn classify(first: &[u8]) -> Protocol {
    if HTTP_METHODS.iter().any(|m| first.starts_with(m)) {
        Protocol::Http
    } else {
        Protocol::Line
    }
}

/// Per-connection entry point handed to the accept loop.
#[derive(Clone)]
pub struct Multiplexer {
    processor: CommandProcessor,
    web_root: PathBuf,
    shutdown: Shutdown,
}

impl Multiplexer {
    pub fn new(processor: CommandProcessor, web_root: PathBuf, shutdown: Shutdown) -> Self {
        Self {
            processor,
            web_root,
            shutdown,
        }
    }

    /// Serve one connection to completion.
    pub fn serve<C: Connection + ?Sized>(&self, conn: &mut C) -> io::Result<()> {
        let Some(first) = self.read_first(conn)? else {
            debug!("Connection from {} closed before sending data", conn.peer());
            return Ok(());
        };

        match classify(&first) {
            Protocol::Http => http::serve(conn, &first, &self.processor, &self.web_root),
            Protocol::Line => session::run(conn, &first, &self.processor, &self.shutdown).map(|_| ()),
        }
    }

    /// First non-empty chunk, or `None` on EOF or shutdown.
    fn read_first<C: Connection + ?Sized>(&self, conn: &mut C) -> io::Result<Option<Vec<u8>>> {
        let mut buf = [0u8; 1024];
        loop {
            if self.shutdown.is_triggered() {
                return Ok(None);
            }
            match conn.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => return Ok(Some(buf[..n].to_vec())),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim_hal::SimHal;
    use crate::config::SystemConfig;
    use crate::protocol::http::CommandReply;
    use crate::protocol::transport::mock::{MockConnection, Step};
    use crate::registry::CapabilityTable;
    use std::sync::Arc;

    fn mux() -> Multiplexer {
        let shutdown = Shutdown::new();
        let table = CapabilityTable::load(&SystemConfig::default(), Arc::new(SimHal::new()), &shutdown);
        let processor = CommandProcessor::new(Arc::new(table), shutdown.clone());
        Multiplexer::new(processor, PathBuf::from("/nonexistent-web-root"), shutdown)
    }

    fn body_of(output: &str) -> &str {
        output.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or_default()
    }

    #[test]
    fn classifies_method_tokens() {
        assert_eq!(classify(b"GET / HTTP/1.1\r\n"), Protocol::Http);
        assert_eq!(classify(b"POST /api/command HTTP/1.1"), Protocol::Http);
        assert_eq!(classify(b"OPTIONS * HTTP/1.1"), Protocol::Http);
        assert_eq!(classify(b"GETX"), Protocol::Line);
        assert_eq!(classify(b"LED_ON\n"), Protocol::Line);
        assert_eq!(classify(b""), Protocol::Line);
    }

    #[test]
    fn http_post_runs_command() {
        let m = mux();
        let body = r#"{"command":"LED_ON"}"#;
        let req = format!(
            "POST /api/command HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let mut conn = MockConnection::new([MockConnection::data(&req)]);
        m.serve(&mut conn).unwrap();
        let out = conn.output();
        assert!(out.starts_with("HTTP/1.1 200 OK"));
        let reply: CommandReply = serde_json::from_str(body_of(&out)).unwrap();
        assert_eq!(reply.command, "LED_ON");
        assert_eq!(reply.response, "OK: LED on");
    }

    #[test]
    fn http_body_in_later_chunk() {
        let m = mux();
        let mut conn = MockConnection::new([
            MockConnection::data("POST /api/command HTTP/1.1\r\nContent-Length: 18\r\n\r\n"),
            Step::Timeout,
            MockConnection::data(r#"{"command":"HELP"}"#),
        ]);
        m.serve(&mut conn).unwrap();
        let reply: CommandReply = serde_json::from_str(body_of(&conn.output())).unwrap();
        assert_eq!(reply.command, "HELP");
        assert_eq!(reply.response, crate::app::service::HELP_TEXT);
    }

    #[test]
    fn unparseable_body_reports_unknown() {
        let m = mux();
        let mut conn = MockConnection::new([MockConnection::data(
            "POST /api/command HTTP/1.1\r\nContent-Length: 9\r\n\r\n{\"cmd\":1}",
        )]);
        m.serve(&mut conn).unwrap();
        let reply: CommandReply = serde_json::from_str(body_of(&conn.output())).unwrap();
        assert_eq!(reply.command, "UNKNOWN");
        assert!(reply.response.starts_with("ERROR: command parse failed"));
    }

    #[test]
    fn get_root_falls_back_to_builtin_page() {
        let m = mux();
        let mut conn = MockConnection::new([MockConnection::data("GET / HTTP/1.1\r\n\r\n")]);
        m.serve(&mut conn).unwrap();
        let out = conn.output();
        assert!(out.starts_with("HTTP/1.1 200 OK"));
        assert!(out.contains("text/html"));
        assert!(out.contains("/api/command"));
    }

    #[test]
    fn options_and_not_found() {
        let m = mux();
        let mut conn = MockConnection::new([MockConnection::data("OPTIONS /api/command HTTP/1.1\r\n\r\n")]);
        m.serve(&mut conn).unwrap();
        assert!(conn.output().starts_with("HTTP/1.1 200 OK"));
        assert!(conn.output().contains("Content-Length: 0\r\n"));

        let mut conn = MockConnection::new([MockConnection::data("GET /secret HTTP/1.1\r\n\r\n")]);
        m.serve(&mut conn).unwrap();
        assert!(conn.output().starts_with("HTTP/1.1 404 Not Found"));
    }

    #[test]
    fn line_session_when_not_http() {
        let m = mux();
        let mut conn = MockConnection::new([MockConnection::data("LED_BRIGHTNESS 2\n")]);
        m.serve(&mut conn).unwrap();
        assert_eq!(conn.output(), "CONNECTED\nOK: LED brightness set to 2\n");
    }
}

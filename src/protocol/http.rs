//! One-shot HTTP handling: CORS preflight, the control page and the
//! JSON command endpoint.
//!
//! Only what the web page and `curl` need is understood.  The request
//! line and headers are read up to the blank line; a body is read only
//! as far as `Content-Length` says.  Every response closes the
//! connection.

use std::io::{self, Read, Write};
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::service::{CommandProcessor, Response};
use crate::error::ProtocolError;

use super::transport::is_timeout;

/// Header block plus body may not exceed this.
pub const MAX_REQUEST: usize = 16 * 1024;
/// Longest accepted `command` string.
pub const MAX_COMMAND_LEN: usize = 255;

pub const API_PATH: &str = "/api/command";

const FALLBACK_PAGE: &str = "<!DOCTYPE html><html><head><meta charset='UTF-8'><title>IoT Control</title></head>\
<body><h1>IoT device control</h1><p>Create web/index.html to replace this page.</p>\
<button onclick=\"fetch('/api/command',{method:'POST',headers:{'Content-Type':'application/json'},\
body:JSON.stringify({command:'HELP'})}).then(r=>r.json()).then(d=>alert(d.response))\">Test</button></body></html>";

const NOT_FOUND_PAGE: &str = "<!DOCTYPE html><html><body><h1>404 Not Found</h1></body></html>";

// ───────────────────────────────────────────────────────────────
// Request
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Read timeouts tolerated while a request is still incomplete.
const MAX_IDLE_READS: u8 = 3;

/// Append one read to `buf`.  `Ok(false)` means no more data is coming.
fn fill<R: Read + ?Sized>(src: &mut R, buf: &mut Vec<u8>, idle: &mut u8) -> io::Result<bool> {
    let mut chunk = [0u8; 1024];
    loop {
        match src.read(&mut chunk) {
            Ok(0) => return Ok(false),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                return Ok(true);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => {
                *idle += 1;
                return Ok(*idle < MAX_IDLE_READS);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read the rest of a request whose first bytes are `first`.
///
/// A stream that ends or stalls early yields whatever arrived; the
/// router decides whether that is enough.
pub fn read_request<R: Read + ?Sized>(src: &mut R, first: &[u8]) -> io::Result<HttpRequest> {
    let mut buf = first.to_vec();
    let mut idle = 0u8;

    let head_len = loop {
        if let Some(end) = header_end(&buf) {
            break end;
        }
        if buf.len() >= MAX_REQUEST || !fill(src, &mut buf, &mut idle)? {
            break buf.len();
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();
    let wanted = content_length(&head).min(MAX_REQUEST.saturating_sub(head_len));
    while buf.len() < head_len + wanted {
        if !fill(src, &mut buf, &mut idle)? {
            break;
        }
    }

    let mut parts = head.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    let body_end = buf.len().min(head_len + wanted);
    let body = buf[head_len..body_end].to_vec();

    Ok(HttpRequest { method, path, body })
}

// ───────────────────────────────────────────────────────────────
// Response
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    fn new(status: &'static str, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// Serialize with the CORS and connection headers every reply carries.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            self.status,
            self.content_type,
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}

// ───────────────────────────────────────────────────────────────
// JSON API
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CommandBody {
    command: String,
}

/// Body of every `/api/command` reply.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandReply {
    pub command: String,
    pub response: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Pull the `command` string out of a request body.
pub fn extract_command(body: &[u8]) -> Result<String, ProtocolError> {
    let parsed: CommandBody =
        serde_json::from_slice(body).map_err(|e| ProtocolError::ParseFailure(e.to_string()))?;
    let command = parsed.command.trim();
    if command.is_empty() {
        return Err(ProtocolError::ParseFailure("empty command".into()));
    }
    if command.len() > MAX_COMMAND_LEN {
        return Err(ProtocolError::ParseFailure("command too long".into()));
    }
    Ok(command.to_string())
}

fn json_reply(command: &str, response: &Response) -> HttpResponse {
    let reply = CommandReply {
        command: command.to_string(),
        response: response.message.clone(),
        timestamp: chrono::Utc::now().timestamp(),
    };
    match serde_json::to_string_pretty(&reply) {
        Ok(body) => HttpResponse::new("200 OK", "application/json", body),
        Err(e) => {
            warn!("HTTP: reply serialization failed: {}", e);
            HttpResponse::new("500 Internal Server Error", "text/plain", "")
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Routing
// ───────────────────────────────────────────────────────────────

/// Map a request to its response.  `POST /api/command` runs the
/// command through `processor`.
pub fn route(req: &HttpRequest, processor: &CommandProcessor, web_root: &Path) -> HttpResponse {
    match (req.method.as_str(), req.path.as_str()) {
        ("OPTIONS", _) => HttpResponse::new("200 OK", "text/plain", ""),
        ("GET", "/" | "/index.html") => {
            let page = web_root.join("index.html");
            match std::fs::read_to_string(&page) {
                Ok(html) => HttpResponse::new("200 OK", "text/html; charset=utf-8", html),
                Err(e) => {
                    debug!("HTTP: {} not readable ({}), serving built-in page", page.display(), e);
                    HttpResponse::new("200 OK", "text/html; charset=utf-8", FALLBACK_PAGE)
                }
            }
        }
        ("POST", API_PATH) => match extract_command(&req.body) {
            Ok(command) => {
                info!("HTTP command: {}", command);
                let (response, _) = processor.process(&command);
                json_reply(&command, &response)
            }
            Err(e) => {
                warn!("HTTP: {}", e);
                json_reply("UNKNOWN", &Response::from(e))
            }
        },
        _ => HttpResponse::new("404 Not Found", "text/html", NOT_FOUND_PAGE),
    }
}

/// Serve one HTTP exchange on `conn`, then return so the caller closes.
pub fn serve<C: Read + Write + ?Sized>(
    conn: &mut C,
    first: &[u8],
    processor: &CommandProcessor,
    web_root: &Path,
) -> io::Result<()> {
    let req = read_request(conn, first)?;
    info!("HTTP request: {} {}", req.method, req.path);
    let resp = route(&req, processor, web_root);
    conn.write_all(&resp.to_bytes())?;
    conn.flush()
}

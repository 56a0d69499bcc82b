//! Transport abstraction: any bidirectional byte stream a client can
//! speak to us over.
//!
//! The multiplexer is generic over [`Connection`], so sessions run the
//! same way on a `TcpStream` and on the in-memory streams used in tests.
//! Reads are expected to time out periodically (`WouldBlock` or
//! `TimedOut`) so the session loop can observe shutdown.

use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;

/// Lines longer than this are cut and delivered in pieces.
pub const MAX_LINE: usize = 1024;

const READ_CHUNK: usize = 512;

/// Byte stream carrying one client connection.
pub trait Connection: Read + Write + Send {
    /// Peer description for logs.
    fn peer(&self) -> String;
}

impl Connection for TcpStream {
    fn peer(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into())
    }
}

/// True for the error kinds a read timeout produces.
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Outcome of one [`LineReader::read_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// One line, terminator stripped.
    Line(String),
    /// The read timed out with nothing buffered.
    Idle,
    /// Peer closed the stream.
    Closed,
}

/// Splits a byte stream into lines.
///
/// A client that sends a command without a terminator and then waits is
/// served too: when a read times out with bytes pending, the pending
/// bytes are delivered as a line.
#[derive(Debug, Default)]
pub struct LineReader {
    pending: Vec<u8>,
}

impl LineReader {
    /// Start with bytes already consumed from the stream.
    pub fn with_prefix(initial: &[u8]) -> Self {
        Self {
            pending: initial.to_vec(),
        }
    }

    pub fn read_line<R: Read + ?Sized>(&mut self, src: &mut R) -> io::Result<ReadEvent> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                return Ok(ReadEvent::Line(self.take(pos + 1)));
            }
            if self.pending.len() >= MAX_LINE {
                return Ok(ReadEvent::Line(self.take(MAX_LINE)));
            }

            let mut chunk = [0u8; READ_CHUNK];
            match src.read(&mut chunk) {
                Ok(0) if self.pending.is_empty() => return Ok(ReadEvent::Closed),
                Ok(0) => return Ok(ReadEvent::Line(self.take(self.pending.len()))),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) && self.pending.is_empty() => return Ok(ReadEvent::Idle),
                Err(e) if is_timeout(&e) => return Ok(ReadEvent::Line(self.take(self.pending.len()))),
                Err(e) => return Err(e),
            }
        }
    }

    fn take(&mut self, len: usize) -> String {
        let raw: Vec<u8> = self.pending.drain(..len).collect();
        String::from_utf8_lossy(&raw)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }
}

/// Write one line-protocol response: the message plus `\n`.
pub fn write_response<W: Write + ?Sized>(out: &mut W, message: &str) -> io::Result<()> {
    out.write_all(message.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

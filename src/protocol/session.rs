//! Persistent line-protocol session.
//!
//! Greeting first, then one response per non-empty line until `QUIT`,
//! end of stream, a read/write failure or process shutdown.

use std::io;

use log::{debug, info};

use crate::app::service::{CommandProcessor, Flow};
use crate::shutdown::Shutdown;

use super::transport::{Connection, LineReader, ReadEvent, write_response};

pub const GREETING: &str = "CONNECTED";

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    Closed,
    Shutdown,
}

/// Run a session.  `first` holds bytes already read by the multiplexer;
/// they are treated as the start of the line stream.
pub fn run<C: Connection + ?Sized>(
    conn: &mut C,
    first: &[u8],
    processor: &CommandProcessor,
    shutdown: &Shutdown,
) -> io::Result<SessionEnd> {
    write_response(conn, GREETING)?;
    info!("Line session opened ({})", conn.peer());

    let mut reader = LineReader::with_prefix(first);
    let mut handled: u32 = 0;
    let end = loop {
        if shutdown.is_triggered() {
            break SessionEnd::Shutdown;
        }
        let line = match reader.read_line(conn)? {
            ReadEvent::Idle => continue,
            ReadEvent::Closed => break SessionEnd::Closed,
            ReadEvent::Line(line) => line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        info!("Command received: {}", line);
        let (response, flow) = processor.process(line);
        debug!("Response: {}", response);
        write_response(conn, &response.message)?;
        handled += 1;
        if flow == Flow::Quit {
            break SessionEnd::Quit;
        }
    };

    info!("Line session closed ({:?}, {} commands)", end, handled);
    Ok(end)
}

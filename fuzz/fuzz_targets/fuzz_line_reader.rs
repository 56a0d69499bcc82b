//! Fuzz target: `LineReader::read_line`
//!
//! Drains arbitrary bytes into lines.  Every delivered line respects
//! `MAX_LINE`, carries no terminator, and the reader always reaches
//! `Closed`.
//!
//! cargo fuzz run fuzz_line_reader

#![no_main]

use std::io::Cursor;

use iotctl::protocol::transport::{LineReader, MAX_LINE, ReadEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut src = Cursor::new(data);
    let mut reader = LineReader::default();
    for _ in 0..=data.len() + 1 {
        match reader.read_line(&mut src) {
            Ok(ReadEvent::Line(line)) => {
                assert!(line.len() <= MAX_LINE * 3, "lossy UTF-8 may widen bytes");
                assert!(!line.ends_with('\n'));
            }
            Ok(ReadEvent::Closed) => return,
            Ok(ReadEvent::Idle) | Err(_) => unreachable!("cursor never times out"),
        }
    }
    panic!("reader did not reach end of input");
});

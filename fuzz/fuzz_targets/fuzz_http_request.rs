//! Fuzz target: HTTP request reading and command extraction
//!
//! Splits the input at an arbitrary point into "first chunk" and "rest",
//! mirroring how the multiplexer hands over an already-read prefix.  The
//! reader must stay within `MAX_REQUEST` and never panic.
//!
//! cargo fuzz run fuzz_http_request

#![no_main]

use std::io::Cursor;

use iotctl::protocol::http::{MAX_REQUEST, extract_command, read_request};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let (first, rest) = data.split_at(split);
    if let Ok(req) = read_request(&mut Cursor::new(rest), first) {
        assert!(req.body.len() <= MAX_REQUEST);
        let _ = extract_command(&req.body);
    }
});

//! Fuzz target: `Command::parse`
//!
//! Any UTF-8 line must parse or be rejected without panicking, and an
//! accepted command never carries more than `MAX_ARGS` arguments.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use iotctl::app::commands::{Command, MAX_ARGS};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(cmd) = Command::parse(line) {
        assert!(cmd.args.len() <= MAX_ARGS);
        assert!(line.trim().starts_with(cmd.verb.as_str()));
        let _ = cmd.int_arg();
    }
});

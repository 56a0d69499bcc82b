//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below exercises one subsystem against the simulated HAL.
//! Protocol tests bind a real listener on 127.0.0.1 with an ephemeral
//! port; no hardware is required.

mod device_tests;
mod harness;
mod protocol_tests;

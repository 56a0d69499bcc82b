//! iotctl: device control daemon library.
//!
//! Exposes the command core, device drivers, registry and protocol
//! layers so the binaries and integration tests share one
//! implementation.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod pins;
pub mod protocol;
pub mod registry;
pub mod shutdown;

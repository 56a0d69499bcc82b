//! Application core: command parsing, dispatch and the port traits.
//!
//! Nothing in here touches sockets or pins directly.  Devices are reached
//! through the capability traits in [`ports`], resolved from the
//! [`CapabilityTable`](crate::registry::CapabilityTable).

pub mod commands;
pub mod ports;
pub mod service;

//! Device drivers implementing the capability ports on top of a
//! [`HalPort`](crate::app::ports::HalPort), plus the background task
//! machinery they share.

pub mod buzzer;
pub mod cds;
pub mod led;
pub mod segment;
pub mod task;

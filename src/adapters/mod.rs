//! Adapters: concrete implementations of the driven ports and the
//! network front end.
//!
//! | Adapter     | Implements | Connects to                          |
//! |-------------|------------|--------------------------------------|
//! | `sim_hal`   | HalPort    | In-memory pins (hosts, tests)        |
//! | `board_hal` | HalPort    | `embedded-hal` GPIO / PWM / I2C      |
//! | `rpi`       | (builder)  | Raspberry Pi pins via `rppal`        |
//! | `tcp`       | (none)     | TCP listener feeding the multiplexer |

pub mod board_hal;
#[cfg(feature = "rpi")]
pub mod rpi;
pub mod sim_hal;
pub mod tcp;

//! Port traits: the hexagonal boundary between the command core and the
//! outside world.
//!
//! ```text
//!   CommandProcessor ──▶ capability traits ──▶ drivers ──▶ HalPort ──▶ adapter
//! ```
//!
//! Two families live here:
//!
//! - **Capability ports** ([`Led`], [`Segment`], [`Buzzer`], [`LightSensor`])
//!   are what the [`CapabilityTable`](crate::registry::CapabilityTable)
//!   binds and what the command processor calls.  They take `&self`: each
//!   implementation guards its own state with a single mutex, so a device
//!   can be shared between the session thread and its background worker.
//! - **[`HalPort`]** is the driven side: thin synchronous pin/bus access.
//!   The daemon plugs in [`SimHal`](crate::adapters::sim_hal::SimHal) or
//!   [`BoardHal`](crate::adapters::board_hal::BoardHal).

use crate::error::{DeviceKind, HalError, Result};

// ───────────────────────────────────────────────────────────────
// Hardware access port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Synchronous pin and bus primitives.  All calls are expected to be
/// fast relative to the 100 ms cancellation granularity.
pub trait HalPort: Send + Sync {
    /// Claim and configure the pins/bus a device needs.
    fn setup(&self, device: DeviceKind) -> core::result::Result<(), HalError>;

    /// Drive a digital output.
    fn pin_write(&self, pin: u8, high: bool) -> core::result::Result<(), HalError>;

    /// Set a PWM output, `value` in `0..=PWM_RANGE`.
    fn pwm_write(&self, pin: u8, value: u16) -> core::result::Result<(), HalError>;

    /// Emit a square wave at `hz` on `pin`; 0 silences it.
    fn tone_write(&self, pin: u8, hz: u16) -> core::result::Result<(), HalError>;

    /// Sample one ADC channel behind an I2C converter.
    fn i2c_read_channel(&self, addr: u8, channel: u8) -> core::result::Result<u8, HalError>;

    fn sleep_millis(&self, ms: u64);
}

// ───────────────────────────────────────────────────────────────
// Status reporting
// ───────────────────────────────────────────────────────────────

/// Externally visible lifecycle phase.  A task that has been asked to
/// stop but has not exited yet still reports [`Phase::Active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Idle,
    Active,
}

/// One sensor sample after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightReading {
    pub value: u8,
    pub bright: bool,
}

impl LightReading {
    pub fn label(&self) -> &'static str {
        if self.bright { "bright" } else { "dark" }
    }
}

// ───────────────────────────────────────────────────────────────
// Capability ports (domain → device implementations)
// ───────────────────────────────────────────────────────────────

/// Shared lifecycle of every device capability.
pub trait Device: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// `UNINITIALIZED → IDLE`.  Idempotent.
    fn init(&self) -> Result<()>;

    /// Cancel background work, park outputs, return to `UNINITIALIZED`.
    fn cleanup(&self);

    fn phase(&self) -> Phase;

    /// Human-readable status line, e.g. `LED: MIDDLE`.
    fn status(&self) -> String;
}

/// Dimmable LED.
pub trait Led: Device {
    fn on(&self) -> Result<()>;
    fn off(&self) -> Result<()>;
    /// `level` in `0..=2`; anything else leaves the LED untouched.
    fn brightness(&self, level: i64) -> Result<()>;
}

/// 4-bit numeric display with countdown.
pub trait Segment: Device {
    /// Show `digit` (0–9), cancelling any running countdown first.
    fn display(&self, digit: i64) -> Result<()>;
    /// Count down from `start` (1–9) once per tick, alarm at zero.
    fn countdown(&self, start: i64) -> Result<()>;
    /// Stop an active countdown and blank the display.
    fn stop(&self) -> Result<()>;
    /// Cancel and blank unconditionally.
    fn off(&self) -> Result<()>;
}

/// Buzzer with a fixed melody.
/// Identifies one melody run started by [`Buzzer::play`].
pub type MelodyId = u32;

pub trait Buzzer: Device {
    /// Start the melody from its first note; latest play wins.
    fn play(&self) -> Result<MelodyId>;
    fn stop(&self) -> Result<()>;
    /// Stop only if `melody` is still the run in progress.  Returns
    /// `false` when a later `play` replaced it or it already ended.
    fn stop_if(&self, melody: MelodyId) -> Result<bool>;
}

/// Light sensor with an auto-driven actuator LED.
pub trait LightSensor: Device {
    fn read(&self) -> Result<LightReading>;
    fn auto_start(&self) -> Result<()>;
    fn auto_stop(&self) -> Result<()>;
    fn manual_on(&self) -> Result<()>;
    fn manual_off(&self) -> Result<()>;
}

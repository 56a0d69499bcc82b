//! Unified error types for the control daemon.
//!
//! Every failure on the command path is recovered locally and rendered
//! to the client as an `ERROR: ...` line; nothing here terminates a
//! session or the process.  The only fatal conditions live in `main`
//! (listener bind failure, zero devices available).

use thiserror::Error;

// ---------------------------------------------------------------------------
// Device identity
// ---------------------------------------------------------------------------

/// Names under which device capabilities are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Led,
    Segment,
    Buzzer,
    Cds,
}

impl DeviceKind {
    pub const ALL: [Self; 4] = [Self::Led, Self::Segment, Self::Buzzer, Self::Cds];

    /// Registry key, also used in error text.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Led => "led",
            Self::Segment => "segment",
            Self::Buzzer => "buzzer",
            Self::Cds => "cds",
        }
    }

    /// Upper-case tag used in log lines and status reports.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Led => "LED",
            Self::Segment => "SEGMENT",
            Self::Buzzer => "BUZZER",
            Self::Cds => "CDS",
        }
    }
}

impl core::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// HAL errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`HalPort`](crate::app::ports::HalPort).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    #[error("peripheral setup failed: {0}")]
    Setup(String),
    #[error("GPIO {0} write failed")]
    PinWrite(u8),
    #[error("PWM {0} write failed")]
    PwmWrite(u8),
    #[error("I2C read from 0x{addr:02X} failed")]
    I2cRead { addr: u8 },
    #[error("pin {0} is not wired to this HAL")]
    UnknownPin(u8),
}

// ---------------------------------------------------------------------------
// Device errors
// ---------------------------------------------------------------------------

/// Every fallible device operation funnels into this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The registry holds no implementation for this device.
    #[error("{0} capability unavailable")]
    CapabilityUnavailable(DeviceKind),
    /// Out-of-range value or malformed arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A cancel-and-replace join exceeded its bound; state was force-reset.
    #[error("{0} busy: previous task did not stop in time, state reset")]
    BusyTransition(DeviceKind),
    /// Operation on a device that was cleaned up.
    #[error("{0} not initialized")]
    NotInitialized(DeviceKind),
    #[error("hardware: {0}")]
    Hal(#[from] HalError),
    /// The OS refused to start a worker thread.
    #[error("worker spawn failed: {0}")]
    Spawn(String),
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

/// Failures while turning inbound bytes into a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// HTTP body without a usable `command` field, or a malformed request.
    #[error("command parse failed: {0}")]
    ParseFailure(String),
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

/// Device-layer `Result` alias.
pub type Result<T> = core::result::Result<T, DeviceError>;

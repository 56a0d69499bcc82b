//! Command processor: the single core shared by both protocols.
//!
//! [`CommandProcessor::process`] takes one text line, resolves the
//! capability it needs from the [`CapabilityTable`], invokes it and
//! renders a one-line (`HELP`: multi-line) response.  Every failure is
//! turned into an `ERROR: ...` response; the only side effect beyond the
//! devices themselves is `QUIT`, which triggers the process shutdown.
//!
//! ```text
//!  line session ──┐
//!                 ├──▶ CommandProcessor ──▶ CapabilityTable ──▶ devices
//!  HTTP /api  ────┘
//! ```

use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{DeviceError, ProtocolError};
use crate::registry::CapabilityTable;
use crate::shutdown::Shutdown;

use super::commands::{Command, Verb};

pub const HELP_TEXT: &str = "LED: LED_ON, LED_OFF, LED_BRIGHTNESS [0-2]\n\
SEGMENT: SEGMENT_DISPLAY [0-9], SEGMENT_COUNTDOWN [1-9], SEGMENT_STOP, SEGMENT_OFF\n\
BUZZER: BUZZER_PLAY, BUZZER_STOP\n\
CDS: CDS_READ, CDS_AUTO_START, CDS_AUTO_STOP, CDS_GET_STATUS, AUTO_LED_ON, AUTO_LED_OFF\n\
OTHER: STATUS, ALL_OFF, HELP, QUIT";

// ───────────────────────────────────────────────────────────────
// Response
// ───────────────────────────────────────────────────────────────

/// Rendered outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub ok: bool,
    pub message: String,
}

impl Response {
    pub fn ok(text: impl core::fmt::Display) -> Self {
        Self {
            ok: true,
            message: format!("OK: {}", text),
        }
    }

    pub fn error(text: impl core::fmt::Display) -> Self {
        Self {
            ok: false,
            message: format!("ERROR: {}", text),
        }
    }

    /// Success without the `OK:` prefix (help text).
    fn plain(text: &str) -> Self {
        Self {
            ok: true,
            message: text.to_string(),
        }
    }
}

impl From<DeviceError> for Response {
    fn from(e: DeviceError) -> Self {
        Self::error(e)
    }
}

impl From<ProtocolError> for Response {
    fn from(e: ProtocolError) -> Self {
        Self::error(e)
    }
}

impl core::fmt::Display for Response {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Whether the session that sent the command should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

// ───────────────────────────────────────────────────────────────
// CommandProcessor
// ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CommandProcessor {
    table: Arc<CapabilityTable>,
    shutdown: Shutdown,
}

impl CommandProcessor {
    pub fn new(table: Arc<CapabilityTable>, shutdown: Shutdown) -> Self {
        Self { table, shutdown }
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Execute one command line.
    pub fn process(&self, line: &str) -> (Response, Flow) {
        let command = match Command::parse(line) {
            Ok(c) => c,
            Err(e) => {
                debug!("Rejected command {:?}: {}", line.trim(), e);
                return (e.into(), Flow::Continue);
            }
        };

        if command.verb == Verb::Quit {
            if self.shutdown.trigger() {
                info!("QUIT received, shutting down");
            }
            return (Response::ok("server shutting down"), Flow::Quit);
        }

        let response = match self.dispatch(&command) {
            Ok(r) => r,
            Err(r) => r,
        };
        if !response.ok {
            warn!("{} -> {}", command.verb.as_str(), response.message);
        }
        (response, Flow::Continue)
    }

    fn dispatch(&self, cmd: &Command<'_>) -> Result<Response, Response> {
        let t = &self.table;
        Ok(match cmd.verb {
            Verb::LedOn => {
                t.led()?.on()?;
                Response::ok("LED on")
            }
            Verb::LedOff => {
                t.led()?.off()?;
                Response::ok("LED off")
            }
            Verb::LedBrightness => {
                let level = usage(cmd, "LED_BRIGHTNESS <0-2>")?;
                t.led()?.brightness(level)?;
                Response::ok(format_args!("LED brightness set to {}", level))
            }
            Verb::SegmentDisplay => {
                let digit = usage(cmd, "SEGMENT_DISPLAY <0-9>")?;
                t.segment()?.display(digit)?;
                Response::ok(format_args!("SEGMENT showing {}", digit))
            }
            Verb::SegmentCountdown => {
                let start = usage(cmd, "SEGMENT_COUNTDOWN <1-9>")?;
                t.segment()?.countdown(start)?;
                Response::ok(format_args!("SEGMENT countdown from {} started", start))
            }
            Verb::SegmentStop => {
                t.segment()?.stop()?;
                Response::ok("SEGMENT countdown stopped")
            }
            Verb::SegmentOff => {
                t.segment()?.off()?;
                Response::ok("SEGMENT off")
            }
            Verb::BuzzerPlay => {
                t.buzzer()?.play()?;
                Response::ok("BUZZER playing")
            }
            Verb::BuzzerStop => {
                t.buzzer()?.stop()?;
                Response::ok("BUZZER stopped")
            }
            Verb::CdsRead => {
                let reading = t.cds()?.read()?;
                Response::ok(format_args!("light value {} ({})", reading.value, reading.label()))
            }
            Verb::CdsAutoStart => {
                t.cds()?.auto_start()?;
                Response::ok("CDS auto LED control started")
            }
            Verb::CdsAutoStop => {
                t.cds()?.auto_stop()?;
                Response::ok("CDS auto LED control stopped")
            }
            Verb::CdsGetStatus => Response::ok(t.cds()?.status()),
            Verb::AutoLedOn => {
                t.cds()?.manual_on()?;
                Response::ok("auto LED on")
            }
            Verb::AutoLedOff => {
                t.cds()?.manual_off()?;
                Response::ok("auto LED off")
            }
            Verb::AllOff => {
                self.all_off();
                Response::ok("all devices off")
            }
            Verb::Status => Response::ok(t.status_lines().join(" | ")),
            Verb::Help => Response::plain(HELP_TEXT),
            Verb::Quit => Response::ok("server shutting down"),
        })
    }

    /// Best effort: every available device is switched off, failures and
    /// missing devices are only logged.
    fn all_off(&self) {
        let t = &self.table;
        let results = [
            ("LED", t.led().and_then(|d| d.off())),
            ("SEGMENT", t.segment().and_then(|d| d.off())),
            ("BUZZER", t.buzzer().and_then(|d| d.stop())),
            ("CDS", t.cds().and_then(|d| d.auto_stop())),
        ];
        for (tag, result) in results {
            match result {
                Ok(()) => {}
                Err(DeviceError::CapabilityUnavailable(_)) => debug!("ALL_OFF: {} not bound", tag),
                Err(e) => warn!("ALL_OFF: {}: {}", tag, e),
            }
        }
        info!("All devices off");
    }
}

/// Integer argument or a usage error naming the expected form.
fn usage(cmd: &Command<'_>, form: &str) -> Result<i64, Response> {
    cmd.int_arg()
        .ok_or_else(|| Response::error(format_args!("usage: {}", form)))
}

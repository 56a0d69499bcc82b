//! 4-bit numeric display behind a BCD-to-7-segment decoder.
//!
//! Digits are written as four GPIO levels, MSB first.  The decoder's
//! inputs are active-low, so the blank pattern drives all four pins HIGH.
//!
//! `countdown(n)` runs on a background task: it shows `n`, `n-1`, ... `0`
//! one tick apart, sounds the alarm at zero and blanks afterwards.  Every
//! write first re-checks the task's stop flag under the device mutex, so
//! once a `display()` or `stop()` has joined (or force-reset) the worker,
//! no stale digit can reach the pins.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::app::ports::{Buzzer, Device, HalPort, Phase, Segment};
use crate::drivers::task::{CancelToken, StopOutcome, TaskHost, TaskKind, TaskSlot, stop_active};
use crate::error::{DeviceError, DeviceKind, Result};
use crate::pins;
use crate::registry::Capability;
use crate::shutdown::Shutdown;

/// Decoder input levels for 0-9 (MSB first).
#[rustfmt::skip]
pub const DIGIT_PATTERNS: [[bool; 4]; 10] = [
    [false, false, false, false],
    [false, false, false, true],
    [false, false, true, false],
    [false, false, true, true],
    [false, true, false, false],
    [false, true, false, true],
    [false, true, true, false],
    [false, true, true, true],
    [true, false, false, false],
    [true, false, false, true],
];

pub const BLANK_PATTERN: [bool; 4] = [true; 4];

#[derive(Debug, Clone, Copy)]
pub struct SegmentTiming {
    pub tick: Duration,
    pub alarm: Duration,
    pub join_timeout: Duration,
    pub cancel_poll: Duration,
}

struct SegmentState {
    initialized: bool,
    shown: Option<u8>,
    tasks: TaskSlot,
}

impl TaskHost for SegmentState {
    fn tasks(&mut self) -> &mut TaskSlot {
        &mut self.tasks
    }
}

struct Inner {
    hal: Arc<dyn HalPort>,
    alarm: Capability<dyn Buzzer>,
    timing: SegmentTiming,
    state: Mutex<SegmentState>,
}

impl Inner {
    fn write_pattern(&self, pattern: &[bool; 4]) -> Result<()> {
        for (pin, high) in pins::SEGMENT_GPIOS.iter().zip(pattern) {
            self.hal.pin_write(*pin, *high)?;
        }
        Ok(())
    }

    fn show(&self, st: &mut SegmentState, digit: u8) -> Result<()> {
        self.write_pattern(&DIGIT_PATTERNS[usize::from(digit)])?;
        st.shown = Some(digit);
        Ok(())
    }

    fn blank(&self, st: &mut SegmentState) -> Result<()> {
        self.write_pattern(&BLANK_PATTERN)?;
        st.shown = None;
        Ok(())
    }

    /// Sound the alarm for the configured duration.  Only the melody
    /// started here is silenced afterwards; a later `BUZZER_PLAY` keeps
    /// playing.
    fn sound_alarm(&self, token: &CancelToken) {
        if token.is_cancelled() {
            return;
        }
        match &self.alarm {
            Capability::Available(buzzer) => {
                let melody = match buzzer.play() {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!("SEGMENT: alarm via buzzer failed: {}", e);
                        ring_terminal_bell();
                        None
                    }
                };
                token.sleep(&*self.hal, self.timing.alarm);
                match melody.map(|id| buzzer.stop_if(id)) {
                    Some(Ok(false)) => debug!("SEGMENT: alarm melody superseded, buzzer left playing"),
                    Some(Err(e)) => warn!("SEGMENT: could not silence alarm: {}", e),
                    Some(Ok(true)) | None => {}
                }
            }
            Capability::Unavailable(reason) => {
                warn!("SEGMENT: buzzer unavailable ({}), ringing terminal bell", reason);
                ring_terminal_bell();
            }
        }
    }
}

fn ring_terminal_bell() {
    let mut out = std::io::stdout();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}

pub struct SegmentDriver {
    inner: Arc<Inner>,
}

impl SegmentDriver {
    /// `alarm` is the buzzer capability resolved by the registry; the
    /// countdown falls back to the terminal bell when it is unavailable.
    pub fn new(
        hal: Arc<dyn HalPort>,
        alarm: Capability<dyn Buzzer>,
        timing: SegmentTiming,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                hal,
                alarm,
                timing,
                state: Mutex::new(SegmentState {
                    initialized: false,
                    shown: None,
                    tasks: TaskSlot::new(shutdown, timing.cancel_poll),
                }),
            }),
        }
    }

    fn run_countdown(inner: Arc<Inner>, start: u8, token: CancelToken) {
        for digit in (0..=start).rev() {
            {
                let mut st = inner.state.lock();
                if token.is_cancelled() {
                    return;
                }
                if let Err(e) = inner.show(&mut st, digit) {
                    warn!("SEGMENT: failed to show {}: {}", digit, e);
                }
            }
            debug!("SEGMENT: countdown {}", digit);
            if digit > 0 && !token.sleep(&*inner.hal, inner.timing.tick) {
                return;
            }
        }

        info!("SEGMENT: countdown reached zero");
        inner.sound_alarm(&token);

        let mut st = inner.state.lock();
        if token.is_cancelled() {
            return;
        }
        if let Err(e) = inner.blank(&mut st) {
            warn!("SEGMENT: failed to blank after countdown: {}", e);
        }
    }

    /// Clear the slot for a new transition.  On a timed-out join the
    /// display is blanked and `BusyTransition` is returned.
    fn settle(&self) -> Result<parking_lot::MutexGuard<'_, SegmentState>> {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.timing.join_timeout);
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Segment));
        }
        if outcome == StopOutcome::TimedOut {
            let _ = self.inner.blank(&mut st);
            return Err(DeviceError::BusyTransition(DeviceKind::Segment));
        }
        Ok(st)
    }

    fn digit_arg(value: i64, range: core::ops::RangeInclusive<i64>) -> Result<u8> {
        if range.contains(&value) {
            Ok(value as u8)
        } else {
            Err(DeviceError::InvalidArgument(format!(
                "{} outside {}-{}",
                value,
                range.start(),
                range.end()
            )))
        }
    }
}

impl Device for SegmentDriver {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Segment
    }

    fn init(&self) -> Result<()> {
        let mut st = self.inner.state.lock();
        if st.initialized {
            return Ok(());
        }
        self.inner.hal.setup(DeviceKind::Segment)?;
        self.inner.blank(&mut st)?;
        st.initialized = true;
        info!("SEGMENT: initialized on GPIO {:?}", pins::SEGMENT_GPIOS);
        Ok(())
    }

    fn cleanup(&self) {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.timing.join_timeout);
        if outcome == StopOutcome::TimedOut {
            warn!("SEGMENT: countdown task did not stop during cleanup");
        }
        let _ = self.inner.blank(&mut st);
        st.initialized = false;
        debug!("SEGMENT: cleaned up");
    }

    fn phase(&self) -> Phase {
        let st = self.inner.state.lock();
        match (st.initialized, st.tasks.is_running()) {
            (false, _) => Phase::Uninitialized,
            (true, true) => Phase::Active,
            (true, false) => Phase::Idle,
        }
    }

    fn status(&self) -> String {
        let st = self.inner.state.lock();
        if !st.initialized {
            return "SEGMENT: NOT_INITIALIZED".into();
        }
        let shown = st.shown.map_or_else(|| "blank".to_string(), |d| d.to_string());
        if st.tasks.is_running() {
            format!("SEGMENT: COUNTING (showing {})", shown)
        } else {
            format!("SEGMENT: IDLE (showing {})", shown)
        }
    }
}

impl Segment for SegmentDriver {
    fn display(&self, digit: i64) -> Result<()> {
        let digit = Self::digit_arg(digit, 0..=9)?;
        let mut st = self.settle()?;
        self.inner.show(&mut st, digit)?;
        info!("SEGMENT: showing {}", digit);
        Ok(())
    }

    fn countdown(&self, start: i64) -> Result<()> {
        let start = Self::digit_arg(start, 1..=9)?;
        let mut st = self.settle()?;
        let inner = Arc::clone(&self.inner);
        let id = st
            .tasks
            .start(TaskKind::Countdown, move |token| Self::run_countdown(inner, start, token))?;
        info!("SEGMENT: countdown from {} started (task {})", start, id);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.timing.join_timeout);
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Segment));
        }
        match outcome {
            StopOutcome::Idle => Ok(()),
            StopOutcome::Stopped => {
                self.inner.blank(&mut st)?;
                info!("SEGMENT: countdown stopped");
                Ok(())
            }
            StopOutcome::TimedOut => {
                let _ = self.inner.blank(&mut st);
                Err(DeviceError::BusyTransition(DeviceKind::Segment))
            }
        }
    }

    fn off(&self) -> Result<()> {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.timing.join_timeout);
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Segment));
        }
        if outcome == StopOutcome::TimedOut {
            warn!("SEGMENT: countdown task did not stop, blanking anyway");
        }
        self.inner.blank(&mut st)?;
        info!("SEGMENT: off");
        Ok(())
    }
}

//! Piezo buzzer playing a fixed melody on a background task.
//!
//! `play()` is cancel-and-replace: a running melody is stopped and
//! joined before the new one starts from its first note, so at most one
//! melody task exists at any time.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::app::ports::{Buzzer, Device, HalPort, MelodyId, Phase};
use crate::drivers::task::{CancelToken, StopOutcome, TaskHost, TaskKind, TaskSlot, stop_active, stop_task};
use crate::error::{DeviceError, DeviceKind, Result};
use crate::pins;
use crate::shutdown::Shutdown;

/// One melody step; a frequency of 0 is a rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub hz: u16,
    /// Length in units of the configured note duration.
    pub beats: u8,
}

const fn n(hz: u16) -> Note {
    Note { hz, beats: 1 }
}

/// School bell: G G A A G G E E / G G E E D D D - / G G A A G G E E / G E D E C C C -
#[rustfmt::skip]
pub const MELODY: [Note; 32] = [
    n(391), n(391), n(440), n(440), n(391), n(391), n(329), n(329),
    n(391), n(391), n(329), n(329), n(293), n(293), n(293), n(0),
    n(391), n(391), n(440), n(440), n(391), n(391), n(329), n(329),
    n(391), n(329), n(293), n(329), n(261), n(261), n(261), n(0),
];

#[derive(Debug, Clone, Copy)]
pub struct BuzzerTiming {
    pub note: Duration,
    pub join_timeout: Duration,
    pub cancel_poll: Duration,
}

struct BuzzerState {
    initialized: bool,
    /// Index of the note currently sounding.
    note: Option<usize>,
    tasks: TaskSlot,
}

impl TaskHost for BuzzerState {
    fn tasks(&mut self) -> &mut TaskSlot {
        &mut self.tasks
    }
}

struct Inner {
    hal: Arc<dyn HalPort>,
    timing: BuzzerTiming,
    state: Mutex<BuzzerState>,
}

pub struct BuzzerDriver {
    inner: Arc<Inner>,
}

impl BuzzerDriver {
    pub fn new(hal: Arc<dyn HalPort>, timing: BuzzerTiming, shutdown: Shutdown) -> Self {
        Self {
            inner: Arc::new(Inner {
                hal,
                timing,
                state: Mutex::new(BuzzerState {
                    initialized: false,
                    note: None,
                    tasks: TaskSlot::new(shutdown, timing.cancel_poll),
                }),
            }),
        }
    }

    fn run_melody(inner: Arc<Inner>, token: CancelToken) {
        for (index, note) in MELODY.iter().enumerate() {
            {
                let mut st = inner.state.lock();
                if token.is_cancelled() {
                    return;
                }
                if let Err(e) = inner.hal.tone_write(pins::BUZZER_GPIO, note.hz) {
                    warn!("BUZZER: note {} failed: {}", index, e);
                }
                st.note = Some(index);
            }
            let length = inner.timing.note * u32::from(note.beats);
            if !token.sleep(&*inner.hal, length) {
                return;
            }
        }

        let mut st = inner.state.lock();
        if token.is_cancelled() {
            return;
        }
        let _ = inner.hal.tone_write(pins::BUZZER_GPIO, 0);
        st.note = None;
        info!("BUZZER: melody finished");
    }
}

impl Device for BuzzerDriver {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Buzzer
    }

    fn init(&self) -> Result<()> {
        let mut st = self.inner.state.lock();
        if st.initialized {
            return Ok(());
        }
        self.inner.hal.setup(DeviceKind::Buzzer)?;
        self.inner.hal.tone_write(pins::BUZZER_GPIO, 0)?;
        st.initialized = true;
        info!("BUZZER: initialized on GPIO {}", pins::BUZZER_GPIO);
        Ok(())
    }

    fn cleanup(&self) {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.timing.join_timeout);
        if outcome == StopOutcome::TimedOut {
            warn!("BUZZER: melody task did not stop during cleanup");
        }
        let _ = self.inner.hal.tone_write(pins::BUZZER_GPIO, 0);
        st.note = None;
        st.initialized = false;
        debug!("BUZZER: cleaned up");
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
        match self.phase() {
            Phase::Uninitialized => "BUZZER: NOT_INITIALIZED".into(),
            Phase::Active => "BUZZER: PLAYING".into(),
            Phase::Idle => "BUZZER: IDLE".into(),
        }
    }
}

impl Buzzer for BuzzerDriver {
    fn play(&self) -> Result<MelodyId> {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.timing.join_timeout);
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Buzzer));
        }
        if outcome == StopOutcome::TimedOut {
            let _ = self.inner.hal.tone_write(pins::BUZZER_GPIO, 0);
            st.note = None;
            return Err(DeviceError::BusyTransition(DeviceKind::Buzzer));
        }

        let inner = Arc::clone(&self.inner);
        let id = st.tasks.start(TaskKind::Melody, move |token| Self::run_melody(inner, token))?;
        info!("BUZZER: melody started (task {})", id);
        Ok(id)
    }

    fn stop(&self) -> Result<()> {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.timing.join_timeout);
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Buzzer));
        }
        self.inner.hal.tone_write(pins::BUZZER_GPIO, 0)?;
        st.note = None;
        match outcome {
            StopOutcome::TimedOut => Err(DeviceError::BusyTransition(DeviceKind::Buzzer)),
            StopOutcome::Stopped => {
                info!("BUZZER: stopped");
                Ok(())
            }
            StopOutcome::Idle => Ok(()),
        }
    }

    fn stop_if(&self, melody: MelodyId) -> Result<bool> {
        let (mut st, outcome) = stop_task(&self.inner.state, self.inner.timing.join_timeout, melody);
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Buzzer));
        }
        let Some(outcome) = outcome else {
            debug!("BUZZER: melody {} no longer current, left alone", melody);
            return Ok(false);
        };
        // A play() may have filled the slot while the join ran.
        if st.tasks.is_empty() {
            self.inner.hal.tone_write(pins::BUZZER_GPIO, 0)?;
            st.note = None;
        }
        if outcome == StopOutcome::TimedOut {
            return Err(DeviceError::BusyTransition(DeviceKind::Buzzer));
        }
        info!("BUZZER: melody {} stopped", melody);
        Ok(true)
    }
}

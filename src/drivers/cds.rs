//! CdS light sensor behind a PCF8591 ADC, plus the LED it can drive.
//!
//! A sample below the configured threshold means the room is bright
//! (the photoresistor divider pulls the reading down in light).  In
//! auto mode a background poller switches the actuator LED on in the
//! dark and off in the light; manual on/off drives the same pin directly.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::app::ports::{Device, HalPort, LightReading, LightSensor, Phase};
use crate::drivers::task::{CancelToken, StopOutcome, TaskHost, TaskKind, TaskSlot, stop_active};
use crate::error::{DeviceError, DeviceKind, Result};
use crate::pins;
use crate::shutdown::Shutdown;

/// Poll count between unconditional log lines in auto mode.
const AUTO_LOG_EVERY: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct CdsSettings {
    pub threshold: u8,
    pub poll_interval: Duration,
    pub join_timeout: Duration,
    pub cancel_poll: Duration,
}

struct CdsState {
    initialized: bool,
    last: Option<LightReading>,
    actuator_on: bool,
    tasks: TaskSlot,
}

impl TaskHost for CdsState {
    fn tasks(&mut self) -> &mut TaskSlot {
        &mut self.tasks
    }
}

struct Inner {
    hal: Arc<dyn HalPort>,
    settings: CdsSettings,
    state: Mutex<CdsState>,
}

impl Inner {
    fn sample(&self, st: &mut CdsState) -> Result<LightReading> {
        let value = self.hal.i2c_read_channel(pins::CDS_I2C_ADDR, pins::CDS_ADC_CHANNEL)?;
        let reading = LightReading {
            value,
            bright: value < self.settings.threshold,
        };
        st.last = Some(reading);
        Ok(reading)
    }

    fn set_actuator(&self, st: &mut CdsState, on: bool) -> Result<()> {
        self.hal.pin_write(pins::AUTO_LED_GPIO, on)?;
        st.actuator_on = on;
        Ok(())
    }
}

pub struct CdsDriver {
    inner: Arc<Inner>,
}

impl CdsDriver {
    pub fn new(hal: Arc<dyn HalPort>, settings: CdsSettings, shutdown: Shutdown) -> Self {
        Self {
            inner: Arc::new(Inner {
                hal,
                settings,
                state: Mutex::new(CdsState {
                    initialized: false,
                    last: None,
                    actuator_on: false,
                    tasks: TaskSlot::new(shutdown, settings.cancel_poll),
                }),
            }),
        }
    }

    fn run_auto(inner: Arc<Inner>, token: CancelToken) {
        let mut previous: Option<bool> = None;
        let mut polls: u32 = 0;
        loop {
            {
                let mut st = inner.state.lock();
                if token.is_cancelled() {
                    return;
                }
                match inner.sample(&mut st) {
                    Ok(reading) => {
                        let dark = !reading.bright;
                        if let Err(e) = inner.set_actuator(&mut st, dark) {
                            warn!("CDS: actuator write failed: {}", e);
                        }
                        if previous != Some(reading.bright) {
                            info!(
                                "CDS: {} (value {}), auto LED {}",
                                reading.label(),
                                reading.value,
                                if dark { "on" } else { "off" }
                            );
                        } else if polls % AUTO_LOG_EVERY == 0 {
                            info!("CDS: value {} ({})", reading.value, reading.label());
                        }
                        previous = Some(reading.bright);
                    }
                    Err(e) => warn!("CDS: sample failed: {}", e),
                }
            }
            polls = polls.wrapping_add(1);
            if !token.sleep(&*inner.hal, inner.settings.poll_interval) {
                return;
            }
        }
    }

    fn initialized(&self) -> Result<parking_lot::MutexGuard<'_, CdsState>> {
        let st = self.inner.state.lock();
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Cds));
        }
        Ok(st)
    }
}

impl Device for CdsDriver {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cds
    }

    fn init(&self) -> Result<()> {
        let mut st = self.inner.state.lock();
        if st.initialized {
            return Ok(());
        }
        self.inner.hal.setup(DeviceKind::Cds)?;
        self.inner.set_actuator(&mut st, false)?;
        st.initialized = true;
        info!(
            "CDS: initialized (ADC 0x{:02X} ch{}, actuator GPIO {})",
            pins::CDS_I2C_ADDR,
            pins::CDS_ADC_CHANNEL,
            pins::AUTO_LED_GPIO
        );
        Ok(())
    }

    fn cleanup(&self) {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.settings.join_timeout);
        if outcome == StopOutcome::TimedOut {
            warn!("CDS: auto task did not stop during cleanup");
        }
        let _ = self.inner.set_actuator(&mut st, false);
        st.initialized = false;
        debug!("CDS: cleaned up");
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
            return "CDS: NOT_INITIALIZED".into();
        }
        let mode = if st.tasks.is_running() { "AUTO_LED_ON" } else { "IDLE" };
        match st.last {
            Some(r) => format!("CDS: {} (value: {}, {})", mode, r.value, r.label()),
            None => format!("CDS: {} (no sample yet)", mode),
        }
    }
}

impl LightSensor for CdsDriver {
    fn read(&self) -> Result<LightReading> {
        let mut st = self.initialized()?;
        let reading = self.inner.sample(&mut st)?;
        if !st.tasks.is_running() {
            info!("CDS: value {} ({})", reading.value, reading.label());
        }
        Ok(reading)
    }

    fn auto_start(&self) -> Result<()> {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.settings.join_timeout);
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Cds));
        }
        if outcome == StopOutcome::TimedOut {
            let _ = self.inner.set_actuator(&mut st, false);
            return Err(DeviceError::BusyTransition(DeviceKind::Cds));
        }
        let inner = Arc::clone(&self.inner);
        let id = st.tasks.start(TaskKind::AutoMonitor, move |token| Self::run_auto(inner, token))?;
        info!("CDS: auto LED control started (task {})", id);
        Ok(())
    }

    fn auto_stop(&self) -> Result<()> {
        let (mut st, outcome) = stop_active(&self.inner.state, self.inner.settings.join_timeout);
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Cds));
        }
        self.inner.set_actuator(&mut st, false)?;
        match outcome {
            StopOutcome::TimedOut => Err(DeviceError::BusyTransition(DeviceKind::Cds)),
            StopOutcome::Stopped => {
                info!("CDS: auto LED control stopped");
                Ok(())
            }
            StopOutcome::Idle => Ok(()),
        }
    }

    fn manual_on(&self) -> Result<()> {
        let mut st = self.initialized()?;
        self.inner.set_actuator(&mut st, true)?;
        info!("CDS: auto LED forced on");
        Ok(())
    }

    fn manual_off(&self) -> Result<()> {
        let mut st = self.initialized()?;
        self.inner.set_actuator(&mut st, false)?;
        info!("CDS: auto LED forced off");
        Ok(())
    }
}

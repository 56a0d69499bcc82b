//! In-memory HAL used by the daemon on hosts without the I/O board and
//! by every test.
//!
//! Records each hardware call so tests can assert on the full output
//! history, keeps the last level written to every pin, and serves light
//! samples from an injectable value.  Setup of individual devices can be
//! made to fail to exercise partial registry loads.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use log::trace;
use parking_lot::Mutex;

use crate::app::ports::HalPort;
use crate::error::{DeviceKind, HalError};

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HalCall {
    Setup(DeviceKind),
    Pin { pin: u8, high: bool },
    Pwm { pin: u8, value: u16 },
    Tone { pin: u8, hz: u16 },
    I2cRead { addr: u8, channel: u8 },
}

#[derive(Default)]
struct SimState {
    calls: Vec<HalCall>,
    pins: HashMap<u8, bool>,
    pwm: HashMap<u8, u16>,
    tones: HashMap<u8, u16>,
    failing: HashSet<DeviceKind>,
}

// ── SimHal ────────────────────────────────────────────────────

pub struct SimHal {
    state: Mutex<SimState>,
    light: AtomicU8,
}

impl SimHal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            light: AtomicU8::new(128),
        }
    }

    /// Value returned by the next ADC samples.
    pub fn set_light(&self, value: u8) {
        self.light.store(value, Ordering::Relaxed);
    }

    /// Make `setup(device)` fail from now on.
    pub fn fail_setup(&self, device: DeviceKind) {
        self.state.lock().failing.insert(device);
    }

    pub fn calls(&self) -> Vec<HalCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn pin(&self, pin: u8) -> Option<bool> {
        self.state.lock().pins.get(&pin).copied()
    }

    pub fn pwm(&self, pin: u8) -> Option<u16> {
        self.state.lock().pwm.get(&pin).copied()
    }

    pub fn tone(&self, pin: u8) -> Option<u16> {
        self.state.lock().tones.get(&pin).copied()
    }

    /// Every frequency written to `pin`, oldest first.
    pub fn tone_history(&self, pin: u8) -> Vec<u16> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                HalCall::Tone { pin: p, hz } if *p == pin => Some(*hz),
                _ => None,
            })
            .collect()
    }

    /// Levels of `pins` in order; unwritten pins read as `None`.
    pub fn levels(&self, pins: &[u8]) -> Vec<Option<bool>> {
        let st = self.state.lock();
        pins.iter().map(|p| st.pins.get(p).copied()).collect()
    }
}

impl Default for SimHal {
    fn default() -> Self {
        Self::new()
    }
}

impl HalPort for SimHal {
    fn setup(&self, device: DeviceKind) -> Result<(), HalError> {
        let mut st = self.state.lock();
        st.calls.push(HalCall::Setup(device));
        if st.failing.contains(&device) {
            return Err(HalError::Setup(format!("{} hardware not present", device)));
        }
        trace!("SimHal: setup {}", device);
        Ok(())
    }

    fn pin_write(&self, pin: u8, high: bool) -> Result<(), HalError> {
        let mut st = self.state.lock();
        st.calls.push(HalCall::Pin { pin, high });
        st.pins.insert(pin, high);
        trace!("SimHal: GPIO {} <- {}", pin, if high { "HIGH" } else { "LOW" });
        Ok(())
    }

    fn pwm_write(&self, pin: u8, value: u16) -> Result<(), HalError> {
        let mut st = self.state.lock();
        st.calls.push(HalCall::Pwm { pin, value });
        st.pwm.insert(pin, value);
        trace!("SimHal: PWM {} <- {}", pin, value);
        Ok(())
    }

    fn tone_write(&self, pin: u8, hz: u16) -> Result<(), HalError> {
        let mut st = self.state.lock();
        st.calls.push(HalCall::Tone { pin, hz });
        st.tones.insert(pin, hz);
        trace!("SimHal: tone {} <- {} Hz", pin, hz);
        Ok(())
    }

    fn i2c_read_channel(&self, addr: u8, channel: u8) -> Result<u8, HalError> {
        self.state.lock().calls.push(HalCall::I2cRead { addr, channel });
        Ok(self.light.load(Ordering::Relaxed))
    }

    fn sleep_millis(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_pin_levels() {
        let hal = SimHal::new();
        hal.pin_write(17, true).unwrap();
        hal.pin_write(17, false).unwrap();
        assert_eq!(hal.pin(17), Some(false));
        assert_eq!(hal.calls().len(), 2);
    }

    #[test]
    fn injected_setup_failure() {
        let hal = SimHal::new();
        hal.fail_setup(DeviceKind::Buzzer);
        assert!(hal.setup(DeviceKind::Led).is_ok());
        assert!(matches!(hal.setup(DeviceKind::Buzzer), Err(HalError::Setup(_))));
    }

    #[test]
    fn light_value_is_injectable() {
        let hal = SimHal::new();
        hal.set_light(42);
        assert_eq!(hal.i2c_read_channel(0x48, 0).unwrap(), 42);
    }
}

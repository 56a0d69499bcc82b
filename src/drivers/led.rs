//! Dimmable LED on a hardware PWM pin.
//!
//! Three brightness presets map to fixed duty values out of
//! [`PWM_RANGE`](pins::PWM_RANGE); `on()` is full scale.  No background
//! work, so the phase is only ever `Uninitialized` or `Idle`.

use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::app::ports::{Device, HalPort, Led, Phase};
use crate::error::{DeviceError, DeviceKind, Result};
use crate::pins;

/// Duty per brightness level 0 (low), 1 (middle), 2 (high).
pub const LEVEL_DUTY: [u16; 3] = [102, 512, pins::PWM_RANGE];

struct LedState {
    initialized: bool,
    duty: u16,
}

pub struct LedDriver {
    hal: Arc<dyn HalPort>,
    state: Mutex<LedState>,
}

impl LedDriver {
    pub fn new(hal: Arc<dyn HalPort>) -> Self {
        Self {
            hal,
            state: Mutex::new(LedState {
                initialized: false,
                duty: 0,
            }),
        }
    }

    fn apply(&self, duty: u16) -> Result<()> {
        let mut st = self.state.lock();
        if !st.initialized {
            return Err(DeviceError::NotInitialized(DeviceKind::Led));
        }
        self.hal.pwm_write(pins::LED_PWM_GPIO, duty)?;
        st.duty = duty;
        Ok(())
    }

    fn level_name(duty: u16) -> &'static str {
        match duty {
            0 => "OFF",
            d if d <= LEVEL_DUTY[0] => "LOW",
            d if d <= LEVEL_DUTY[1] => "MIDDLE",
            _ => "HIGH",
        }
    }
}

impl Device for LedDriver {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Led
    }

    fn init(&self) -> Result<()> {
        let mut st = self.state.lock();
        if st.initialized {
            return Ok(());
        }
        self.hal.setup(DeviceKind::Led)?;
        self.hal.pwm_write(pins::LED_PWM_GPIO, 0)?;
        st.initialized = true;
        st.duty = 0;
        info!("LED: initialized on GPIO {}", pins::LED_PWM_GPIO);
        Ok(())
    }

    fn cleanup(&self) {
        let mut st = self.state.lock();
        if !st.initialized {
            return;
        }
        let _ = self.hal.pwm_write(pins::LED_PWM_GPIO, 0);
        st.initialized = false;
        st.duty = 0;
        debug!("LED: cleaned up");
    }

    fn phase(&self) -> Phase {
        if self.state.lock().initialized {
            Phase::Idle
        } else {
            Phase::Uninitialized
        }
    }

    fn status(&self) -> String {
        let st = self.state.lock();
        if !st.initialized {
            return "LED: NOT_INITIALIZED".into();
        }
        format!("LED: {}", Self::level_name(st.duty))
    }
}

impl Led for LedDriver {
    fn on(&self) -> Result<()> {
        self.apply(pins::PWM_RANGE)?;
        info!("LED: on");
        Ok(())
    }

    fn off(&self) -> Result<()> {
        self.apply(0)?;
        info!("LED: off");
        Ok(())
    }

    fn brightness(&self, level: i64) -> Result<()> {
        let duty = usize::try_from(level)
            .ok()
            .and_then(|i| LEVEL_DUTY.get(i).copied())
            .ok_or_else(|| {
                DeviceError::InvalidArgument(format!("brightness level {level} out of range 0-2"))
            })?;
        self.apply(duty)?;
        info!("LED: brightness level {} (duty {})", level, duty);
        Ok(())
    }
}

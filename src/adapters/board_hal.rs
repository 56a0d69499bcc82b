//! [`HalPort`] over `embedded-hal` 1.0 peripherals.
//!
//! Any platform crate that hands out `OutputPin`, `SetDutyCycle` and
//! `I2c` implementations can drive the real board through this adapter.
//! Pin numbers coming from the drivers are mapped back to the owned
//! peripherals using the assignments in [`pins`].
//!
//! The buzzer has no hardware tone generator: a dedicated thread toggles
//! its pin at the requested frequency, like a soft-tone driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use embedded_hal::pwm::SetDutyCycle;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::app::ports::HalPort;
use crate::error::{DeviceKind, HalError};
use crate::pins;

/// Rest period of the tone thread while silent.
const TONE_IDLE: Duration = Duration::from_millis(10);

/// Peripherals handed over by the platform layer.
pub struct BoardPins<P, W, I> {
    pub led_pwm: W,
    /// Decoder inputs in [`pins::SEGMENT_GPIOS`] order.
    pub segment: [P; 4],
    pub buzzer: P,
    pub auto_led: P,
    pub adc: I,
}

// ── Soft tone ─────────────────────────────────────────────────

struct ToneGenerator {
    hz: Arc<AtomicU16>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ToneGenerator {
    fn start<P>(mut pin: P) -> Result<Self, HalError>
    where
        P: OutputPin + Send + 'static,
    {
        let hz = Arc::new(AtomicU16::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let (thread_hz, thread_stop) = (Arc::clone(&hz), Arc::clone(&stop));

        let handle = std::thread::Builder::new()
            .name("soft-tone".into())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    let freq = thread_hz.load(Ordering::Relaxed);
                    if freq == 0 {
                        let _ = pin.set_low();
                        std::thread::sleep(TONE_IDLE);
                        continue;
                    }
                    let half = Duration::from_micros(500_000 / u64::from(freq));
                    let _ = pin.set_high();
                    std::thread::sleep(half);
                    let _ = pin.set_low();
                    std::thread::sleep(half);
                }
                let _ = pin.set_low();
            })
            .map_err(|e| HalError::Setup(format!("soft-tone thread: {}", e)))?;

        Ok(Self {
            hz,
            stop,
            handle: Some(handle),
        })
    }

    fn set(&self, hz: u16) {
        self.hz.store(hz, Ordering::Relaxed);
    }
}

impl Drop for ToneGenerator {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ── BoardHal ──────────────────────────────────────────────────

pub struct BoardHal<P, W, I> {
    segment: Mutex<[P; 4]>,
    auto_led: Mutex<P>,
    led_pwm: Mutex<W>,
    adc: Mutex<I>,
    tone: ToneGenerator,
}

impl<P, W, I> BoardHal<P, W, I>
where
    P: OutputPin + Send + 'static,
    W: SetDutyCycle + Send,
    I: I2c + Send,
{
    pub fn new(board: BoardPins<P, W, I>) -> Result<Self, HalError> {
        let tone = ToneGenerator::start(board.buzzer)?;
        info!("BoardHal: peripherals claimed");
        Ok(Self {
            segment: Mutex::new(board.segment),
            auto_led: Mutex::new(board.auto_led),
            led_pwm: Mutex::new(board.led_pwm),
            adc: Mutex::new(board.adc),
            tone,
        })
    }

    fn read_adc(&self, addr: u8, channel: u8) -> Result<u8, HalError> {
        let mut adc = self.adc.lock();
        adc.write(addr, &[channel & 0x03])
            .map_err(|_| HalError::I2cRead { addr })?;
        // The first byte is the previous conversion.
        let mut sample = [0u8; 2];
        adc.read(addr, &mut sample)
            .map_err(|_| HalError::I2cRead { addr })?;
        Ok(sample[1])
    }
}

impl<P, W, I> HalPort for BoardHal<P, W, I>
where
    P: OutputPin + Send + 'static,
    W: SetDutyCycle + Send,
    I: I2c + Send,
{
    fn setup(&self, device: DeviceKind) -> Result<(), HalError> {
        match device {
            DeviceKind::Cds => {
                self.read_adc(pins::CDS_I2C_ADDR, pins::CDS_ADC_CHANNEL)
                    .map_err(|e| HalError::Setup(format!("light sensor ADC not responding: {}", e)))?;
            }
            DeviceKind::Led | DeviceKind::Segment | DeviceKind::Buzzer => {}
        }
        debug!("BoardHal: {} ready", device);
        Ok(())
    }

    fn pin_write(&self, pin: u8, high: bool) -> Result<(), HalError> {
        let result = if let Some(i) = pins::SEGMENT_GPIOS.iter().position(|p| *p == pin) {
            let mut seg = self.segment.lock();
            if high { seg[i].set_high() } else { seg[i].set_low() }
        } else if pin == pins::AUTO_LED_GPIO {
            let mut led = self.auto_led.lock();
            if high { led.set_high() } else { led.set_low() }
        } else {
            return Err(HalError::UnknownPin(pin));
        };
        result.map_err(|_| HalError::PinWrite(pin))
    }

    fn pwm_write(&self, pin: u8, value: u16) -> Result<(), HalError> {
        if pin != pins::LED_PWM_GPIO {
            return Err(HalError::UnknownPin(pin));
        }
        self.led_pwm
            .lock()
            .set_duty_cycle_fraction(value.min(pins::PWM_RANGE), pins::PWM_RANGE)
            .map_err(|_| HalError::PwmWrite(pin))
    }

    fn tone_write(&self, pin: u8, hz: u16) -> Result<(), HalError> {
        if pin != pins::BUZZER_GPIO {
            return Err(HalError::UnknownPin(pin));
        }
        self.tone.set(hz);
        Ok(())
    }

    fn i2c_read_channel(&self, addr: u8, channel: u8) -> Result<u8, HalError> {
        self.read_adc(addr, channel).inspect_err(|e| warn!("BoardHal: {}", e))
    }

    fn sleep_millis(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

//! Raspberry Pi peripherals through `rppal`, handed to [`BoardHal`].
//!
//! The LED needs hardware PWM on GPIO 18 (`dtoverlay=pwm,pin=18,func=2`)
//! and the light sensor needs I2C bus 1 enabled.

use core::fmt::Display;

use rppal::gpio::{Gpio, OutputPin};
use rppal::i2c::I2c;
use rppal::pwm::{Channel, Polarity, Pwm};

use super::board_hal::{BoardHal, BoardPins};
use crate::error::HalError;
use crate::pins;

/// LED PWM carrier frequency.
const LED_PWM_HZ: f64 = 1000.0;

pub type RpiHal = BoardHal<OutputPin, Pwm, I2c>;

fn setup<E: Display>(what: &'static str) -> impl Fn(E) -> HalError {
    move |e| HalError::Setup(format!("{}: {}", what, e))
}

/// Claim every pin in [`pins`] and build the board HAL.
pub fn open() -> Result<RpiHal, HalError> {
    let gpio = Gpio::new().map_err(setup("GPIO"))?;
    let output = |pin: u8, high: bool| -> Result<OutputPin, HalError> {
        let pin = gpio.get(pin).map_err(setup("GPIO"))?;
        Ok(if high {
            pin.into_output_high()
        } else {
            pin.into_output_low()
        })
    };

    // Decoder inputs start blank (all HIGH).
    let [a, b, c, d] = pins::SEGMENT_GPIOS;
    let segment = [output(a, true)?, output(b, true)?, output(c, true)?, output(d, true)?];

    let led_pwm = Pwm::with_frequency(Channel::Pwm0, LED_PWM_HZ, 0.0, Polarity::Normal, true)
        .map_err(setup("PWM0"))?;
    let adc = I2c::new().map_err(setup("I2C"))?;

    BoardHal::new(BoardPins {
        led_pwm,
        segment,
        buzzer: output(pins::BUZZER_GPIO, false)?,
        auto_led: output(pins::AUTO_LED_GPIO, false)?,
        adc,
    })
}

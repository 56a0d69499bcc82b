//! GPIO / bus assignments for the I/O board (BCM numbering).
//!
//! Drivers take their pin numbers from here; nothing else hard-codes a
//! pin.  The numbers match the board's wiring harness.

// ---------------------------------------------------------------------------
// Dimmable LED
// ---------------------------------------------------------------------------

/// Hardware PWM output driving the main LED.
pub const LED_PWM_GPIO: u8 = 18;
/// Full-scale PWM value (range configured at 1024).
pub const PWM_RANGE: u16 = 1024;

// ---------------------------------------------------------------------------
// 4-bit numeric display (BCD decoder inputs, MSB first)
// ---------------------------------------------------------------------------

pub const SEGMENT_GPIOS: [u8; 4] = [16, 20, 21, 12];

// ---------------------------------------------------------------------------
// Buzzer
// ---------------------------------------------------------------------------

/// Soft-tone output for the piezo buzzer.
pub const BUZZER_GPIO: u8 = 19;

// ---------------------------------------------------------------------------
// Light sensor (PCF8591 ADC on I2C-1) and its actuator
// ---------------------------------------------------------------------------

pub const CDS_I2C_ADDR: u8 = 0x48;
pub const CDS_ADC_CHANNEL: u8 = 0;
/// Digital output for the LED driven by the light sensor.
pub const AUTO_LED_GPIO: u8 = 17;

//! NTC thermistor measurement.
//!
//! Each thermistor sits at the bottom of a divider with a 10k pull-up to the
//! 3V3 rail. Channels 0-6 are switched by MCU pins, the rest by the I/O
//! expander.

use embedded_hal_async::{delay::DelayNs, i2c::I2c};
use segment_messages::THERMISTOR_COUNT;
use tca9535_async::{Port, Tca9535};

use crate::{
    board::Board,
    config::{
        REFERENCE_VOLTAGE, THERMISTOR_NOISE_THRESHOLD, THERMISTOR_RANGE_THRESHOLD,
        THERMISTOR_SAMPLE_COUNT,
    },
    voltage::{self, AdcSample},
};

/// Thermistors switched directly by MCU pins.
pub const DIRECT_THERMISTOR_COUNT: usize = 7;

/// The first few thermistors are on the board and use a different part.
const ONBOARD_THERMISTOR_COUNT: usize = 3;
const ONBOARD_BETA: f32 = 1.0 / 3350.0;
const REMOTE_BETA: f32 = 1.0 / 3950.0;

const PULL_UP_OHMS: i32 = 10_000;
const NOMINAL_OHMS: f32 = 10_000.0;
const NOMINAL_KELVIN_INV: f32 = 1.0 / 298.15;
const CELSIUS_OFFSET: f32 = 273.15;

const SETTLE_US: u32 = 5;

/// Expander pin value with every thermistor switched off.
const EXPANDER_ALL_OFF: u8 = 0xff;

/// How a thermistor channel is switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThermistorChannel {
    /// MCU pin with the given index.
    Direct(usize),
    /// Expander pin, enabled by making it an output driving low.
    Expander { port: Port, bit: u8 },
}

impl ThermistorChannel {
    pub fn of(index: usize) -> Option<Self> {
        if index < DIRECT_THERMISTOR_COUNT {
            return Some(Self::Direct(index));
        }
        if index >= THERMISTOR_COUNT {
            return None;
        }
        // Port 1 is wired in the opposite direction, the pins go around clockwise.
        let pin = (index - DIRECT_THERMISTOR_COUNT) as u8;
        Some(if pin < 8 {
            Self::Expander {
                port: Port::Port0,
                bit: pin,
            }
        } else {
            Self::Expander {
                port: Port::Port1,
                bit: 15 - pin,
            }
        })
    }
}

/// Why a thermistor has no reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThermistorFault {
    InvalidIndex,
    /// Couldn't switch the channel through the expander.
    Expander,
    Adc,
    /// Open or short circuit.
    OutOfRange,
    Noisy,
}

/// Inverse beta of the thermistor part on a channel.
pub fn beta(index: usize) -> f32 {
    if index < ONBOARD_THERMISTOR_COUNT {
        ONBOARD_BETA
    } else {
        REMOTE_BETA
    }
}

/// Thermistor resistance in ohms from the divider ratio.
pub fn resistance(rail_voltage: u16, voltage: u16) -> i32 {
    (rail_voltage as i32 * PULL_UP_OHMS) / voltage as i32 - PULL_UP_OHMS
}

/// Beta equation, truncated to whole degrees Celsius.
pub fn temperature(resistance: i32, beta: f32) -> i8 {
    let ratio = resistance as f32 / NOMINAL_OHMS;
    let kelvin = 1.0 / (NOMINAL_KELVIN_INV + beta * libm::logf(ratio));
    (kelvin - CELSIUS_OFFSET) as i8
}

async fn switch<B, I2C>(
    board: &mut B,
    expander: &mut Tca9535<I2C>,
    channel: ThermistorChannel,
    enabled: bool,
) -> Result<(), ThermistorFault>
where
    B: Board,
    I2C: I2c,
{
    match channel {
        ThermistorChannel::Direct(pin) => {
            board.set_thermistor_enable(pin, enabled);
            Ok(())
        }
        ThermistorChannel::Expander { port, bit } => {
            let value = if enabled {
                !(1 << bit)
            } else {
                EXPANDER_ALL_OFF
            };
            expander
                .set_configuration(port, value)
                .await
                .map_err(|_| ThermistorFault::Expander)
        }
    }
}

/// Switch a thermistor on, measure it and switch it off again.
///
/// `rail_voltage` is the divider supply in 100 uV resolution.
pub async fn sample_thermistor<B, I2C, D>(
    board: &mut B,
    expander: &mut Tca9535<I2C>,
    delay: &mut D,
    rail_voltage: u16,
    index: usize,
) -> Result<i8, ThermistorFault>
where
    B: Board,
    I2C: I2c,
    D: DelayNs,
{
    let channel = ThermistorChannel::of(index).ok_or(ThermistorFault::InvalidIndex)?;

    switch(board, expander, channel, true).await?;
    delay.delay_us(SETTLE_US).await;
    let sample = voltage::sample(board, REFERENCE_VOLTAGE, THERMISTOR_SAMPLE_COUNT).await;
    switch(board, expander, channel, false).await?;

    let AdcSample { voltage, range } = sample.ok_or(ThermistorFault::Adc)?;

    // A bad rail reading must not turn into a plausible temperature.
    let voltage = voltage.min(rail_voltage);
    if voltage < THERMISTOR_RANGE_THRESHOLD
        || voltage > rail_voltage.saturating_sub(THERMISTOR_RANGE_THRESHOLD)
    {
        return Err(ThermistorFault::OutOfRange);
    }
    if range > THERMISTOR_NOISE_THRESHOLD {
        return Err(ThermistorFault::Noisy);
    }

    Ok(temperature(resistance(rail_voltage, voltage), beta(index)))
}

//! Board support the engine needs beyond the SPI and I2C drivers.

use crate::voltage::AdcSample;

/// Pin sequencing, the shared ADC and the wake-up source of one board.
///
/// The SPI link to the AFE and the expander I2C link are passed to the
/// controller separately as `embedded-hal-async` devices.
#[allow(async_fn_in_trait)]
pub trait Board {
    /// Average `count` conversions against `reference` (100 uV).
    ///
    /// Returns the mean voltage and the spread of the raw samples in ADC
    /// counts, or `None` if the converter couldn't be read.
    async fn sample_voltage(&mut self, reference: u16, count: usize) -> Option<AdcSample>;

    /// Drive a directly connected thermistor enable line high, or float it.
    fn set_thermistor_enable(&mut self, index: usize, enabled: bool);

    /// Switch the AFE enable and reference enable lines together.
    fn set_front_end_power(&mut self, enabled: bool);

    /// Turn SCK and MOSI into plain outputs and deselect the ADC and AFE.
    fn park_measurement_bus(&mut self);

    /// Put the ADC into shutdown. The measurement bus must be parked.
    async fn shutdown_adc(&mut self);

    /// Wake the ADC and hand SCK and MOSI back to the SPI master.
    async fn wake_measurement_bus(&mut self);

    /// Float the two-wire pins and arm SCL as the wake-up event.
    fn park_bus_pins(&mut self);

    /// Halt until the wake-up event or another interrupt.
    async fn wait_for_wake(&mut self);

    /// Return the two-wire pins to the I2C peripherals and reinitialize them.
    fn restore_bus_pins(&mut self);
}

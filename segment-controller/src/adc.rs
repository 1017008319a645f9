//! External 16-bit SAR ADC on the measurement SPI bus.
//!
//! A rising edge on CNVST starts a conversion, the result is clocked out on
//! the next low phase. The same edge puts the converter into shutdown when SCK
//! is held high and wakes it when SCK is low.

use embassy_embedded_hal::adapter::BlockingAsync;
use embassy_stm32::{gpio::Output, mode::Blocking, spi::Spi};
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use embedded_hal_async::spi::SpiBus;
use segment_core::AdcSample;

/// SPI2, shared with the AFE.
pub type MeasurementBus = Mutex<NoopRawMutex, BlockingAsync<Spi<'static, Blocking>>>;

/// Core cycles covering one conversion at 8 MHz.
const CONVERSION_CYCLES: u32 = 24;

pub struct MaxAdc {
    bus: &'static MeasurementBus,
    cnvst: Output<'static>,
}

impl MaxAdc {
    pub fn new(bus: &'static MeasurementBus, cnvst: Output<'static>) -> Self {
        Self { bus, cnvst }
    }

    /// Single CNVST pulse.
    pub fn pulse(&mut self) {
        self.cnvst.set_low();
        self.cnvst.set_high();
    }

    /// Average `count` conversions and scale them to `reference` (100 uV).
    pub async fn sample_voltage(&mut self, reference: u16, count: usize) -> Option<AdcSample> {
        if count == 0 {
            return None;
        }
        let mut bus = self.bus.lock().await;

        let mut sum = 0u32;
        let mut min = u16::MAX;
        let mut max = u16::MIN;
        // One extra round, the first result is left over from before.
        for round in 0..=count {
            cortex_m::asm::delay(CONVERSION_CYCLES);
            let mut raw = [0u8; 2];
            self.cnvst.set_low();
            let result = bus.read(&mut raw).await;
            self.cnvst.set_high();
            result.ok()?;

            if round == 0 {
                continue;
            }
            let value = u16::from_be_bytes(raw);
            sum += u32::from(value);
            min = min.min(value);
            max = max.max(value);
        }

        let mean = sum / count as u32;
        Some(AdcSample {
            voltage: ((mean * u32::from(reference)) >> 16) as u16,
            range: max - min,
        })
    }
}

use cortex_m::peripheral::SCB;
use embassy_stm32::{
    exti::ExtiInput,
    gpio::{Flex, Output, Pull, Speed},
};
use segment_core::{thermistor::DIRECT_THERMISTOR_COUNT, AdcSample, Board};

use crate::{
    adc::MaxAdc,
    pins::{self, PinMode},
    slave,
};

/// Segment controller board, hardware revision D.
pub struct SegmentBoard {
    pub adc: MaxAdc,
    pub thermistors: [Flex<'static>; DIRECT_THERMISTOR_COUNT],
    pub afe_enable: Output<'static>,
    pub reference_enable: Output<'static>,
    /// SCL of the slave bus, only used while it's parked.
    pub wake: ExtiInput<'static>,
    pub scb: SCB,
    pub address: u8,
}

impl Board for SegmentBoard {
    async fn sample_voltage(&mut self, reference: u16, count: usize) -> Option<AdcSample> {
        self.adc.sample_voltage(reference, count).await
    }

    fn set_thermistor_enable(&mut self, index: usize, enabled: bool) {
        let Some(pin) = self.thermistors.get_mut(index) else {
            return;
        };
        if enabled {
            pin.set_high();
            pin.set_as_output(Speed::Low);
        } else {
            pin.set_as_input(Pull::None);
        }
    }

    fn set_front_end_power(&mut self, enabled: bool) {
        self.afe_enable.set_level(enabled.into());
        self.reference_enable.set_level(enabled.into());
    }

    fn park_measurement_bus(&mut self) {
        pins::SCK.set_mode(PinMode::PushPull2MHz);
        pins::MOSI.set_mode(PinMode::PushPull2MHz);
        pins::SCK.set_high();
    }

    async fn shutdown_adc(&mut self) {
        self.adc.pulse();
    }

    async fn wake_measurement_bus(&mut self) {
        pins::SCK.set_low();
        self.adc.pulse();
        pins::SCK.set_mode(PinMode::AlternatePushPull10MHz);
        pins::MOSI.set_mode(PinMode::AlternatePushPull10MHz);
    }

    fn park_bus_pins(&mut self) {
        // Floating SDA too, so the isolator isn't held low.
        for pin in pins::TWO_WIRE {
            pin.set_mode(PinMode::FloatingInput);
        }
    }

    async fn wait_for_wake(&mut self) {
        // The executor idles with WFE, which becomes stop mode.
        self.scb.set_sleepdeep();
        self.wake.wait_for_falling_edge().await;
        self.scb.clear_sleepdeep();
    }

    fn restore_bus_pins(&mut self) {
        for pin in pins::TWO_WIRE {
            pin.set_mode(PinMode::AlternateOpenDrain2MHz);
        }
        slave::listen(self.address);
    }
}

//! Mode switches for pins that belong to a peripheral driver.
//!
//! The SPI and I2C drivers own these pins, but they have to be turned into
//! plain GPIOs around stop mode. This goes straight to the port registers.

use embassy_stm32::pac::{
    self,
    gpio::{regs::Bsrr, Gpio},
};

/// CNF and MODE bits of one pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PinMode {
    FloatingInput = 0b0100,
    PushPull2MHz = 0b0010,
    AlternatePushPull10MHz = 0b1001,
    AlternateOpenDrain2MHz = 0b1110,
}

#[derive(Clone, Copy)]
pub struct RawPin {
    port: Gpio,
    pin: usize,
}

impl RawPin {
    pub const fn new(port: Gpio, pin: usize) -> Self {
        Self { port, pin }
    }

    pub fn set_mode(&self, mode: PinMode) {
        let shift = (self.pin % 8) * 4;
        self.port
            .cr(self.pin / 8)
            .modify(|w| w.0 = (w.0 & !(0xf << shift)) | ((mode as u32) << shift));
    }

    pub fn set_high(&self) {
        self.port.bsrr().write_value(Bsrr(1 << self.pin));
    }

    pub fn set_low(&self) {
        self.port.bsrr().write_value(Bsrr(1 << (self.pin + 16)));
    }
}

pub const SCK: RawPin = RawPin::new(pac::GPIOB, 13);
pub const MOSI: RawPin = RawPin::new(pac::GPIOB, 15);

/// SCL1, SDA1, SCL2, SDA2.
pub const TWO_WIRE: [RawPin; 4] = [
    RawPin::new(pac::GPIOB, 6),
    RawPin::new(pac::GPIOB, 7),
    RawPin::new(pac::GPIOB, 10),
    RawPin::new(pac::GPIOB, 11),
];

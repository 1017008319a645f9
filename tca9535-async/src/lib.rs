#![deny(unsafe_code)]
#![no_std]

use embedded_hal::i2c::I2c as I2cBlocking;
use embedded_hal_async::i2c::I2c as I2cAsync;

/// Address with A0..A2 tied low.
pub const DEFAULT_ADDRESS: u8 = 0x20;

/// TCA9535 registers.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    InputPort0 = 0x00,
    InputPort1 = 0x01,
    OutputPort0 = 0x02,
    OutputPort1 = 0x03,
    PolarityPort0 = 0x04,
    PolarityPort1 = 0x05,
    ConfigurationPort0 = 0x06,
    ConfigurationPort1 = 0x07,
}

/// One of the two 8-bit ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    Port0,
    Port1,
}

impl Port {
    /// Configuration register of the port. A cleared bit makes the pin an output.
    pub fn configuration(self) -> Register {
        match self {
            Port::Port0 => Register::ConfigurationPort0,
            Port::Port1 => Register::ConfigurationPort1,
        }
    }
}

/// Register writes that put the expander into its power-on state:
/// outputs high, no inversion, every pin an input.
const RESET_SEQUENCE: [(Register, u8); 6] = [
    (Register::OutputPort0, 0xff),
    (Register::OutputPort1, 0xff),
    (Register::PolarityPort0, 0x00),
    (Register::PolarityPort1, 0x00),
    (Register::ConfigurationPort0, 0xff),
    (Register::ConfigurationPort1, 0xff),
];

/// The TCA9535 16-bit I/O expander driver.
pub struct Tca9535<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> Tca9535<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self::new_with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn new_with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Give the I2C bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C> Tca9535<I2C>
where
    I2C: I2cAsync,
{
    /// Write value to register.
    pub async fn write_register(&mut self, reg: Register, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[reg as u8, value]).await
    }

    /// Fetch 8-bit register value.
    pub async fn read_register(&mut self, reg: Register) -> Result<u8, I2C::Error> {
        let mut buf = [0];
        self.i2c
            .write_read(self.address, &[reg as u8], &mut buf)
            .await?;
        Ok(buf[0])
    }

    /// Write the pin direction mask of a port.
    pub async fn set_configuration(&mut self, port: Port, value: u8) -> Result<(), I2C::Error> {
        self.write_register(port.configuration(), value).await
    }

    /// Return to a known-safe state with every pin floating.
    ///
    /// All writes are attempted even if one fails; the first error is returned.
    pub async fn reset(&mut self) -> Result<(), I2C::Error> {
        let mut result = Ok(());
        for (reg, value) in RESET_SEQUENCE {
            let r = self.write_register(reg, value).await;
            if result.is_ok() {
                result = r;
            }
        }
        result
    }
}

impl<I2C> Tca9535<I2C>
where
    I2C: I2cBlocking,
{
    /// Write value to register.
    pub fn write_register_blocking(&mut self, reg: Register, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[reg as u8, value])
    }

    /// Fetch 8-bit register value.
    pub fn read_register_blocking(&mut self, reg: Register) -> Result<u8, I2C::Error> {
        let mut buf = [0];
        self.i2c.write_read(self.address, &[reg as u8], &mut buf)?;
        Ok(buf[0])
    }
}

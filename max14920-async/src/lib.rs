#![deny(unsafe_code)]
#![no_std]

use embedded_hal::spi::SpiDevice as SpiBlocking;
use embedded_hal_async::spi::SpiDevice as SpiAsync;

mod control;
pub use control::*;

/// Product and die version in the upper status nibble.
const VERSION_BITS: u8 = 0b1010;
/// UVLO and thermal shutdown flags.
const FAULT_BITS: u8 = 0b1101;
const NOT_READY_BIT: u8 = 0b0010;

/// Device state reported with every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AfeStatus {
    Ready,
    /// Still starting up.
    NotReady,
    /// Transfer failed or the reply isn't from a MAX14920.
    BadSpi,
    /// Undervoltage lockout or thermal shutdown.
    Shutdown,
}

impl AfeStatus {
    /// Interpret the status byte clocked out during the control byte.
    pub fn from_status_byte(status: u8) -> Self {
        if status >> 4 != VERSION_BITS {
            AfeStatus::BadSpi
        } else if status & FAULT_BITS != 0 {
            AfeStatus::Shutdown
        } else if status & NOT_READY_BIT != 0 {
            AfeStatus::NotReady
        } else {
            AfeStatus::Ready
        }
    }
}

/// Build the 3-byte frame. Balance bits go out MSB first.
fn frame(balance: u16, control: Control) -> [u8; 3] {
    let [hi, lo] = balance.to_be_bytes();
    [hi, lo, control.bits()]
}

/// The MAX14920 analog front end driver.
pub struct Max14920<SPI> {
    spi: SPI,
}

impl<SPI> Max14920<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Give the SPI device back.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> Max14920<SPI>
where
    SPI: SpiAsync,
{
    /// Program balance switches and routing, returning the device status.
    ///
    /// The new state is kept by the chip until the next command.
    pub async fn command(&mut self, balance: u16, control: Control) -> AfeStatus {
        let mut data = frame(balance, control);
        if self.spi.transfer_in_place(&mut data).await.is_err() {
            return AfeStatus::BadSpi;
        }
        AfeStatus::from_status_byte(data[2])
    }

    /// Repeat a command until the chip has finished starting up.
    ///
    /// Gives up with `NotReady` after `max_polls` attempts.
    pub async fn wait_ready(&mut self, control: Control, max_polls: u32) -> AfeStatus {
        let mut status = AfeStatus::NotReady;
        for _ in 0..max_polls {
            status = self.command(0, control).await;
            if status != AfeStatus::NotReady {
                break;
            }
        }
        #[cfg(feature = "defmt")]
        if status != AfeStatus::Ready {
            defmt::warn!("AFE not ready: {}", status);
        }
        status
    }
}

impl<SPI> Max14920<SPI>
where
    SPI: SpiBlocking,
{
    /// Program balance switches and routing, returning the device status.
    pub fn command_blocking(&mut self, balance: u16, control: Control) -> AfeStatus {
        let mut data = frame(balance, control);
        if self.spi.transfer_in_place(&mut data).is_err() {
            return AfeStatus::BadSpi;
        }
        AfeStatus::from_status_byte(data[2])
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use embassy_futures::block_on;
    use embedded_hal::spi::{ErrorKind, ErrorType, Operation};
    use std::vec::Vec;

    #[derive(Debug)]
    struct Broken;

    impl embedded_hal::spi::Error for Broken {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Replies with queued status bytes and records every frame.
    struct DummySpi {
        replies: Vec<u8>,
        sent: Vec<[u8; 3]>,
        fail: bool,
    }

    impl DummySpi {
        fn new(replies: &[u8]) -> Self {
            Self {
                replies: replies.iter().rev().copied().collect(),
                sent: Vec::new(),
                fail: false,
            }
        }

        fn exchange(&mut self, ops: &mut [Operation<'_, u8>]) -> Result<(), Broken> {
            if self.fail {
                return Err(Broken);
            }
            for op in ops {
                if let Operation::TransferInPlace(buf) = op {
                    self.sent.push([buf[0], buf[1], buf[2]]);
                    buf[0] = 0;
                    buf[1] = 0;
                    buf[2] = self.replies.pop().unwrap_or(0);
                }
            }
            Ok(())
        }
    }

    impl ErrorType for DummySpi {
        type Error = Broken;
    }

    impl SpiAsync for DummySpi {
        async fn transaction(&mut self, ops: &mut [Operation<'_, u8>]) -> Result<(), Broken> {
            self.exchange(ops)
        }
    }

    impl SpiBlocking for DummySpi {
        fn transaction(&mut self, ops: &mut [Operation<'_, u8>]) -> Result<(), Broken> {
            self.exchange(ops)
        }
    }

    #[test]
    fn status_decoding() {
        assert_eq!(AfeStatus::from_status_byte(0xA0), AfeStatus::Ready);
        assert_eq!(AfeStatus::from_status_byte(0xA2), AfeStatus::NotReady);
        assert_eq!(AfeStatus::from_status_byte(0xA1), AfeStatus::Shutdown);
        assert_eq!(AfeStatus::from_status_byte(0xA4), AfeStatus::Shutdown);
        assert_eq!(AfeStatus::from_status_byte(0xAA), AfeStatus::Shutdown);
        // Wrong version wins over every other flag.
        assert_eq!(AfeStatus::from_status_byte(0x50), AfeStatus::BadSpi);
        assert_eq!(AfeStatus::from_status_byte(0xFF), AfeStatus::BadSpi);
        assert_eq!(AfeStatus::from_status_byte(0x02), AfeStatus::BadSpi);
    }

    #[test]
    fn command_frame() {
        let mut afe = Max14920::new(DummySpi::new(&[0xA0]));
        let control = Control::cell(3).unwrap() | Control::HOLD;
        let status = block_on(afe.command(0x0ABC, control));
        assert_eq!(status, AfeStatus::Ready);
        let spi = afe.release();
        assert_eq!(spi.sent, [[0x0A, 0xBC, 0b1110_0100]]);
    }

    #[test]
    fn transfer_error_is_bad_spi() {
        let mut spi = DummySpi::new(&[0xA0]);
        spi.fail = true;
        let mut afe = Max14920::new(spi);
        assert_eq!(block_on(afe.command(0, Control::NONE)), AfeStatus::BadSpi);
        assert_eq!(afe.command_blocking(0, Control::NONE), AfeStatus::BadSpi);
    }

    #[test]
    fn waits_until_ready() {
        let mut afe = Max14920::new(DummySpi::new(&[0xA2, 0xA2, 0xA0, 0xA2]));
        let status = block_on(afe.wait_ready(Control::ROUTE_T2_BUFFERED, 10));
        assert_eq!(status, AfeStatus::Ready);
        assert_eq!(afe.release().sent.len(), 3);
    }

    #[test]
    fn wait_gives_up() {
        let mut afe = Max14920::new(DummySpi::new(&[0xA2; 8]));
        let status = block_on(afe.wait_ready(Control::ROUTE_T2_BUFFERED, 4));
        assert_eq!(status, AfeStatus::NotReady);
        assert_eq!(afe.release().sent.len(), 4);
    }

    #[test]
    fn blocking_command() {
        let mut afe = Max14920::new(DummySpi::new(&[0xA8]));
        assert_eq!(afe.command_blocking(0, Control::DIAGNOSTIC), AfeStatus::Shutdown);
        assert_eq!(afe.release().sent, [[0, 0, 0b0101_1010]]);
    }
}

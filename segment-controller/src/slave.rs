//! Polled two-wire slave on I2C1.

use embassy_futures::yield_now;
use embassy_stm32::pac::{
    self,
    i2c::regs::{Oar1, Sr1},
};
use embassy_time::{Duration, Instant};
use segment_core::{BusError, SlaveBus, SlaveEvent};

/// APB1 clock in MHz.
const PCLK1_MHZ: u8 = 8;

/// Bit 14 of OAR1 must be kept set by software.
const OAR1_FIXED: u32 = 1 << 14;

/// Reset I2C1 and start acknowledging `address`.
pub fn listen(address: u8) {
    pac::RCC.apb1enr().modify(|w| w.set_i2c1en(true));
    pac::RCC.apb1rstr().modify(|w| w.set_i2c1rst(true));
    pac::RCC.apb1rstr().modify(|w| w.set_i2c1rst(false));

    let i2c = pac::I2C1;
    i2c.cr2().modify(|w| w.set_freq(PCLK1_MHZ));
    i2c.oar1()
        .write_value(Oar1(OAR1_FIXED | (u32::from(address) << 1)));
    i2c.cr1().modify(|w| w.set_pe(true));
    // ACK can only be set once the peripheral is enabled.
    i2c.cr1().modify(|w| w.set_ack(true));
}

fn check(sr1: Sr1) -> Result<(), BusError> {
    if sr1.berr() || sr1.arlo() || sr1.ovr() {
        pac::I2C1.sr1().modify(|w| {
            w.set_berr(false);
            w.set_arlo(false);
            w.set_ovr(false);
        });
        return Err(BusError::Bus);
    }
    Ok(())
}

/// Poll SR1 until `done` holds or `timeout_ms` passes. Checks at least once.
async fn wait(timeout_ms: u32, mut done: impl FnMut(Sr1) -> bool) -> Result<Sr1, BusError> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms.into());
    loop {
        let sr1 = pac::I2C1.sr1().read();
        check(sr1)?;
        if done(sr1) {
            return Ok(sr1);
        }
        if Instant::now() >= deadline {
            return Err(BusError::Timeout);
        }
        yield_now().await;
    }
}

fn clear_nack() {
    pac::I2C1.sr1().modify(|w| w.set_af(false));
}

pub struct Slave;

impl SlaveBus for Slave {
    async fn accept(&mut self, timeout_ms: u32) -> Result<SlaveEvent, BusError> {
        wait(timeout_ms, |sr1| {
            if sr1.stopf() {
                // Left over from the last transfer. Cleared by writing CR1.
                pac::I2C1.cr1().modify(|_| {});
            }
            sr1.addr()
        })
        .await?;

        // Reading SR2 after SR1 clears ADDR.
        if pac::I2C1.sr2().read().tra() {
            Ok(SlaveEvent::Transmit)
        } else {
            Ok(SlaveEvent::Receive)
        }
    }

    async fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), BusError> {
        for byte in buf.iter_mut() {
            wait(timeout_ms, |sr1| sr1.rxne()).await?;
            *byte = pac::I2C1.dr().read().dr();
        }
        Ok(())
    }

    async fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<(), BusError> {
        for &byte in buf {
            let sr1 = wait(timeout_ms, |sr1| sr1.txe() || sr1.af()).await?;
            if sr1.af() {
                clear_nack();
                return Err(BusError::Nack);
            }
            pac::I2C1.dr().write(|w| w.set_dr(byte));
        }

        // The master NACKs whatever would come after its last byte.
        wait(timeout_ms, |sr1| sr1.af()).await?;
        clear_nack();
        Ok(())
    }
}

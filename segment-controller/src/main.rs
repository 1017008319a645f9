#![feature(impl_trait_in_assoc_type)]
#![no_std]
#![no_main]

mod adc;
mod board;
mod pins;
mod slave;

use {defmt_rtt as _, panic_probe as _};

use crate::{
    adc::{MaxAdc, MeasurementBus},
    board::SegmentBoard,
    slave::Slave,
};
use defmt::{info, unwrap};
use embassy_embedded_hal::{adapter::BlockingAsync, shared_bus::asynch::spi::SpiDevice};
use embassy_executor::{main, Spawner};
use embassy_stm32::{
    bind_interrupts,
    exti::ExtiInput,
    gpio::{Flex, Input, Level, Output, Pull, Speed},
    i2c::{self, Config as I2cConfig, I2c},
    pac, peripherals,
    spi::{Config as SpiConfig, Spi},
    time::{khz, mhz},
    Config as DeviceConfig,
};
use embassy_sync::mutex::Mutex;
use embassy_time::Delay;
use max14920_async::Max14920;
use segment_core::{config::bus_address, Config, Controller};
use static_cell::StaticCell;
use tca9535_async::Tca9535;

bind_interrupts!(struct Irqs {
    I2C2_EV => i2c::EventInterruptHandler<peripherals::I2C2>;
    I2C2_ER => i2c::ErrorInterruptHandler<peripherals::I2C2>;
});

#[main]
async fn main(_spawner: Spawner) {
    // HSI oscillator 8 MHz straight, no PLL
    let mut config = DeviceConfig::default();
    {
        use embassy_stm32::rcc::*;
        config.rcc.hsi = true;
        config.rcc.hse = None;
        config.rcc.pll = None;
        config.rcc.sys = Sysclk::HSI;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV1;
        config.rcc.apb2_pre = APBPrescaler::DIV1;
    }
    let dev = embassy_stm32::init(config);

    // Low-power regulator in stop mode
    pac::RCC.apb1enr().modify(|w| w.set_pwren(true));
    pac::PWR.cr().modify(|w| {
        w.set_pdds(pac::pwr::vals::Pdds::STOP_MODE);
        w.set_lpds(true);
    });
    let core = unwrap!(cortex_m::Peripherals::take());

    // Solder jumpers pull the address pins low
    let address_pins = [
        Input::new(dev.PA8, Pull::Up),
        Input::new(dev.PA9, Pull::Up),
        Input::new(dev.PA10, Pull::Up),
        Input::new(dev.PA11, Pull::Up),
    ];
    let jumpers = address_pins
        .iter()
        .enumerate()
        .fold(0u8, |acc, (i, pin)| acc | ((pin.is_high() as u8) << i));
    let address = bus_address(jumpers);
    info!("Bus address {=u8:#x}", address);

    let _led = Output::new(dev.PB5, Level::Low, Speed::Low);
    let afe_enable = Output::new(dev.PB0, Level::Low, Speed::Low);
    let reference_enable = Output::new(dev.PB1, Level::Low, Speed::Low);
    let mut thermistors = [
        Flex::new(dev.PB9),
        Flex::new(dev.PB8),
        Flex::new(dev.PB12),
        Flex::new(dev.PA1),
        Flex::new(dev.PA2),
        Flex::new(dev.PA3),
        Flex::new(dev.PA4),
    ];
    for pin in &mut thermistors {
        pin.set_as_input(Pull::None);
    }

    // Measurement SPI bus: AFE and ADC, 2 MHz
    let spi = Spi::new_blocking(dev.SPI2, dev.PB13, dev.PB15, dev.PB14, {
        let mut cfg = SpiConfig::default();
        cfg.frequency = mhz(2);
        cfg.miso_pull = Pull::Up;
        cfg
    });
    static SPI_BUS: StaticCell<MeasurementBus> = StaticCell::new();
    let spi = SPI_BUS.init(Mutex::new(BlockingAsync::new(spi)));
    let afe = Max14920::new(SpiDevice::new(spi, Output::new(dev.PA7, Level::High, Speed::Low)));
    let adc = MaxAdc::new(spi, Output::new(dev.PA5, Level::High, Speed::Low));

    // Expander bus
    let i2c = I2c::new(
        dev.I2C2,
        dev.PB10,
        dev.PB11,
        Irqs,
        dev.DMA1_CH4,
        dev.DMA1_CH5,
        {
            let mut cfg = I2cConfig::default();
            cfg.frequency = khz(100);
            cfg
        },
    );
    let expander = Tca9535::new(i2c);

    // Slave bus SCL doubles as the wake-up line
    let wake = ExtiInput::new(dev.PB6, dev.EXTI6, Pull::None);

    let board = SegmentBoard {
        adc,
        thermistors,
        afe_enable,
        reference_enable,
        wake,
        scb: core.SCB,
        address,
    };

    let mut config = Config::new(address);
    if !cfg!(feature = "hw-rev-d") {
        config.rail_voltage_override = None;
    }

    let mut controller = Controller::new(board, Slave, afe, expander, Delay, config);
    controller.run().await
}

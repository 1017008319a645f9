//! Simulated segment board shared by the integration tests.
#![allow(dead_code)]

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use embedded_hal::{i2c, spi};
use embedded_hal_async::{delay::DelayNs, i2c::I2c, spi::SpiDevice};
use max14920_async::{Control, Max14920};
use segment_core::{AdcSample, Board, BusError, Config, Controller, SlaveBus, SlaveEvent, State};
use tca9535_async::Tca9535;

pub const RAIL: u16 = 33330;

/// Reading of an ADC input that isn't connected to anything useful.
pub const OPEN_CELL: AdcSample = AdcSample {
    voltage: 44900,
    range: 2,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Delay(u32),
    Poll,
    Accept,
    ParkMeasurementBus,
    ShutdownAdc,
    WakeMeasurementBus,
    ParkBusPins,
    WaitForWake,
    RestoreBusPins,
    Adc(usize),
    Afe(u8),
}

/// What the master does on the next address match.
#[derive(Debug, Clone, Copy)]
pub enum Master {
    Write(u8),
    Read,
    Fail(BusError),
}

pub struct Sim {
    pub events: Vec<Event>,
    pub front_end_power: bool,
    pub direct_enabled: [bool; 7],
    pub expander_regs: [u8; 8],
    pub expander_writes: Vec<(u8, u8)>,
    pub expander_broken: bool,
    /// Register writes accepted before the expander stops answering.
    pub expander_write_budget: Option<usize>,
    pub afe_control: u8,
    pub afe_not_ready_polls: u32,
    /// Cells for which the AFE answers with a corrupted status byte.
    pub afe_bad_cells: Vec<usize>,
    pub rail: AdcSample,
    pub adc_broken: bool,
    pub cells: [AdcSample; 12],
    /// Voltage seen with the thermistor switched on. `None` reads as open.
    pub thermistors: [Option<AdcSample>; 23],
    pub polls: VecDeque<Master>,
    pub accepts: VecDeque<Master>,
    pub pending_byte: Option<u8>,
    pub served: Vec<Vec<u8>>,
    /// How the master ends the next snapshot read, if not cleanly.
    pub write_error: Option<BusError>,
}

impl Sim {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            events: Vec::new(),
            front_end_power: false,
            direct_enabled: [false; 7],
            expander_regs: [0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0xff, 0xff],
            expander_writes: Vec::new(),
            expander_broken: false,
            expander_write_budget: None,
            afe_control: 0,
            afe_not_ready_polls: 0,
            afe_bad_cells: Vec::new(),
            rail: AdcSample {
                voltage: 33012,
                range: 4,
            },
            adc_broken: false,
            cells: [OPEN_CELL; 12],
            thermistors: [None; 23],
            polls: VecDeque::new(),
            accepts: VecDeque::new(),
            pending_byte: None,
            served: Vec::new(),
            write_error: None,
        }))
    }

    /// Thermistor channels currently switched on.
    fn enabled_thermistors(&self) -> Vec<usize> {
        let mut enabled: Vec<usize> = (0..7).filter(|&i| self.direct_enabled[i]).collect();
        let config0 = self.expander_regs[6];
        let config1 = self.expander_regs[7];
        for bit in 0..8 {
            if config0 & (1 << bit) == 0 {
                enabled.push(7 + bit);
            }
            if config1 & (1 << bit) == 0 {
                enabled.push(22 - bit);
            }
        }
        enabled
    }

    fn adc(&self) -> AdcSample {
        let enabled = self.enabled_thermistors();
        if let [index] = enabled[..] {
            // An open thermistor leaves the divider output at the rail.
            return self.thermistors[index].unwrap_or(AdcSample {
                voltage: RAIL,
                range: 3,
            });
        }
        match Control::from(self.afe_control).selected_cell() {
            Some(cell) => self.cells[cell],
            None => self.rail,
        }
    }

    pub fn afe_controls(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Afe(control) => Some(*control),
                _ => None,
            })
            .collect()
    }
}

pub struct SimBoard(pub Rc<RefCell<Sim>>);

impl Board for SimBoard {
    async fn sample_voltage(&mut self, reference: u16, count: usize) -> Option<AdcSample> {
        assert_eq!(reference, 45000);
        let mut sim = self.0.borrow_mut();
        sim.events.push(Event::Adc(count));
        if sim.adc_broken {
            return None;
        }
        Some(sim.adc())
    }

    fn set_thermistor_enable(&mut self, index: usize, enabled: bool) {
        self.0.borrow_mut().direct_enabled[index] = enabled;
    }

    fn set_front_end_power(&mut self, enabled: bool) {
        self.0.borrow_mut().front_end_power = enabled;
    }

    fn park_measurement_bus(&mut self) {
        self.0.borrow_mut().events.push(Event::ParkMeasurementBus);
    }

    async fn shutdown_adc(&mut self) {
        self.0.borrow_mut().events.push(Event::ShutdownAdc);
    }

    async fn wake_measurement_bus(&mut self) {
        self.0.borrow_mut().events.push(Event::WakeMeasurementBus);
    }

    fn park_bus_pins(&mut self) {
        self.0.borrow_mut().events.push(Event::ParkBusPins);
    }

    async fn wait_for_wake(&mut self) {
        self.0.borrow_mut().events.push(Event::WaitForWake);
    }

    fn restore_bus_pins(&mut self) {
        self.0.borrow_mut().events.push(Event::RestoreBusPins);
    }
}

pub struct SimSlave(pub Rc<RefCell<Sim>>);

impl SlaveBus for SimSlave {
    async fn accept(&mut self, timeout_ms: u32) -> Result<SlaveEvent, BusError> {
        let mut sim = self.0.borrow_mut();
        let next = if timeout_ms == 0 {
            sim.events.push(Event::Poll);
            sim.polls.pop_front()
        } else {
            sim.events.push(Event::Accept);
            sim.accepts.pop_front()
        };
        match next {
            Some(Master::Write(byte)) => {
                sim.pending_byte = Some(byte);
                Ok(SlaveEvent::Receive)
            }
            Some(Master::Read) => Ok(SlaveEvent::Transmit),
            Some(Master::Fail(e)) => Err(e),
            None => Err(BusError::Timeout),
        }
    }

    async fn read(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<(), BusError> {
        match self.0.borrow_mut().pending_byte.take() {
            Some(byte) => {
                buf[0] = byte;
                Ok(())
            }
            None => Err(BusError::Timeout),
        }
    }

    async fn write(&mut self, buf: &[u8], _timeout_ms: u32) -> Result<(), BusError> {
        let mut sim = self.0.borrow_mut();
        sim.served.push(buf.to_vec());
        match sim.write_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct SimError;

impl spi::Error for SimError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

impl i2c::Error for SimError {
    fn kind(&self) -> i2c::ErrorKind {
        i2c::ErrorKind::Bus
    }
}

/// MAX14920 on the SPI bus.
pub struct SimSpi(pub Rc<RefCell<Sim>>);

impl spi::ErrorType for SimSpi {
    type Error = SimError;
}

impl SpiDevice for SimSpi {
    async fn transaction(&mut self, ops: &mut [spi::Operation<'_, u8>]) -> Result<(), SimError> {
        let mut sim = self.0.borrow_mut();
        for op in ops {
            if let spi::Operation::TransferInPlace(buf) = op {
                let control = buf[2];
                sim.events.push(Event::Afe(control));
                sim.afe_control = control;
                let bad = Control::from(control)
                    .selected_cell()
                    .is_some_and(|cell| sim.afe_bad_cells.contains(&cell));
                buf[2] = if bad {
                    0x5a
                } else if sim.afe_not_ready_polls > 0 {
                    sim.afe_not_ready_polls -= 1;
                    0xa2
                } else {
                    0xa0
                };
            }
        }
        Ok(())
    }
}

/// TCA9535 on the expander bus.
pub struct SimI2c(pub Rc<RefCell<Sim>>);

impl i2c::ErrorType for SimI2c {
    type Error = SimError;
}

impl I2c for SimI2c {
    async fn transaction(&mut self, address: u8, ops: &mut [i2c::Operation<'_>]) -> Result<(), SimError> {
        assert_eq!(address, 0x20);
        let mut sim = self.0.borrow_mut();
        if sim.expander_broken {
            return Err(SimError);
        }
        let mut pointer = 0;
        for op in ops {
            match op {
                i2c::Operation::Write(bytes) => {
                    pointer = bytes[0] as usize;
                    if let Some(&value) = bytes.get(1) {
                        match sim.expander_write_budget {
                            Some(0) => return Err(SimError),
                            Some(n) => sim.expander_write_budget = Some(n - 1),
                            None => {}
                        }
                        sim.expander_regs[pointer] = value;
                        sim.expander_writes.push((bytes[0], value));
                    }
                }
                i2c::Operation::Read(buf) => buf[0] = sim.expander_regs[pointer],
            }
        }
        Ok(())
    }
}

pub struct SimDelay(pub Rc<RefCell<Sim>>);

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().events.push(Event::Delay(ns / 1000));
    }
}

pub type SimController = Controller<SimBoard, SimSlave, SimSpi, SimI2c, SimDelay>;

pub fn controller(sim: &Rc<RefCell<Sim>>, config: Config) -> SimController {
    Controller::new(
        SimBoard(sim.clone()),
        SimSlave(sim.clone()),
        Max14920::new(SimSpi(sim.clone())),
        Tca9535::new(SimI2c(sim.clone())),
        SimDelay(sim.clone()),
        config,
    )
}

/// Sleep, wake up and handle whatever the master does until the next sleep.
pub async fn wake_cycle(controller: &mut SimController) {
    let mut state = controller.step(State::Sleeping).await;
    while state != State::Sleeping {
        state = controller.step(state).await;
    }
}

/// Wake cycle in which the master writes `byte`.
pub async fn command(controller: &mut SimController, sim: &Rc<RefCell<Sim>>, byte: u8) {
    sim.borrow_mut().accepts.push_back(Master::Write(byte));
    wake_cycle(controller).await;
}

//! Top-level sleep, wake and measure loop.

use embedded_hal_async::{delay::DelayNs, i2c::I2c, spi::SpiDevice};
use max14920_async::{AfeStatus, Control, Max14920};
use segment_messages::{Command, SegmentData, CELL_COUNT, THERMISTOR_COUNT};
use tca9535_async::Tca9535;

use crate::{
    board::Board,
    bus::{BusHandler, BusStats, SlaveBus},
    cell::sample_cell,
    config::{Config, RAIL_SAMPLE_COUNT, REFERENCE_VOLTAGE},
    thermistor::sample_thermistor,
    voltage,
};

/// Delay before the last look at the bus, so a repeated start is still captured.
const LINGER_US: u32 = 100;

/// Extra settling for the cell sampling capacitors after the thermistors.
const CELL_SETTLE_US: u32 = 1000;

/// Where the controller is in its wake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Sleeping,
    AwaitingAddress,
    Dispatching(Command),
    RailMeasure,
    FullSample,
}

/// Owns the hardware and the measurement snapshot.
pub struct Controller<B, S, SPI, I2C, D> {
    board: B,
    bus: BusHandler<S>,
    afe: Max14920<SPI>,
    expander: Tca9535<I2C>,
    delay: D,
    config: Config,
    data: SegmentData,
}

impl<B, S, SPI, I2C, D> Controller<B, S, SPI, I2C, D>
where
    B: Board,
    S: SlaveBus,
    SPI: SpiDevice,
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(
        board: B,
        bus: S,
        afe: Max14920<SPI>,
        expander: Tca9535<I2C>,
        delay: D,
        config: Config,
    ) -> Self {
        Self {
            board,
            bus: BusHandler::new(bus),
            afe,
            expander,
            delay,
            config,
            data: SegmentData::default(),
        }
    }

    /// Latest snapshot.
    pub fn data(&self) -> &SegmentData {
        &self.data
    }

    pub fn stats(&self) -> &BusStats {
        self.bus.stats()
    }

    /// Run for the lifetime of the device.
    pub async fn run(&mut self) -> ! {
        #[cfg(feature = "defmt")]
        defmt::info!("Segment controller at address {=u8:#x}", self.config.address);
        let mut state = State::Sleeping;
        loop {
            state = self.step(state).await;
        }
    }

    /// Do the work of one state and return the next one.
    pub async fn step(&mut self, state: State) -> State {
        match state {
            State::Sleeping => {
                self.sleep().await;
                State::AwaitingAddress
            }
            State::AwaitingAddress => match self.await_address().await {
                Some(command) => State::Dispatching(command),
                None => State::Sleeping,
            },
            State::Dispatching(command) => self.dispatch(command),
            State::RailMeasure => {
                self.measure_rail().await;
                State::Sleeping
            }
            State::FullSample => {
                self.sample_all().await;
                State::Sleeping
            }
        }
    }

    async fn sleep(&mut self) {
        self.delay.delay_us(LINGER_US).await;
        if let Some(_command) = self.bus.service(&self.data, 0).await {
            #[cfg(feature = "defmt")]
            defmt::debug!("Dropping {} received before sleep", _command);
        }

        self.board.park_measurement_bus();
        self.board.shutdown_adc().await;
        self.board.park_bus_pins();
        self.board.wait_for_wake().await;
    }

    async fn await_address(&mut self) -> Option<Command> {
        self.board.restore_bus_pins();
        let command = self
            .bus
            .service(&self.data, self.config.accept_timeout_ms)
            .await;

        // Whatever happened, leave every expander-switched thermistor off.
        if self.expander.reset().await.is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("Expander reset failed");
        }

        #[cfg(feature = "defmt")]
        if let Some(command) = command {
            defmt::info!("Command {}", command);
        }
        command
    }

    fn dispatch(&mut self, command: Command) -> State {
        match command {
            Command::Enable => {
                self.board.set_front_end_power(true);
                State::Sleeping
            }
            Command::Disable => {
                self.board.set_front_end_power(false);
                State::Sleeping
            }
            Command::MeasureRail => State::RailMeasure,
            Command::Sample => State::FullSample,
        }
    }

    /// Wake the ADC and AFE and wait for AFE startup, routing the buffered
    /// thermistor path.
    async fn wake_front_end(&mut self) -> AfeStatus {
        self.board.wake_measurement_bus().await;
        self.afe
            .wait_ready(Control::ROUTE_T2_BUFFERED, self.config.afe_ready_polls)
            .await
    }

    async fn measure_rail(&mut self) {
        self.wake_front_end().await;

        // All thermistors are switched off, so the ADC sees the rail directly.
        let sample = voltage::sample(&mut self.board, REFERENCE_VOLTAGE, RAIL_SAMPLE_COUNT).await;
        if let Some(sample) = sample {
            self.data.rail_voltage = sample.voltage;
        }
        if let Some(rail_voltage) = self.config.rail_voltage_override {
            self.data.rail_voltage = rail_voltage;
        }

        #[cfg(feature = "defmt")]
        defmt::info!("Rail {} x 100uV", self.data.rail_voltage);
    }

    async fn sample_all(&mut self) {
        self.wake_front_end().await;

        // Thermistors first, giving the sampling capacitors time to top up.
        self.data.clear_thermistors();
        for index in 0..THERMISTOR_COUNT {
            let result = sample_thermistor(
                &mut self.board,
                &mut self.expander,
                &mut self.delay,
                self.data.rail_voltage,
                index,
            )
            .await;
            match result {
                Ok(temperature) => self.data.set_temperature(index, temperature),
                Err(_fault) => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("Thermistor {}: {}", index, _fault);
                }
            }
        }

        self.delay.delay_us(CELL_SETTLE_US).await;

        // Most potential to least potential w.r.t. ground.
        self.data.clear_cells();
        for index in (0..CELL_COUNT).rev() {
            match sample_cell(&mut self.afe, &mut self.board, index).await {
                Ok(reading) => self.data.set_cell(index, reading.voltage, reading.degraded),
                Err(_fault) => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("Cell {}: {}", index, _fault);
                }
            }
        }

        let _ = self.afe.command(0, Control::DIAGNOSTIC).await;

        #[cfg(feature = "defmt")]
        defmt::info!(
            "Sampled: thermistors {=u32:#x}, cells {=u16:#x}, degraded {=u16:#x}",
            self.data.thermistor_bitset,
            self.data.cell_tap_bitset,
            self.data.degraded_bitset
        );
    }
}

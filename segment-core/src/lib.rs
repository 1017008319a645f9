//! Measurement and protocol engine of a BMS segment controller.
//!
//! Board specifics live behind [`Board`] and [`SlaveBus`]; the AFE and the
//! thermistor I/O expander are driven through `embedded-hal-async` devices.
#![deny(unsafe_code)]
#![no_std]

pub mod board;
pub mod bus;
pub mod cell;
pub mod config;
pub mod controller;
pub mod thermistor;
pub mod voltage;

pub use board::Board;
pub use bus::{BusError, BusHandler, BusStats, SlaveBus, SlaveEvent};
pub use config::Config;
pub use controller::{Controller, State};
pub use voltage::AdcSample;

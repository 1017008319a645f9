//! Messages exchanged between a segment controller and the BMS master.
#![no_std]

use num_enum::{IntoPrimitive, TryFromPrimitive};
use static_assertions::const_assert_eq;
use zerocopy::{
    byteorder::big_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
};

pub mod prelude {
    pub use zerocopy::{FromBytes, IntoBytes};
}

/// Number of series cell taps measured by one segment.
pub const CELL_COUNT: usize = 12;

/// Number of thermistor channels, including the onboard ones.
pub const THERMISTOR_COUNT: usize = 23;

/// Zero bytes after the temperatures, padding the frame to a multiple of four.
pub const FRAME_PADDING: usize = 3;

/// Size of the snapshot served to the master.
pub const SEGMENT_FRAME_SIZE: usize =
    4 + 2 + 2 + 2 + CELL_COUNT * 2 + THERMISTOR_COUNT + FRAME_PADDING;

/// Single-byte command written by the master.
#[repr(u8)]
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Switch the AFE and the voltage reference off.
    Disable = 0x10,
    /// Switch the AFE and the voltage reference on.
    Enable = 0x20,
    /// Measure the 3V3 rail used as the thermistor divider supply.
    MeasureRail = 0x30,
    /// Sample every thermistor and cell tap.
    Sample = 0x40,
}

impl Command {
    /// Decode a received byte, `None` for anything that isn't a command.
    pub fn decode(byte: u8) -> Option<Self> {
        Self::try_from(byte).ok()
    }
}

/// Measurement snapshot of one segment.
///
/// Readings are only meaningful where the matching bitset bit is set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SegmentData {
    /// Bit `i` set if thermistor `i` is connected and reading in range.
    pub thermistor_bitset: u32,
    /// Bit `i` set if cell tap `i` is connected.
    pub cell_tap_bitset: u16,
    /// Bit `i` set if the reading of cell `i` is noisy.
    pub degraded_bitset: u16,
    /// 3V3 rail voltage in 100 uV resolution.
    pub rail_voltage: u16,
    /// Cell voltages in 100 uV resolution.
    pub voltages: [u16; CELL_COUNT],
    /// Thermistor temperatures to the nearest degree.
    pub temperatures: [i8; THERMISTOR_COUNT],
}

impl SegmentData {
    /// Forget all thermistor readings.
    pub fn clear_thermistors(&mut self) {
        self.thermistor_bitset = 0;
        self.temperatures = [0; THERMISTOR_COUNT];
    }

    /// Forget all cell readings.
    pub fn clear_cells(&mut self) {
        self.cell_tap_bitset = 0;
        self.degraded_bitset = 0;
        self.voltages = [0; CELL_COUNT];
    }

    /// Store a valid temperature.
    pub fn set_temperature(&mut self, index: usize, temperature: i8) {
        self.thermistor_bitset |= 1 << index;
        self.temperatures[index] = temperature;
    }

    /// Store a valid cell voltage.
    pub fn set_cell(&mut self, index: usize, voltage: u16, degraded: bool) {
        self.cell_tap_bitset |= 1 << index;
        self.voltages[index] = voltage;
        if degraded {
            self.degraded_bitset |= 1 << index;
        }
    }

    /// Big-endian wire image of the snapshot.
    pub fn encode(&self) -> SegmentFrame {
        SegmentFrame {
            thermistor_bitset: U32::new(self.thermistor_bitset),
            cell_tap_bitset: U16::new(self.cell_tap_bitset),
            degraded_bitset: U16::new(self.degraded_bitset),
            rail_voltage: U16::new(self.rail_voltage),
            voltages: self.voltages.map(U16::new),
            temperatures: self.temperatures,
            _reserved: [0; FRAME_PADDING],
        }
    }
}

/// Snapshot as it goes over the wire. No framing, the master knows the size.
///
/// The layout matches the master's in-memory struct, tail padding included.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SegmentFrame {
    pub thermistor_bitset: U32,
    pub cell_tap_bitset: U16,
    pub degraded_bitset: U16,
    pub rail_voltage: U16,
    pub voltages: [U16; CELL_COUNT],
    pub temperatures: [i8; THERMISTOR_COUNT],
    pub _reserved: [u8; FRAME_PADDING],
}

const_assert_eq!(core::mem::size_of::<SegmentFrame>(), SEGMENT_FRAME_SIZE);

impl SegmentFrame {
    /// View received bytes as a frame. Fails unless exactly one frame long.
    pub fn from_bytes(bytes: &[u8]) -> Option<&Self> {
        Self::ref_from_bytes(bytes).ok()
    }

    /// Native representation of the snapshot.
    pub fn decode(&self) -> SegmentData {
        SegmentData {
            thermistor_bitset: self.thermistor_bitset.get(),
            cell_tap_bitset: self.cell_tap_bitset.get(),
            degraded_bitset: self.degraded_bitset.get(),
            rail_voltage: self.rail_voltage.get(),
            voltages: self.voltages.map(|v| v.get()),
            temperatures: self.temperatures,
        }
    }
}

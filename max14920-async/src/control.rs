//! MAX14920 control byte.

use core::ops::BitOr;

/// Control byte sent as the last byte of every SPI frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Control(u8);

/// EC bit followed by the bit-reversed cell index in CS0..CS3.
const CELL_SELECT: [u8; 12] = [
    0b1000_0000,
    0b1100_0000,
    0b1010_0000,
    0b1110_0000,
    0b1001_0000,
    0b1101_0000,
    0b1011_0000,
    0b1111_0000,
    0b1000_1000,
    0b1100_1000,
    0b1010_1000,
    0b1110_1000,
];

impl Control {
    /// Sample mode, nothing routed to AOUT.
    pub const NONE: Self = Self(0);

    /// Hold the sampled level on the output buffer.
    pub const HOLD: Self = Self(0b100);

    /// Route T2 through the buffer to AOUT. Used while measuring thermistors.
    pub const ROUTE_T2_BUFFERED: Self = Self(0b0011_1000);

    /// Diagnostic mode with the output amplifier in low-power state.
    pub const DIAGNOSTIC: Self = Self(0b0101_1010);

    /// Select a cell for output on AOUT.
    pub fn cell(index: usize) -> Option<Self> {
        CELL_SELECT.get(index).copied().map(Self)
    }

    /// The cell currently selected by this control byte, if any.
    pub fn selected_cell(self) -> Option<usize> {
        let select = self.0 & 0b1111_1000;
        CELL_SELECT.iter().position(|&code| code == select)
    }

    /// Raw byte value.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Control {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<u8> for Control {
    fn from(bits: u8) -> Self {
        Self(bits)
    }
}

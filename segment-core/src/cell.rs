//! Cell tap voltage measurement through the AFE.

use embedded_hal_async::spi::SpiDevice;
use max14920_async::{AfeStatus, Control, Max14920};

use crate::{
    board::Board,
    config::{CELL_DEGRADED_THRESHOLD, CELL_OPEN_THRESHOLD, CELL_SAMPLE_COUNT, REFERENCE_VOLTAGE},
    voltage::{self, AdcSample},
};

/// A connected cell tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CellReading {
    /// Voltage in 100 uV resolution.
    pub voltage: u16,
    /// The reading was noisier than usual.
    pub degraded: bool,
}

/// Why a cell has no reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CellFault {
    InvalidIndex,
    /// The AFE refused the cell selection.
    Afe(AfeStatus),
    Adc,
    /// Reading sits at one of the ADC endpoints.
    OpenTap,
}

/// Select a cell on AOUT in hold mode and measure it.
///
/// The level shift and AOUT settling finish before the first ADC acquisition.
pub async fn sample_cell<SPI, B>(
    afe: &mut Max14920<SPI>,
    board: &mut B,
    index: usize,
) -> Result<CellReading, CellFault>
where
    SPI: SpiDevice,
    B: Board,
{
    let select = Control::cell(index).ok_or(CellFault::InvalidIndex)?;
    match afe.command(0, select | Control::HOLD).await {
        AfeStatus::Ready => {}
        status => return Err(CellFault::Afe(status)),
    }

    let AdcSample { voltage, range } =
        voltage::sample(board, REFERENCE_VOLTAGE, CELL_SAMPLE_COUNT)
            .await
            .ok_or(CellFault::Adc)?;
    if voltage < CELL_OPEN_THRESHOLD || voltage > REFERENCE_VOLTAGE - CELL_OPEN_THRESHOLD {
        return Err(CellFault::OpenTap);
    }

    Ok(CellReading {
        voltage,
        degraded: range > CELL_DEGRADED_THRESHOLD,
    })
}

//! Averaged voltage readings through the shared ADC channel.

use crate::board::Board;

/// One averaged conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcSample {
    /// Mean voltage in 100 uV resolution.
    pub voltage: u16,
    /// Difference between the largest and smallest raw sample in ADC counts.
    pub range: u16,
}

/// Take `count` samples and average them.
pub async fn sample<B: Board>(board: &mut B, reference: u16, count: usize) -> Option<AdcSample> {
    let sample = board.sample_voltage(reference, count).await;
    #[cfg(feature = "defmt")]
    if sample.is_none() {
        defmt::debug!("ADC sampling failed ({} samples)", count);
    }
    sample
}

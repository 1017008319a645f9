//! Measurement constants and per-board configuration.

/// Samples averaged for the rail, cell and thermistor measurements respectively.
pub const RAIL_SAMPLE_COUNT: usize = 1024;
pub const CELL_SAMPLE_COUNT: usize = 64;
pub const THERMISTOR_SAMPLE_COUNT: usize = 8;

/// On-board precision voltage reference in 100 uV resolution.
pub const REFERENCE_VOLTAGE: u16 = 45000;

/// Cell readings noisier than this many ADC counts are flagged as degraded.
pub const CELL_DEGRADED_THRESHOLD: u16 = 10;

/// Distance from either ADC endpoint, in 100 uV, below which a cell tap is open.
pub const CELL_OPEN_THRESHOLD: u16 = 1000;

/// Thermistor noise limit in ADC counts, around 100 mV.
pub const THERMISTOR_NOISE_THRESHOLD: u16 = 1500;

/// Distance from 0 and the rail, in 100 uV, below which a thermistor is open or shorted.
pub const THERMISTOR_RANGE_THRESHOLD: u16 = 3000;

/// Nominal 3V3 rail on hardware revision D, where the rail can't be measured.
pub const RAIL_VOLTAGE_NOMINAL: u16 = 33330;

/// Base of the slave address; the low nibble comes from the solder jumpers.
const BUS_ADDRESS_BASE: u8 = 0x40;

/// Slave address for the jumper pattern read from the pulled-up address pins.
///
/// A closed jumper pulls its pin low and sets the corresponding address bit.
pub fn bus_address(jumper_pins: u8) -> u8 {
    BUS_ADDRESS_BASE | (!jumper_pins & 0xf)
}

/// Settings fixed at boot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// 7-bit slave address.
    pub address: u8,
    /// How long to wait for an address match after waking up.
    pub accept_timeout_ms: u32,
    /// Replaces every rail measurement when set.
    pub rail_voltage_override: Option<u16>,
    /// Status polls before giving up on AFE startup.
    pub afe_ready_polls: u32,
}

impl Config {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            accept_timeout_ms: 10,
            rail_voltage_override: Some(RAIL_VOLTAGE_NOMINAL),
            afe_ready_polls: 10_000,
        }
    }
}

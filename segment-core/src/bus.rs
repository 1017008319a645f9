//! Slave side of the two-wire link to the master.

use segment_messages::{prelude::*, Command, SegmentData};

/// What the master asked for after matching our address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveEvent {
    /// Master writes, a command byte follows.
    Receive,
    /// Master reads the snapshot.
    Transmit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    Timeout,
    /// Master stopped acknowledging.
    Nack,
    /// Bus error or arbitration loss.
    Bus,
}

/// Two-wire slave peripheral.
#[allow(async_fn_in_trait)]
pub trait SlaveBus {
    /// Wait for an address match. A zero timeout only checks for a pending one.
    async fn accept(&mut self, timeout_ms: u32) -> Result<SlaveEvent, BusError>;

    /// Receive exactly `buf.len()` bytes.
    async fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), BusError>;

    /// Send all of `buf`.
    async fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<(), BusError>;
}

/// Per-byte timeout once a transfer has started.
const TRANSFER_TIMEOUT_MS: u32 = 1;

/// Bus events seen since boot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusStats {
    /// Waits that ended without an address match.
    pub timeouts: u32,
    pub errors: u32,
    pub invalid_commands: u32,
    pub snapshots_served: u32,
}

/// Command and snapshot exchange over a [`SlaveBus`].
pub struct BusHandler<S> {
    bus: S,
    stats: BusStats,
}

impl<S: SlaveBus> BusHandler<S> {
    pub fn new(bus: S) -> Self {
        Self {
            bus,
            stats: BusStats::default(),
        }
    }

    pub fn stats(&self) -> &BusStats {
        &self.stats
    }

    /// Handle one address match, waiting at most `timeout_ms` for it.
    ///
    /// Returns the command written by the master, if any. Serving a read never
    /// yields a command.
    pub async fn service(&mut self, data: &SegmentData, timeout_ms: u32) -> Option<Command> {
        let event = match self.bus.accept(timeout_ms).await {
            Ok(event) => event,
            Err(BusError::Timeout) => {
                if timeout_ms != 0 {
                    self.stats.timeouts = self.stats.timeouts.saturating_add(1);
                }
                return None;
            }
            Err(e) => {
                self.record_error(e);
                return None;
            }
        };

        match event {
            SlaveEvent::Receive => {
                let mut byte = [0u8];
                if let Err(e) = self.bus.read(&mut byte, TRANSFER_TIMEOUT_MS).await {
                    self.record_error(e);
                    return None;
                }
                let command = Command::decode(byte[0]);
                if command.is_none() {
                    self.stats.invalid_commands = self.stats.invalid_commands.saturating_add(1);
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Invalid command {=u8:#x}", byte[0]);
                }
                command
            }
            SlaveEvent::Transmit => {
                let frame = data.encode();
                match self.bus.write(frame.as_bytes(), TRANSFER_TIMEOUT_MS).await {
                    Ok(()) => {
                        self.stats.snapshots_served = self.stats.snapshots_served.saturating_add(1)
                    }
                    Err(e) => self.record_error(e),
                }
                None
            }
        }
    }

    fn record_error(&mut self, _error: BusError) {
        self.stats.errors = self.stats.errors.saturating_add(1);
        #[cfg(feature = "defmt")]
        defmt::warn!("Bus error: {}", _error);
    }
}

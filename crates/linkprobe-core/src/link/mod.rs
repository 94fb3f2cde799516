//! Serial link access
//!
//! Opens, owns and releases the endpoints under test, and defines the packet
//! format exchanged between them.
//!
//! Every probe iteration opens its own [`EndpointSet`] and drops it before the
//! next one is opened, so no two sets ever hold the same device at once.

mod channel;
mod endpoint;
mod error;
pub mod packet;
pub mod serial;

use std::time::Duration;

pub use channel::{Channel, SerialChannel, Transport};
pub use endpoint::{Endpoint, EndpointSet};
pub use error::{ProbeError, RoundFailure};
pub use packet::{checksum, Packet, PayloadGenerator, Received};
pub use serial::{list_ports, PortInfo, SerialTransport};

/// Default baud rate for a single round
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default per-read timeout in milliseconds
///
/// Bounds how long a stalled receiver can hold up a round.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

/// Configuration applied to every endpoint of a set
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout
    pub read_timeout: Duration,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Flow control
    pub flow_control: FlowControl,
    /// Assert DTR and RTS after opening
    pub assert_control_lines: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            assert_control_lines: true,
        }
    }
}

impl LinkConfig {
    /// Same configuration at a different baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Same configuration with a different per-read timeout
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

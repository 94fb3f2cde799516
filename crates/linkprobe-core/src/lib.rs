//! # linkprobe core library
//!
//! Characterises serial (UART) links between a set of attached endpoints.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Endpoint sets opened at one configuration and released as a unit
//! - Transmission rounds: a random CRC-32 protected packet broadcast from
//!   every endpoint to every other, with per-receipt latency
//! - Boundary search for the highest reliable baud rate and packet length
//! - Delay statistics at fixed settings
//! - A simulated bus for running all of the above without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use linkprobe_core::prelude::*;
//!
//! let ports = vec!["/dev/ttyUSB0".to_string(), "/dev/ttyUSB1".to_string()];
//! let mut prober = Prober::new(SerialTransport, ports);
//!
//! let report = prober.characterize(&SearchPlan::default())?;
//! println!("max speed: {} baud", report.max_baud());
//! println!("max length: {} characters", report.max_length());
//! ```

pub mod link;
pub mod probe;
pub mod round;
pub mod search;
pub mod sim;
pub mod stats;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::link::{
        list_ports, EndpointSet, LinkConfig, PayloadGenerator, ProbeError, RoundFailure,
        SerialTransport, Transport,
    };
    pub use crate::probe::{LinkReport, Prober, SearchPlan};
    pub use crate::round::{run_round, Receipt, RoundOutcome};
    pub use crate::search::{search, SearchReport, Termination};
    pub use crate::sim::SimTransport;
    pub use crate::stats::DelayStats;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

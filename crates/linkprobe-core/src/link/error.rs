//! Probe errors

use thiserror::Error;

/// Why a transmission round stopped early
///
/// These are expected outcomes on an unreliable link. They are carried in a
/// round's outcome and used by the search to narrow its window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoundFailure {
    /// A receiver's line does not match what was sent
    #[error(
        "integrity code mismatch {sender} -> {receiver}: expected '{expected}', \
         got '{received}' over a payload hashing to '{payload_code}'"
    )]
    Verification {
        /// Endpoint that sent the packet
        sender: String,
        /// Endpoint whose copy failed
        receiver: String,
        /// Integrity code of the payload as sent
        expected: String,
        /// Integrity code found on the received line
        received: String,
        /// Integrity code of the payload region as received
        payload_code: String,
    },

    /// A receiver produced nothing within the read timeout
    #[error("no line from {receiver} within the read timeout (sent by {sender})")]
    Timeout {
        /// Endpoint that sent the packet
        sender: String,
        /// Endpoint that stayed silent
        receiver: String,
    },
}

impl RoundFailure {
    /// Short tag for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            RoundFailure::Verification { .. } => "verification",
            RoundFailure::Timeout { .. } => "timeout",
        }
    }
}

/// Errors that can occur while probing a link
#[derive(Error, Debug)]
pub enum ProbeError {
    /// An endpoint could not be opened or configured
    #[error("Cannot open {endpoint}: {reason}")]
    Connection {
        /// Identifier that failed
        endpoint: String,
        /// What the transport reported
        reason: String,
    },

    /// The endpoint list is empty
    #[error("No endpoints given")]
    NoEndpoints,

    /// Payload lengths must be at least 1
    #[error("Invalid payload length: {0}")]
    InvalidLength(usize),

    /// Delay sampling gathered nothing to reduce
    #[error("No delay samples collected")]
    EmptySample,

    /// A round failure raised as an error
    #[error(transparent)]
    Round(#[from] RoundFailure),

    /// Transport I/O failed outside a read timeout
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProbeError {
    pub(crate) fn connection(endpoint: &str, reason: impl ToString) -> Self {
        ProbeError::Connection {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

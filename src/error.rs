//! Error types shared by the codecs and the RLC engine.

use thiserror::Error;

/// Wire codec errors (GTP-U, PDCP, AMD and STATUS PDUs).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Buffer shorter than the header being decoded.
    #[error("buffer too short: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    /// A header field holds a value the codec cannot accept.
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: u32 },
}

/// Errors surfaced by the RLC AM entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RlcError {
    /// Accepting the SDU would exceed `max_tx_buffer_size`; the SDU is discarded.
    #[error("transmission buffer full: {buffered} + {sdu} bytes exceeds {max}")]
    TxBufferFull {
        buffered: usize,
        sdu: usize,
        max: usize,
    },
    /// The queueing discipline in front of the transmission buffer refused the SDU.
    #[error("queue discipline rejected a {0}-byte SDU")]
    QueueRejected(usize),
    #[error("empty SDU")]
    EmptySdu,
    #[error("malformed PDU: {0}")]
    Malformed(#[from] CodecError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Entry point invoked after `dispose`.
    #[error("entity disposed")]
    Disposed,
}

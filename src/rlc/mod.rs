//! RLC Acknowledged Mode (TS 36.322).
//!
//! [`RlcAm`] is the entity; the rest are its parts, usable on their own for
//! codec work and tests.

mod am;
mod bits;
mod config;
mod forwarding;
pub mod header;
mod retx;
mod rx;
pub mod sap;
pub mod sn;
mod stats;
pub mod status;
pub mod timer;
pub mod tx_buffer;

pub use am::RlcAm;
pub use config::RlcAmConfig;
pub use header::{AmdHeader, AmdPdu, FramingInfo, SegmentInfo};
pub use retx::PduState;
pub use sap::{BufferStatus, MacSapProvider, MacSapUser, RlcSapProvider, RlcSapUser};
pub use sn::SequenceNumber;
pub use stats::RlcStats;
pub use status::{Nack, StatusPdu};
pub use timer::{TimerKind, TimerRequest, TimerTable};

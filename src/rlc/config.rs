use serde::{Deserialize, Serialize};

use super::header::MAX_PDU_PAYLOAD;
use super::sn::SN_MODULUS;
use crate::error::RlcError;
use crate::sim::SimTime;

/// RLC AM entity configuration. Timer durations are given in milliseconds in
/// serialized form; a zero duration disables the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlcAmConfig {
    /// Bytes the transmission buffer may hold before SDUs are discarded.
    pub max_tx_buffer_size: usize,
    pub window_size: u16,
    pub poll_pdu: u32,
    pub poll_byte: u64,
    pub max_retx_threshold: u32,
    #[serde(with = "millis")]
    pub poll_retransmit_timer: SimTime,
    #[serde(with = "millis")]
    pub reordering_timer: SimTime,
    #[serde(with = "millis")]
    pub status_prohibit_timer: SimTime,
    #[serde(with = "millis")]
    pub rbs_timer: SimTime,
    pub enable_aqm: bool,
}

impl Default for RlcAmConfig {
    fn default() -> Self {
        Self {
            max_tx_buffer_size: 10 * 1024,
            window_size: 512,
            poll_pdu: 4,
            poll_byte: 25_000,
            max_retx_threshold: 4,
            poll_retransmit_timer: SimTime::from_millis(20),
            reordering_timer: SimTime::from_millis(10),
            status_prohibit_timer: SimTime::from_millis(10),
            rbs_timer: SimTime::from_millis(10),
            enable_aqm: false,
        }
    }
}

impl RlcAmConfig {
    pub fn validate(&self) -> Result<(), RlcError> {
        if self.window_size == 0 || self.window_size > SN_MODULUS / 2 {
            return Err(RlcError::InvalidConfig(format!(
                "window_size must be in 1..={}, got {}",
                SN_MODULUS / 2,
                self.window_size
            )));
        }
        if self.max_tx_buffer_size == 0 {
            return Err(RlcError::InvalidConfig("max_tx_buffer_size must be > 0".into()));
        }
        if self.poll_pdu == 0 || self.poll_byte == 0 {
            return Err(RlcError::InvalidConfig(
                "poll_pdu and poll_byte must be > 0".into(),
            ));
        }
        if self.poll_retransmit_timer.is_zero() {
            return Err(RlcError::InvalidConfig(
                "poll_retransmit_timer must be > 0".into(),
            ));
        }
        if self.max_tx_buffer_size > MAX_PDU_PAYLOAD * SN_MODULUS as usize {
            return Err(RlcError::InvalidConfig(format!(
                "max_tx_buffer_size {} is larger than a full window of maximum PDUs",
                self.max_tx_buffer_size
            )));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::sim::SimTime;

    pub fn serialize<S: Serializer>(t: &SimTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(t.0 / 1_000_000)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SimTime, D::Error> {
        u64::deserialize(d).map(SimTime::from_millis)
    }
}

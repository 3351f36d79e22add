//! Service access points.
//!
//! The entity talks to its neighbours through two user-implemented traits:
//! [`RlcSapUser`] towards PDCP and [`MacSapProvider`] towards MAC. The calls in
//! the other direction are the entity's own methods, grouped in
//! [`RlcSapProvider`] and [`MacSapUser`] so drivers can stay generic.

use bytes::Bytes;
use serde::Serialize;

use super::sn::SequenceNumber;
use crate::error::RlcError;
use crate::sim::SimTime;

/// What the entity has to send, reported to MAC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStatus {
    pub tx_queue_bytes: usize,
    pub tx_queue_hol_delay: SimTime,
    pub retx_queue_bytes: usize,
    pub retx_queue_hol_delay: SimTime,
    pub status_pdu_bytes: usize,
}

impl BufferStatus {
    pub fn is_empty(&self) -> bool {
        self.tx_queue_bytes == 0 && self.retx_queue_bytes == 0 && self.status_pdu_bytes == 0
    }
}

/// Upper layer (PDCP) side.
pub trait RlcSapUser {
    /// An SDU reassembled in order.
    fn receive_pdcp_pdu(&mut self, sdu: Bytes);

    /// `sn` was retransmitted `max_retx_threshold` times without being acked.
    fn notify_max_retx_reached(&mut self, _sn: SequenceNumber) {}
}

/// Lower layer (MAC) side.
pub trait MacSapProvider {
    fn report_buffer_status(&mut self, _status: BufferStatus) {}
}

/// Calls PDCP makes into the entity.
pub trait RlcSapProvider {
    fn transmit_pdcp_pdu(&mut self, sdu: Bytes, now: SimTime) -> Result<(), RlcError>;
}

/// Calls MAC makes into the entity.
pub trait MacSapUser {
    fn notify_tx_opportunity(&mut self, bytes: usize, harq_id: u8, now: SimTime) -> Option<Bytes>;

    fn receive_pdu(&mut self, pdu: Bytes, now: SimTime) -> Result<(), RlcError>;

    fn notify_harq_delivery_failure(&mut self, harq_id: u8, now: SimTime);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSapUser;

impl RlcSapUser for NullSapUser {
    fn receive_pdcp_pdu(&mut self, _sdu: Bytes) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullMacSap;

impl MacSapProvider for NullMacSap {}

//! Transmission buffer: SDUs waiting to be segmented into new AMD PDUs.
//!
//! SDUs sit in a delegated [`SduQueue`] until the segmentation engine pulls
//! the first byte of one; from then on the remainder lives in `head` until it
//! is fully consumed. Occupancy is checked against `max_bytes` on submission.

use bytes::Bytes;
use tracing::debug;

use crate::error::RlcError;
use crate::queue::{QueuedSdu, SduQueue, new_sdu_queue};
use crate::sim::SimTime;

/// A slice of one SDU handed to the segmentation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SduPiece {
    pub sdu_id: u64,
    pub data: Bytes,
    pub starts_sdu: bool,
    pub ends_sdu: bool,
    /// The whole SDU, kept for the lossless forwarding buffer.
    pub sdu: Bytes,
}

#[derive(Debug)]
struct HeadSdu {
    id: u64,
    full: Bytes,
    remaining: Bytes,
    enqueued_at: SimTime,
}

impl HeadSdu {
    fn started(&self) -> bool {
        self.remaining.len() < self.full.len()
    }
}

#[derive(Debug)]
pub struct TxBuffer {
    queue: Box<dyn SduQueue>,
    head: Option<HeadSdu>,
    max_bytes: usize,
    next_sdu_id: u64,
    drops_seen: u64,
}

impl TxBuffer {
    pub fn new(max_bytes: usize, enable_aqm: bool) -> Self {
        Self::with_queue(max_bytes, new_sdu_queue(enable_aqm))
    }

    pub fn with_queue(max_bytes: usize, queue: Box<dyn SduQueue>) -> Self {
        Self {
            queue,
            head: None,
            max_bytes,
            next_sdu_id: 0,
            drops_seen: 0,
        }
    }

    /// Accept an SDU, returning its id.
    pub fn submit(&mut self, sdu: Bytes, now: SimTime) -> Result<u64, RlcError> {
        if sdu.is_empty() {
            return Err(RlcError::EmptySdu);
        }
        let buffered = self.occupancy();
        if buffered.saturating_add(sdu.len()) > self.max_bytes {
            return Err(RlcError::TxBufferFull {
                buffered,
                sdu: sdu.len(),
                max: self.max_bytes,
            });
        }
        let id = self.next_sdu_id;
        let len = sdu.len();
        self.queue
            .enqueue(
                QueuedSdu {
                    id,
                    data: sdu,
                    enqueued_at: now,
                },
                now,
            )
            .map_err(|rejected| RlcError::QueueRejected(rejected.data.len()))?;
        self.next_sdu_id = self.next_sdu_id.wrapping_add(1);
        debug!(sdu_id = id, len, occupancy = self.occupancy(), "SDU buffered");
        Ok(id)
    }

    /// Bytes waiting for first transmission.
    pub fn occupancy(&self) -> usize {
        self.queue.bytes() as usize + self.head.as_ref().map_or(0, |h| h.remaining.len())
    }

    pub fn sdu_count(&self) -> usize {
        self.queue.len() + usize::from(self.head.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none() && self.queue.is_empty()
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn load_head(&mut self, now: SimTime) {
        if self.head.is_some() {
            return;
        }
        if let Some(q) = self.queue.dequeue(now) {
            self.head = Some(HeadSdu {
                id: q.id,
                remaining: q.data.clone(),
                full: q.data,
                enqueued_at: q.enqueued_at,
            });
        }
    }

    /// How many of the next `n` bytes `consume` would return, without consuming.
    pub fn peek_next_bytes(&mut self, n: usize, now: SimTime) -> usize {
        self.load_head(now);
        self.head.as_ref().map_or(0, |h| h.remaining.len().min(n))
    }

    /// Take up to `n` bytes from the head SDU. Never crosses an SDU boundary.
    pub fn consume(&mut self, n: usize, now: SimTime) -> Option<SduPiece> {
        if n == 0 {
            return None;
        }
        self.load_head(now);
        let head = self.head.as_mut()?;
        let starts_sdu = !head.started();
        let take = n.min(head.remaining.len());
        let data = head.remaining.split_to(take);
        let ends_sdu = head.remaining.is_empty();
        let piece = SduPiece {
            sdu_id: head.id,
            data,
            starts_sdu,
            ends_sdu,
            sdu: head.full.clone(),
        };
        if ends_sdu {
            self.head = None;
        }
        Some(piece)
    }

    /// Age of the oldest byte still waiting for first transmission.
    pub fn head_of_line_delay(&self, now: SimTime) -> SimTime {
        let oldest = match &self.head {
            Some(h) => Some(h.enqueued_at),
            None => self.queue.peek().map(|q| q.enqueued_at),
        };
        oldest.map_or(SimTime::ZERO, |t| now.saturating_sub(t))
    }

    /// SDU drops by the queue discipline since the previous call.
    pub fn take_queue_drops(&mut self) -> u64 {
        let total = self.queue.dropped();
        let delta = total.saturating_sub(self.drops_seen);
        self.drops_seen = total;
        delta
    }

    /// SDUs none of whose bytes have been sent yet, in submission order.
    pub fn untouched_sdus(&self) -> Vec<(u64, Bytes)> {
        let head = self
            .head
            .as_ref()
            .filter(|h| !h.started())
            .map(|h| (h.id, h.full.clone()));
        head.into_iter()
            .chain(self.queue.iter().map(|q| (q.id, q.data.clone())))
            .collect()
    }

    pub fn clear(&mut self) {
        self.head = None;
        self.queue.clear();
    }
}

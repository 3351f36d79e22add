//! In-flight SDU copies kept for lossless forwarding.
//!
//! An SDU enters when its first byte is segmented and leaves once every AMD
//! PDU carrying part of it is acknowledged (or abandoned) and no bytes of it
//! remain in the transmission buffer.

use std::collections::BTreeMap;

use bytes::Bytes;

#[derive(Debug)]
struct InFlightSdu {
    data: Bytes,
    outstanding_pdus: u32,
    fully_segmented: bool,
}

#[derive(Debug, Default)]
pub(crate) struct InFlightSdus {
    sdus: BTreeMap<u64, InFlightSdu>,
}

impl InFlightSdus {
    /// One more PDU now carries bytes of `id`.
    pub(crate) fn add_pdu(&mut self, id: u64, data: &Bytes, ends_sdu: bool) {
        let entry = self.sdus.entry(id).or_insert_with(|| InFlightSdu {
            data: data.clone(),
            outstanding_pdus: 0,
            fully_segmented: false,
        });
        entry.outstanding_pdus += 1;
        entry.fully_segmented |= ends_sdu;
    }

    /// A PDU carrying bytes of `id` is done with.
    pub(crate) fn release_pdu(&mut self, id: u64) {
        let Some(entry) = self.sdus.get_mut(&id) else {
            return;
        };
        entry.outstanding_pdus = entry.outstanding_pdus.saturating_sub(1);
        if entry.outstanding_pdus == 0 && entry.fully_segmented {
            self.sdus.remove(&id);
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, &Bytes)> {
        self.sdus.iter().map(|(&id, s)| (id, &s.data))
    }

    pub(crate) fn clear(&mut self) {
        self.sdus.clear();
    }
}

//! STATUS PDU codec, TS 36.322 §6.2.1.6.
//!
//! ```text
//! D/C(1)=0 CPT(3)=000 ACK_SN(10) E1(1)
//! { NACK_SN(10) E1(1) E2(1) [SOstart(15) SOend(15)] }*
//! ```

use bytes::Bytes;

use super::bits::{BitReader, BitWriter};
use super::sn::SequenceNumber;
use crate::error::CodecError;

/// `SOend` value meaning "up to the last byte of the PDU".
pub const SO_END_OF_PDU: u16 = 0x7FFF;

const FIXED_BITS: usize = 1 + 3 + 10 + 1;
const NACK_BITS: usize = 10 + 1 + 1;
const SO_PAIR_BITS: usize = 15 + 15;

/// One negatively acknowledged PDU or byte range of a PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nack {
    pub sn: SequenceNumber,
    /// Inclusive `(so_start, so_end)`; `None` NACKs the whole PDU.
    pub range: Option<(u16, u16)>,
}

impl Nack {
    pub fn whole(sn: SequenceNumber) -> Self {
        Self { sn, range: None }
    }

    pub fn segment(sn: SequenceNumber, so_start: u16, so_end: u16) -> Self {
        Self {
            sn,
            range: Some((so_start, so_end)),
        }
    }

    fn bits(&self) -> usize {
        NACK_BITS + if self.range.is_some() { SO_PAIR_BITS } else { 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPdu {
    /// First SN neither acknowledged nor reported missing.
    pub ack_sn: SequenceNumber,
    pub nacks: Vec<Nack>,
}

impl StatusPdu {
    pub const MIN_LEN: usize = FIXED_BITS.div_ceil(8);

    pub fn ack_only(ack_sn: SequenceNumber) -> Self {
        Self {
            ack_sn,
            nacks: Vec::new(),
        }
    }

    pub(crate) fn bits_for<'a>(nacks: impl IntoIterator<Item = &'a Nack>) -> usize {
        FIXED_BITS + nacks.into_iter().map(Nack::bits).sum::<usize>()
    }

    pub fn serialized_len(&self) -> usize {
        Self::bits_for(&self.nacks).div_ceil(8)
    }

    pub fn encode(&self) -> Bytes {
        let mut w = BitWriter::with_capacity(self.serialized_len());
        w.put_bool(false); // D/C: control
        w.put(0, 3); // CPT: STATUS
        w.put(self.ack_sn.value() as u32, 10);
        w.put_bool(!self.nacks.is_empty());
        let n = self.nacks.len();
        for (i, nack) in self.nacks.iter().enumerate() {
            w.put(nack.sn.value() as u32, 10);
            w.put_bool(i + 1 < n);
            w.put_bool(nack.range.is_some());
            if let Some((start, end)) = nack.range {
                w.put(start as u32, 15);
                w.put(end as u32, 15);
            }
        }
        w.finish().freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = BitReader::new(data);
        if r.get_bool()? {
            return Err(CodecError::InvalidField {
                field: "D/C",
                value: 1,
            });
        }
        let cpt = r.get(3)?;
        if cpt != 0 {
            return Err(CodecError::InvalidField {
                field: "CPT",
                value: cpt,
            });
        }
        let ack_sn = SequenceNumber::new(r.get(10)? as u16);
        let mut more = r.get_bool()?;
        let mut nacks = Vec::new();
        while more {
            let sn = SequenceNumber::new(r.get(10)? as u16);
            more = r.get_bool()?;
            let has_range = r.get_bool()?;
            let range = if has_range {
                let start = r.get(15)? as u16;
                let end = r.get(15)? as u16;
                if end < start {
                    return Err(CodecError::InvalidField {
                        field: "SOend",
                        value: end as u32,
                    });
                }
                Some((start, end))
            } else {
                None
            };
            nacks.push(Nack { sn, range });
        }
        Ok(Self { ack_sn, nacks })
    }
}

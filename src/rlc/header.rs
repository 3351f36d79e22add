//! AMD PDU (data PDU) header codec, TS 36.322 §6.2.1.4/6.2.1.5.
//!
//! ```text
//! D/C(1) RF(1) P(1) FI(2) E(1) SN(10)
//! [LSF(1) SO(15)]            when RF = 1 (AMD PDU segment)
//! {E(1) LI(11)}*             one per SDU boundary inside the data field
//! ```

use bytes::{Bytes, BytesMut};

use super::bits::{BitReader, BitWriter};
use super::sn::SequenceNumber;
use crate::error::CodecError;

pub const AMD_FIXED_HEADER_LEN: usize = 2;
pub const AMD_SEGMENT_HEADER_LEN: usize = 4;
/// Largest value an 11-bit LI can carry.
pub const MAX_LI: usize = 0x7FF;
/// Largest AMD PDU data field: every byte must be addressable by the 15-bit SO.
pub const MAX_PDU_PAYLOAD: usize = 0x7FFF;

/// Framing info: where the data field starts and ends relative to SDU boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingInfo {
    /// Starts and ends an SDU.
    Full,
    /// Starts an SDU, the SDU continues in a later PDU.
    First,
    /// Neither starts nor ends an SDU.
    Middle,
    /// Ends an SDU that started in an earlier PDU.
    Last,
}

impl FramingInfo {
    pub fn new(starts_sdu: bool, ends_sdu: bool) -> Self {
        match (starts_sdu, ends_sdu) {
            (true, true) => FramingInfo::Full,
            (true, false) => FramingInfo::First,
            (false, true) => FramingInfo::Last,
            (false, false) => FramingInfo::Middle,
        }
    }

    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => FramingInfo::Full,
            0b01 => FramingInfo::First,
            0b10 => FramingInfo::Last,
            _ => FramingInfo::Middle,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            FramingInfo::Full => 0b00,
            FramingInfo::First => 0b01,
            FramingInfo::Last => 0b10,
            FramingInfo::Middle => 0b11,
        }
    }

    pub fn starts_sdu(self) -> bool {
        matches!(self, FramingInfo::Full | FramingInfo::First)
    }

    pub fn ends_sdu(self) -> bool {
        matches!(self, FramingInfo::Full | FramingInfo::Last)
    }
}

/// Segment header of a re-segmented AMD PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Byte offset of this segment inside the original data field.
    pub offset: u16,
    /// LSF: the segment carries the last byte of the original PDU.
    pub last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmdHeader {
    pub sn: SequenceNumber,
    pub poll: bool,
    pub framing: FramingInfo,
    pub segment: Option<SegmentInfo>,
    /// Lengths of every SDU piece in the data field except the last one.
    pub length_indicators: Vec<u16>,
}

impl AmdHeader {
    /// Header size for a PDU with the given shape.
    pub fn len_for(segment: bool, lis: usize) -> usize {
        let fixed = if segment {
            AMD_SEGMENT_HEADER_LEN
        } else {
            AMD_FIXED_HEADER_LEN
        };
        fixed + (12 * lis).div_ceil(8)
    }

    pub fn serialized_len(&self) -> usize {
        Self::len_for(self.segment.is_some(), self.length_indicators.len())
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let mut w = BitWriter::with_capacity(self.serialized_len());
        w.put_bool(true); // D/C: data
        w.put_bool(self.segment.is_some());
        w.put_bool(self.poll);
        w.put(self.framing.bits() as u32, 2);
        w.put_bool(!self.length_indicators.is_empty());
        w.put(self.sn.value() as u32, 10);
        if let Some(seg) = self.segment {
            w.put_bool(seg.last);
            w.put(seg.offset as u32, 15);
        }
        let n = self.length_indicators.len();
        for (i, &li) in self.length_indicators.iter().enumerate() {
            w.put_bool(i + 1 < n);
            w.put(li as u32, 11);
        }
        buf.extend_from_slice(&w.finish());
    }

    /// Parse a header, returning it together with its length in bytes.
    pub fn deserialize(data: &[u8]) -> Result<(Self, usize), CodecError> {
        let mut r = BitReader::new(data);
        let dc = r.get_bool()?;
        if !dc {
            return Err(CodecError::InvalidField {
                field: "D/C",
                value: 0,
            });
        }
        let rf = r.get_bool()?;
        let poll = r.get_bool()?;
        let framing = FramingInfo::from_bits(r.get(2)? as u8);
        let mut more = r.get_bool()?;
        let sn = SequenceNumber::new(r.get(10)? as u16);
        let segment = if rf {
            let last = r.get_bool()?;
            let offset = r.get(15)? as u16;
            Some(SegmentInfo { offset, last })
        } else {
            None
        };
        let mut length_indicators = Vec::new();
        while more {
            more = r.get_bool()?;
            let li = r.get(11)? as u16;
            if li == 0 {
                return Err(CodecError::InvalidField {
                    field: "LI",
                    value: 0,
                });
            }
            length_indicators.push(li);
        }
        let header = AmdHeader {
            sn,
            poll,
            framing,
            segment,
            length_indicators,
        };
        Ok((header, r.byte_offset()))
    }
}

/// A data PDU: header plus data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmdPdu {
    pub header: AmdHeader,
    pub payload: Bytes,
}

impl AmdPdu {
    pub fn serialized_len(&self) -> usize {
        self.header.serialized_len() + self.payload.len()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.header.serialize(&mut buf);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decode and check that the LIs leave a non-empty last piece.
    pub fn decode(data: Bytes) -> Result<Self, CodecError> {
        let (header, hlen) = AmdHeader::deserialize(&data)?;
        let payload = data.slice(hlen..);
        let li_sum: usize = header.length_indicators.iter().map(|&l| l as usize).sum();
        if payload.is_empty() || li_sum >= payload.len() {
            return Err(CodecError::InvalidField {
                field: "LI sum",
                value: li_sum as u32,
            });
        }
        if let Some(seg) = header.segment {
            if seg.offset as usize + payload.len() > MAX_PDU_PAYLOAD {
                return Err(CodecError::InvalidField {
                    field: "SO",
                    value: seg.offset as u32,
                });
            }
        }
        Ok(Self { header, payload })
    }
}

/// D/C bit of the first byte: `true` for data PDUs.
pub fn is_data_pdu(first_byte: u8) -> bool {
    first_byte & 0x80 != 0
}

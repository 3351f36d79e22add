//! GTP-U header codec (TS 29.281), fixed 12-byte form.
//!
//! ```text
//! byte0:   version(3) | PT(1) | reserved(1)=1 | E(1) | S(1) | PN(1)
//! byte1:   message type
//! 2..4:    length
//! 4..8:    TEID
//! 8..10:   sequence number
//! byte10:  N-PDU number
//! byte11:  next extension header type
//! ```
//!
//! The optional word (sequence number, N-PDU number, next extension type)
//! always occupies its slot, whatever the E/S/PN flags say.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// G-PDU (user data)
pub const GTPU_G_PDU: u8 = 255;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GtpuHeader {
    version: u8,
    pub protocol_type: bool,
    pub extension_header_flag: bool,
    pub sequence_number_flag: bool,
    pub n_pdu_number_flag: bool,
    pub message_type: u8,
    /// Octets after the mandatory 8-byte part: payload plus the optional word.
    pub length: u16,
    pub teid: u32,
    pub sequence_number: u16,
    pub n_pdu_number: u8,
    pub next_extension_type: u8,
}

impl Default for GtpuHeader {
    fn default() -> Self {
        Self {
            version: 1,
            protocol_type: true,
            extension_header_flag: false,
            sequence_number_flag: true,
            n_pdu_number_flag: true,
            message_type: GTPU_G_PDU,
            length: 0,
            teid: 0,
            sequence_number: 0,
            n_pdu_number: 0,
            next_extension_type: 0,
        }
    }
}

impl GtpuHeader {
    pub const SIZE: usize = 12;
    /// Part of `length` taken by the optional word.
    const OPTIONAL_WORD: u16 = 4;

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Only the low 3 bits are kept.
    pub fn set_version(&mut self, version: u8) {
        self.version = version & 0x07;
    }

    pub fn serialized_size(&self) -> usize {
        Self::SIZE
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        let flags = (self.version << 5)
            | (u8::from(self.protocol_type) << 4)
            | (1 << 3)
            | (u8::from(self.extension_header_flag) << 2)
            | (u8::from(self.sequence_number_flag) << 1)
            | u8::from(self.n_pdu_number_flag);
        buf.put_u8(flags);
        buf.put_u8(self.message_type);
        buf.put_u16(self.length);
        buf.put_u32(self.teid);
        buf.put_u16(self.sequence_number);
        buf.put_u8(self.n_pdu_number);
        buf.put_u8(self.next_extension_type);
    }

    /// Caller guarantees at least [`GtpuHeader::SIZE`] bytes; see [`GtpuHeader::decode`].
    pub fn deserialize(buf: &mut impl Buf) -> Self {
        debug_assert!(buf.remaining() >= Self::SIZE);
        let flags = buf.get_u8();
        Self {
            version: flags >> 5,
            protocol_type: flags & 0x10 != 0,
            extension_header_flag: flags & 0x04 != 0,
            sequence_number_flag: flags & 0x02 != 0,
            n_pdu_number_flag: flags & 0x01 != 0,
            message_type: buf.get_u8(),
            length: buf.get_u16(),
            teid: buf.get_u32(),
            sequence_number: buf.get_u16(),
            n_pdu_number: buf.get_u8(),
            next_extension_type: buf.get_u8(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.serialize(&mut buf);
        buf.freeze()
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < Self::SIZE {
            return Err(CodecError::Truncated {
                needed: Self::SIZE,
                available: data.len(),
            });
        }
        Ok(Self::deserialize(&mut data))
    }

    /// Prefix `payload` with a G-PDU header for `teid`.
    pub fn encapsulate(teid: u32, payload: &[u8]) -> Result<Bytes, CodecError> {
        let length = u16::try_from(payload.len() + Self::OPTIONAL_WORD as usize).map_err(|_| {
            CodecError::InvalidField {
                field: "length",
                value: payload.len() as u32,
            }
        })?;
        let header = GtpuHeader {
            teid,
            length,
            ..Default::default()
        };
        let mut buf = BytesMut::with_capacity(Self::SIZE + payload.len());
        header.serialize(&mut buf);
        buf.extend_from_slice(payload);
        Ok(buf.freeze())
    }

    /// Split a packet into header and payload, trimming to the header's length.
    pub fn decapsulate(packet: Bytes) -> Result<(Self, Bytes), CodecError> {
        let header = Self::decode(&packet)?;
        let end = Self::SIZE - Self::OPTIONAL_WORD as usize + header.length as usize;
        if end > packet.len() || (header.length as usize) < Self::OPTIONAL_WORD as usize {
            return Err(CodecError::Truncated {
                needed: end.max(Self::SIZE),
                available: packet.len(),
            });
        }
        Ok((header, packet.slice(Self::SIZE..end)))
    }
}

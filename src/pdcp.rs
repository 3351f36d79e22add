//! PDCP data PDU header with a 12-bit SN (TS 36.323 §6.2.3).
//!
//! byte0 = D/C | R R R | SN[11:8], byte1 = SN[7:0].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

pub const PDCP_SN_MASK: u16 = 0x0FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PdcpHeader {
    /// `true` for a data PDU.
    pub data: bool,
    sn: u16,
}

impl Default for PdcpHeader {
    fn default() -> Self {
        Self { data: true, sn: 0 }
    }
}

impl PdcpHeader {
    pub const SIZE: usize = 2;

    pub fn new(data: bool, sn: u16) -> Self {
        Self {
            data,
            sn: sn & PDCP_SN_MASK,
        }
    }

    pub fn sn(&self) -> u16 {
        self.sn
    }

    pub fn set_sn(&mut self, sn: u16) {
        self.sn = sn & PDCP_SN_MASK;
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8((u8::from(self.data) << 7) | ((self.sn >> 8) as u8 & 0x0F));
        buf.put_u8((self.sn & 0xFF) as u8);
    }

    pub fn deserialize(buf: &mut impl Buf) -> Self {
        debug_assert!(buf.remaining() >= Self::SIZE);
        let b0 = buf.get_u8();
        let b1 = buf.get_u8();
        Self {
            data: b0 & 0x80 != 0,
            sn: (u16::from(b0 & 0x0F) << 8) | u16::from(b1),
        }
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

    /// Header followed by `payload`.
    pub fn encode_pdu(&self, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE + payload.len());
        self.serialize(&mut buf);
        buf.extend_from_slice(payload);
        buf.freeze()
    }
}

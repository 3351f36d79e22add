//! MSB-first bit packing for the AMD and STATUS PDU headers.

use bytes::{BufMut, BytesMut};

use crate::error::CodecError;

#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    buf: BytesMut,
    cur: u8,
    used: u32,
}

impl BitWriter {
    pub(crate) fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(bytes),
            cur: 0,
            used: 0,
        }
    }

    /// Append the low `bits` bits of `value`.
    pub(crate) fn put(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            self.cur = (self.cur << 1) | ((value >> i) & 1) as u8;
            self.used += 1;
            if self.used == 8 {
                self.buf.put_u8(self.cur);
                self.cur = 0;
                self.used = 0;
            }
        }
    }

    pub(crate) fn put_bool(&mut self, bit: bool) {
        self.put(bit as u32, 1);
    }

    /// Flush, zero-padding to the next byte boundary.
    pub(crate) fn finish(mut self) -> BytesMut {
        if self.used > 0 {
            self.cur <<= 8 - self.used;
            self.buf.put_u8(self.cur);
        }
        self.buf
    }
}

#[derive(Debug)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, bit: 0 }
    }

    pub(crate) fn get(&mut self, bits: u32) -> Result<u32, CodecError> {
        let end = self.bit + bits as usize;
        if end > self.data.len() * 8 {
            return Err(CodecError::Truncated {
                needed: end.div_ceil(8),
                available: self.data.len(),
            });
        }
        let mut v = 0u32;
        while self.bit < end {
            let byte = self.data[self.bit / 8];
            let b = (byte >> (7 - (self.bit % 8))) & 1;
            v = (v << 1) | b as u32;
            self.bit += 1;
        }
        Ok(v)
    }

    pub(crate) fn get_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.get(1)? == 1)
    }

    /// Bytes consumed so far, counting a partially read byte as consumed.
    pub(crate) fn byte_offset(&self) -> usize {
        self.bit.div_ceil(8)
    }
}

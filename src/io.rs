// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use byteorder::{BigEndian as BE, ByteOrder, LittleEndian as LE, WriteBytesExt};

use std::io;

use crate::error::{Error, Result};

/// Bounds-checked cursor over an event body.
///
/// Every `eat_*` method either consumes exactly the requested amount of bytes
/// or fails with [`Error::ShortBuffer`] leaving the cursor untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseBuf<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ParseBuf<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Number of remaining bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Remaining bytes (not consumed).
    pub fn peek(&self) -> &'a [u8] {
        self.buf
    }

    /// Consumes `n` bytes.
    pub fn eat(&mut self, n: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::ShortBuffer {
                field,
                offset: self.offset,
                needed: n,
                available: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        self.offset += n;
        Ok(head)
    }

    pub fn skip(&mut self, n: usize, field: &'static str) -> Result<()> {
        self.eat(n, field).map(drop)
    }

    /// Consumes the rest of the buffer.
    pub fn eat_all(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.offset += rest.len();
        self.buf = &[];
        rest
    }

    pub fn eat_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.eat(1, field)?[0])
    }

    pub fn eat_u16_le(&mut self, field: &'static str) -> Result<u16> {
        self.eat(2, field).map(LE::read_u16)
    }

    pub fn eat_u24_le(&mut self, field: &'static str) -> Result<u32> {
        self.eat(3, field).map(LE::read_u24)
    }

    pub fn eat_u24_be(&mut self, field: &'static str) -> Result<u32> {
        self.eat(3, field).map(BE::read_u24)
    }

    pub fn eat_u32_le(&mut self, field: &'static str) -> Result<u32> {
        self.eat(4, field).map(LE::read_u32)
    }

    pub fn eat_u32_be(&mut self, field: &'static str) -> Result<u32> {
        self.eat(4, field).map(BE::read_u32)
    }

    /// Reads a 6-byte little-endian value zero-extended to 8 bytes.
    pub fn eat_u48_le(&mut self, field: &'static str) -> Result<u64> {
        self.eat(6, field).map(LE::read_u48)
    }

    pub fn eat_u64_le(&mut self, field: &'static str) -> Result<u64> {
        self.eat(8, field).map(LE::read_u64)
    }

    /// Reads a length-encoded integer. `None` means SQL `NULL` (`0xfb`).
    pub fn eat_lenenc_int(&mut self, field: &'static str) -> Result<Option<u64>> {
        let mut probe = *self;
        let value = match probe.eat_u8(field)? {
            0xfb => None,
            0xfc => Some(probe.eat_u16_le(field)? as u64),
            0xfd => Some(probe.eat_u24_le(field)? as u64),
            0xfe => Some(probe.eat_u64_le(field)?),
            0xff => return Err(Error::InvalidLengthEncodedInt(0xff)),
            x => Some(x as u64),
        };
        *self = probe;
        Ok(value)
    }

    /// Reads a length-encoded string. `None` means SQL `NULL`.
    pub fn eat_lenenc_str(&mut self, field: &'static str) -> Result<Option<&'a [u8]>> {
        let mut probe = *self;
        let value = match probe.eat_lenenc_int(field)? {
            Some(len) => Some(probe.eat(len as usize, field)?),
            None => None,
        };
        *self = probe;
        Ok(value)
    }
}

/// Encoders for MySql wire primitives.
pub trait WriteMysqlExt: WriteBytesExt {
    /// Writes MySql's length-encoded integer.
    fn write_lenenc_int(&mut self, x: u64) -> io::Result<u64> {
        if x < 251 {
            self.write_u8(x as u8)?;
            Ok(1)
        } else if x < 65_536 {
            self.write_u8(0xfc)?;
            self.write_uint::<LE>(x, 2)?;
            Ok(3)
        } else if x < 16_777_216 {
            self.write_u8(0xfd)?;
            self.write_uint::<LE>(x, 3)?;
            Ok(4)
        } else {
            self.write_u8(0xfe)?;
            self.write_uint::<LE>(x, 8)?;
            Ok(9)
        }
    }

    /// Writes MySql's length-encoded string.
    fn write_lenenc_str(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let written = self.write_lenenc_int(bytes.len() as u64)?;
        self.write_all(bytes)?;
        Ok(written + bytes.len() as u64)
    }
}

impl<T> WriteMysqlExt for T where T: WriteBytesExt {}

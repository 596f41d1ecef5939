// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Wire primitives shared by the event decoders.

use bitvec::prelude::*;

use crate::{error::Result, io::ParseBuf};

/// Returns length of length-encoded-integer representation of `x`.
pub fn lenenc_int_len(x: u64) -> u64 {
    if x < 251 {
        1
    } else if x < 65_536 {
        3
    } else if x < 16_777_216 {
        4
    } else {
        9
    }
}

/// Reads a length-encoded integer from the head of `buf`.
///
/// Returns `(value, is_null, bytes_consumed)`. `0xfb` is SQL `NULL` (value `0`, one byte).
pub fn read_lenenc_int(buf: &[u8]) -> Result<(u64, bool, usize)> {
    let mut buf = ParseBuf::new(buf);
    let value = buf.eat_lenenc_int("length-encoded integer")?;
    Ok((value.unwrap_or(0), value.is_none(), buf.offset()))
}

/// Reads a length-encoded string from the head of `buf`.
///
/// Returns `(bytes, is_null, bytes_consumed)`.
pub fn read_lenenc_str(buf: &[u8]) -> Result<(&[u8], bool, usize)> {
    let mut buf = ParseBuf::new(buf);
    let value = buf.eat_lenenc_str("length-encoded string")?;
    Ok((value.unwrap_or_default(), value.is_none(), buf.offset()))
}

/// Number of set bits in the bitmap.
pub fn bit_count(bitmap: &[u8]) -> usize {
    bitmap.view_bits::<Lsb0>().count_ones()
}

/// Tests the `index`-th bit (LSB-first within each byte). Out of range bits are unset.
pub fn bit_test(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .view_bits::<Lsb0>()
        .get(index)
        .map(|bit| *bit)
        .unwrap_or(false)
}

/// Bytes needed for a bitmap of `bits` bits.
pub fn bitmap_len(bits: usize) -> usize {
    (bits + 7) / 8
}

pub fn read_u24_be(buf: &[u8]) -> Result<u32> {
    ParseBuf::new(buf).eat_u24_be("24-bit integer")
}

pub fn read_u24_le(buf: &[u8]) -> Result<u32> {
    ParseBuf::new(buf).eat_u24_le("24-bit integer")
}

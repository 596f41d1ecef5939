// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use byteorder::{ByteOrder, LittleEndian as LE};
use bytes::{BufMut, BytesMut};
use tracing::trace;

use std::io::{Read, Write};

use crate::{
    constants::Command,
    error::{Error, Result},
};

use super::Transport;

/// Maximum payload of a single MySql packet.
pub const MAX_PAYLOAD_LEN: usize = 16_777_215;

const HEADER_LEN: usize = 4;

/// Synchronous packet framing over an established stream.
///
/// The stream is expected to be connected and authenticated already.
#[derive(Debug)]
pub struct PacketFramed<T> {
    seq_id: u8,
    out_buf: BytesMut,
    stream: T,
}

impl<T> PacketFramed<T> {
    /// Creates new instance with given `stream`.
    pub fn new(stream: T) -> Self {
        Self {
            seq_id: 0,
            out_buf: BytesMut::new(),
            stream,
        }
    }

    /// Returns reference to a stream.
    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    /// Returns mutable reference to a stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: Write> PacketFramed<T> {
    /// Splits `payload` into packets and flushes them to the stream.
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        self.out_buf.clear();
        let mut chunks = payload.chunks(MAX_PAYLOAD_LEN).peekable();
        let mut last_len = 0;

        while let Some(chunk) = chunks.next() {
            self.put_chunk(chunk);
            last_len = chunk.len();
            if chunks.peek().is_none() {
                break;
            }
        }

        // empty payload or a payload ending at the packet boundary
        if payload.is_empty() || last_len == MAX_PAYLOAD_LEN {
            self.put_chunk(&[]);
        }

        self.stream.write_all(&self.out_buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn put_chunk(&mut self, chunk: &[u8]) {
        self.out_buf.put_uint_le(chunk.len() as u64, 3);
        self.out_buf.put_u8(self.seq_id);
        self.out_buf.put_slice(chunk);
        self.seq_id = self.seq_id.wrapping_add(1);
    }
}

impl<T: Read> PacketFramed<T> {
    /// Reads the next logical packet joining split packets together.
    pub fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();

        loop {
            let mut header = [0_u8; HEADER_LEN];
            self.stream.read_exact(&mut header)?;
            let len = LE::read_u24(&header) as usize;
            let seq_id = header[3];

            if seq_id != self.seq_id {
                return Err(Error::PacketsOutOfSync {
                    expected: self.seq_id,
                    actual: seq_id,
                });
            }
            self.seq_id = self.seq_id.wrapping_add(1);

            let start = payload.len();
            payload.resize(start + len, 0);
            self.stream.read_exact(&mut payload[start..])?;
            trace!("read packet #{} of {} bytes", seq_id, len);

            if len < MAX_PAYLOAD_LEN {
                return Ok(payload);
            }
        }
    }
}

impl<T: Read + Write + Send> Transport for PacketFramed<T> {
    fn connect(&mut self) -> Result<()> {
        self.seq_id = 0;
        Ok(())
    }

    fn send_command(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        let mut body = Vec::with_capacity(1 + payload.len());
        body.push(command as u8);
        body.extend_from_slice(payload);
        self.write_packet(&body)
    }

    fn read_packet(&mut self) -> Result<Vec<u8>> {
        PacketFramed::read_packet(self)
    }

    fn reset_sequence(&mut self) {
        self.seq_id = 0;
    }
}

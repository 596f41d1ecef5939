// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Client side of the replication protocol.
//!
//! Connection setup and authentication are left to [`Transport`] implementations,
//! SQL execution against the source is left to [`SourceConnection`] implementations.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::{
    constants::{Command, DEFAULT_SERVER_ID, EOF_HEADER, ERR_HEADER, OK_HEADER},
    error::{BoxError, Error, Result},
    io::ParseBuf,
    schema::ColumnRow,
};

pub use self::framed::PacketFramed;

mod framed;

/// Packet-level access to a connected and authenticated replication source.
pub trait Transport: Send {
    /// Establishes the session. Called once before any command.
    fn connect(&mut self) -> Result<()>;

    /// Sends a command packet (`command` followed by `payload`).
    fn send_command(&mut self, command: Command, payload: &[u8]) -> Result<()>;

    /// Reads the next packet payload.
    fn read_packet(&mut self) -> Result<Vec<u8>>;

    /// Resets the packet sequence id before a new command.
    fn reset_sequence(&mut self);
}

/// SQL access to the replication source.
pub trait SourceConnection: Send {
    fn begin(&mut self) -> std::result::Result<(), BoxError>;

    fn execute(&mut self, statement: &str) -> std::result::Result<(), BoxError>;

    fn commit(&mut self) -> std::result::Result<(), BoxError>;

    fn rollback(&mut self) -> std::result::Result<(), BoxError>;

    /// Runs a `SELECT TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, COLUMN_TYPE ...` query.
    fn query_columns(&mut self, query: &str) -> std::result::Result<Vec<ColumnRow>, BoxError>;
}

/// Position in the binlog of the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinlogPosition {
    pub file: String,
    pub position: u32,
}

impl BinlogPosition {
    /// Position of the first event of a binlog file.
    pub const FIRST_EVENT: u32 = 4;

    pub fn new(file: impl Into<String>, position: u32) -> Self {
        Self {
            file: file.into(),
            position,
        }
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.position)
    }
}

/// Binlog dump command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComBinlogDump {
    /// Position in the binlog-file to start the stream with.
    pub pos: u32,
    /// Command flags.
    pub flags: u16,
    /// Server id of this slave.
    pub server_id: u32,
    /// Filename of the binlog on the master.
    ///
    /// If the binlog-filename is empty, the server will send the binlog-stream
    /// of the first known binlog.
    pub filename: Vec<u8>,
}

impl ComBinlogDump {
    pub const COMMAND: Command = Command::COM_BINLOG_DUMP;

    /// Query that makes the source append checksums to every event.
    pub const CHECKSUM_QUERY: &'static str =
        "set @master_binlog_checksum= @@global.binlog_checksum";

    pub fn new(position: &BinlogPosition) -> Self {
        Self {
            pos: position.position,
            flags: 0,
            server_id: DEFAULT_SERVER_ID,
            filename: position.file.as_bytes().to_vec(),
        }
    }

    pub fn with_server_id(mut self, server_id: u32) -> Self {
        self.server_id = server_id;
        self
    }

    /// Command payload without the command byte.
    pub fn payload(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(4 + 2 + 4 + self.filename.len());
        buf.put_u32_le(self.pos);
        buf.put_u16_le(self.flags);
        buf.put_u32_le(self.server_id);
        buf.put_slice(&self.filename);
        buf
    }
}

/// A packet of the binlog stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationPacket<'a> {
    /// An event packet, including the status marker.
    Event(&'a [u8]),
    /// End of the stream.
    Eof,
    /// Server error.
    Err(ErrPacket<'a>),
}

impl<'a> ReplicationPacket<'a> {
    /// EOF packets are shorter than this.
    const MAX_EOF_LEN: usize = 9;

    pub fn classify(packet: &'a [u8]) -> Result<Self> {
        match packet.first() {
            Some(&OK_HEADER) => Ok(ReplicationPacket::Event(packet)),
            Some(&EOF_HEADER) if packet.len() < Self::MAX_EOF_LEN => Ok(ReplicationPacket::Eof),
            Some(&ERR_HEADER) => ErrPacket::read(&packet[1..]).map(ReplicationPacket::Err),
            Some(x) => Err(Error::Server(format!(
                "unexpected packet marker {:#04x} in binlog stream",
                x
            ))),
            None => Err(Error::ShortBuffer {
                field: "status marker",
                offset: 0,
                needed: 1,
                available: 0,
            }),
        }
    }
}

/// MySql error packet (without the marker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrPacket<'a> {
    pub error_code: u16,
    pub sql_state: Option<&'a [u8]>,
    pub message: &'a [u8],
}

impl<'a> ErrPacket<'a> {
    pub fn read(payload: &'a [u8]) -> Result<Self> {
        let mut buf = ParseBuf::new(payload);
        let error_code = buf.eat_u16_le("error_code")?;
        let sql_state = if buf.peek().first() == Some(&b'#') {
            buf.skip(1, "sql_state_marker")?;
            Some(buf.eat(5, "sql_state")?)
        } else {
            None
        };
        Ok(Self {
            error_code,
            sql_state,
            message: buf.eat_all(),
        })
    }
}

impl fmt::Display for ErrPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR {}", self.error_code)?;
        if let Some(state) = self.sql_state {
            write!(f, " ({})", String::from_utf8_lossy(state))?;
        }
        write!(f, ": {}", String::from_utf8_lossy(self.message))
    }
}

impl From<ErrPacket<'_>> for Error {
    fn from(packet: ErrPacket<'_>) -> Self {
        Error::Server(packet.to_string())
    }
}

// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::convert::TryFrom;

/// First byte of a successful replication packet.
pub const OK_HEADER: u8 = 0x00;
/// First byte of a short end-of-stream packet.
pub const EOF_HEADER: u8 = 0xfe;
/// First byte of an error packet.
pub const ERR_HEADER: u8 = 0xff;

/// Server id this client registers the binlog dump with.
pub const DEFAULT_SERVER_ID: u32 = 123_456_789;

/// Client commands used by a replication session.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Command {
    COM_QUIT = 0x01,
    COM_INIT_DB = 0x02,
    COM_QUERY = 0x03,
    COM_PING = 0x0e,
    COM_BINLOG_DUMP = 0x12,
    COM_REGISTER_SLAVE = 0x15,
}

/// Type of MySql column field.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum ColumnType {
    MYSQL_TYPE_DECIMAL = 0,
    MYSQL_TYPE_TINY,
    MYSQL_TYPE_SHORT,
    MYSQL_TYPE_LONG,
    MYSQL_TYPE_FLOAT,
    MYSQL_TYPE_DOUBLE,
    MYSQL_TYPE_NULL,
    MYSQL_TYPE_TIMESTAMP,
    MYSQL_TYPE_LONGLONG,
    MYSQL_TYPE_INT24,
    MYSQL_TYPE_DATE,
    MYSQL_TYPE_TIME,
    MYSQL_TYPE_DATETIME,
    MYSQL_TYPE_YEAR,
    MYSQL_TYPE_NEWDATE,
    MYSQL_TYPE_VARCHAR,
    MYSQL_TYPE_BIT,
    MYSQL_TYPE_TIMESTAMP2,
    MYSQL_TYPE_DATETIME2,
    MYSQL_TYPE_TIME2,
    MYSQL_TYPE_JSON = 245,
    MYSQL_TYPE_NEWDECIMAL = 246,
    MYSQL_TYPE_ENUM = 247,
    MYSQL_TYPE_SET = 248,
    MYSQL_TYPE_TINY_BLOB = 249,
    MYSQL_TYPE_MEDIUM_BLOB = 250,
    MYSQL_TYPE_LONG_BLOB = 251,
    MYSQL_TYPE_BLOB = 252,
    MYSQL_TYPE_VAR_STRING = 253,
    MYSQL_TYPE_STRING = 254,
    MYSQL_TYPE_GEOMETRY = 255,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("Unknown column type {}", _0)]
#[repr(transparent)]
pub struct UnknownColumnType(pub u8);

impl From<UnknownColumnType> for u8 {
    fn from(x: UnknownColumnType) -> Self {
        x.0
    }
}

impl TryFrom<u8> for ColumnType {
    type Error = UnknownColumnType;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use ColumnType::*;

        Ok(match byte {
            0x00 => MYSQL_TYPE_DECIMAL,
            0x01 => MYSQL_TYPE_TINY,
            0x02 => MYSQL_TYPE_SHORT,
            0x03 => MYSQL_TYPE_LONG,
            0x04 => MYSQL_TYPE_FLOAT,
            0x05 => MYSQL_TYPE_DOUBLE,
            0x06 => MYSQL_TYPE_NULL,
            0x07 => MYSQL_TYPE_TIMESTAMP,
            0x08 => MYSQL_TYPE_LONGLONG,
            0x09 => MYSQL_TYPE_INT24,
            0x0a => MYSQL_TYPE_DATE,
            0x0b => MYSQL_TYPE_TIME,
            0x0c => MYSQL_TYPE_DATETIME,
            0x0d => MYSQL_TYPE_YEAR,
            0x0e => MYSQL_TYPE_NEWDATE,
            0x0f => MYSQL_TYPE_VARCHAR,
            0x10 => MYSQL_TYPE_BIT,
            0x11 => MYSQL_TYPE_TIMESTAMP2,
            0x12 => MYSQL_TYPE_DATETIME2,
            0x13 => MYSQL_TYPE_TIME2,
            0xf5 => MYSQL_TYPE_JSON,
            0xf6 => MYSQL_TYPE_NEWDECIMAL,
            0xf7 => MYSQL_TYPE_ENUM,
            0xf8 => MYSQL_TYPE_SET,
            0xf9 => MYSQL_TYPE_TINY_BLOB,
            0xfa => MYSQL_TYPE_MEDIUM_BLOB,
            0xfb => MYSQL_TYPE_LONG_BLOB,
            0xfc => MYSQL_TYPE_BLOB,
            0xfd => MYSQL_TYPE_VAR_STRING,
            0xfe => MYSQL_TYPE_STRING,
            0xff => MYSQL_TYPE_GEOMETRY,
            x => return Err(UnknownColumnType(x)),
        })
    }
}

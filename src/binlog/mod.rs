// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Binlog-related structures and functions. This implementation assumes
//! binlog version >= 4 (MySql >= 5.0.0) and decodes only the events needed
//! for row-level change capture.

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use std::{convert::TryFrom, fmt, io, sync::Arc};

use crate::{
    error::{Error, Result},
    io::ParseBuf,
};

pub use self::{
    catalog::TableCatalog,
    dispatcher::EventDispatcher,
    events::{
        FormatDescriptionEvent, GtidEvent, PreviousGtidsEvent, QueryEvent, RotateEvent,
        RowsEvent, RowsEventKind, StopEvent, TableMapEvent, XidEvent,
    },
    row::{BinlogRow, BinlogValue},
};

pub mod catalog;
pub mod dispatcher;
pub mod events;
pub mod row;
pub mod time;

/// Binlog Event Type
#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EventType {
    /// Ignored event.
    UNKNOWN_EVENT = 0x00,
    START_EVENT_V3 = 0x01,
    /// A `QUERY_EVENT` is created for each query that modifies the database,
    /// unless the query is logged row-based.
    QUERY_EVENT = 0x02,
    /// A `STOP_EVENT` has no payload or post-header.
    STOP_EVENT = 0x03,
    /// The rotate event is added to the binlog as last event
    /// to tell the reader what binlog to request next.
    ROTATE_EVENT = 0x04,
    INTVAR_EVENT = 0x05,
    LOAD_EVENT = 0x06,
    SLAVE_EVENT = 0x07,
    CREATE_FILE_EVENT = 0x08,
    APPEND_BLOCK_EVENT = 0x09,
    EXEC_LOAD_EVENT = 0x0a,
    DELETE_FILE_EVENT = 0x0b,
    NEW_LOAD_EVENT = 0x0c,
    RAND_EVENT = 0x0d,
    USER_VAR_EVENT = 0x0e,
    /// A format description event is the first event of a binlog for binlog-version 4.
    FORMAT_DESCRIPTION_EVENT = 0x0f,
    XID_EVENT = 0x10,
    BEGIN_LOAD_QUERY_EVENT = 0x11,
    EXECUTE_LOAD_QUERY_EVENT = 0x12,
    TABLE_MAP_EVENT = 0x13,
    PRE_GA_WRITE_ROWS_EVENT = 0x14,
    PRE_GA_UPDATE_ROWS_EVENT = 0x15,
    PRE_GA_DELETE_ROWS_EVENT = 0x16,
    WRITE_ROWS_EVENT_V1 = 0x17,
    UPDATE_ROWS_EVENT_V1 = 0x18,
    DELETE_ROWS_EVENT_V1 = 0x19,
    INCIDENT_EVENT = 0x1a,
    HEARTBEAT_EVENT = 0x1b,
    IGNORABLE_EVENT = 0x1c,
    ROWS_QUERY_EVENT = 0x1d,
    WRITE_ROWS_EVENT = 0x1e,
    UPDATE_ROWS_EVENT = 0x1f,
    DELETE_ROWS_EVENT = 0x20,
    GTID_EVENT = 0x21,
    ANONYMOUS_GTID_EVENT = 0x22,
    PREVIOUS_GTIDS_EVENT = 0x23,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("Unknown event type {}", _0)]
#[repr(transparent)]
pub struct UnknownEventType(pub u8);

impl From<UnknownEventType> for u8 {
    fn from(x: UnknownEventType) -> Self {
        x.0
    }
}

impl TryFrom<u8> for EventType {
    type Error = UnknownEventType;

    fn try_from(byte: u8) -> std::result::Result<Self, UnknownEventType> {
        use EventType::*;

        Ok(match byte {
            0x00 => UNKNOWN_EVENT,
            0x01 => START_EVENT_V3,
            0x02 => QUERY_EVENT,
            0x03 => STOP_EVENT,
            0x04 => ROTATE_EVENT,
            0x05 => INTVAR_EVENT,
            0x06 => LOAD_EVENT,
            0x07 => SLAVE_EVENT,
            0x08 => CREATE_FILE_EVENT,
            0x09 => APPEND_BLOCK_EVENT,
            0x0a => EXEC_LOAD_EVENT,
            0x0b => DELETE_FILE_EVENT,
            0x0c => NEW_LOAD_EVENT,
            0x0d => RAND_EVENT,
            0x0e => USER_VAR_EVENT,
            0x0f => FORMAT_DESCRIPTION_EVENT,
            0x10 => XID_EVENT,
            0x11 => BEGIN_LOAD_QUERY_EVENT,
            0x12 => EXECUTE_LOAD_QUERY_EVENT,
            0x13 => TABLE_MAP_EVENT,
            0x14 => PRE_GA_WRITE_ROWS_EVENT,
            0x15 => PRE_GA_UPDATE_ROWS_EVENT,
            0x16 => PRE_GA_DELETE_ROWS_EVENT,
            0x17 => WRITE_ROWS_EVENT_V1,
            0x18 => UPDATE_ROWS_EVENT_V1,
            0x19 => DELETE_ROWS_EVENT_V1,
            0x1a => INCIDENT_EVENT,
            0x1b => HEARTBEAT_EVENT,
            0x1c => IGNORABLE_EVENT,
            0x1d => ROWS_QUERY_EVENT,
            0x1e => WRITE_ROWS_EVENT,
            0x1f => UPDATE_ROWS_EVENT,
            0x20 => DELETE_ROWS_EVENT,
            0x21 => GTID_EVENT,
            0x22 => ANONYMOUS_GTID_EVENT,
            0x23 => PREVIOUS_GTIDS_EVENT,
            x => return Err(UnknownEventType(x)),
        })
    }
}

/// Returns a printable name of a raw event type.
pub fn event_type_name(event_type: u8) -> String {
    match EventType::try_from(event_type) {
        Ok(known) => format!("{:?}", known),
        Err(UnknownEventType(x)) => format!("UNKNOWN({})", x),
    }
}

/// The binlog event header starts each event and is 19 bytes long assuming binlog version >= 4.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BinlogEventHeader {
    /// Seconds since unix epoch.
    pub timestamp: u32,
    /// Raw event type.
    pub event_type: u8,
    /// Server-id of the originating mysql-server.
    pub server_id: u32,
    /// Size of the event (header, post-header, body).
    pub event_size: u32,
    /// Position of the next event.
    pub log_pos: u32,
    /// Binlog event flags.
    pub flags: u16,
}

impl BinlogEventHeader {
    /// Binlog event header length for version >= 4.
    pub const LEN: usize = 19;

    /// Decodes the header of a replication packet.
    ///
    /// `packet` starts with the 1-byte status marker, the header follows it.
    pub fn read(packet: &[u8]) -> Result<Self> {
        let available = packet.len().saturating_sub(1);
        if available < Self::LEN {
            return Err(Error::HeaderTooShort { len: available });
        }
        Self::read_from(&mut ParseBuf::new(&packet[1..]))
    }

    /// Decodes a header that starts at the cursor position.
    pub fn read_from(buf: &mut ParseBuf<'_>) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::HeaderTooShort { len: buf.len() });
        }

        let header = Self {
            timestamp: buf.eat_u32_le("timestamp")?,
            event_type: buf.eat_u8("event_type")?,
            server_id: buf.eat_u32_le("server_id")?,
            event_size: buf.eat_u32_le("event_size")?,
            log_pos: buf.eat_u32_le("log_pos")?,
            flags: buf.eat_u16_le("flags")?,
        };

        if (header.event_size as usize) < Self::LEN {
            return Err(Error::InvalidEventSize {
                size: header.event_size,
            });
        }

        Ok(header)
    }

    pub fn write<T: io::Write>(&self, mut output: T) -> io::Result<()> {
        output.write_u32::<LittleEndian>(self.timestamp)?;
        output.write_u8(self.event_type)?;
        output.write_u32::<LittleEndian>(self.server_id)?;
        output.write_u32::<LittleEndian>(self.event_size)?;
        output.write_u32::<LittleEndian>(self.log_pos)?;
        output.write_u16::<LittleEndian>(self.flags)?;
        Ok(())
    }

    /// Returns parsed event type, or raw value if type is unknown.
    pub fn get_event_type(&self) -> std::result::Result<EventType, UnknownEventType> {
        EventType::try_from(self.event_type)
    }
}

impl fmt::Display for BinlogEventHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type: {}, date: {}, pos: {}, eveSize: {}",
            self.event_type,
            time::format_timestamp(self.timestamp),
            self.log_pos,
            self.event_size,
        )
    }
}

/// Decoded event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventData {
    FormatDescription(FormatDescriptionEvent),
    Rotate(RotateEvent),
    Stop(StopEvent),
    Gtid(GtidEvent),
    PreviousGtids(PreviousGtidsEvent),
    Xid(XidEvent),
    Query(QueryEvent),
    TableMap(Arc<TableMapEvent>),
    Rows(RowsEvent),
}

impl fmt::Display for EventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventData::FormatDescription(ev) => ev.fmt(f),
            EventData::Rotate(ev) => ev.fmt(f),
            EventData::Stop(ev) => ev.fmt(f),
            EventData::Gtid(ev) => ev.fmt(f),
            EventData::PreviousGtids(ev) => ev.fmt(f),
            EventData::Xid(ev) => ev.fmt(f),
            EventData::Query(ev) => ev.fmt(f),
            EventData::TableMap(ev) => ev.fmt(f),
            EventData::Rows(ev) => ev.fmt(f),
        }
    }
}

/// A decoded binlog event. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Common header of an event.
    pub header: BinlogEventHeader,
    /// An event-type specific data.
    pub data: EventData,
}

impl Event {
    pub fn new(header: BinlogEventHeader, data: EventData) -> Self {
        Self { header, data }
    }

    /// Seconds since unix epoch.
    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    pub fn event_type(&self) -> u8 {
        self.header.event_type
    }

    /// Returns `false` for events the source generates on the fly, such as the
    /// rotate event that starts every dumped file. Their timestamp is zero.
    pub fn has_time(&self) -> bool {
        self.header.timestamp != 0
    }

    pub fn is_gtid(&self) -> bool {
        matches!(self.data, EventData::Gtid(_))
    }

    pub fn is_xid(&self) -> bool {
        matches!(self.data, EventData::Xid(_))
    }

    /// A rotate event with zero timestamp is sent by the server at stream start
    /// to announce the file being dumped.
    pub fn is_fake_rotate(&self) -> bool {
        matches!(self.data, EventData::Rotate(_)) && self.header.timestamp == 0
    }

    pub fn as_rows(&self) -> Option<&RowsEvent> {
        match self.data {
            EventData::Rows(ref rows) => Some(rows),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.header, self.data)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    pub(crate) fn header(event_type: EventType, timestamp: u32) -> BinlogEventHeader {
        BinlogEventHeader {
            timestamp,
            event_type: event_type as u8,
            server_id: 1,
            event_size: BinlogEventHeader::LEN as u32,
            log_pos: 0,
            flags: 0,
        }
    }

    #[test]
    fn should_parse_header() {
        const PACKET: &[u8] = &[
            0x00, 0xfc, 0x35, 0xbb, 0x4a, 0x0f, 0x01, 0x00, 0x00, 0x00, 0x5e, 0x00, 0x00, 0x00,
            0x62, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let header = BinlogEventHeader::read(PACKET).unwrap();
        assert_eq!(header.timestamp, 1_253_782_012);
        assert_eq!(
            header.get_event_type(),
            Ok(EventType::FORMAT_DESCRIPTION_EVENT)
        );
        assert_eq!(header.server_id, 1);
        assert_eq!(header.event_size, 0x5e);
        assert_eq!(header.log_pos, 0x62);
        assert_eq!(header.flags, 0);
    }

    #[test]
    fn should_reject_short_header() {
        let packet = [0_u8; BinlogEventHeader::LEN];
        assert!(matches!(
            BinlogEventHeader::read(&packet),
            Err(Error::HeaderTooShort { len: 18 })
        ));
        assert!(matches!(
            BinlogEventHeader::read(&[]),
            Err(Error::HeaderTooShort { len: 0 })
        ));
    }

    #[test]
    fn should_reject_small_event_size() {
        let mut packet = vec![0x00];
        BinlogEventHeader {
            event_size: 18,
            ..header(EventType::XID_EVENT, 1)
        }
        .write(&mut packet)
        .unwrap();
        assert!(matches!(
            BinlogEventHeader::read(&packet),
            Err(Error::InvalidEventSize { size: 18 })
        ));
    }

    #[test]
    fn should_name_event_types() {
        assert_eq!(event_type_name(0x1e), "WRITE_ROWS_EVENT");
        assert_eq!(event_type_name(0x99), "UNKNOWN(153)");
    }

    proptest! {
        #[test]
        fn header_roundtrip(
            timestamp: u32,
            event_type: u8,
            server_id: u32,
            event_size in (BinlogEventHeader::LEN as u32)..=u32::MAX,
            log_pos: u32,
            flags: u16,
        ) {
            let header = BinlogEventHeader {
                timestamp,
                event_type,
                server_id,
                event_size,
                log_pos,
                flags,
            };
            let mut packet = vec![0x00];
            header.write(&mut packet).unwrap();
            prop_assert_eq!(packet.len(), 1 + BinlogEventHeader::LEN);
            prop_assert_eq!(BinlogEventHeader::read(&packet).unwrap(), header);
        }
    }
}

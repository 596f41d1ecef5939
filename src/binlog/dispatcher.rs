// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use tracing::{debug, trace};

use std::sync::Arc;

use crate::{
    error::{Error, Result},
    schema::{Ddl, SchemaCatalog},
};

use super::{
    catalog::TableCatalog,
    events::{
        FormatDescriptionEvent, GtidEvent, PreviousGtidsEvent, QueryEvent, RotateEvent,
        RowsEvent, RowsEventKind, StopEvent, TableMapEvent, XidEvent,
    },
    event_type_name, BinlogEventHeader, Event, EventData, EventType,
};

/// Length of the checksum that trails every event.
pub const CHECKSUM_LEN: usize = 4;

/// Turns replication packets into events.
///
/// Owns the table catalog, so rows events are decoded against the table map
/// most recently seen for their table id.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    tables: TableCatalog,
    schema: Option<Arc<SchemaCatalog>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a schema catalog that is kept in sync with DDL and table maps.
    pub fn with_schema(mut self, schema: Arc<SchemaCatalog>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn tables(&self) -> &TableCatalog {
        &self.tables
    }

    /// Decodes a replication packet (status marker, header, body and checksum).
    ///
    /// Returns `Ok(None)` for event kinds that are not captured.
    pub fn dispatch(&mut self, packet: &[u8]) -> Result<Option<Event>> {
        let header = BinlogEventHeader::read(packet)?;
        let body = &packet[1 + BinlogEventHeader::LEN..];
        let body_len = body
            .len()
            .checked_sub(CHECKSUM_LEN)
            .ok_or(Error::ShortBuffer {
                field: "checksum",
                offset: 0,
                needed: CHECKSUM_LEN,
                available: body.len(),
            })?;
        self.dispatch_body(header, &body[..body_len])
    }

    /// Decodes a checksum-stripped event body.
    pub fn dispatch_body(
        &mut self,
        header: BinlogEventHeader,
        body: &[u8],
    ) -> Result<Option<Event>> {
        match self.decode(header, body) {
            Ok(event) => {
                debug!("{}", event);
                Ok(Some(event))
            }
            Err(Error::UnsupportedEventKind { event_type })
            | Err(Error::UnknownEventType(event_type)) => {
                debug!(
                    "dropping {} event at {}",
                    event_type_name(event_type),
                    header.log_pos
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Decodes a checksum-stripped event body.
    ///
    /// Fails with [`Error::UnsupportedEventKind`] or [`Error::UnknownEventType`]
    /// for events that are not captured.
    pub fn decode(&mut self, header: BinlogEventHeader, body: &[u8]) -> Result<Event> {
        use EventType::*;

        trace!("decoding {} ({} bytes)", header, body.len());

        let event_type = header
            .get_event_type()
            .map_err(|err| Error::UnknownEventType(err.0))?;

        let data = match event_type {
            FORMAT_DESCRIPTION_EVENT => {
                EventData::FormatDescription(FormatDescriptionEvent::read(body)?)
            }
            ROTATE_EVENT => EventData::Rotate(RotateEvent::read(body)?),
            STOP_EVENT => EventData::Stop(StopEvent::read(body)),
            GTID_EVENT => EventData::Gtid(GtidEvent::read(body)?),
            PREVIOUS_GTIDS_EVENT => EventData::PreviousGtids(PreviousGtidsEvent::read(body)),
            XID_EVENT => EventData::Xid(XidEvent::read(body)?),
            QUERY_EVENT => {
                let query = QueryEvent::read(body)?;
                self.on_query(&query);
                EventData::Query(query)
            }
            TABLE_MAP_EVENT => {
                let table = Arc::new(TableMapEvent::read(body)?);
                self.on_table_map(&table);
                self.tables.insert(table.clone());
                EventData::TableMap(table)
            }
            WRITE_ROWS_EVENT | DELETE_ROWS_EVENT => {
                let kind = RowsEventKind::from_event_type(header.event_type).ok_or(
                    Error::UnsupportedEventKind {
                        event_type: header.event_type,
                    },
                )?;
                let table = self.tables.resolve(RowsEvent::peek_table_id(body)?)?;
                EventData::Rows(RowsEvent::read(kind, body, table)?)
            }
            _ => {
                return Err(Error::UnsupportedEventKind {
                    event_type: header.event_type,
                })
            }
        };

        Ok(Event::new(header, data))
    }

    fn on_query(&self, query: &QueryEvent) {
        if let (Some(schema), Some(ddl)) = (&self.schema, Ddl::parse(&query.schema, &query.query))
        {
            debug!("invalidating schema cache after DDL: {:?}", ddl);
            schema.apply_ddl(&ddl);
        }
    }

    fn on_table_map(&self, table: &TableMapEvent) {
        if let Some(schema) = &self.schema {
            schema.check_table_map(table);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        binlog::BinlogValue,
        constants::ColumnType,
        io::WriteMysqlExt,
        schema::ColumnDef,
    };

    pub(crate) fn packet(event_type: EventType, timestamp: u32, body: &[u8]) -> Vec<u8> {
        let mut packet = vec![0x00];
        BinlogEventHeader {
            timestamp,
            event_type: event_type as u8,
            server_id: 1,
            event_size: (BinlogEventHeader::LEN + body.len() + CHECKSUM_LEN) as u32,
            log_pos: 120,
            flags: 0,
        }
        .write(&mut packet)
        .unwrap();
        packet.extend_from_slice(body);
        packet.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        packet
    }

    fn table_map_body(table_id: u8, columns: &[ColumnType]) -> Vec<u8> {
        let mut body = vec![table_id, 0, 0, 0, 0, 0, 0, 0];
        body.write_lenenc_str(b"shop").unwrap();
        body.push(0);
        body.write_lenenc_str(b"orders").unwrap();
        body.push(0);
        body.write_lenenc_int(columns.len() as u64).unwrap();
        body.extend(columns.iter().map(|c| *c as u8));
        body.write_lenenc_str(&[]).unwrap();
        body
    }

    fn rows_body(table_id: u8) -> Vec<u8> {
        let mut body = vec![table_id, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        body.extend_from_slice(&[0x01, 0b1]);
        body.push(0);
        body.extend_from_slice(&9_u32.to_le_bytes());
        body
    }

    #[test]
    fn should_decode_rows_against_table_map() {
        let mut dispatcher = EventDispatcher::new();
        let table_map = packet(
            EventType::TABLE_MAP_EVENT,
            10,
            &table_map_body(3, &[ColumnType::MYSQL_TYPE_LONG]),
        );
        let event = dispatcher.dispatch(&table_map).unwrap().unwrap();
        assert!(matches!(event.data, EventData::TableMap(ref t) if t.table_id == 3));
        assert_eq!(dispatcher.tables().len(), 1);

        let rows = packet(EventType::WRITE_ROWS_EVENT, 10, &rows_body(3));
        let event = dispatcher.dispatch(&rows).unwrap().unwrap();
        let rows = event.as_rows().unwrap();
        assert_eq!(rows.kind, RowsEventKind::Write);
        assert!(rows.is_table("shop", "orders"));
        assert_eq!(rows.rows[0].get(0), Some(&BinlogValue::UInt(9)));
    }

    #[test]
    fn should_fail_rows_without_table_map() {
        let mut dispatcher = EventDispatcher::new();
        let rows = packet(EventType::DELETE_ROWS_EVENT, 10, &rows_body(3));
        assert!(matches!(
            dispatcher.dispatch(&rows),
            Err(Error::UnknownTableId { table_id: 3 })
        ));
    }

    #[test]
    fn should_drop_unsupported_events() {
        let mut dispatcher = EventDispatcher::new();
        let update = packet(EventType::UPDATE_ROWS_EVENT, 10, &rows_body(3));
        assert!(dispatcher.dispatch(&update).unwrap().is_none());
        assert!(matches!(
            dispatcher.decode(BinlogEventHeader::read(&update).unwrap(), &rows_body(3)),
            Err(Error::UnsupportedEventKind { event_type: 0x1f })
        ));

        let heartbeat = packet(EventType::HEARTBEAT_EVENT, 0, &[]);
        assert!(dispatcher.dispatch(&heartbeat).unwrap().is_none());

        let mut unknown = packet(EventType::XID_EVENT, 0, &[0; 8]);
        unknown[5] = 0xa0;
        assert!(dispatcher.dispatch(&unknown).unwrap().is_none());
    }

    #[test]
    fn should_strip_checksum() {
        let mut dispatcher = EventDispatcher::new();
        let xid = packet(EventType::XID_EVENT, 10, &77_u64.to_le_bytes());
        let event = dispatcher.dispatch(&xid).unwrap().unwrap();
        assert!(matches!(event.data, EventData::Xid(XidEvent { xid: 77 })));
        assert_eq!(event.header.timestamp, 10);

        // body shorter than the checksum
        let mut short = packet(EventType::STOP_EVENT, 10, &[]);
        short.truncate(short.len() - 2);
        assert!(matches!(
            dispatcher.dispatch(&short),
            Err(Error::ShortBuffer {
                field: "checksum",
                ..
            })
        ));
    }

    #[test]
    fn should_fail_on_truncated_body() {
        let mut dispatcher = EventDispatcher::new();
        let xid = packet(EventType::XID_EVENT, 10, &[1, 2, 3]);
        let err = dispatcher.dispatch(&xid).unwrap_err();
        assert!(matches!(err, Error::ShortBuffer { field: "xid", .. }));
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn should_invalidate_schema_on_ddl() {
        let schema = Arc::new(SchemaCatalog::new());
        schema.set_columns(
            "shop",
            "orders",
            vec![ColumnDef::new("id", "bigint unsigned")],
        );
        let mut dispatcher = EventDispatcher::new().with_schema(schema.clone());

        let mut body = Vec::new();
        body.extend_from_slice(&[0; 8]);
        body.push(4);
        body.extend_from_slice(&[0, 0, 0, 0]);
        body.extend_from_slice(b"shop\0ALTER TABLE orders ADD note VARCHAR(10)");
        let query = packet(EventType::QUERY_EVENT, 10, &body);

        let event = dispatcher.dispatch(&query).unwrap().unwrap();
        assert!(matches!(event.data, EventData::Query(ref q) if q.schema == "shop"));
        assert!(schema.column_names("shop", "orders").is_none());
    }

    #[test]
    fn should_invalidate_schema_on_column_count_change() {
        let schema = Arc::new(SchemaCatalog::new());
        schema.set_columns("shop", "orders", vec![ColumnDef::new("id", "int")]);
        let mut dispatcher = EventDispatcher::new().with_schema(schema.clone());

        let table_map = packet(
            EventType::TABLE_MAP_EVENT,
            10,
            &table_map_body(
                3,
                &[ColumnType::MYSQL_TYPE_LONG, ColumnType::MYSQL_TYPE_STRING],
            ),
        );
        dispatcher.dispatch(&table_map).unwrap();
        assert!(schema.column_names("shop", "orders").is_none());
    }
}

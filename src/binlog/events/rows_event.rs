// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use serde::{Deserialize, Serialize};

use std::{fmt, sync::Arc};

use crate::{
    binlog::{
        row::{read_rows, BinlogRow},
        EventType,
    },
    error::{Error, Result},
    io::ParseBuf,
    misc::bitmap_len,
};

use super::TableMapEvent;

/// Kind of a row-based change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowsEventKind {
    Write,
    Update,
    Delete,
}

impl RowsEventKind {
    /// Maps version 2 rows event types.
    pub fn from_event_type(event_type: u8) -> Option<Self> {
        match event_type {
            x if x == EventType::WRITE_ROWS_EVENT as u8 => Some(RowsEventKind::Write),
            x if x == EventType::UPDATE_ROWS_EVENT as u8 => Some(RowsEventKind::Update),
            x if x == EventType::DELETE_ROWS_EVENT as u8 => Some(RowsEventKind::Delete),
            _ => None,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            RowsEventKind::Write => EventType::WRITE_ROWS_EVENT,
            RowsEventKind::Update => EventType::UPDATE_ROWS_EVENT,
            RowsEventKind::Delete => EventType::DELETE_ROWS_EVENT,
        }
    }
}

/// Common base structure for all row-containing binary log events.
///
/// Carries the table map the rows were decoded with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowsEvent {
    pub kind: RowsEventKind,
    /// An identifier that refers to the table.
    pub table_id: u64,
    /// Raw rows event flags.
    pub flags: u16,
    /// Raw extra data.
    pub extra_data: Vec<u8>,
    /// Number of columns in each row image.
    pub columns_count: u64,
    /// For each column, a bit indicating whether it is present in the row image.
    pub columns_present: Vec<u8>,
    /// Decoded row images.
    pub rows: Vec<BinlogRow>,
    /// Table map active for `table_id` at decode time.
    pub table: Arc<TableMapEvent>,
}

impl RowsEvent {
    /// Returns the table id a rows event body refers to.
    pub fn peek_table_id(body: &[u8]) -> Result<u64> {
        ParseBuf::new(body).eat_u48_le("table_id")
    }

    pub fn read(kind: RowsEventKind, body: &[u8], table: Arc<TableMapEvent>) -> Result<Self> {
        let mut buf = ParseBuf::new(body);
        let table_id = buf.eat_u48_le("table_id")?;
        if table_id != table.table_id {
            return Err(Error::UnknownTableId { table_id });
        }

        let flags = buf.eat_u16_le("flags")?;
        // extra data length is counted in bits on the wire
        let extra_data_len = buf.eat_u16_le("extra_data_len")?;
        let extra_data = buf
            .eat(extra_data_len as usize / 8, "extra_data")?
            .to_vec();

        let columns_count = buf.eat_lenenc_int("columns_count")?.unwrap_or(0);
        let columns_present = buf
            .eat(bitmap_len(columns_count as usize), "columns_present")?
            .to_vec();

        let rows = read_rows(&mut buf, columns_count, &columns_present, &table)?;

        Ok(Self {
            kind,
            table_id,
            flags,
            extra_data,
            columns_count,
            columns_present,
            rows,
            table,
        })
    }

    pub fn database_name(&self) -> &str {
        &self.table.database_name
    }

    pub fn table_name(&self) -> &str {
        &self.table.table_name
    }

    /// Returns `true` if the event belongs to `schema`.`table`.
    pub fn is_table(&self, schema: &str, table: &str) -> bool {
        self.database_name() == schema && self.table_name() == table
    }
}

impl fmt::Display for RowsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}Rows TableID: {}, Table: {}, Flags: {}, ColumnCount: {}, Rows:",
            self.kind,
            self.table_id,
            self.table.full_name(),
            self.flags,
            self.columns_count,
        )?;
        for row in &self.rows {
            write!(f, " {}", row)?;
        }
        Ok(())
    }
}

// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use serde::{Deserialize, Serialize};

use std::{convert::TryFrom, fmt};

use crate::{
    constants::{ColumnType, UnknownColumnType},
    error::Result,
    io::ParseBuf,
};

/// Table map event.
///
/// In row-based mode, every row operation event is preceded by a Table_map_event which maps
/// a table definition to a number.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TableMapEvent {
    /// The number that identifies the table.
    ///
    /// It's 6 bytes long, so valid range is [0, 1<<48).
    pub table_id: u64,
    /// The name of the database in which the table resides (lossy converted).
    pub database_name: String,
    /// The name of the table (lossy converted).
    pub table_name: String,
    /// Number of columns in the table.
    pub columns_count: u64,
    /// The type of each column in the table, listed from left to right.
    pub columns_type: Vec<u8>,
}

impl TableMapEvent {
    pub fn read(body: &[u8]) -> Result<Self> {
        let mut buf = ParseBuf::new(body);
        let table_id = buf.eat_u48_le("table_id")?;
        // reserved flags
        buf.skip(2, "flags")?;

        let database_len = buf.eat_u8("database_name_len")?;
        let database_name = buf.eat(database_len as usize, "database_name")?;
        buf.skip(1, "database_name terminator")?;

        let table_len = buf.eat_u8("table_name_len")?;
        let table_name = buf.eat(table_len as usize, "table_name")?;
        buf.skip(1, "table_name terminator")?;

        let columns_count = buf.eat_lenenc_int("columns_count")?.unwrap_or(0);
        let columns_type = buf.eat(columns_count as usize, "columns_type")?.to_vec();

        // column metadata, null bitmask and optional metadata are not used
        if !buf.is_empty() {
            buf.eat_lenenc_str("columns_metadata")?;
        }

        Ok(Self {
            table_id,
            database_name: String::from_utf8_lossy(database_name).into_owned(),
            table_name: String::from_utf8_lossy(table_name).into_owned(),
            columns_count,
            columns_type,
        })
    }

    /// Returns `database.table`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database_name, self.table_name)
    }

    /// Returns the raw type of the given column.
    ///
    /// `None` means that the column index is out of range.
    pub fn column_type_raw(&self, col_idx: usize) -> Option<u8> {
        self.columns_type.get(col_idx).copied()
    }

    /// Returns a type of the given column.
    ///
    /// `None` means that the column index is out of range.
    pub fn get_column_type(
        &self,
        col_idx: usize,
    ) -> std::result::Result<Option<ColumnType>, UnknownColumnType> {
        self.column_type_raw(col_idx)
            .map(ColumnType::try_from)
            .transpose()
    }
}

impl fmt::Display for TableMapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TableID: {}, Table: {}, ColumnCount: {}, ColumnTypes: {:?}",
            self.table_id,
            self.full_name(),
            self.columns_count,
            self.columns_type,
        )
    }
}

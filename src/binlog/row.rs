// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Row image decoding.

use serde::{Deserialize, Serialize};
use tracing::warn;

use std::{collections::BTreeMap, convert::TryFrom, fmt};

use crate::{
    binlog::time::{format_timestamp2, PackedDate},
    constants::ColumnType,
    error::Result,
    io::ParseBuf,
    misc::{bit_count, bit_test, bitmap_len},
};

use super::events::TableMapEvent;

/// Decoded value of a binlog row column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinlogValue {
    Null,
    /// `LONG` and `LONGLONG` columns.
    UInt(u64),
    /// Strings and textual renderings of temporal columns.
    Text(String),
}

impl BinlogValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BinlogValue::Null)
    }

    /// Returns `true` if the non-null value renders exactly as `literal`.
    pub fn matches(&self, literal: &str) -> bool {
        match self {
            BinlogValue::Null => false,
            BinlogValue::UInt(x) => x.to_string() == literal,
            BinlogValue::Text(x) => x == literal,
        }
    }
}

impl fmt::Display for BinlogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinlogValue::Null => f.write_str("NULL"),
            BinlogValue::UInt(x) => x.fmt(f),
            BinlogValue::Text(x) => x.fmt(f),
        }
    }
}

/// Representation of a binlog row: column index to its value.
///
/// Columns of an unsupported type are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinlogRow {
    values: BTreeMap<usize, BinlogValue>,
}

impl BinlogRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of decoded columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value of the given column.
    ///
    /// `None` means that the column wasn't decoded.
    pub fn get(&self, column_index: usize) -> Option<&BinlogValue> {
        self.values.get(&column_index)
    }

    pub fn insert(&mut self, column_index: usize, value: BinlogValue) {
        self.values.insert(column_index, value);
    }

    /// Iterates `(column index, value)` in column order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &BinlogValue)> + '_ {
        self.values.iter().map(|(idx, value)| (*idx, value))
    }
}

impl FromIterator<(usize, BinlogValue)> for BinlogRow {
    fn from_iter<T: IntoIterator<Item = (usize, BinlogValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for BinlogRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (idx, value)) in self.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}@{}={}", sep, idx, value)?;
        }
        f.write_str(" ]")
    }
}

/// Decodes row images until the buffer is exhausted.
///
/// * `field_count` - number of columns in each image,
/// * `presence` - bit per column, unset columns are `NULL` and take no space,
/// * `table` - provides column types.
pub fn read_rows(
    buf: &mut ParseBuf<'_>,
    field_count: u64,
    presence: &[u8],
    table: &TableMapEvent,
) -> Result<Vec<BinlogRow>> {
    let null_bitmap_len = bitmap_len(bit_count(presence));
    let mut rows = Vec::new();

    while !buf.is_empty() {
        let row_start = buf.offset();
        let row = read_row(buf, field_count, presence, null_bitmap_len, table)?;

        if buf.offset() == row_start {
            // nothing is present, so the rest of the buffer can't be split into images
            warn!(
                "{} trailing bytes after an empty row image of `{}`",
                buf.len(),
                table.full_name()
            );
            buf.eat_all();
        }

        rows.push(row);
    }

    Ok(rows)
}

fn read_row(
    buf: &mut ParseBuf<'_>,
    field_count: u64,
    presence: &[u8],
    null_bitmap_len: usize,
    table: &TableMapEvent,
) -> Result<BinlogRow> {
    let null_bitmap = buf.eat(null_bitmap_len, "null_bitmap")?;
    let mut row = BinlogRow::new();
    let mut present_idx = 0;

    for idx in 0..field_count as usize {
        if !bit_test(presence, idx) {
            row.insert(idx, BinlogValue::Null);
            continue;
        }

        let is_null = bit_test(null_bitmap, present_idx);
        present_idx += 1;

        if is_null {
            row.insert(idx, BinlogValue::Null);
        } else if let Some(value) = read_value(buf, table, idx)? {
            row.insert(idx, value);
        }
    }

    Ok(row)
}

/// Reads a non-null value of the given column. Returns `None` for unsupported column types.
fn read_value(
    buf: &mut ParseBuf<'_>,
    table: &TableMapEvent,
    idx: usize,
) -> Result<Option<BinlogValue>> {
    let raw_type = match table.column_type_raw(idx) {
        Some(raw_type) => raw_type,
        None => {
            warn!(
                "column {} is out of range of table `{}` ({} columns)",
                idx,
                table.full_name(),
                table.columns_count
            );
            return Ok(None);
        }
    };

    let value = match ColumnType::try_from(raw_type) {
        Ok(ColumnType::MYSQL_TYPE_LONGLONG) => BinlogValue::UInt(buf.eat_u64_le("LONGLONG")?),
        Ok(ColumnType::MYSQL_TYPE_LONG) => BinlogValue::UInt(buf.eat_u32_le("LONG")? as u64),
        Ok(ColumnType::MYSQL_TYPE_STRING) => match buf.eat_lenenc_str("STRING")? {
            Some(bytes) => BinlogValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            None => BinlogValue::Null,
        },
        Ok(ColumnType::MYSQL_TYPE_TIMESTAMP2) => {
            let secs = buf.eat_u32_be("TIMESTAMP2")?;
            let frac = buf.eat_u24_be("TIMESTAMP2 fraction")?;
            BinlogValue::Text(format_timestamp2(secs, frac))
        }
        Ok(ColumnType::MYSQL_TYPE_DATE) => match PackedDate::from_packed(buf.eat_u24_le("DATE")?)
        {
            Some(date) => BinlogValue::Text(date.to_string()),
            None => BinlogValue::Null,
        },
        _ => {
            warn!(
                "unsupported column type {} of `{}` column {}",
                raw_type,
                table.full_name(),
                idx
            );
            return Ok(None);
        }
    };

    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, io::WriteMysqlExt};

    fn table(columns_type: Vec<u8>) -> TableMapEvent {
        TableMapEvent {
            table_id: 1,
            database_name: "shop".into(),
            table_name: "orders".into(),
            columns_count: columns_type.len() as u64,
            columns_type,
        }
    }

    #[test]
    fn should_decode_present_null_column() {
        let table = table(vec![
            ColumnType::MYSQL_TYPE_LONG as u8,
            ColumnType::MYSQL_TYPE_STRING as u8,
        ]);
        // null bitmap: second present column is null
        let image = [0b0000_0010, 42, 0, 0, 0];

        let rows = read_rows(&mut ParseBuf::new(&image), 2, &[0b11], &table).unwrap();
        let expected: BinlogRow = vec![(0, BinlogValue::UInt(42)), (1, BinlogValue::Null)]
            .into_iter()
            .collect();
        assert_eq!(rows, vec![expected]);
        assert_eq!(rows[0].to_string(), "[ @0=42, @1=NULL ]");
    }

    #[test]
    fn should_not_consume_absent_columns() {
        let table = table(vec![
            ColumnType::MYSQL_TYPE_LONG as u8,
            ColumnType::MYSQL_TYPE_LONGLONG as u8,
            ColumnType::MYSQL_TYPE_LONG as u8,
        ]);
        // column 1 is absent, its null bit would claim `NULL` for column 2 if indexed by column
        let image = [0b0000_0010, 7, 0, 0, 0];

        let mut buf = ParseBuf::new(&image);
        let rows = read_rows(&mut buf, 3, &[0b101], &table).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), Some(&BinlogValue::UInt(7)));
        assert_eq!(rows[0].get(1), Some(&BinlogValue::Null));
        assert_eq!(rows[0].get(2), Some(&BinlogValue::Null));
        assert!(buf.is_empty());
    }

    #[test]
    fn should_decode_multiple_images() {
        let table = table(vec![
            ColumnType::MYSQL_TYPE_LONGLONG as u8,
            ColumnType::MYSQL_TYPE_STRING as u8,
        ]);
        let mut image = Vec::new();
        for (id, name) in &[(1_u64, "one"), (2, "two")] {
            image.push(0);
            image.extend_from_slice(&id.to_le_bytes());
            image.write_lenenc_str(name.as_bytes()).unwrap();
        }

        let rows = read_rows(&mut ParseBuf::new(&image), 2, &[0b11], &table).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get(0), Some(&BinlogValue::UInt(2)));
        assert_eq!(rows[1].get(1), Some(&BinlogValue::Text("two".into())));
    }

    #[test]
    fn should_decode_temporal_columns() {
        let table = table(vec![
            ColumnType::MYSQL_TYPE_TIMESTAMP2 as u8,
            ColumnType::MYSQL_TYPE_DATE as u8,
            ColumnType::MYSQL_TYPE_DATE as u8,
        ]);
        let mut image = vec![0];
        image.extend_from_slice(&1_600_000_000_u32.to_be_bytes());
        image.extend_from_slice(&[0x00, 0x00, 0x78]);
        let date: u32 = 2021 * 512 + 3 * 32 + 9;
        image.extend_from_slice(&date.to_le_bytes()[..3]);
        image.extend_from_slice(&[0, 0, 0]);

        let rows = read_rows(&mut ParseBuf::new(&image), 3, &[0b111], &table).unwrap();
        assert_eq!(
            rows[0].get(0),
            Some(&BinlogValue::Text("2020-09-13 12:26:40.120".into()))
        );
        assert_eq!(rows[0].get(1), Some(&BinlogValue::Text("2021-03-09".into())));
        assert_eq!(rows[0].get(2), Some(&BinlogValue::Null));
    }

    #[test]
    fn should_skip_unsupported_column_types() {
        let table = table(vec![
            ColumnType::MYSQL_TYPE_DOUBLE as u8,
            ColumnType::MYSQL_TYPE_LONG as u8,
        ]);
        let image = [0, 5, 0, 0, 0];

        let rows = read_rows(&mut ParseBuf::new(&image), 2, &[0b11], &table).unwrap();
        assert_eq!(rows[0].get(0), None);
        assert_eq!(rows[0].get(1), Some(&BinlogValue::UInt(5)));
        assert_eq!(rows[0].len(), 1);
    }

    #[test]
    fn should_fail_on_truncated_image() {
        let table = table(vec![ColumnType::MYSQL_TYPE_LONGLONG as u8]);
        let image = [0, 1, 2, 3];
        assert!(matches!(
            read_rows(&mut ParseBuf::new(&image), 1, &[0b1], &table),
            Err(Error::ShortBuffer {
                field: "LONGLONG",
                needed: 8,
                available: 3,
                ..
            })
        ));
    }

    #[test]
    fn should_match_literals() {
        assert!(BinlogValue::UInt(42).matches("42"));
        assert!(BinlogValue::Text("42".into()).matches("42"));
        assert!(!BinlogValue::Null.matches("NULL"));
        assert!(!BinlogValue::UInt(42).matches("042"));
    }

    #[test]
    fn should_serialize_rows_as_json_objects() {
        let row: BinlogRow = vec![(0, BinlogValue::UInt(1)), (1, BinlogValue::Null)]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"0":1,"1":null}"#);
        assert_eq!(serde_json::from_str::<BinlogRow>(&json).unwrap(), row);
    }
}

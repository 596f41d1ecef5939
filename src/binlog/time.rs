// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Textual renderings of binlog time values.

use chrono::{NaiveDateTime, TimeZone, Utc};

use std::fmt;

/// Format of a datetime in requests and decoded rows.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders unix seconds as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_timestamp(secs: u32) -> String {
    match Utc.timestamp_opt(secs as i64, 0).single() {
        Some(datetime) => datetime.format(DATETIME_FORMAT).to_string(),
        None => secs.to_string(),
    }
}

/// Renders a `TIMESTAMP2` value. The fractional part is printed as a bare integer.
pub fn format_timestamp2(secs: u32, frac: u32) -> String {
    format!("{}.{}", format_timestamp(secs), frac)
}

/// Packed 3-byte `DATE` value: `day | month << 5 | year << 9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedDate {
    pub year: u32,
    pub month: u32,
    pub day: u32,
}

impl PackedDate {
    /// Returns `None` for the zero value which stands for an unset date.
    pub fn from_packed(packed: u32) -> Option<Self> {
        if packed == 0 {
            return None;
        }
        Some(Self {
            year: packed / (16 * 32),
            month: packed / 32 % 16,
            day: packed % 32,
        })
    }
}

impl fmt::Display for PackedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS` as UTC and returns unix seconds.
pub fn parse_datetime(input: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(input.trim(), DATETIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
}

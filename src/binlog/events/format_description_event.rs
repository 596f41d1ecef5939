// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use serde::{Deserialize, Serialize};

use std::{borrow::Cow, fmt};

use crate::{binlog::time::format_timestamp, error::Result, io::ParseBuf};

/// A format description event is the first event of a binlog for binlog-version 4.
///
/// It describes how the other events are layed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatDescriptionEvent {
    /// Version of this binlog format.
    pub binlog_version: u16,
    /// Version of the MySQL Server that created the binlog (len=50).
    ///
    /// The string is evaluated to apply work-arounds in the slave.
    pub server_version: Vec<u8>,
    /// Seconds since Unix epoch when the binlog was created.
    pub create_timestamp: u32,
}

impl FormatDescriptionEvent {
    pub const SERVER_VER_LEN: usize = 50;

    pub fn read(body: &[u8]) -> Result<Self> {
        let mut buf = ParseBuf::new(body);
        let binlog_version = buf.eat_u16_le("binlog_version")?;
        let server_version = buf.eat(Self::SERVER_VER_LEN, "server_version")?.to_vec();
        let create_timestamp = buf.eat_u32_le("create_timestamp")?;
        // event header length, not used by the decoder
        buf.skip(1, "event_header_length")?;

        Ok(Self {
            binlog_version,
            server_version,
            create_timestamp,
        })
    }

    /// Returns the `server_version` field value as a string (lossy converted),
    /// truncated at the first `\0`.
    pub fn server_version(&self) -> Cow<'_, str> {
        let end = self
            .server_version
            .iter()
            .position(|x| *x == 0)
            .unwrap_or(self.server_version.len());
        String::from_utf8_lossy(&self.server_version[..end])
    }
}

impl fmt::Display for FormatDescriptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BinlogVersion: {}, ServerVersion: {}, CreateTime: {}",
            self.binlog_version,
            self.server_version(),
            format_timestamp(self.create_timestamp),
        )
    }
}

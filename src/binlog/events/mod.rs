// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::{error::Result, io::ParseBuf};

pub use self::{
    format_description_event::FormatDescriptionEvent,
    gtid_event::GtidEvent,
    previous_gtids_event::PreviousGtidsEvent,
    query_event::QueryEvent,
    rotate_event::RotateEvent,
    rows_event::{RowsEvent, RowsEventKind},
    table_map_event::TableMapEvent,
};

mod format_description_event;
mod gtid_event;
mod previous_gtids_event;
mod query_event;
mod rotate_event;
mod rows_event;
mod table_map_event;

/// A stop event is written to the log files under these circumstances:
///
/// *   A master writes the event to the binary log when it shuts down.
/// *   A slave writes the event to the relay log when it shuts down or when a
///     `RESET SLAVE` statement is executed.
///
/// The body is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StopEvent {
    pub raw: Vec<u8>,
}

impl StopEvent {
    pub fn read(body: &[u8]) -> Self {
        Self { raw: body.to_vec() }
    }
}

impl fmt::Display for StopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Stop")
    }
}

/// Xid event. Generated for a commit of a transaction that modifies one or more tables
/// of an XA-capable storage engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XidEvent {
    /// XID. Assigned by the storage engine.
    pub xid: u64,
}

impl XidEvent {
    pub fn read(body: &[u8]) -> Result<Self> {
        let mut buf = ParseBuf::new(body);
        Ok(Self {
            xid: buf.eat_u64_le("xid")?,
        })
    }
}

impl fmt::Display for XidEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Xid: {}", self.xid)
    }
}

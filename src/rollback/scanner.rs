// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Backward search for the transaction that touched a row.

use tracing::trace;

use std::sync::Arc;

use crate::{
    binlog::{event_type_name, Event},
    error::{Error, Result},
};

use super::RollbackQuery;

/// Events of a transaction, newest first.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub events: Vec<Arc<Event>>,
    /// `true` if a rows event of the transaction touched the requested row.
    pub matched: bool,
}

/// Fails with [`Error::IncompleteSync`] unless events up to `end_time` are replicated.
pub fn check_synced(newest: Option<u32>, end_time: i64) -> Result<()> {
    match newest {
        Some(newest) if newest as i64 >= end_time => Ok(()),
        newest => Err(Error::IncompleteSync {
            newest: newest.map(i64::from).unwrap_or(0),
            end: end_time,
        }),
    }
}

/// Walks `history` (oldest first) from the newest event back to `query.start_time`.
/// Events without a timestamp are passed over.
///
/// A GTID event ends the walk if the events collected after it touched the row with
/// `query`'s primary key value in column `pk_index`; otherwise collection starts over
/// from the GTID event.
pub fn scan(history: &[Arc<Event>], query: &RollbackQuery, pk_index: usize) -> Capture {
    let pk_value = query.primary_key().map(|field| field.value.as_str());
    let mut capture = Capture::default();

    for event in history.iter().rev() {
        // file boundaries inside the window
        if !event.has_time() {
            continue;
        }

        let timestamp = event.timestamp() as i64;
        if timestamp > query.end_time {
            continue;
        }
        if timestamp < query.start_time {
            trace!("scan reached {} before the window start", timestamp);
            break;
        }

        if let (Some(rows), Some(pk_value)) = (event.as_rows(), pk_value) {
            if rows.is_table(&query.schema, &query.table)
                && rows
                    .rows
                    .iter()
                    .any(|row| row.get(pk_index).map_or(false, |v| v.matches(pk_value)))
            {
                capture.matched = true;
            }
        }

        if event.is_gtid() {
            if capture.matched {
                break;
            }
            capture.events.clear();
        }

        capture.events.push(event.clone());
    }

    capture
}

/// Checks that the newest captured event is a GTID event and the oldest one is a XID event.
pub fn check_bounds(events: &[Arc<Event>]) -> Result<()> {
    match (events.first(), events.last()) {
        (Some(newest), Some(oldest)) if newest.is_gtid() && oldest.is_xid() => Ok(()),
        (newest, oldest) => {
            let name = |event: Option<&Arc<Event>>| {
                event
                    .map(|e| event_type_name(e.event_type()))
                    .unwrap_or_else(|| "nothing".into())
            };
            Err(Error::MalformedTransactionBounds {
                newest: name(newest),
                oldest: name(oldest),
            })
        }
    }
}

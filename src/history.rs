// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use parking_lot::RwLock;

use std::sync::Arc;

use crate::binlog::Event;

/// Append-only sequence of decoded events in wire order.
///
/// Appends and snapshots hold the lock only for the copy of the `Arc`s, so
/// rollback queries never block the replication loop for long.
#[derive(Debug, Default)]
pub struct EventHistory {
    events: RwLock<Vec<Arc<Event>>>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<I: IntoIterator<Item = Event>>(events: I) -> Self {
        Self {
            events: RwLock::new(events.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn append(&self, event: Event) {
        self.events.write().push(Arc::new(event));
    }

    pub fn extend<I: IntoIterator<Item = Event>>(&self, events: I) {
        self.events.write().extend(events.into_iter().map(Arc::new));
    }

    /// Returns the events appended so far, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        self.events.read().clone()
    }

    /// Timestamp of the most recent event that has one.
    pub fn newest_timestamp(&self) -> Option<u32> {
        self.events
            .read()
            .iter()
            .rev()
            .find(|event| event.has_time())
            .map(|event| event.timestamp())
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

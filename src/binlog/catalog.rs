// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::{collections::HashMap, sync::Arc};

use crate::error::{Error, Result};

use super::events::TableMapEvent;

/// Table id to the most recently seen table map.
///
/// Entries live for the whole replication session. A table id reused after DDL
/// overwrites the previous entry.
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    tables: HashMap<u64, Arc<TableMapEvent>>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the table map. Returns the superseded one, if any.
    pub fn insert(&mut self, table: Arc<TableMapEvent>) -> Option<Arc<TableMapEvent>> {
        self.tables.insert(table.table_id, table)
    }

    pub fn get(&self, table_id: u64) -> Option<&Arc<TableMapEvent>> {
        self.tables.get(&table_id)
    }

    /// Same as [`TableCatalog::get`] but fails with [`Error::UnknownTableId`].
    pub fn resolve(&self, table_id: u64) -> Result<Arc<TableMapEvent>> {
        self.get(table_id)
            .cloned()
            .ok_or(Error::UnknownTableId { table_id })
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! MySql binlog replication client that can undo captured transactions.
//!
//! A [`ReplicationSession`] requests a binlog dump from the source and decodes the
//! stream with an [`EventDispatcher`]. Decoded events are handed to an
//! [`EventSink`], usually the shared [`EventHistory`] and a [`JsonSyncer`] that
//! persists them per binlog file.
//!
//! [`Rollback`] answers [`RollbackQuery`]s against the history. It walks the history
//! backwards to the newest transaction that touched a row with the given primary
//! key value and builds statements that compensate every row change of it:
//!
//! * inserted rows are deleted,
//! * deleted rows are inserted back,
//! * updates are not supported.
//!
//! The [`server`] module exposes `GET` and `ROLLBACK` over a line-oriented TCP
//! protocol.
//!
//! Connection setup and SQL execution against the source are provided by the
//! caller through the [`Transport`] and [`SourceConnection`] traits.

pub mod binlog;
pub mod config;
pub mod constants;
pub mod error;
pub mod history;
pub mod io;
pub mod misc;
pub mod persist;
pub mod proto;
pub mod replication;
pub mod rollback;
pub mod schema;
pub mod server;

pub use crate::{
    binlog::{Event, EventData, EventDispatcher},
    config::Config,
    error::{Error, Result},
    history::EventHistory,
    persist::{load_history, JsonSyncer},
    proto::{BinlogPosition, SourceConnection, Transport},
    replication::{EventSink, ReplicationSession},
    rollback::{Rollback, RollbackQuery},
    schema::SchemaCatalog,
};

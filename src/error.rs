// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::io;

/// Boxed error returned by external collaborators (SQL execution, transports).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors of this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A decode step needs more bytes than are available.
    #[error(
        "can't parse `{}` at offset {}: need {} bytes, {} available",
        field,
        offset,
        needed,
        available
    )]
    ShortBuffer {
        field: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("header size too short {}, must be at least 19", len)]
    HeaderTooShort { len: usize },
    #[error("invalid event size {}, must be >= 19", size)]
    InvalidEventSize { size: u32 },
    #[error("invalid length-encoded integer prefix {:#04x}", _0)]
    InvalidLengthEncodedInt(u8),
    #[error("rows event references unknown table id {}", table_id)]
    UnknownTableId { table_id: u64 },
    #[error("unknown event type {}", _0)]
    UnknownEventType(u8),
    #[error("unsupported event kind {}", event_type)]
    UnsupportedEventKind { event_type: u8 },
    #[error(
        "binlog is synced up to {}, which is before the requested end {}",
        newest,
        end
    )]
    IncompleteSync { newest: i64, end: i64 },
    #[error("no transaction in the requested window touches the given row")]
    TransactionNotFound,
    #[error(
        "captured transaction must end with a GTID event and start with a XID event, got {} .. {}",
        newest,
        oldest
    )]
    MalformedTransactionBounds { newest: String, oldest: String },
    #[error("rollback of event type {} is not supported", event_type)]
    RollbackUnsupported { event_type: u8 },
    #[error(
        "table `{}` has {} columns but the rows event carries {}",
        table,
        expected,
        actual
    )]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        actual: u64,
    },
    #[error("row of `{}` has no decoded columns to build a statement from", table)]
    UndecodedRow { table: String },
    #[error("table `{}` has no column `{}`", table, column)]
    UnknownColumn { table: String, column: String },
    #[error("statement `{}` failed: {}", statement, cause)]
    Sql {
        statement: String,
        #[source]
        cause: BoxError,
    },
    #[error("binlog position {} is out of range", position)]
    PositionOutOfRange { position: u64 },
    #[error("replication source error: {}", _0)]
    Server(String),
    #[error("packets out of sync: expected sequence id {}, got {}", expected, actual)]
    PacketsOutOfSync { expected: u8, actual: u8 },
    #[error("bad request: {}", _0)]
    Request(String),
    #[error("persisted binlog error: {}", _0)]
    Persist(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Returns `true` if the error means subsequent packet boundaries can't be trusted.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::HeaderTooShort { .. }
                | Error::InvalidEventSize { .. }
                | Error::PacketsOutOfSync { .. }
                | Error::Io(_)
        )
    }

    pub(crate) fn sql<E: Into<BoxError>>(statement: impl Into<String>, cause: E) -> Self {
        Error::Sql {
            statement: statement.into(),
            cause: cause.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_report_offsets_in_short_buffer() {
        let err = Error::ShortBuffer {
            field: "table_id",
            offset: 0,
            needed: 6,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "can't parse `table_id` at offset 0: need 6 bytes, 2 available"
        );
        assert!(!err.is_session_fatal());
        assert!(Error::HeaderTooShort { len: 3 }.is_session_fatal());
    }
}

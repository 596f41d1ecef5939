// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Undoing a captured transaction.
//!
//! A [`RollbackQuery`] names a row by its primary key value and a time window.
//! The newest transaction in the window that touched the row is captured from the
//! [`EventHistory`], and every row change of it is compensated by a statement
//! executed against the source in a single transaction.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    binlog::Event,
    error::{Error, Result},
    history::EventHistory,
    proto::SourceConnection,
    schema::SchemaCatalog,
};

pub use self::{
    scanner::Capture,
    statement::{compensate, literal, quote_ident, quote_text},
};

pub mod scanner;
pub mod statement;

/// `name=value` argument of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Locates a row change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RollbackQuery {
    pub schema: String,
    pub table: String,
    /// The first field is the primary key predicate.
    pub fields: Vec<Field>,
    /// Window start, seconds since unix epoch.
    pub start_time: i64,
    /// Window end, seconds since unix epoch.
    pub end_time: i64,
}

impl RollbackQuery {
    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.first()
    }
}

impl fmt::Display for RollbackQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema: {} table: {} [", self.schema, self.table)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            field.fmt(f)?;
        }
        write!(f, "] {}..{}", self.start_time, self.end_time)
    }
}

/// Answers rollback queries against the event history.
///
/// Owns the connection compensating statements run on. Rollbacks are serialized
/// by the connection lock.
pub struct Rollback {
    conn: Mutex<Box<dyn SourceConnection>>,
    schema: Arc<SchemaCatalog>,
    history: Arc<EventHistory>,
}

impl fmt::Debug for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rollback")
            .field("schema", &self.schema)
            .field("history", &self.history.len())
            .finish()
    }
}

impl Rollback {
    pub fn new(
        conn: Box<dyn SourceConnection>,
        schema: Arc<SchemaCatalog>,
        history: Arc<EventHistory>,
    ) -> Self {
        Self {
            conn: Mutex::new(conn),
            schema,
            history,
        }
    }

    /// Returns the captured transaction, newest event first.
    pub fn capture(&self, query: &RollbackQuery) -> Result<Vec<Arc<Event>>> {
        let mut conn = self.conn.lock();
        self.capture_with(&mut **conn, query)
    }

    /// Returns compensating statements in execution order without executing them.
    pub fn plan(&self, query: &RollbackQuery) -> Result<Vec<String>> {
        let mut conn = self.conn.lock();
        let events = self.capture_with(&mut **conn, query)?;
        self.synthesize(&mut **conn, &events)
    }

    /// Executes compensating statements in one transaction. Returns the executed statements.
    pub fn rollback(&self, query: &RollbackQuery) -> Result<Vec<String>> {
        let mut conn = self.conn.lock();
        let events = self.capture_with(&mut **conn, query)?;
        let statements = self.synthesize(&mut **conn, &events)?;
        execute(&mut **conn, &statements)?;
        info!(
            "rolled back {} statements for {}",
            statements.len(),
            query
        );
        Ok(statements)
    }

    fn capture_with(
        &self,
        conn: &mut dyn SourceConnection,
        query: &RollbackQuery,
    ) -> Result<Vec<Arc<Event>>> {
        scanner::check_synced(self.history.newest_timestamp(), query.end_time)?;

        let pk = query
            .primary_key()
            .ok_or_else(|| Error::Request("primary key field is required".into()))?;
        let columns = self
            .schema
            .resolve_column_names(conn, &query.schema, &query.table)?;
        let pk_index = columns
            .iter()
            .position(|name| *name == pk.name)
            .ok_or_else(|| Error::UnknownColumn {
                table: format!("{}.{}", query.schema, query.table),
                column: pk.name.clone(),
            })?;

        let capture = scanner::scan(&self.history.snapshot(), query, pk_index);
        if !capture.matched {
            return Err(Error::TransactionNotFound);
        }
        scanner::check_bounds(&capture.events)?;

        debug!("captured {} events for {}", capture.events.len(), query);
        Ok(capture.events)
    }

    fn synthesize(
        &self,
        conn: &mut dyn SourceConnection,
        events: &[Arc<Event>],
    ) -> Result<Vec<String>> {
        let mut names: HashMap<u64, Vec<String>> = HashMap::new();
        let mut statements = Vec::new();

        for rows in events.iter().filter_map(|event| event.as_rows()) {
            if !names.contains_key(&rows.table_id) {
                let columns = self.schema.resolve_column_names(
                    conn,
                    rows.database_name(),
                    rows.table_name(),
                )?;
                names.insert(rows.table_id, columns);
            }
            let columns = names.get(&rows.table_id).map(Vec::as_slice).unwrap_or(&[]);
            statements.extend(compensate(rows, columns)?);
        }

        Ok(statements)
    }
}

/// Runs `statements` in a transaction. Any failure rolls the transaction back.
pub fn execute(conn: &mut dyn SourceConnection, statements: &[String]) -> Result<()> {
    conn.begin().map_err(|err| Error::sql("BEGIN", err))?;

    for statement in statements {
        debug!("executing {}", statement);
        if let Err(err) = conn.execute(statement) {
            abort(conn);
            return Err(Error::sql(statement.as_str(), err));
        }
    }

    if let Err(err) = conn.commit() {
        abort(conn);
        return Err(Error::sql("COMMIT", err));
    }

    Ok(())
}

fn abort(conn: &mut dyn SourceConnection) {
    if let Err(err) = conn.rollback() {
        warn!("rollback of compensating transaction failed: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binlog::RowsEventKind,
        proto::tests::MockConnection,
        schema::ColumnDef,
    };

    use super::scanner::tests::{gtid, query, rotate, rows, xid};

    fn schema() -> Arc<SchemaCatalog> {
        let schema = SchemaCatalog::new();
        schema.set_columns(
            "shop",
            "orders",
            vec![
                ColumnDef::new("id", "int(10) unsigned"),
                ColumnDef::new("name", "varchar(32)"),
            ],
        );
        Arc::new(schema)
    }

    fn history() -> Arc<EventHistory> {
        let history = EventHistory::new();
        for event in vec![
            xid(10, 1),
            rows(RowsEventKind::Write, 10, 1, "a"),
            rows(RowsEventKind::Delete, 10, 9, "it's"),
            gtid(10, 3),
            xid(11, 4),
            rows(RowsEventKind::Write, 11, 2, "b"),
            gtid(11, 6),
        ] {
            history.append((*event).clone());
        }
        Arc::new(history)
    }

    /// Keeps the mock reachable after it is boxed.
    struct Shared(Arc<Mutex<MockConnection>>);

    impl SourceConnection for Shared {
        fn begin(&mut self) -> std::result::Result<(), crate::error::BoxError> {
            self.0.lock().begin()
        }

        fn execute(&mut self, statement: &str) -> std::result::Result<(), crate::error::BoxError> {
            self.0.lock().execute(statement)
        }

        fn commit(&mut self) -> std::result::Result<(), crate::error::BoxError> {
            self.0.lock().commit()
        }

        fn rollback(&mut self) -> std::result::Result<(), crate::error::BoxError> {
            self.0.lock().rollback()
        }

        fn query_columns(
            &mut self,
            query: &str,
        ) -> std::result::Result<Vec<crate::schema::ColumnRow>, crate::error::BoxError> {
            self.0.lock().query_columns(query)
        }
    }

    fn rollback(conn: MockConnection) -> (Rollback, Arc<Mutex<MockConnection>>) {
        let conn = Arc::new(Mutex::new(conn));
        let rollback = Rollback::new(Box::new(Shared(conn.clone())), schema(), history());
        (rollback, conn)
    }

    const UNDO_WRITE: &str = "DELETE FROM `shop`.`orders` WHERE `id` = 1 AND `name` = 'a'";
    const UNDO_DELETE: &str =
        "INSERT INTO `shop`.`orders` (`id`, `name`) VALUES (9, 'it\\'s')";

    #[test]
    fn should_capture_transaction() {
        let (rollback, _) = rollback(MockConnection::default());
        let events = rollback.capture(&query("1", 0, 11)).unwrap();
        assert_eq!(events.len(), 4);
        assert!(events[0].is_gtid());
        assert!(events[3].is_xid());
    }

    #[test]
    fn should_plan_in_capture_order() {
        let (rollback, conn) = rollback(MockConnection::default());
        let plan = rollback.plan(&query("9", 0, 11)).unwrap();
        assert_eq!(plan, vec![UNDO_DELETE, UNDO_WRITE]);
        assert_eq!(plan, rollback.plan(&query("9", 0, 11)).unwrap());
        assert!(conn.lock().log.is_empty());
    }

    #[test]
    fn should_execute_in_one_transaction() {
        let (rollback, conn) = rollback(MockConnection::default());
        let statements = rollback.rollback(&query("1", 0, 11)).unwrap();
        assert_eq!(statements, vec![UNDO_DELETE, UNDO_WRITE]);
        assert_eq!(
            conn.lock().log,
            vec!["BEGIN", UNDO_DELETE, UNDO_WRITE, "COMMIT"]
        );
    }

    #[test]
    fn should_roll_back_on_failure() {
        let (rollback, conn) = rollback(MockConnection {
            fail_on: Some(UNDO_DELETE.into()),
            ..Default::default()
        });
        match rollback.rollback(&query("1", 0, 11)) {
            Err(Error::Sql { statement, cause }) => {
                assert_eq!(statement, UNDO_DELETE);
                assert!(cause.to_string().contains("Duplicate entry"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(conn.lock().log, vec!["BEGIN", UNDO_DELETE, "ROLLBACK"]);
    }

    #[test]
    fn should_refuse_unsynced_window() {
        let (rollback, conn) = rollback(MockConnection::default());
        assert!(matches!(
            rollback.rollback(&query("1", 0, 12)),
            Err(Error::IncompleteSync {
                newest: 11,
                end: 12
            })
        ));
        assert!(conn.lock().log.is_empty());
        assert!(conn.lock().queries.is_empty());
    }

    #[test]
    fn should_treat_history_ending_in_new_file_as_synced() {
        let (rollback, _) = rollback(MockConnection::default());
        rollback
            .history
            .append((*rotate(0, "mysql-bin.000002")).clone());
        let events = rollback.capture(&query("1", 0, 11)).unwrap();
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn should_report_missing_transaction() {
        let (rollback, _) = rollback(MockConnection::default());
        assert!(matches!(
            rollback.capture(&query("77", 0, 11)),
            Err(Error::TransactionNotFound)
        ));

        let mut unknown = query("1", 0, 11);
        unknown.fields[0].name = "uuid".into();
        assert!(matches!(
            rollback.capture(&unknown),
            Err(Error::UnknownColumn { .. })
        ));
    }

    #[test]
    fn should_display_query() {
        assert_eq!(
            query("1", 0, 11).to_string(),
            "schema: shop table: orders [id=1 name=x] 0..11"
        );
    }
}

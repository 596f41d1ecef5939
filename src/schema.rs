// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Column names of the replicated tables.
//!
//! Table maps carry column types only, so compensating statements take column
//! names from this catalog. It is seeded once from `information_schema` and
//! loses entries on DDL; lost entries are fetched again when needed.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use std::collections::HashMap;

use crate::{
    binlog::TableMapEvent,
    error::{Error, Result},
    proto::SourceConnection,
    rollback::statement::quote_text,
};

lazy_static! {
    static ref TABLE_DDL: Regex = {
        Regex::new(
            r"(?is)^\s*(?:CREATE|ALTER|DROP|RENAME|TRUNCATE)\s+(?:TEMPORARY\s+)?TABLE\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?(?:`?(\w+)`?\s*\.\s*)?`?(\w+)`?",
        )
        .unwrap()
    };
    static ref RENAME_PAIR: Regex = {
        Regex::new(
            r"(?is)(?:^\s*RENAME\s+TABLES?|,)\s*(?:`?(\w+)`?\s*\.\s*)?`?(\w+)`?\s+TO\s+(?:`?(\w+)`?\s*\.\s*)?`?(\w+)`?",
        )
        .unwrap()
    };
    static ref ALTER_RENAME: Regex = {
        Regex::new(r"(?is)\bRENAME\s+(?:(TO|AS)\s+)?(?:`?(\w+)`?\s*\.\s*)?`?(\w+)`?").unwrap()
    };
    static ref SCHEMA_DDL: Regex = {
        Regex::new(
            r"(?is)^\s*(?:CREATE|DROP)\s+(?:DATABASE|SCHEMA)\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?`?(\w+)`?",
        )
        .unwrap()
    };
}

/// System schemas are never captured.
pub const SYSTEM_SCHEMAS: &[&str] = &["mysql", "information_schema", "performance_schema", "sys"];

/// One row of an `information_schema.COLUMNS` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub schema: String,
    pub table: String,
    pub column_name: String,
    pub column_type: String,
}

impl ColumnRow {
    pub fn new(schema: &str, table: &str, column_name: &str, column_type: &str) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column_name: column_name.into(),
            column_type: column_type.into(),
        }
    }
}

/// Column definition as reported by `information_schema`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// Full column type, e.g. `bigint(20) unsigned`.
    pub column_type: String,
    pub unsigned: bool,
}

impl ColumnDef {
    pub fn new(name: &str, column_type: &str) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            unsigned: column_type.to_ascii_lowercase().contains("unsigned"),
        }
    }
}

/// A DDL statement that makes cached columns stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ddl {
    Table { schema: String, table: String },
    /// Old and new `(schema, table)` names of renamed tables.
    Renamed(Vec<(String, String)>),
    Schema(String),
}

impl Ddl {
    /// Classifies `statement`. Unqualified table names resolve against `default_schema`.
    pub fn parse(default_schema: &str, statement: &str) -> Option<Self> {
        if let Some(caps) = SCHEMA_DDL.captures(statement) {
            return Some(Ddl::Schema(caps[1].to_owned()));
        }

        let qualified = |schema: Option<regex::Match<'_>>, table: &str| {
            (
                schema.map_or(default_schema, |m| m.as_str()).to_owned(),
                table.to_owned(),
            )
        };

        let renamed = if starts_with_keyword(statement, "RENAME") {
            RENAME_PAIR.captures_iter(statement).collect::<Vec<_>>()
        } else {
            Vec::new()
        };
        let renamed = renamed
            .into_iter()
            .flat_map(|caps| {
                vec![
                    qualified(caps.get(1), &caps[2]),
                    qualified(caps.get(3), &caps[4]),
                ]
            })
            .collect::<Vec<_>>();
        if !renamed.is_empty() {
            return Some(Ddl::Renamed(renamed));
        }

        let caps = TABLE_DDL.captures(statement)?;
        let (schema, table) = qualified(caps.get(1), &caps[2]);

        if starts_with_keyword(statement, "ALTER") {
            let rest = &statement[caps.get(0).map_or(0, |m| m.end())..];
            let target = ALTER_RENAME.captures_iter(rest).find(|found| {
                // `RENAME COLUMN|INDEX|KEY` keep the table name
                found.get(1).is_some()
                    || !["COLUMN", "INDEX", "KEY"]
                        .iter()
                        .any(|kw| found[3].eq_ignore_ascii_case(kw))
            });
            if let Some(target) = target {
                return Some(Ddl::Renamed(vec![
                    (schema, table),
                    qualified(target.get(2), &target[3]),
                ]));
            }
        }

        Some(Ddl::Table { schema, table })
    }
}

/// `schema.table` to its columns in ordinal order.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    tables: RwLock<HashMap<String, Vec<ColumnDef>>>,
}

impl SchemaCatalog {
    /// Columns of every non-system table.
    pub const BOOTSTRAP_QUERY: &'static str = "SELECT TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, COLUMN_TYPE \
         FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys') \
         ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION";

    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the catalog from rows ordered by ordinal position within each table.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = ColumnRow>,
    {
        let catalog = Self::new();
        {
            let mut tables = catalog.tables.write();
            for row in rows {
                if SYSTEM_SCHEMAS.contains(&row.schema.as_str()) {
                    continue;
                }
                tables
                    .entry(full_name(&row.schema, &row.table))
                    .or_default()
                    .push(ColumnDef::new(&row.column_name, &row.column_type));
            }
        }
        catalog
    }

    /// Runs [`SchemaCatalog::BOOTSTRAP_QUERY`] against the source.
    pub fn bootstrap(conn: &mut dyn SourceConnection) -> Result<Self> {
        let rows = conn
            .query_columns(Self::BOOTSTRAP_QUERY)
            .map_err(|err| Error::sql(Self::BOOTSTRAP_QUERY, err))?;
        let catalog = Self::from_rows(rows);
        info!("schema catalog loaded {} tables", catalog.len());
        Ok(catalog)
    }

    /// Query for the columns of a single table.
    pub fn table_query(schema: &str, table: &str) -> String {
        format!(
            "SELECT TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, COLUMN_TYPE \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} \
             ORDER BY ORDINAL_POSITION",
            quote_text(schema),
            quote_text(table),
        )
    }

    /// Returns cached column names, fetching the table from the source if it isn't cached.
    pub fn resolve_column_names(
        &self,
        conn: &mut dyn SourceConnection,
        schema: &str,
        table: &str,
    ) -> Result<Vec<String>> {
        if let Some(names) = self.column_names(schema, table) {
            return Ok(names);
        }

        let query = Self::table_query(schema, table);
        let rows = conn
            .query_columns(&query)
            .map_err(|err| Error::sql(query.as_str(), err))?;
        let columns: Vec<ColumnDef> = rows
            .iter()
            .map(|row| ColumnDef::new(&row.column_name, &row.column_type))
            .collect();
        debug!(
            "fetched {} columns of `{}`",
            columns.len(),
            full_name(schema, table)
        );

        let names = columns.iter().map(|c| c.name.clone()).collect();
        if !columns.is_empty() {
            self.set_columns(schema, table, columns);
        }
        Ok(names)
    }

    pub fn columns(&self, schema: &str, table: &str) -> Option<Vec<ColumnDef>> {
        self.tables.read().get(&full_name(schema, table)).cloned()
    }

    pub fn column_names(&self, schema: &str, table: &str) -> Option<Vec<String>> {
        self.tables
            .read()
            .get(&full_name(schema, table))
            .map(|columns| columns.iter().map(|c| c.name.clone()).collect())
    }

    pub fn set_columns(&self, schema: &str, table: &str, columns: Vec<ColumnDef>) {
        self.tables.write().insert(full_name(schema, table), columns);
    }

    pub fn invalidate_table(&self, schema: &str, table: &str) {
        self.tables.write().remove(&full_name(schema, table));
    }

    pub fn invalidate_schema(&self, schema: &str) {
        let prefix = format!("{}.", schema);
        self.tables.write().retain(|name, _| !name.starts_with(&prefix));
    }

    pub fn apply_ddl(&self, ddl: &Ddl) {
        match ddl {
            Ddl::Table { schema, table } => self.invalidate_table(schema, table),
            Ddl::Renamed(tables) => {
                for (schema, table) in tables {
                    self.invalidate_table(schema, table);
                }
            }
            Ddl::Schema(schema) => self.invalidate_schema(schema),
        }
    }

    /// Invalidates the table if the table map disagrees on the number of columns.
    pub fn check_table_map(&self, table: &TableMapEvent) {
        let known = self
            .tables
            .read()
            .get(&table.full_name())
            .map(|columns| columns.len());

        if let Some(known) = known {
            if known as u64 != table.columns_count {
                warn!(
                    "table `{}` has {} columns in the catalog but {} in the table map",
                    table.full_name(),
                    known,
                    table.columns_count
                );
                self.invalidate_table(&table.database_name, &table.table_name);
            }
        }
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

fn starts_with_keyword(statement: &str, keyword: &str) -> bool {
    statement
        .trim_start()
        .get(..keyword.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(keyword))
}

fn full_name(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::tests::MockConnection;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_rows(vec![
            ColumnRow::new("shop", "orders", "id", "bigint(20) unsigned"),
            ColumnRow::new("shop", "orders", "note", "varchar(32)"),
            ColumnRow::new("shop", "items", "id", "int(11)"),
            ColumnRow::new("mysql", "user", "Host", "char(60)"),
        ])
    }

    #[test]
    fn should_build_catalog_from_rows() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.column_names("shop", "orders"),
            Some(vec!["id".to_owned(), "note".to_owned()])
        );
        let columns = catalog.columns("shop", "orders").unwrap();
        assert!(columns[0].unsigned);
        assert!(!columns[1].unsigned);
        assert!(catalog.columns("mysql", "user").is_none());
    }

    #[test]
    fn should_classify_ddl() {
        assert_eq!(
            Ddl::parse("shop", "ALTER TABLE orders ADD COLUMN x INT"),
            Some(Ddl::Table {
                schema: "shop".into(),
                table: "orders".into()
            })
        );
        assert_eq!(
            Ddl::parse("shop", "create table if not exists `crm`.`leads` (id int)"),
            Some(Ddl::Table {
                schema: "crm".into(),
                table: "leads".into()
            })
        );
        assert_eq!(
            Ddl::parse("", "DROP DATABASE IF EXISTS crm"),
            Some(Ddl::Schema("crm".into()))
        );
        assert_eq!(Ddl::parse("shop", "INSERT INTO orders VALUES (1)"), None);
        assert_eq!(Ddl::parse("shop", "BEGIN"), None);
    }

    #[test]
    fn should_classify_renames() {
        let renamed = |pairs: &[(&str, &str)]| {
            Some(Ddl::Renamed(
                pairs
                    .iter()
                    .map(|(s, t)| (s.to_string(), t.to_string()))
                    .collect(),
            ))
        };

        assert_eq!(
            Ddl::parse("shop", "RENAME TABLE orders TO orders_old, crm.leads TO `shop`.`leads`"),
            renamed(&[
                ("shop", "orders"),
                ("shop", "orders_old"),
                ("crm", "leads"),
                ("shop", "leads"),
            ])
        );
        assert_eq!(
            Ddl::parse("shop", "ALTER TABLE orders RENAME TO archive.orders"),
            renamed(&[("shop", "orders"), ("archive", "orders")])
        );
        assert_eq!(
            Ddl::parse("shop", "ALTER TABLE orders RENAME COLUMN note TO memo"),
            Some(Ddl::Table {
                schema: "shop".into(),
                table: "orders".into()
            })
        );
        assert_eq!(Ddl::parse("shop", "GRANT r1, r2 TO bob"), None);
    }

    #[test]
    fn should_invalidate_both_names_on_rename() {
        let catalog = catalog();
        catalog.set_columns("shop", "orders_old", vec![ColumnDef::new("id", "int")]);

        let ddl = Ddl::parse("shop", "RENAME TABLE items TO orders_old").unwrap();
        catalog.apply_ddl(&ddl);

        assert!(catalog.column_names("shop", "items").is_none());
        assert!(catalog.column_names("shop", "orders_old").is_none());
        assert!(catalog.column_names("shop", "orders").is_some());
    }

    #[test]
    fn should_invalidate_on_ddl() {
        let catalog = catalog();
        catalog.apply_ddl(&Ddl::Table {
            schema: "shop".into(),
            table: "items".into(),
        });
        assert!(catalog.column_names("shop", "items").is_none());
        assert!(catalog.column_names("shop", "orders").is_some());

        catalog.apply_ddl(&Ddl::Schema("shop".into()));
        assert!(catalog.is_empty());
    }

    #[test]
    fn should_fetch_invalidated_table() {
        let catalog = catalog();
        catalog.invalidate_table("shop", "orders");

        let mut conn = MockConnection::default();
        conn.columns = vec![
            ColumnRow::new("shop", "orders", "id", "bigint(20) unsigned"),
            ColumnRow::new("shop", "orders", "note", "varchar(32)"),
            ColumnRow::new("shop", "orders", "added", "date"),
        ];

        let names = catalog
            .resolve_column_names(&mut conn, "shop", "orders")
            .unwrap();
        assert_eq!(names, vec!["id", "note", "added"]);
        assert_eq!(
            conn.queries,
            vec![SchemaCatalog::table_query("shop", "orders")]
        );

        // served from cache now
        catalog
            .resolve_column_names(&mut conn, "shop", "orders")
            .unwrap();
        assert_eq!(conn.queries.len(), 1);
    }

    #[test]
    fn should_bootstrap_from_source() {
        let mut conn = MockConnection::default();
        conn.columns = vec![ColumnRow::new("shop", "orders", "id", "int")];
        let catalog = SchemaCatalog::bootstrap(&mut conn).unwrap();
        assert_eq!(conn.queries, vec![SchemaCatalog::BOOTSTRAP_QUERY]);
        assert_eq!(catalog.column_names("shop", "orders"), Some(vec!["id".into()]));
    }
}

// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Compensating statements for captured row changes.

use crate::{
    binlog::{BinlogRow, BinlogValue, RowsEvent, RowsEventKind},
    error::{Error, Result},
};

/// Back-quotes an identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Single-quotes a string literal escaping `\` and `'`.
pub fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Renders a value as an SQL literal.
pub fn literal(value: &BinlogValue) -> String {
    match value {
        BinlogValue::Null => "NULL".into(),
        BinlogValue::UInt(x) => x.to_string(),
        BinlogValue::Text(x) => quote_text(x),
    }
}

/// Builds statements undoing every row of `event`, in row order.
///
/// * write rows are undone by `DELETE`s keyed by every decoded column,
/// * delete rows are undone by `INSERT`s of every decoded column,
/// * update rows can't be undone.
///
/// `columns` are the table's column names in ordinal order.
pub fn compensate(event: &RowsEvent, columns: &[String]) -> Result<Vec<String>> {
    if event.kind == RowsEventKind::Update {
        return Err(Error::RollbackUnsupported {
            event_type: event.kind.event_type() as u8,
        });
    }

    if columns.len() as u64 != event.columns_count {
        return Err(Error::ColumnCountMismatch {
            table: event.table.full_name(),
            expected: columns.len(),
            actual: event.columns_count,
        });
    }

    let table = format!(
        "{}.{}",
        quote_ident(event.database_name()),
        quote_ident(event.table_name())
    );

    event
        .rows
        .iter()
        .map(|row| {
            if row.is_empty() {
                return Err(Error::UndecodedRow {
                    table: event.table.full_name(),
                });
            }
            Ok(match event.kind {
                RowsEventKind::Delete => insert_statement(&table, row, columns),
                _ => delete_statement(&table, row, columns),
            })
        })
        .collect()
}

fn delete_statement(table: &str, row: &BinlogRow, columns: &[String]) -> String {
    let predicates = row
        .iter()
        .map(|(idx, value)| match value {
            BinlogValue::Null => format!("{} IS NULL", quote_ident(&columns[idx])),
            value => format!("{} = {}", quote_ident(&columns[idx]), literal(value)),
        })
        .collect::<Vec<_>>();
    format!("DELETE FROM {} WHERE {}", table, predicates.join(" AND "))
}

fn insert_statement(table: &str, row: &BinlogRow, columns: &[String]) -> String {
    let names = row
        .iter()
        .map(|(idx, _)| quote_ident(&columns[idx]))
        .collect::<Vec<_>>();
    let values = row
        .iter()
        .map(|(_, value)| literal(value))
        .collect::<Vec<_>>();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        names.join(", "),
        values.join(", ")
    )
}

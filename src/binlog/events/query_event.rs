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

/// A query event is created for each query that modifies the database, unless the query
/// is logged row-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryEvent {
    /// The ID of the thread that issued this statement.
    pub thread_id: u32,
    /// The time in seconds that the statement took to execute.
    pub execution_time: u32,
    /// Error code generated by the master.
    pub error_code: u16,
    /// The currently selected database (lossy converted).
    pub schema: String,
    /// The SQL query (lossy converted).
    pub query: String,
}

impl QueryEvent {
    pub fn read(body: &[u8]) -> Result<Self> {
        let mut buf = ParseBuf::new(body);
        let thread_id = buf.eat_u32_le("thread_id")?;
        let execution_time = buf.eat_u32_le("execution_time")?;
        let schema_len = buf.eat_u8("schema_len")?;
        let error_code = buf.eat_u16_le("error_code")?;
        let status_vars_len = buf.eat_u16_le("status_vars_len")?;
        buf.skip(status_vars_len as usize, "status_vars")?;
        let schema = buf.eat(schema_len as usize, "schema")?;
        buf.skip(1, "schema terminator")?;
        let query = buf.eat_all();

        Ok(Self {
            thread_id,
            execution_time,
            error_code,
            schema: String::from_utf8_lossy(schema).into_owned(),
            query: String::from_utf8_lossy(query).into_owned(),
        })
    }
}

impl fmt::Display for QueryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema: {}, Query: {}", self.schema, self.query)
    }
}

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

/// The rotate event is added to the binlog as last event
/// to tell the reader what binlog to request next.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RotateEvent {
    /// Position of the first event in the next file.
    pub position: u64,
    /// Name of the next binlog.
    pub name: String,
}

impl RotateEvent {
    pub fn read(body: &[u8]) -> Result<Self> {
        let mut buf = ParseBuf::new(body);
        let position = buf.eat_u64_le("position")?;
        let name = String::from_utf8_lossy(buf.eat_all()).into_owned();
        Ok(Self { position, name })
    }
}

impl fmt::Display for RotateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NextPos: {}, NextFile: {}", self.position, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_rotate() {
        let mut body = 4_u64.to_le_bytes().to_vec();
        body.extend_from_slice(b"mysql-bin.000002");
        let ev = RotateEvent::read(&body).unwrap();
        assert_eq!(ev.position, 4);
        assert_eq!(ev.name, "mysql-bin.000002");

        assert!(RotateEvent::read(&[4, 0, 0]).is_err());
    }
}

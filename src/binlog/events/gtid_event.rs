// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

use crate::{error::Result, io::ParseBuf};

/// GTID stands for Global Transaction IDentifier.
///
/// It is composed of two parts:
///
/// *   `sid` for Source Identifier, and
/// *   `gno` for Group Number. The basic idea is to associate an identifier,
///     the Global Transaction IDentifier or GTID, to every transaction.
///
/// Every transaction in a binlog starts with a GTID event.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GtidEvent {
    /// `true` if the transaction may have changes logged with SBR.
    pub commit_flag: bool,
    /// UUID representing the SID.
    pub sid: [u8; Self::ENCODED_SID_LENGTH],
    /// Group number, second component of GTID.
    pub gno: u64,
    /// Store the transaction's commit parent `sequence_number`.
    pub last_committed: u64,
    /// The transaction's logical timestamp assigned at prepare phase.
    pub sequence_number: u64,
}

impl GtidEvent {
    pub const ENCODED_SID_LENGTH: usize = 16;

    pub fn read(body: &[u8]) -> Result<Self> {
        let mut buf = ParseBuf::new(body);
        let commit_flag = buf.eat_u8("commit_flag")? != 0;
        let mut sid = [0_u8; Self::ENCODED_SID_LENGTH];
        sid.copy_from_slice(buf.eat(Self::ENCODED_SID_LENGTH, "sid")?);
        let gno = buf.eat_u64_le("gno")?;

        buf.skip(1, "lc_typecode")?;
        let last_committed = buf.eat_u64_le("last_committed")?;
        let sequence_number = buf.eat_u64_le("sequence_number")?;

        Ok(Self {
            commit_flag,
            sid,
            gno,
            last_committed,
            sequence_number,
        })
    }

    /// Returns the `sid` as a UUID.
    pub fn sid_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.sid)
    }
}

impl fmt::Display for GtidEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gtid: {}:{}, LastCommitted: {}, SequenceNumber: {}",
            self.sid_uuid(),
            self.gno,
            self.last_committed,
            self.sequence_number,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const SID: [u8; 16] = [
        0x3e, 0x11, 0xfa, 0x47, 0x71, 0xca, 0x11, 0xe1, 0x9e, 0x33, 0xc8, 0x0a, 0xa9, 0x42, 0x95,
        0x62,
    ];

    #[test]
    fn should_parse_gtid() {
        let mut body = vec![0x01];
        body.extend_from_slice(&SID);
        body.extend_from_slice(&23_u64.to_le_bytes());
        body.push(0x02);
        body.extend_from_slice(&10_u64.to_le_bytes());
        body.extend_from_slice(&11_u64.to_le_bytes());

        let ev = GtidEvent::read(&body).unwrap();
        assert!(ev.commit_flag);
        assert_eq!(ev.gno, 23);
        assert_eq!(ev.last_committed, 10);
        assert_eq!(ev.sequence_number, 11);
        assert_eq!(
            ev.to_string(),
            "Gtid: 3e11fa47-71ca-11e1-9e33-c80aa9429562:23, LastCommitted: 10, SequenceNumber: 11"
        );
    }

    #[test]
    fn should_require_logical_timestamps() {
        let mut body = vec![0x00];
        body.extend_from_slice(&SID);
        body.extend_from_slice(&5_u64.to_le_bytes());

        assert!(matches!(
            GtidEvent::read(&body),
            Err(Error::ShortBuffer {
                field: "lc_typecode",
                offset: 25,
                needed: 1,
                available: 0,
            })
        ));
    }

    #[test]
    fn should_fail_on_truncated_gtid() {
        let mut body = vec![0x00];
        body.extend_from_slice(&SID);
        body.extend_from_slice(&5_u64.to_le_bytes());
        body.extend_from_slice(&[0x02, 0x01]);
        assert!(matches!(
            GtidEvent::read(&body),
            Err(Error::ShortBuffer {
                field: "last_committed",
                ..
            })
        ));
        assert!(GtidEvent::read(&body[..10]).is_err());
    }
}

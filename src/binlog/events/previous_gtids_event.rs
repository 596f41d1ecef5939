// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use serde::{Deserialize, Serialize};

use std::fmt;

/// The event is logged at the start of each binlog file and lists the GTIDs
/// executed by the previous files. The GTID set is kept encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviousGtidsEvent {
    pub raw: Vec<u8>,
}

impl PreviousGtidsEvent {
    pub fn read(body: &[u8]) -> Self {
        Self { raw: body.to_vec() }
    }
}

impl fmt::Display for PreviousGtidsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PreviousGtids: {} bytes", self.raw.len())
    }
}

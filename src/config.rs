// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! YAML configuration.
//!
//! ```yaml
//! bind:
//!   host: 0.0.0.0
//!   port: 1236
//! master:
//!   host: db.local
//!   user: repl
//!   password: secret
//! binlog:
//!   path: /var/lib/binlog_rewind
//!   file: mysql-bin.000001
//! ```

use serde::{Deserialize, Serialize};

use std::{fs, path::Path, time::Duration};

use crate::{
    constants::DEFAULT_SERVER_ID, error::Result, persist::FlushPolicy, proto::BinlogPosition,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bind: BindConfig,
    #[serde(default)]
    pub master: MasterConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub binlog: BinlogConfig,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// Position the binlog dump is requested from.
    pub fn start_position(&self) -> BinlogPosition {
        BinlogPosition::new(self.binlog.file.clone(), self.binlog.position)
    }
}

/// Address of the query listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindConfig {
    #[serde(default = "default_bind_host")]
    pub host: String,
    #[serde(default = "default_bind_port")]
    pub port: u16,
}

impl BindConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: default_bind_host(),
            port: default_bind_port(),
        }
    }
}

/// Replication source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterConfig {
    #[serde(default = "default_master_host")]
    pub host: String,
    #[serde(default = "default_master_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            host: default_master_host(),
            port: default_master_port(),
            user: String::new(),
            password: String::new(),
        }
    }
}

/// Persistence of received events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Persist events at all.
    #[serde(default = "default_true")]
    pub sync: bool,
    /// Flush interval in seconds, `0` disables time-based flushing.
    #[serde(default)]
    pub synctime: u64,
    /// Flush after this many events, `0` flushes every event.
    #[serde(default)]
    pub syncount: usize,
}

impl SyncConfig {
    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy {
            every_events: self.syncount,
            every: match self.synctime {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync: true,
            synctime: 0,
            syncount: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinlogConfig {
    /// Directory of persisted binlog containers.
    #[serde(default = "default_binlog_path")]
    pub path: String,
    /// First binlog file to request, empty for the first file the source knows.
    #[serde(default)]
    pub file: String,
    #[serde(default = "default_binlog_position")]
    pub position: u32,
    #[serde(default = "default_server_id")]
    pub server_id: u32,
}

impl Default for BinlogConfig {
    fn default() -> Self {
        Self {
            path: default_binlog_path(),
            file: String::new(),
            position: default_binlog_position(),
            server_id: default_server_id(),
        }
    }
}

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    1236
}

fn default_master_host() -> String {
    "127.0.0.1".to_string()
}

fn default_master_port() -> u16 {
    3306
}

fn default_true() -> bool {
    true
}

fn default_binlog_path() -> String {
    "./binlog".to_string()
}

fn default_binlog_position() -> u32 {
    BinlogPosition::FIRST_EVENT
}

fn default_server_id() -> u32 {
    DEFAULT_SERVER_ID
}

// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Per-binlog-file JSON containers.
//!
//! Every binlog file of the source gets a container file of the same name holding
//! a JSON array of [`JsonEntry`]. A container is opened by the fake rotate event
//! the source sends when it starts streaming a file, and closed by the stop event
//! or the rotate event that ends the file.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crate::{
    binlog::{event_type_name, Event, EventData},
    error::{Error, Result},
    proto::BinlogPosition,
    replication::EventSink,
};

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonEntry {
    pub event_name: String,
    pub event_type: u8,
    pub encoded: Event,
}

impl JsonEntry {
    pub fn new(event: &Event) -> Self {
        Self {
            event_name: event_type_name(event.event_type()),
            event_type: event.event_type(),
            encoded: event.clone(),
        }
    }
}

/// When buffered entries are flushed to the container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushPolicy {
    /// Flush after this many entries, `0` flushes every entry.
    pub every_events: usize,
    /// Flush if this much time passed since the previous flush.
    pub every: Option<Duration>,
}

/// Writes events into per-binlog-file containers.
#[derive(Debug)]
pub struct JsonSyncer {
    dir: PathBuf,
    policy: FlushPolicy,
    current: Option<Container>,
}

#[derive(Debug)]
struct Container {
    file: String,
    writer: BufWriter<File>,
    pending: usize,
    last_flush: Instant,
}

impl Container {
    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.pending = 0;
        self.last_flush = Instant::now();
        Ok(())
    }
}

impl JsonSyncer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            policy: FlushPolicy::default(),
            current: None,
        }
    }

    pub fn with_policy(mut self, policy: FlushPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Name of the open container, if any.
    pub fn current_file(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.file.as_str())
    }

    pub fn sync(&mut self, event: &Event) -> Result<()> {
        let entry = serde_json::to_string(&JsonEntry::new(event))?;

        match event.data {
            EventData::Rotate(ref rotate) if event.is_fake_rotate() => {
                self.close(false)?;
                let path = self.dir.join(&rotate.name);
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                info!("opened binlog container {}", path.display());
                let mut container = Container {
                    file: rotate.name.clone(),
                    writer: BufWriter::new(file),
                    pending: 0,
                    last_flush: Instant::now(),
                };
                write!(container.writer, "[\n\t{},\n", entry)?;
                self.current = Some(container);
                self.after_write()
            }
            EventData::Rotate(_) | EventData::Stop(_) => match self.current {
                Some(ref mut container) => {
                    write!(container.writer, "\n\t{}\n]", entry)?;
                    self.close(true)
                }
                None => {
                    debug!("no open container for {}", event);
                    Ok(())
                }
            },
            _ => match self.current {
                Some(ref mut container) => {
                    write!(container.writer, "\n\t{},\n", entry)?;
                    self.after_write()
                }
                None => {
                    debug!("no open container for {}", event);
                    Ok(())
                }
            },
        }
    }

    fn after_write(&mut self) -> Result<()> {
        let policy = self.policy;
        if let Some(ref mut container) = self.current {
            container.pending += 1;
            let by_count = container.pending >= policy.every_events;
            let by_time = policy
                .every
                .map_or(false, |every| container.last_flush.elapsed() >= every);
            if by_count || by_time {
                container.flush()?;
            }
        }
        Ok(())
    }

    fn close(&mut self, complete: bool) -> Result<()> {
        if let Some(mut container) = self.current.take() {
            container.flush()?;
            if complete {
                info!("closed binlog container {}", container.file);
            } else {
                warn!("binlog container {} left unterminated", container.file);
            }
        }
        Ok(())
    }
}

impl EventSink for JsonSyncer {
    fn on_event(&mut self, event: &Event) -> Result<()> {
        self.sync(event)
    }
}

impl Drop for JsonSyncer {
    fn drop(&mut self) {
        if let Some(ref mut container) = self.current {
            if let Err(err) = container.flush() {
                warn!("can't flush binlog container {}: {}", container.file, err);
            }
        }
    }
}

/// Events loaded from containers and the position to continue replication from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedHistory {
    pub events: Vec<Event>,
    pub resume: BinlogPosition,
}

/// Loads containers starting with `start_file` following the chain of binlog files.
///
/// The walk ends at the first missing or unterminated container; replication
/// should resume from the beginning of that file.
pub fn load_history(dir: impl AsRef<Path>, start_file: &str) -> Result<LoadedHistory> {
    let dir = dir.as_ref();
    let mut events = Vec::new();
    let mut file = start_file.to_owned();

    loop {
        let path = dir.join(&file);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no container {}, stopping", path.display());
                break;
            }
            Err(err) => return Err(err.into()),
        };

        let entries: Vec<JsonEntry> = match serde_json::from_slice(&data) {
            Ok(entries) => entries,
            Err(err) if err.is_eof() => {
                warn!("container {} is unterminated, stopping", path.display());
                break;
            }
            Err(err) => return Err(err.into()),
        };

        let next = match entries.last() {
            Some(last) => next_file(&file, &last.encoded)?,
            None => return Err(Error::Persist(format!("container {} is empty", file))),
        };

        debug!("loaded {} events from {}", entries.len(), file);
        events.extend(entries.into_iter().map(|entry| entry.encoded));
        file = next;
    }

    Ok(LoadedHistory {
        events,
        resume: BinlogPosition::new(file, BinlogPosition::FIRST_EVENT),
    })
}

/// Name of the binlog file following `file`, judging by its last event.
pub fn next_file(file: &str, last: &Event) -> Result<String> {
    match last.data {
        EventData::Rotate(ref rotate) => Ok(rotate.name.clone()),
        EventData::Stop(_) => {
            let (stem, index) = file
                .rsplit_once('.')
                .and_then(|(stem, index)| index.parse::<u64>().ok().map(|index| (stem, index)))
                .ok_or_else(|| {
                    Error::Persist(format!("binlog file name {} has no numeric suffix", file))
                })?;
            Ok(format!("{}.{:06}", stem, index + 1))
        }
        _ => Err(Error::Persist(format!(
            "last event of {} must be a rotate or stop event, got {}",
            file,
            event_type_name(last.event_type())
        ))),
    }
}

/// Removes containers of `file` and every later file of the same binlog.
pub fn remove_from(dir: impl AsRef<Path>, file: &str) -> Result<()> {
    let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(stem) && *name >= *file {
            fs::remove_file(entry.path())?;
            debug!("removed container {}", name);
        }
    }

    Ok(())
}

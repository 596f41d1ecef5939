// Copyright (c) 2021 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Binlog streaming session.

use tracing::{debug, error, info, warn};

use std::{convert::TryFrom, sync::Arc};

use crate::{
    binlog::{BinlogEventHeader, Event, EventData, EventDispatcher},
    constants::{Command, DEFAULT_SERVER_ID, ERR_HEADER},
    error::{Error, Result},
    history::EventHistory,
    proto::{BinlogPosition, ComBinlogDump, ErrPacket, ReplicationPacket, Transport},
};

/// Consumer of decoded events.
pub trait EventSink {
    fn on_event(&mut self, event: &Event) -> Result<()>;
}

impl EventSink for Arc<EventHistory> {
    fn on_event(&mut self, event: &Event) -> Result<()> {
        self.append(event.clone());
        Ok(())
    }
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn on_event(&mut self, event: &Event) -> Result<()> {
        (**self).on_event(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn on_event(&mut self, event: &Event) -> Result<()> {
        (**self).on_event(event)
    }
}

impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn on_event(&mut self, event: &Event) -> Result<()> {
        self.0.on_event(event)?;
        self.1.on_event(event)
    }
}

/// Streams events from a replication source starting at a binlog position.
#[derive(Debug)]
pub struct ReplicationSession<T> {
    transport: T,
    dispatcher: EventDispatcher,
    position: BinlogPosition,
    server_id: u32,
    skip_errors: bool,
}

impl<T: Transport> ReplicationSession<T> {
    pub fn new(transport: T, dispatcher: EventDispatcher, position: BinlogPosition) -> Self {
        Self {
            transport,
            dispatcher,
            position,
            server_id: DEFAULT_SERVER_ID,
            skip_errors: false,
        }
    }

    /// Server id the session registers with.
    pub fn with_server_id(mut self, server_id: u32) -> Self {
        self.server_id = server_id;
        self
    }

    /// Log and skip events that fail to decode instead of ending the session.
    ///
    /// Errors that break packet boundaries still end the session.
    pub fn skip_errors(mut self, skip_errors: bool) -> Self {
        self.skip_errors = skip_errors;
        self
    }

    /// Position of the next event to receive.
    pub fn position(&self) -> &BinlogPosition {
        &self.position
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Enables checksums and requests the binlog stream.
    pub fn start(&mut self) -> Result<()> {
        self.transport.connect()?;

        self.transport.reset_sequence();
        self.transport
            .send_command(Command::COM_QUERY, ComBinlogDump::CHECKSUM_QUERY.as_bytes())?;
        let reply = self.transport.read_packet()?;
        if reply.first() == Some(&ERR_HEADER) {
            return Err(ErrPacket::read(&reply[1..])?.into());
        }

        let dump = ComBinlogDump::new(&self.position).with_server_id(self.server_id);
        self.transport.reset_sequence();
        self.transport
            .send_command(ComBinlogDump::COMMAND, &dump.payload())?;

        info!(
            "replication started at {} as server {}",
            self.position, self.server_id
        );
        Ok(())
    }

    /// Receives events until the source ends the stream.
    pub fn run<S: EventSink>(&mut self, mut sink: S) -> Result<()> {
        loop {
            match self.next_event() {
                Ok(Received::Event(event)) => sink.on_event(&event)?,
                Ok(Received::Skipped) => continue,
                Ok(Received::End) => {
                    info!("binlog stream ended at {}", self.position);
                    return Ok(());
                }
                Err(err) if self.skip_errors && !err.is_session_fatal() => {
                    warn!("skipping event at {}: {}", self.position, err);
                }
                Err(err) => {
                    error!("replication failed at {}: {}", self.position, err);
                    return Err(err);
                }
            }
        }
    }

    /// Reads and decodes the next packet.
    fn next_event(&mut self) -> Result<Received> {
        let packet = self.transport.read_packet()?;
        let packet = match ReplicationPacket::classify(&packet)? {
            ReplicationPacket::Event(packet) => packet,
            ReplicationPacket::Eof => return Ok(Received::End),
            ReplicationPacket::Err(err) => return Err(err.into()),
        };

        let header = BinlogEventHeader::read(packet)?;
        if header.log_pos != 0 {
            self.position.position = header.log_pos;
        }

        let event = match self.dispatcher.dispatch(packet)? {
            Some(event) => event,
            None => return Ok(Received::Skipped),
        };
        if let EventData::Rotate(ref rotate) = event.data {
            let position =
                u32::try_from(rotate.position).map_err(|_| Error::PositionOutOfRange {
                    position: rotate.position,
                })?;
            self.position = BinlogPosition::new(rotate.name.clone(), position);
            debug!("rotated to {}", self.position);
        }

        Ok(Received::Event(event))
    }
}

enum Received {
    Event(Event),
    /// An event kind that is not captured.
    Skipped,
    End,
}

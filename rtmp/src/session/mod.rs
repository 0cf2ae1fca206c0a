//! The per-connection state machine.
//!
//! A [`Session`] owns everything one publishing connection needs: the
//! handshake, the chunk demultiplexer and serializer, the flow-control
//! counters, and the [`RtmpActor`] the decoded events feed.  It does not
//! own a socket; the connection driver reads bytes, hands them to
//! [`Session::handle_bytes`], and writes whatever bytes come back.  All
//! responses must reach the peer in the order they were produced.

mod config;
mod errors;


pub use self::config::SessionConfig;
pub use self::errors::SessionError;

use crate::actor::RtmpActor;
use crate::chunk::{ChunkDemultiplexer, ChunkSerializer};
use crate::handshake::Handshake;
use crate::messages::{
    acknowledgement_body, parse_command, parse_data_frame, parse_set_chunk_size,
    parse_window_ack_size, set_chunk_size_body, set_peer_bandwidth_body, window_ack_size_body,
    Command, ConnectCommand, Message, MessageKind, PeerBandwidthLimit, PublishCommand,
};
use crate::time::RtmpTimestamp;
use bytes::Bytes;
use inlet_amf0::Amf0Encoder;
use inlet_bitbuf::{ReadBuffer, WriteBuffer};
use log::{debug, info};
use std::collections::HashSet;

/// Protocol-control messages travel on the reserved chunk stream 2.
const CONTROL_CHUNK_STREAM_ID: u32 = 2;

/// Command responses go out on chunk stream 3 by convention.
const COMMAND_CHUNK_STREAM_ID: u32 = 3;

const READ_BUFFER_INITIAL_SIZE: usize = 8192;

/// An opaque client id for onStatus responses; players echo it, nothing
/// interprets it.
const CLIENT_ID: &str = "AAAAAAAA";

/// The server side of one RTMP publishing connection.
pub struct Session<A: RtmpActor> {
    actor: A,
    config: SessionConfig,
    handshake: Handshake,
    demultiplexer: ChunkDemultiplexer,
    serializer: ChunkSerializer,
    inbound: ReadBuffer,
    outbound: WriteBuffer,
    scratch: WriteBuffer,
    connected: bool,
    disconnected: bool,
    peer_window_ack_size: Option<u32>,
    bytes_received: u32,
    acknowledged: u32,
    next_stream_id: u32,
    published_streams: HashSet<u32>,
}

impl<A: RtmpActor> Session<A> {
    pub fn new(config: SessionConfig, actor: A) -> Session<A> {
        Session {
            actor,
            config,
            handshake: Handshake::new(),
            demultiplexer: ChunkDemultiplexer::new(),
            serializer: ChunkSerializer::new(),
            inbound: ReadBuffer::with_capacity(READ_BUFFER_INITIAL_SIZE),
            outbound: WriteBuffer::new(),
            scratch: WriteBuffer::new(),
            connected: false,
            disconnected: false,
            peer_window_ack_size: None,
            bytes_received: 0,
            acknowledged: 0,
            next_stream_id: 1,
            published_streams: HashSet::new(),
        }
    }

    /// Consumes one network read's worth of bytes and returns the bytes to
    /// send back.
    ///
    /// An `Err` is fatal; the caller must stop feeding the session, close
    /// the socket and call [`Session::disconnect`].
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> Result<Vec<u8>, SessionError> {
        self.count_received(bytes.len() as u32)?;
        self.inbound.append(bytes);

        while !self.handshake.is_done() && self.inbound.remaining() > 0 {
            self.inbound.snapshot();
            match self.handshake.process(&mut self.inbound, &mut self.outbound) {
                Ok(()) => self.inbound.discard_snapshot(),
                Err(err) => {
                    self.inbound.restore();
                    if err.is_insufficient_data() {
                        return Ok(self.outbound.take());
                    }

                    return Err(err.into());
                }
            }
        }

        if self.handshake.is_done() {
            while let Some(message) = self.demultiplexer.poll(&mut self.inbound)? {
                self.dispatch(message)?;
            }
        }

        Ok(self.outbound.take())
    }

    /// Fires the actor's terminal callback.  Safe to call repeatedly; only
    /// the first call reaches the actor.
    pub fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }

        self.disconnected = true;
        if !self.published_streams.is_empty() {
            debug!(
                "closing with {} published stream(s)",
                self.published_streams.len()
            );
        }

        self.actor.on_disconnect();
    }

    fn count_received(&mut self, count: u32) -> Result<(), SessionError> {
        self.bytes_received = self.bytes_received.wrapping_add(count);

        if let Some(window) = self.peer_window_ack_size {
            let threshold = window / 2;
            if threshold == 0 {
                return Ok(());
            }

            while self.bytes_received.wrapping_sub(self.acknowledged) >= threshold {
                self.acknowledged = self.acknowledged.wrapping_add(threshold);
                let body = acknowledgement_body(self.acknowledged)?;
                self.send_control(MessageKind::Acknowledgement, body)?;
            }
        }

        Ok(())
    }

    fn dispatch(&mut self, message: Message) -> Result<(), SessionError> {
        match message.kind() {
            MessageKind::CommandAmf0 => self.handle_command(&message),
            MessageKind::DataAmf0 => self.handle_data(&message),
            MessageKind::Audio => self.handle_media(&message, false),
            MessageKind::Video => self.handle_media(&message, true),
            MessageKind::SetChunkSize => self.handle_set_chunk_size(&message),
            MessageKind::WindowAckSize => self.handle_window_ack_size(&message),
            MessageKind::CommandAmf3
            | MessageKind::DataAmf3
            | MessageKind::SharedObjectAmf0
            | MessageKind::SharedObjectAmf3
            | MessageKind::Aggregate => Err(SessionError::UnsupportedMessage {
                type_id: message.type_id,
            }),
            MessageKind::Acknowledgement
            | MessageKind::Abort
            | MessageKind::UserControl
            | MessageKind::SetPeerBandwidth
            | MessageKind::Unknown(_) => {
                debug!("ignoring message of type {}", message.type_id);
                Ok(())
            }
        }
    }

    fn handle_command(&mut self, message: &Message) -> Result<(), SessionError> {
        match parse_command(&message.body)? {
            Command::Connect(command) => self.handle_connect(command),
            Command::ReleaseStream { transaction_id, stream_name } => {
                debug!("releaseStream for {:?}", stream_name);
                self.send_null_result(transaction_id)
            }
            Command::FcPublish { transaction_id, stream_name } => {
                debug!("FCPublish for {:?}", stream_name);
                self.send_null_result(transaction_id)
            }
            Command::CreateStream { transaction_id } => self.handle_create_stream(transaction_id),
            Command::Publish(command) => self.handle_publish(message, command),
            Command::Unknown { name } => {
                info!("ignoring unrecognised command {:?}", name);
                Ok(())
            }
        }
    }

    fn handle_connect(&mut self, command: ConnectCommand) -> Result<(), SessionError> {
        if self.connected {
            return Err(SessionError::BadState { command: "connect" });
        }

        info!(
            "connect requested for app {:?} (tcUrl {:?})",
            command.app, command.tc_url
        );

        if !self.actor.on_connect(&command) {
            return Err(SessionError::Rejected {
                callback: "on_connect",
            });
        }

        self.send_control(
            MessageKind::WindowAckSize,
            window_ack_size_body(self.config.window_ack_size)?,
        )?;
        self.send_control(
            MessageKind::SetPeerBandwidth,
            set_peer_bandwidth_body(self.config.peer_bandwidth, PeerBandwidthLimit::Dynamic)?,
        )?;
        self.send_control(
            MessageKind::SetChunkSize,
            set_chunk_size_body(self.config.outbound_chunk_size)?,
        )?;
        self.serializer.set_chunk_size(self.config.outbound_chunk_size)?;

        let server_version = self.config.server_version.clone();
        let body = self.encode_amf0(|encoder| {
            encoder.write_string("_result")?;
            encoder.write_number(command.transaction_id)?;

            encoder.write_object_start()?;
            encoder.write_object_key("fmsVer")?;
            encoder.write_string(&server_version)?;
            encoder.write_object_key("capabilities")?;
            encoder.write_number(255.0)?;
            encoder.write_object_key("mode")?;
            encoder.write_number(1.0)?;
            encoder.write_object_end()?;

            encoder.write_object_start()?;
            encoder.write_object_key("level")?;
            encoder.write_string("status")?;
            encoder.write_object_key("code")?;
            encoder.write_string("NetConnection.Connect.Success")?;
            encoder.write_object_key("description")?;
            encoder.write_string("connection succeeded")?;
            encoder.write_object_key("objectEncoding")?;
            encoder.write_number(0.0)?;
            encoder.write_object_end()?;
            Ok(())
        })?;
        self.send_command_message(COMMAND_CHUNK_STREAM_ID, 0, body)?;

        let body = self.encode_amf0(|encoder| {
            encoder.write_string("onBWDone")?;
            encoder.write_number(0.0)?;
            encoder.write_null()?;
            Ok(())
        })?;
        self.send_command_message(COMMAND_CHUNK_STREAM_ID, 0, body)?;

        self.connected = true;
        Ok(())
    }

    fn handle_create_stream(&mut self, transaction_id: f64) -> Result<(), SessionError> {
        let stream_id = self.next_stream_id;

        if !self.actor.on_create_stream(stream_id) {
            return Err(SessionError::Rejected {
                callback: "on_create_stream",
            });
        }

        let body = self.encode_amf0(|encoder| {
            encoder.write_string("_result")?;
            encoder.write_number(transaction_id)?;
            encoder.write_null()?;
            encoder.write_number(f64::from(stream_id))?;
            Ok(())
        })?;
        self.send_command_message(COMMAND_CHUNK_STREAM_ID, 0, body)?;

        self.next_stream_id += 1;
        Ok(())
    }

    fn handle_publish(
        &mut self,
        message: &Message,
        command: PublishCommand,
    ) -> Result<(), SessionError> {
        // Encoders append authentication material as a query string; the
        // stream is named by what comes before it.
        let name = match command.publishing_name.split_once('?') {
            Some((base, _)) => base.to_string(),
            None => command.publishing_name.clone(),
        };

        match command.publishing_type.as_str() {
            "live" | "record" | "append" => (),
            other => info!("unrecognised publishing type {:?}, continuing", other),
        }

        info!(
            "publish of {:?} requested on stream {}",
            name, message.message_stream_id
        );

        if !self.actor.on_publish(message.message_stream_id, &name) {
            return Err(SessionError::Rejected {
                callback: "on_publish",
            });
        }

        self.published_streams.insert(message.message_stream_id);

        let description = format!("{} is now published", name);
        let body = self.encode_amf0(|encoder| {
            encoder.write_string("onStatus")?;
            encoder.write_number(command.transaction_id)?;
            encoder.write_null()?;

            encoder.write_object_start()?;
            encoder.write_object_key("level")?;
            encoder.write_string("status")?;
            encoder.write_object_key("code")?;
            encoder.write_string("NetStream.Publish.Start")?;
            encoder.write_object_key("description")?;
            encoder.write_string(&description)?;
            encoder.write_object_key("clientid")?;
            encoder.write_string(CLIENT_ID)?;
            encoder.write_object_end()?;
            Ok(())
        })?;

        self.send_command_message(message.chunk_stream_id, message.message_stream_id, body)
    }

    fn handle_data(&mut self, message: &Message) -> Result<(), SessionError> {
        match parse_data_frame(&message.body)? {
            Some(mut metadata) => {
                metadata.timestamp = message.timestamp;
                if !self.actor.on_metadata(message.message_stream_id, metadata) {
                    return Err(SessionError::Rejected {
                        callback: "on_metadata",
                    });
                }

                Ok(())
            }
            None => {
                debug!("ignoring data message that is not a @setDataFrame");
                Ok(())
            }
        }
    }

    fn handle_media(&mut self, message: &Message, is_video: bool) -> Result<(), SessionError> {
        if !self.actor.on_media(message.message_stream_id, is_video, message) {
            return Err(SessionError::Rejected {
                callback: "on_media",
            });
        }

        Ok(())
    }

    fn handle_set_chunk_size(&mut self, message: &Message) -> Result<(), SessionError> {
        // The demultiplexer already applied the new size mid-read; this
        // validates it and surfaces bad values as connection errors.
        let size = parse_set_chunk_size(&message.body)?;
        self.demultiplexer.set_chunk_size(size)?;
        debug!("peer chunk size is now {}", size);
        Ok(())
    }

    fn handle_window_ack_size(&mut self, message: &Message) -> Result<(), SessionError> {
        let size = parse_window_ack_size(&message.body)?;
        self.peer_window_ack_size = Some(size);
        debug!("peer window acknowledgement size is now {}", size);

        let body = self.encode_amf0(|encoder| {
            encoder.write_string("onBWDone")?;
            encoder.write_number(0.0)?;
            encoder.write_null()?;
            Ok(())
        })?;
        self.send_command_message(COMMAND_CHUNK_STREAM_ID, 0, body)
    }

    /// The `_result(transaction_id, Null, Undefined)` shape shared by the
    /// releaseStream and FCPublish responses.
    fn send_null_result(&mut self, transaction_id: f64) -> Result<(), SessionError> {
        let body = self.encode_amf0(|encoder| {
            encoder.write_string("_result")?;
            encoder.write_number(transaction_id)?;
            encoder.write_null()?;
            encoder.write_undefined()?;
            Ok(())
        })?;

        self.send_command_message(COMMAND_CHUNK_STREAM_ID, 0, body)
    }

    fn encode_amf0(
        &mut self,
        write: impl FnOnce(&mut Amf0Encoder) -> Result<(), inlet_amf0::Amf0EncodeError>,
    ) -> Result<Bytes, SessionError> {
        self.scratch.reset();
        write(&mut Amf0Encoder::new(&mut self.scratch))?;
        Ok(Bytes::from(self.scratch.take()))
    }

    fn send_control(&mut self, kind: MessageKind, body: Bytes) -> Result<(), SessionError> {
        let message = Message {
            chunk_stream_id: CONTROL_CHUNK_STREAM_ID,
            message_stream_id: 0,
            type_id: kind.type_id(),
            timestamp: RtmpTimestamp::new(0),
            body,
        };

        self.serializer.serialize(&message, &mut self.outbound)?;
        Ok(())
    }

    fn send_command_message(
        &mut self,
        chunk_stream_id: u32,
        message_stream_id: u32,
        body: Bytes,
    ) -> Result<(), SessionError> {
        let message = Message {
            chunk_stream_id,
            message_stream_id,
            type_id: MessageKind::CommandAmf0.type_id(),
            timestamp: RtmpTimestamp::new(0),
            body,
        };

        self.serializer.serialize(&message, &mut self.outbound)?;
        Ok(())
    }
}

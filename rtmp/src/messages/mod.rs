//! RTMP message model and the parsers that turn reassembled message bodies
//! into typed commands, metadata records and control values.

mod command;
mod control;
mod errors;
mod metadata;

pub use self::command::{parse_command, Command, ConnectCommand, PublishCommand};
pub use self::control::{
    acknowledgement_body, parse_set_chunk_size, parse_window_ack_size, set_chunk_size_body,
    set_peer_bandwidth_body, window_ack_size_body, PeerBandwidthLimit,
};
pub use self::errors::MessageError;
pub use self::metadata::{parse_data_frame, MetaData};

use crate::time::RtmpTimestamp;
use bytes::Bytes;

/// A fully reassembled RTMP message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The chunk stream the message arrived on (or should leave on); a
    /// routing tag for header compression, not a logical stream.
    pub chunk_stream_id: u32,

    /// The logical RTMP stream (e.g. the `NetStream` media flows on).
    pub message_stream_id: u32,

    pub type_id: u8,
    pub timestamp: RtmpTimestamp,
    pub body: Bytes,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_type_id(self.type_id)
    }
}

/// The message type ids RTMP defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SetChunkSize,
    Abort,
    Acknowledgement,
    UserControl,
    WindowAckSize,
    SetPeerBandwidth,
    Audio,
    Video,
    DataAmf3,
    SharedObjectAmf3,
    CommandAmf3,
    DataAmf0,
    SharedObjectAmf0,
    CommandAmf0,
    Aggregate,
    Unknown(u8),
}

impl MessageKind {
    pub fn from_type_id(type_id: u8) -> MessageKind {
        match type_id {
            1 => MessageKind::SetChunkSize,
            2 => MessageKind::Abort,
            3 => MessageKind::Acknowledgement,
            4 => MessageKind::UserControl,
            5 => MessageKind::WindowAckSize,
            6 => MessageKind::SetPeerBandwidth,
            8 => MessageKind::Audio,
            9 => MessageKind::Video,
            15 => MessageKind::DataAmf3,
            16 => MessageKind::SharedObjectAmf3,
            17 => MessageKind::CommandAmf3,
            18 => MessageKind::DataAmf0,
            19 => MessageKind::SharedObjectAmf0,
            20 => MessageKind::CommandAmf0,
            22 => MessageKind::Aggregate,
            other => MessageKind::Unknown(other),
        }
    }

    pub fn type_id(&self) -> u8 {
        match *self {
            MessageKind::SetChunkSize => 1,
            MessageKind::Abort => 2,
            MessageKind::Acknowledgement => 3,
            MessageKind::UserControl => 4,
            MessageKind::WindowAckSize => 5,
            MessageKind::SetPeerBandwidth => 6,
            MessageKind::Audio => 8,
            MessageKind::Video => 9,
            MessageKind::DataAmf3 => 15,
            MessageKind::SharedObjectAmf3 => 16,
            MessageKind::CommandAmf3 => 17,
            MessageKind::DataAmf0 => 18,
            MessageKind::SharedObjectAmf0 => 19,
            MessageKind::CommandAmf0 => 20,
            MessageKind::Aggregate => 22,
            MessageKind::Unknown(type_id) => type_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MessageKind;

    #[test]
    fn type_ids_map_both_ways() {
        for type_id in 0..=30 {
            assert_eq!(MessageKind::from_type_id(type_id).type_id(), type_id);
        }
    }

    #[test]
    fn unassigned_ids_are_unknown() {
        assert_eq!(MessageKind::from_type_id(7), MessageKind::Unknown(7));
        assert_eq!(MessageKind::from_type_id(21), MessageKind::Unknown(21));
    }
}

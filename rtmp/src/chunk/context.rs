use crate::time::RtmpTimestamp;
use bytes::BytesMut;

/// The per chunk-stream state delta headers decode against.
///
/// A context is created lazily on first sight of its chunk stream id and
/// lives until the connection closes.  It owns the partially reassembled
/// message for its chunk stream by value, so the demultiplexer's shadow copy
/// (a clone of the context table) captures reassembly progress too.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    pub timestamp: RtmpTimestamp,
    pub timestamp_delta: u32,
    pub message_length: u32,
    pub message_type_id: u8,
    pub message_stream_id: u32,

    /// The value of the last extended timestamp field, if the last header
    /// carried one.  Some encoders echo it on type 3 chunks even though the
    /// specification forbids it.
    pub extended_timestamp: Option<u32>,

    pub pending: Option<PendingMessage>,
}

impl ChunkContext {
    pub fn new() -> ChunkContext {
        ChunkContext {
            timestamp: RtmpTimestamp::new(0),
            timestamp_delta: 0,
            message_length: 0,
            message_type_id: 0,
            message_stream_id: 0,
            extended_timestamp: None,
            pending: None,
        }
    }
}

/// A message whose first chunk has arrived but whose body is not complete.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub length: u32,
    pub type_id: u8,
    pub message_stream_id: u32,
    pub timestamp: RtmpTimestamp,
    pub body: BytesMut,
}

impl PendingMessage {
    /// Body bytes still owed.  Never exceeds one chunk's worth at a chunk
    /// boundary; zero means the next completion check fires.
    pub fn remaining(&self) -> usize {
        self.length as usize - self.body.len()
    }
}

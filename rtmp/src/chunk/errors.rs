use inlet_bitbuf::BufferError;
use thiserror::Error;

/// Errors raised while parsing or producing RTMP chunks.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// Delta headers (types 1, 2 and 3) inherit fields from the previous
    /// chunk on the same chunk stream; there is nothing to inherit from
    /// before a type 0 chunk has been seen.
    #[error("Received a format {format} chunk on chunk stream {chunk_stream_id} before any full header")]
    NoPreviousChunk { format: u8, chunk_stream_id: u32 },

    /// A full header may only start a new message once the previous message
    /// on its chunk stream has been completed.
    #[error("Received a format {format} header on chunk stream {chunk_stream_id} while a message is still being reassembled")]
    HeaderDuringReassembly { format: u8, chunk_stream_id: u32 },

    /// Chunk sizes are carried in 31 bits and a zero size could never make
    /// progress.
    #[error("Requested an invalid chunk size of {chunk_size}")]
    InvalidChunkSize { chunk_size: u32 },

    /// Message lengths are carried in 24 bits.
    #[error("Cannot serialize a message body of {size} bytes (maximum is 16777215)")]
    MessageTooLong { size: usize },

    /// Chunk stream ids 0 and 1 are escape codes and the two byte escape
    /// tops out at 65599.
    #[error("Chunk stream id {chunk_stream_id} is outside the encodable range of 2 through 65599")]
    InvalidChunkStreamId { chunk_stream_id: u32 },
}

impl ChunkError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, ChunkError::Buffer(error) if error.is_insufficient_data())
    }
}

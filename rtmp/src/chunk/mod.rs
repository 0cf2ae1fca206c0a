//! Serialization and deserialization of the RTMP chunk framing described in
//! section 5.3 of the RTMP specification.
//!
//! The chunk format heavily relies on state from previously seen chunks:
//! delta headers inherit fields from the last chunk on the same chunk
//! stream.  Every inbound byte of a connection must therefore flow through
//! the same [`ChunkDemultiplexer`], in order, and every outbound message
//! through the same [`ChunkSerializer`].
//!
//! Outbound messages are always emitted with fully expanded type 0 headers
//! (continuation chunks excepted); only the inbound path decodes delta
//! headers.

mod context;
mod demultiplexer;
mod errors;
mod serializer;

pub use self::demultiplexer::ChunkDemultiplexer;
pub use self::errors::ChunkError;
pub use self::serializer::ChunkSerializer;

/// Chunks default to 128 byte bodies until a SetChunkSize message says
/// otherwise.
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// A 24 bit timestamp field of all ones escapes to a 32 bit extended
/// timestamp after the header.
pub(crate) const EXTENDED_TIMESTAMP_SENTINEL: u32 = 0x00ff_ffff;

/// SetChunkSize carries the size in 31 bits.
pub(crate) const MAX_CHUNK_SIZE: u32 = 0x7fff_ffff;

use super::{ChunkError, DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP_SENTINEL, MAX_CHUNK_SIZE};
use crate::messages::Message;
use inlet_bitbuf::WriteBuffer;

/// Fragments outbound messages into RTMP chunks.
///
/// Every message gets a fully expanded type 0 header; bodies longer than
/// the outbound chunk size continue in type 3 chunks.  No delta state is
/// kept for the outbound direction, so serialization order cannot corrupt
/// the stream the way it would with header compression.
pub struct ChunkSerializer {
    chunk_size: u32,
}

impl ChunkSerializer {
    pub fn new() -> ChunkSerializer {
        ChunkSerializer {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Changes the outbound chunk body size.  The caller must have already
    /// serialized a SetChunkSize message announcing the new size.
    pub fn set_chunk_size(&mut self, size: u32) -> Result<(), ChunkError> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ChunkError::InvalidChunkSize { chunk_size: size });
        }

        self.chunk_size = size;
        Ok(())
    }

    pub fn serialize(&self, message: &Message, out: &mut WriteBuffer) -> Result<(), ChunkError> {
        if message.body.len() > EXTENDED_TIMESTAMP_SENTINEL as usize {
            return Err(ChunkError::MessageTooLong {
                size: message.body.len(),
            });
        }

        write_basic_header(out, 0, message.chunk_stream_id)?;

        let timestamp = message.timestamp.value;
        let field = timestamp.min(EXTENDED_TIMESTAMP_SENTINEL);
        out.write_bits_be(u64::from(field), 24)?;
        out.write_bits_be(message.body.len() as u64, 24)?;
        out.write_bits_be(u64::from(message.type_id), 8)?;
        out.write_bits_le(u64::from(message.message_stream_id), 32)?;
        if field == EXTENDED_TIMESTAMP_SENTINEL {
            out.write_bits_be(u64::from(timestamp - EXTENDED_TIMESTAMP_SENTINEL), 32)?;
        }

        for (index, slice) in message.body.chunks(self.chunk_size as usize).enumerate() {
            if index > 0 {
                write_basic_header(out, 3, message.chunk_stream_id)?;
            }

            out.write_bytes(slice);
        }

        Ok(())
    }
}

impl Default for ChunkSerializer {
    fn default() -> Self {
        ChunkSerializer::new()
    }
}

fn write_basic_header(out: &mut WriteBuffer, format: u8, csid: u32) -> Result<(), ChunkError> {
    out.write_bits_be(u64::from(format), 2)?;
    match csid {
        2..=63 => out.write_bits_be(u64::from(csid), 6)?,
        64..=319 => {
            out.write_bits_be(0, 6)?;
            out.write_bits_be(u64::from(csid - 64), 8)?;
        }
        320..=65599 => {
            out.write_bits_be(1, 6)?;
            out.write_bits_le(u64::from(csid - 64), 16)?;
        }
        _ => {
            return Err(ChunkError::InvalidChunkStreamId {
                chunk_stream_id: csid,
            })
        }
    }

    Ok(())
}

use super::context::{ChunkContext, PendingMessage};
use super::{ChunkError, DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP_SENTINEL, MAX_CHUNK_SIZE};
use crate::messages::{parse_set_chunk_size, Message, MessageKind};
use crate::time::RtmpTimestamp;
use bytes::BytesMut;
use inlet_bitbuf::{Endianness, ReadBuffer};
use log::trace;
use std::cmp::min;
use std::collections::{HashMap, VecDeque};

/// Reassembles RTMP messages from the interleaved chunks of a connection.
///
/// Parsing is transactional: each call to [`ChunkDemultiplexer::poll`]
/// attempts whole chunks under a buffer snapshot and a shadow copy of the
/// chunk-stream contexts.  A chunk that runs out of bytes mid-header (or
/// mid-body) rolls everything back and reports "no message yet", so feeding
/// a byte stream one byte at a time yields exactly the messages feeding it
/// in one append would.
pub struct ChunkDemultiplexer {
    chunk_size: u32,
    contexts: HashMap<u32, ChunkContext>,
    /// Completed but not yet delivered messages.  More than one can pile up
    /// when a chunk completes a message while earlier completions are still
    /// queued behind a SetChunkSize that changed the parse mid-read.
    ready: VecDeque<Message>,
}

struct Shadow {
    chunk_size: u32,
    contexts: HashMap<u32, ChunkContext>,
    ready: VecDeque<Message>,
}

impl ChunkDemultiplexer {
    pub fn new() -> ChunkDemultiplexer {
        ChunkDemultiplexer {
            chunk_size: DEFAULT_CHUNK_SIZE,
            contexts: HashMap::new(),
            ready: VecDeque::new(),
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Changes the maximum inbound chunk body size.
    ///
    /// This is also applied automatically the moment a SetChunkSize message
    /// completes, so chunks later in the same network read parse correctly.
    pub fn set_chunk_size(&mut self, size: u32) -> Result<(), ChunkError> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ChunkError::InvalidChunkSize { chunk_size: size });
        }

        self.chunk_size = size;
        Ok(())
    }

    /// Reads chunks from `buffer` until a message completes or the buffered
    /// bytes run out.
    ///
    /// `Ok(None)` means more bytes are needed; the buffer cursor and all
    /// contexts are exactly as they were before the bytes that could not be
    /// finished.  Errors are fatal to the connection.
    pub fn poll(&mut self, buffer: &mut ReadBuffer) -> Result<Option<Message>, ChunkError> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Ok(Some(message));
            }

            if buffer.remaining() == 0 {
                return Ok(None);
            }

            let shadow = Shadow {
                chunk_size: self.chunk_size,
                contexts: self.contexts.clone(),
                ready: self.ready.clone(),
            };

            buffer.snapshot();
            match self.parse_chunk(buffer) {
                Ok(()) => buffer.discard_snapshot(),
                Err(error) if error.is_insufficient_data() => {
                    buffer.restore();
                    self.chunk_size = shadow.chunk_size;
                    self.contexts = shadow.contexts;
                    self.ready = shadow.ready;
                    return Ok(None);
                }
                Err(error) => {
                    buffer.discard_snapshot();
                    return Err(error);
                }
            }
        }
    }

    /// Parses exactly one chunk (header plus its slice of body bytes).
    fn parse_chunk(&mut self, buffer: &mut ReadBuffer) -> Result<(), ChunkError> {
        let lead = buffer.read_byte()?;
        let format = lead >> 6;
        let chunk_stream_id = match lead & 0x3f {
            0 => u32::from(buffer.read_byte()?) + 64,
            1 => buffer.read_uint(2, Endianness::Little)? as u32 + 64,
            id => u32::from(id),
        };

        trace!("chunk format {} on chunk stream {}", format, chunk_stream_id);

        match format {
            0 => self.parse_full_header(buffer, chunk_stream_id)?,
            1 | 2 => self.parse_delta_header(buffer, chunk_stream_id, format)?,
            _ => self.parse_bare_header(buffer, chunk_stream_id)?,
        }

        self.read_body(buffer, chunk_stream_id)
    }

    fn parse_full_header(
        &mut self,
        buffer: &mut ReadBuffer,
        chunk_stream_id: u32,
    ) -> Result<(), ChunkError> {
        self.reject_mid_reassembly(0, chunk_stream_id)?;

        let timestamp_field = buffer.read_uint(3, Endianness::Big)? as u32;
        let message_length = buffer.read_uint(3, Endianness::Big)? as u32;
        let message_type_id = buffer.read_byte()?;
        let message_stream_id = buffer.read_uint(4, Endianness::Little)? as u32;
        let (timestamp_value, extended) = read_extended_timestamp(buffer, timestamp_field)?;

        let context = self
            .contexts
            .entry(chunk_stream_id)
            .or_insert_with(ChunkContext::new);

        context.timestamp = RtmpTimestamp::new(timestamp_value);
        context.timestamp_delta = 0;
        context.message_length = message_length;
        context.message_type_id = message_type_id;
        context.message_stream_id = message_stream_id;
        context.extended_timestamp = extended;
        context.pending = Some(PendingMessage {
            length: message_length,
            type_id: message_type_id,
            message_stream_id,
            timestamp: context.timestamp,
            body: BytesMut::with_capacity(message_length as usize),
        });

        Ok(())
    }

    fn parse_delta_header(
        &mut self,
        buffer: &mut ReadBuffer,
        chunk_stream_id: u32,
        format: u8,
    ) -> Result<(), ChunkError> {
        if !self.contexts.contains_key(&chunk_stream_id) {
            return Err(ChunkError::NoPreviousChunk {
                format,
                chunk_stream_id,
            });
        }

        self.reject_mid_reassembly(format, chunk_stream_id)?;

        let delta_field = buffer.read_uint(3, Endianness::Big)? as u32;
        let length_and_type = if format == 1 {
            let message_length = buffer.read_uint(3, Endianness::Big)? as u32;
            let message_type_id = buffer.read_byte()?;
            Some((message_length, message_type_id))
        } else {
            None
        };
        let (delta, extended) = read_extended_timestamp(buffer, delta_field)?;

        let context = match self.contexts.get_mut(&chunk_stream_id) {
            Some(context) => context,
            None => {
                return Err(ChunkError::NoPreviousChunk {
                    format,
                    chunk_stream_id,
                })
            }
        };

        context.timestamp_delta = delta;
        context.timestamp = context.timestamp + delta;
        if let Some((message_length, message_type_id)) = length_and_type {
            context.message_length = message_length;
            context.message_type_id = message_type_id;
        }
        context.extended_timestamp = extended;
        context.pending = Some(PendingMessage {
            length: context.message_length,
            type_id: context.message_type_id,
            message_stream_id: context.message_stream_id,
            timestamp: context.timestamp,
            body: BytesMut::with_capacity(context.message_length as usize),
        });

        Ok(())
    }

    fn parse_bare_header(
        &mut self,
        buffer: &mut ReadBuffer,
        chunk_stream_id: u32,
    ) -> Result<(), ChunkError> {
        let context = match self.contexts.get_mut(&chunk_stream_id) {
            Some(context) => context,
            None => {
                return Err(ChunkError::NoPreviousChunk {
                    format: 3,
                    chunk_stream_id,
                })
            }
        };

        // Type 3 chunks must not carry an extended timestamp, but FMLE (and
        // friends) echo the previous one anyway.  If the last header on this
        // chunk stream used one and the next four bytes repeat it, consume
        // them.
        if let Some(extended) = context.extended_timestamp {
            if buffer.peek_uint(4, Endianness::Big, 0)? == u64::from(extended) {
                buffer.skip(4)?;
            }
        }

        if context.pending.is_none() {
            // No message underway on this chunk stream, so this is a new
            // message inheriting every header field from context.
            context.timestamp = context.timestamp + context.timestamp_delta;
            context.pending = Some(PendingMessage {
                length: context.message_length,
                type_id: context.message_type_id,
                message_stream_id: context.message_stream_id,
                timestamp: context.timestamp,
                body: BytesMut::with_capacity(context.message_length as usize),
            });
        }

        Ok(())
    }

    fn read_body(&mut self, buffer: &mut ReadBuffer, chunk_stream_id: u32) -> Result<(), ChunkError> {
        let chunk_size = self.chunk_size as usize;

        let completed = {
            let context = match self.contexts.get_mut(&chunk_stream_id) {
                Some(context) => context,
                None => {
                    return Err(ChunkError::NoPreviousChunk {
                        format: 3,
                        chunk_stream_id,
                    })
                }
            };

            let pending = match context.pending.as_mut() {
                Some(pending) => pending,
                None => return Ok(()),
            };

            let count = min(chunk_size, pending.remaining());
            if count > 0 {
                let data = buffer.read_bytes(count)?;
                pending.body.extend_from_slice(&data);
            }

            if pending.remaining() == 0 {
                context.pending.take().map(|finished| Message {
                    chunk_stream_id,
                    message_stream_id: finished.message_stream_id,
                    type_id: finished.type_id,
                    timestamp: finished.timestamp,
                    body: finished.body.freeze(),
                })
            } else {
                None
            }
        };

        if let Some(message) = completed {
            if message.kind() == MessageKind::SetChunkSize {
                // Takes effect for the very next chunk parsed, even within
                // the same network read.
                if let Ok(size) = parse_set_chunk_size(&message.body) {
                    self.set_chunk_size(size)?;
                }
            }

            self.ready.push_back(message);
        }

        Ok(())
    }

    fn reject_mid_reassembly(&self, format: u8, chunk_stream_id: u32) -> Result<(), ChunkError> {
        let mid_message = self
            .contexts
            .get(&chunk_stream_id)
            .map_or(false, |context| context.pending.is_some());

        if mid_message {
            return Err(ChunkError::HeaderDuringReassembly {
                format,
                chunk_stream_id,
            });
        }

        Ok(())
    }
}

impl Default for ChunkDemultiplexer {
    fn default() -> Self {
        ChunkDemultiplexer::new()
    }
}

fn read_extended_timestamp(
    buffer: &mut ReadBuffer,
    field: u32,
) -> Result<(u32, Option<u32>), ChunkError> {
    if field == EXTENDED_TIMESTAMP_SENTINEL {
        let extended = buffer.read_uint(4, Endianness::Big)? as u32;
        Ok((EXTENDED_TIMESTAMP_SENTINEL.wrapping_add(extended), Some(extended)))
    } else {
        Ok((field, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
    use std::io::{Cursor, Write};

    fn feed(demultiplexer: &mut ChunkDemultiplexer, bytes: &[u8]) -> Vec<Message> {
        let mut buffer = ReadBuffer::with_capacity(bytes.len().max(1));
        buffer.append(bytes);

        let mut messages = Vec::new();
        while let Some(message) = demultiplexer.poll(&mut buffer).unwrap() {
            messages.push(message);
        }

        messages
    }

    fn write_basic_header(cursor: &mut Cursor<Vec<u8>>, format: u8, csid: u32) {
        let format_mask = format << 6;
        if csid < 64 {
            cursor.write_u8(format_mask | csid as u8).unwrap();
        } else if csid < 320 {
            cursor.write_u8(format_mask).unwrap();
            cursor.write_u8((csid - 64) as u8).unwrap();
        } else {
            cursor.write_u8(format_mask | 1).unwrap();
            cursor.write_u16::<LittleEndian>((csid - 64) as u16).unwrap();
        }
    }

    fn form_type_0_chunk(
        csid: u32,
        timestamp: u32,
        message_stream_id: u32,
        type_id: u8,
        length: u32,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_basic_header(&mut cursor, 0, csid);

        let field = timestamp.min(0xff_ffff);
        cursor.write_u24::<BigEndian>(field).unwrap();
        cursor.write_u24::<BigEndian>(length).unwrap();
        cursor.write_u8(type_id).unwrap();
        cursor.write_u32::<LittleEndian>(message_stream_id).unwrap();
        if field == 0xff_ffff {
            cursor
                .write_u32::<BigEndian>(timestamp - 0xff_ffff)
                .unwrap();
        }

        cursor.write_all(payload).unwrap();
        cursor.into_inner()
    }

    fn form_type_1_chunk(csid: u32, delta: u32, type_id: u8, length: u32, payload: &[u8]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_basic_header(&mut cursor, 1, csid);
        cursor.write_u24::<BigEndian>(delta).unwrap();
        cursor.write_u24::<BigEndian>(length).unwrap();
        cursor.write_u8(type_id).unwrap();
        cursor.write_all(payload).unwrap();
        cursor.into_inner()
    }

    fn form_type_2_chunk(csid: u32, delta: u32, payload: &[u8]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_basic_header(&mut cursor, 2, csid);
        cursor.write_u24::<BigEndian>(delta).unwrap();
        cursor.write_all(payload).unwrap();
        cursor.into_inner()
    }

    fn form_type_3_chunk(csid: u32, payload: &[u8]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        write_basic_header(&mut cursor, 3, csid);
        cursor.write_all(payload).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn can_read_a_type_0_chunk() {
        let payload = [1_u8, 2, 3];
        let bytes = form_type_0_chunk(50, 25, 5, 8, 3, &payload);

        let mut demultiplexer = ChunkDemultiplexer::new();
        let messages = feed(&mut demultiplexer, &bytes);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].chunk_stream_id, 50);
        assert_eq!(messages[0].message_stream_id, 5);
        assert_eq!(messages[0].type_id, 8);
        assert_eq!(messages[0].timestamp, RtmpTimestamp::new(25));
        assert_eq!(&messages[0].body[..], &payload[..]);
    }

    #[test]
    fn delta_headers_inherit_and_accumulate() {
        let payload = [1_u8, 2, 3];
        let mut demultiplexer = ChunkDemultiplexer::new();

        let first = feed(
            &mut demultiplexer,
            &form_type_0_chunk(50, 25, 5, 8, 3, &payload),
        );
        let second = feed(&mut demultiplexer, &form_type_1_chunk(50, 10, 9, 3, &payload));
        let third = feed(&mut demultiplexer, &form_type_2_chunk(50, 11, &payload));
        let fourth = feed(&mut demultiplexer, &form_type_3_chunk(50, &payload));

        assert_eq!(first[0].timestamp, RtmpTimestamp::new(25));
        assert_eq!(second[0].timestamp, RtmpTimestamp::new(35));
        assert_eq!(second[0].type_id, 9, "type 1 sets a new type id");
        assert_eq!(second[0].message_stream_id, 5, "type 1 inherits stream id");
        assert_eq!(third[0].timestamp, RtmpTimestamp::new(46));
        assert_eq!(third[0].type_id, 9, "type 2 inherits type id");
        assert_eq!(fourth[0].timestamp, RtmpTimestamp::new(57));
        assert_eq!(&fourth[0].body[..], &payload[..]);
    }

    #[test]
    fn type_3_after_type_0_does_not_reapply_the_absolute_time() {
        let payload = [7_u8; 4];
        let mut demultiplexer = ChunkDemultiplexer::new();

        let first = feed(
            &mut demultiplexer,
            &form_type_0_chunk(4, 1000, 1, 9, 4, &payload),
        );
        let second = feed(&mut demultiplexer, &form_type_3_chunk(4, &payload));

        assert_eq!(first[0].timestamp, RtmpTimestamp::new(1000));
        assert_eq!(
            second[0].timestamp,
            RtmpTimestamp::new(1000),
            "a full header clears the delta"
        );
    }

    #[test]
    fn message_larger_than_chunk_size_reassembles_across_continuations() {
        let payload = [100_u8; 500];
        let mut bytes = form_type_0_chunk(50, 25, 5, 9, 500, &payload[..100]);
        for slice in payload[100..].chunks(100) {
            bytes.extend_from_slice(&form_type_3_chunk(50, slice));
        }

        let mut demultiplexer = ChunkDemultiplexer::new();
        demultiplexer.set_chunk_size(100).unwrap();
        let messages = feed(&mut demultiplexer, &bytes);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body.len(), 500);
        assert_eq!(&messages[0].body[..], &payload[..]);
    }

    #[test]
    fn interleaved_continuations_complete_in_completion_order() {
        // Audio on chunk stream 4 and video on chunk stream 6, three chunks
        // each, interleaved A0 V0 A1 V1 A2 V2.
        let chunk_size = 16_usize;
        let audio = [0xaa_u8; 48];
        let video = [0xbb_u8; 48];

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&form_type_0_chunk(4, 10, 1, 8, 48, &audio[..16]));
        bytes.extend_from_slice(&form_type_0_chunk(6, 10, 1, 9, 48, &video[..16]));
        bytes.extend_from_slice(&form_type_3_chunk(4, &audio[16..32]));
        bytes.extend_from_slice(&form_type_3_chunk(6, &video[16..32]));
        bytes.extend_from_slice(&form_type_3_chunk(4, &audio[32..]));
        bytes.extend_from_slice(&form_type_3_chunk(6, &video[32..]));

        let mut demultiplexer = ChunkDemultiplexer::new();
        demultiplexer.set_chunk_size(chunk_size as u32).unwrap();
        let messages = feed(&mut demultiplexer, &bytes);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].type_id, 8, "audio completes first");
        assert_eq!(&messages[0].body[..], &audio[..]);
        assert_eq!(messages[1].type_id, 9);
        assert_eq!(&messages[1].body[..], &video[..]);
    }

    #[test]
    fn chunk_size_update_applies_within_the_same_read() {
        // A SetChunkSize(300) message followed by a 300 byte message in a
        // single chunk, all in one append.
        let mut set_chunk_size = Cursor::new(Vec::new());
        set_chunk_size.write_u32::<BigEndian>(300).unwrap();
        let mut bytes = form_type_0_chunk(2, 0, 0, 1, 4, &set_chunk_size.into_inner());

        let payload = [42_u8; 300];
        bytes.extend_from_slice(&form_type_0_chunk(5, 20, 1, 9, 300, &payload));

        let mut demultiplexer = ChunkDemultiplexer::new();
        let messages = feed(&mut demultiplexer, &bytes);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].body.len(), 300);
        assert_eq!(demultiplexer.chunk_size(), 300);
    }

    #[test]
    fn extended_timestamp_decodes_additively() {
        let bytes = form_type_0_chunk(5, 0xff_ffff + 0x0100_0000, 1, 9, 3, &[1, 2, 3]);

        let mut demultiplexer = ChunkDemultiplexer::new();
        let messages = feed(&mut demultiplexer, &bytes);

        assert_eq!(
            messages[0].timestamp,
            RtmpTimestamp::new(0x0100_0000 + 0x00ff_ffff)
        );
    }

    #[test]
    fn type_3_chunks_may_echo_the_extended_timestamp() {
        // 7 byte message split across two chunks of 4; the first header uses
        // the extended timestamp and the continuation echoes it.
        let extended = 0x0000_0002_u32;
        let mut bytes = form_type_0_chunk(6, 0xff_ffff + extended, 1, 9, 7, &[1, 2, 3, 4]);

        let mut continuation = Cursor::new(Vec::new());
        continuation.write_u8(0xc6).unwrap();
        continuation.write_u32::<BigEndian>(extended).unwrap();
        continuation.write_all(&[5, 6, 7]).unwrap();
        bytes.extend_from_slice(&continuation.into_inner());

        let mut demultiplexer = ChunkDemultiplexer::new();
        demultiplexer.set_chunk_size(4).unwrap();
        let messages = feed(&mut demultiplexer, &bytes);

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0].body[..], &[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(
            messages[0].timestamp,
            RtmpTimestamp::new(0x00ff_ffff + extended)
        );
    }

    #[test]
    fn byte_at_a_time_delivery_matches_single_append() {
        let payload = [9_u8; 200];
        let mut bytes = form_type_0_chunk(50, 25, 5, 8, 200, &payload[..128]);
        bytes.extend_from_slice(&form_type_3_chunk(50, &payload[128..]));
        bytes.extend_from_slice(&form_type_2_chunk(50, 5, &payload[..128]));
        bytes.extend_from_slice(&form_type_3_chunk(50, &payload[128..]));

        let mut whole = ChunkDemultiplexer::new();
        let expected = feed(&mut whole, &bytes);
        assert_eq!(expected.len(), 2);

        let mut trickled = ChunkDemultiplexer::new();
        let mut buffer = ReadBuffer::with_capacity(bytes.len());
        let mut received = Vec::new();
        for byte in &bytes {
            buffer.append(&[*byte]);
            while let Some(message) = trickled.poll(&mut buffer).unwrap() {
                received.push(message);
            }
        }

        assert_eq!(received, expected);
    }

    #[test]
    fn partial_chunk_rolls_back_the_cursor() {
        let bytes = form_type_0_chunk(50, 25, 5, 8, 10, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let partial = &bytes[..bytes.len() - 4];

        let mut demultiplexer = ChunkDemultiplexer::new();
        let mut buffer = ReadBuffer::with_capacity(partial.len());
        buffer.append(partial);

        assert!(demultiplexer.poll(&mut buffer).unwrap().is_none());
        assert_eq!(
            buffer.remaining(),
            partial.len(),
            "failed parse must consume nothing"
        );

        buffer.append(&bytes[bytes.len() - 4..]);
        let message = demultiplexer.poll(&mut buffer).unwrap().unwrap();
        assert_eq!(message.body.len(), 10);
    }

    #[test]
    fn zero_length_message_is_delivered_without_body_bytes() {
        let bytes = form_type_0_chunk(3, 5, 1, 20, 0, &[]);

        let mut demultiplexer = ChunkDemultiplexer::new();
        let messages = feed(&mut demultiplexer, &bytes);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body.len(), 0);
    }

    #[test]
    fn delta_chunk_before_any_full_header_is_an_error() {
        let bytes = form_type_1_chunk(9, 5, 8, 3, &[1, 2, 3]);

        let mut demultiplexer = ChunkDemultiplexer::new();
        let mut buffer = ReadBuffer::with_capacity(bytes.len());
        buffer.append(&bytes);

        match demultiplexer.poll(&mut buffer) {
            Err(ChunkError::NoPreviousChunk {
                format: 1,
                chunk_stream_id: 9,
            }) => (),
            x => panic!("Expected NoPreviousChunk, got {:?}", x),
        }
    }

    #[test]
    fn full_header_mid_reassembly_is_an_error() {
        let payload = [1_u8; 200];
        let mut bytes = form_type_0_chunk(50, 25, 5, 8, 200, &payload[..128]);
        bytes.extend_from_slice(&form_type_0_chunk(50, 30, 5, 8, 3, &[1, 2, 3]));

        let mut demultiplexer = ChunkDemultiplexer::new();
        let mut buffer = ReadBuffer::with_capacity(bytes.len());
        buffer.append(&bytes);

        match demultiplexer.poll(&mut buffer) {
            Err(ChunkError::HeaderDuringReassembly {
                format: 0,
                chunk_stream_id: 50,
            }) => (),
            x => panic!("Expected HeaderDuringReassembly, got {:?}", x),
        }
    }

    #[test]
    fn oversized_chunk_size_is_rejected() {
        let mut demultiplexer = ChunkDemultiplexer::new();
        match demultiplexer.set_chunk_size(0x8000_0000) {
            Err(ChunkError::InvalidChunkSize {
                chunk_size: 0x8000_0000,
            }) => (),
            x => panic!("Expected InvalidChunkSize, got {:?}", x),
        }
    }
}

//! Payload encoding and decoding for the protocol-control messages carried
//! on chunk stream 2: SetChunkSize (1), Acknowledgement (3), WindowAckSize
//! (5) and SetPeerBandwidth (6).  All are a 4 byte big-endian value, plus a
//! trailing limit-type byte for SetPeerBandwidth.

use crate::messages::MessageError;
use bytes::Bytes;
use inlet_bitbuf::{BufferError, Endianness, ReadBuffer, WriteBuffer};

/// The bandwidth limiting behaviour requested by a SetPeerBandwidth message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBandwidthLimit {
    Hard,
    Soft,
    Dynamic,
}

impl PeerBandwidthLimit {
    fn limit_byte(self) -> u8 {
        match self {
            PeerBandwidthLimit::Hard => 0,
            PeerBandwidthLimit::Soft => 1,
            PeerBandwidthLimit::Dynamic => 2,
        }
    }
}

pub fn parse_window_ack_size(body: &[u8]) -> Result<u32, MessageError> {
    parse_u32(body)
}

pub fn parse_set_chunk_size(body: &[u8]) -> Result<u32, MessageError> {
    parse_u32(body)
}

pub fn window_ack_size_body(size: u32) -> Result<Bytes, BufferError> {
    u32_body(size)
}

pub fn acknowledgement_body(sequence_number: u32) -> Result<Bytes, BufferError> {
    u32_body(sequence_number)
}

pub fn set_chunk_size_body(size: u32) -> Result<Bytes, BufferError> {
    u32_body(size)
}

pub fn set_peer_bandwidth_body(
    size: u32,
    limit: PeerBandwidthLimit,
) -> Result<Bytes, BufferError> {
    let mut buffer = WriteBuffer::with_capacity(5);
    buffer.write_bits_be(u64::from(size), 32)?;
    buffer.write_bits_be(u64::from(limit.limit_byte()), 8)?;
    Ok(Bytes::from(buffer.take()))
}

fn parse_u32(body: &[u8]) -> Result<u32, MessageError> {
    let mut buffer = ReadBuffer::with_capacity(body.len().max(1));
    buffer.append(body);
    buffer
        .read_uint(4, Endianness::Big)
        .map(|value| value as u32)
        .map_err(|_| MessageError::TruncatedBody)
}

fn u32_body(value: u32) -> Result<Bytes, BufferError> {
    let mut buffer = WriteBuffer::with_capacity(4);
    buffer.write_bits_be(u64::from(value), 32)?;
    Ok(Bytes::from(buffer.take()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_ack_size_round_trips() {
        let body = window_ack_size_body(2_500_000).unwrap();
        assert_eq!(&body[..], &[0x00, 0x26, 0x25, 0xa0]);
        assert_eq!(parse_window_ack_size(&body).unwrap(), 2_500_000);
    }

    #[test]
    fn set_peer_bandwidth_appends_the_limit_type() {
        let body = set_peer_bandwidth_body(2_500_000, PeerBandwidthLimit::Dynamic).unwrap();
        assert_eq!(&body[..], &[0x00, 0x26, 0x25, 0xa0, 0x02]);

        let body = set_peer_bandwidth_body(1, PeerBandwidthLimit::Hard).unwrap();
        assert_eq!(body[4], 0);
    }

    #[test]
    fn short_control_payloads_are_truncated_bodies() {
        match parse_set_chunk_size(&[0x00, 0x01]) {
            Err(MessageError::TruncatedBody) => (),
            x => panic!("Expected TruncatedBody, got {:?}", x),
        }
    }
}

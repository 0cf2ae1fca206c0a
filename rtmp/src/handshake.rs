//! The server side of the RTMP handshake.
//!
//! The exchange is C0/C1/C2 against S0/S1/S2: a one byte version, then two
//! 1536 byte packets each way.  S2 echoes C1's timestamp and random payload.
//! C2 is deliberately *not* validated against S1: well known encoders send
//! echoes that do not match, and a strict check would reject them.
//!
//! Each phase consumes from the connection's [`ReadBuffer`] under the
//! session's snapshot, so a phase that runs out of bytes is simply retried
//! when more arrive.  Phases run opportunistically: if one network read
//! carries C0, C1 and C2 back to back, all three are handled before the
//! call returns.

use inlet_bitbuf::{BufferError, Endianness, ReadBuffer, WriteBuffer};
use log::debug;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// The random payload portion of packets 1 and 2.
pub const RANDOM_PAYLOAD_SIZE: usize = 1528;

/// Timestamp, zeros, and random payload.
const PACKET_SIZE: usize = 8 + RANDOM_PAYLOAD_SIZE;

/// RTMP version 3 is plain RTMP; anything else is encrypted or unknown.
const RTMP_VERSION: u8 = 3;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Client requested RTMP version {version}, only version 3 is supported")]
    BadVersion { version: u8 },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl HandshakeError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, HandshakeError::Buffer(error) if error.is_insufficient_data())
    }
}

/// Where the handshake stands, named for the last packet the server sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Uninitialized,
    S0Sent,
    S2Sent,
    Done,
}

pub struct Handshake {
    phase: HandshakePhase,
    epoch: u32,
}

impl Handshake {
    pub fn new() -> Handshake {
        Handshake {
            phase: HandshakePhase::Uninitialized,
            epoch: 0,
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == HandshakePhase::Done
    }

    /// Runs the next handshake phase against the buffered bytes, writing any
    /// response packets to `out`.
    ///
    /// Response bytes are only written once the phase's inbound packet has
    /// been fully consumed, so a rolled back attempt leaves `out` untouched.
    pub fn process(
        &mut self,
        buffer: &mut ReadBuffer,
        out: &mut WriteBuffer,
    ) -> Result<(), HandshakeError> {
        match self.phase {
            HandshakePhase::Uninitialized => self.handle_c0(buffer, out),
            HandshakePhase::S0Sent => self.handle_c1(buffer, out),
            HandshakePhase::S2Sent => self.handle_c2(buffer),
            HandshakePhase::Done => Ok(()),
        }
    }

    fn handle_c0(
        &mut self,
        buffer: &mut ReadBuffer,
        out: &mut WriteBuffer,
    ) -> Result<(), HandshakeError> {
        let version = buffer.read_byte()?;
        if version != RTMP_VERSION {
            return Err(HandshakeError::BadVersion { version });
        }

        out.write_bytes(&[RTMP_VERSION]);

        out.write_bits_be(u64::from(self.epoch), 32)?;
        out.write_bits_be(0, 32)?;
        let mut payload = [0_u8; RANDOM_PAYLOAD_SIZE];
        rand::thread_rng().fill(&mut payload[..]);
        out.write_bytes(&payload);

        debug!("handshake: S0 and S1 sent");
        self.phase = HandshakePhase::S0Sent;
        Ok(())
    }

    fn handle_c1(
        &mut self,
        buffer: &mut ReadBuffer,
        out: &mut WriteBuffer,
    ) -> Result<(), HandshakeError> {
        let timestamp = buffer.read_uint(4, Endianness::Big)? as u32;
        buffer.skip(4)?;
        let echo = buffer.read_bytes(RANDOM_PAYLOAD_SIZE)?;

        out.write_bits_be(u64::from(timestamp), 32)?;
        out.write_bits_be(u64::from(wall_clock_seconds()), 32)?;
        out.write_bytes(&echo);

        debug!("handshake: S2 sent");
        self.phase = HandshakePhase::S2Sent;
        Ok(())
    }

    fn handle_c2(&mut self, buffer: &mut ReadBuffer) -> Result<(), HandshakeError> {
        // Consumed, never compared against S1.
        buffer.skip(PACKET_SIZE)?;

        debug!("handshake: complete");
        self.phase = HandshakePhase::Done;
        Ok(())
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Handshake::new()
    }
}

fn wall_clock_seconds() -> u32 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs() as u32,
        Err(_) => 0,
    }
}

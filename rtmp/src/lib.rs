//! Publish-side RTMP protocol engine.
//!
//! This crate accepts the bytes of an RTMP connection from a publishing
//! encoder (OBS, FMLE, ffmpeg and friends), performs the handshake,
//! reassembles chunk streams into messages, negotiates the publishing
//! session and hands decoded media to an [`actor::RtmpActor`] supplied by
//! the embedding application.  The actor owns everything downstream of the
//! protocol: what to do with metadata, audio and video is not this crate's
//! concern.
//!
//! The layering mirrors the wire format:
//!
//! * [`chunk`]: splitting and reassembling the RTMP chunk framing
//! * [`messages`]: interpreting reassembled message bodies
//! * [`handshake`]: the C0/C1/C2 - S0/S1/S2 exchange
//! * [`session`]: the per-connection state machine tying it together
//! * [`listener`]: blocking accept loop, one thread per connection
//! * [`queue`]: the byte queue linking a connection to its media consumer

pub mod actor;
pub mod chunk;
pub mod handshake;
pub mod listener;
pub mod messages;
pub mod queue;
pub mod session;
pub mod time;

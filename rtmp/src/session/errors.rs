use crate::chunk::ChunkError;
use crate::handshake::HandshakeError;
use crate::messages::MessageError;
use inlet_amf0::Amf0EncodeError;
use inlet_bitbuf::BufferError;
use thiserror::Error;

/// Errors a session can raise while processing connection bytes.
///
/// Everything except a buffered-data shortfall (see
/// [`SessionError::is_insufficient_data`]) is fatal: the connection driver
/// closes the socket and fires the actor's disconnect callback.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("Failed to encode an outbound response: {0}")]
    ResponseEncoding(#[from] Amf0EncodeError),

    /// A valid message arrived at a phase that disallows it.
    #[error("Received a {command} command in a state that does not allow it")]
    BadState { command: &'static str },

    /// The external collaborator refused the request.
    #[error("The {callback} callback rejected the request")]
    Rejected { callback: &'static str },

    /// A recognised but unimplemented message class (AMF3 commands and
    /// data, shared objects, aggregates).
    #[error("Messages of type {type_id} are not supported")]
    UnsupportedMessage { type_id: u8 },
}

impl SessionError {
    /// True when the error only means "wait for more bytes".  The session
    /// has already rolled its cursor back; the caller keeps the connection
    /// open and retries after the next network read.
    pub fn is_insufficient_data(&self) -> bool {
        match self {
            SessionError::Handshake(error) => error.is_insufficient_data(),
            SessionError::Chunk(error) => error.is_insufficient_data(),
            SessionError::Buffer(error) => error.is_insufficient_data(),
            _ => false,
        }
    }
}

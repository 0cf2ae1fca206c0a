use thiserror::Error;

/// Errors raised by the buffer primitives.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum BufferError {
    /// A read reached past the bytes currently buffered.  This is the normal
    /// end-of-buffer signal for streaming parsers and is always retried once
    /// more bytes arrive; it never indicates malformed data.
    #[error("Not enough bytes are buffered to complete the read")]
    InsufficientData,

    /// An integer width outside the supported range was requested.
    #[error("Invalid width of {bits} bits requested")]
    InvalidWidth { bits: u32 },
}

impl BufferError {
    pub fn is_insufficient_data(&self) -> bool {
        *self == BufferError::InsufficientData
    }
}

use crate::Amf0Marker;
use inlet_bitbuf::BufferError;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Errors that can occur while decoding AMF0 data.
#[derive(Debug, Error)]
pub enum Amf0DecodeError {
    /// A value of one type was found where another was required (e.g. a
    /// boolean where a command name string should be).
    #[error("Expected a {expected:?} marker but found byte {found}")]
    Unexpected { found: u8, expected: Amf0Marker },

    /// A marker byte outside the supported variant set was encountered.
    /// Long strings, typed objects, dates and the other rarely seen AMF0
    /// types fall in here.
    #[error("Encountered unsupported marker byte {marker}")]
    Unsupported { marker: u8 },

    /// Ran out of buffered bytes mid-value.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// AMF0 strings are UTF-8; raised when the bytes read are not.
    #[error("String data was not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

impl Amf0DecodeError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Amf0DecodeError::Buffer(error) if error.is_insufficient_data())
    }
}

/// Errors that can occur while encoding AMF0 data.
#[derive(Debug, Error)]
pub enum Amf0EncodeError {
    /// AMF0 strings carry a u16 length prefix, so 65,535 bytes is the most
    /// a normal string can hold.
    #[error("String length greater than 65,535")]
    StringTooLong,

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

use inlet_amf0::Amf0DecodeError;
use thiserror::Error;

/// Errors raised while interpreting a completed message body.
///
/// These operate on fully reassembled bodies, so running out of bytes does
/// not mean "wait for more": a declared length and the encoded content
/// disagree, which is malformed protocol data and fatal to the connection.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The message body ended before the encoded content did.
    #[error("The message body ended before its encoded content did")]
    TruncatedBody,

    #[error("Malformed AMF0 content: {0}")]
    Amf0(Amf0DecodeError),

    /// The RTMP specification requires the connect command to use
    /// transaction id 1.
    #[error("The connect command must carry transaction id 1, received {transaction_id}")]
    ConnectTransactionId { transaction_id: f64 },

    /// A value other than the required one led a message body (e.g. a data
    /// frame without the `onMetaData` name).
    #[error("Expected {expected} in the message body")]
    UnexpectedField { expected: &'static str },
}

impl From<Amf0DecodeError> for MessageError {
    fn from(error: Amf0DecodeError) -> Self {
        if error.is_insufficient_data() {
            MessageError::TruncatedBody
        } else {
            MessageError::Amf0(error)
        }
    }
}

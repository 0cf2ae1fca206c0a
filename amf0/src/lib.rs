//! Encoding and decoding of AMF0 values based on the Adobe AMF0
//! specification located at
//! <https://wwwimages2.adobe.com/content/dam/acom/en/devnet/pdf/amf0-file-format-specification.pdf>.
//!
//! The decoder works value-by-value against a [`inlet_bitbuf::ReadBuffer`]
//! cursor so command parsers can pull out the fields they recognise and skip
//! the ones they do not, without materialising whole documents.  A full
//! recursive [`Amf0Decoder::read_value`] / [`Amf0Encoder::write_value`] pair
//! is also provided.
//!
//! # Examples
//! ```
//! use inlet_amf0::{Amf0Decoder, Amf0Encoder, Amf0Value};
//! use inlet_bitbuf::{ReadBuffer, WriteBuffer};
//!
//! let value = Amf0Value::Object(vec![
//!     ("app".to_string(), Amf0Value::Utf8String("live".to_string())),
//!     ("fpad".to_string(), Amf0Value::Boolean(false)),
//! ]);
//!
//! let mut output = WriteBuffer::new();
//! Amf0Encoder::new(&mut output).write_value(&value).unwrap();
//!
//! let mut input = ReadBuffer::with_capacity(64);
//! input.append(&output.take());
//! let decoded = Amf0Decoder::new(&mut input).read_value().unwrap();
//!
//! assert_eq!(decoded, value);
//! ```

mod decoder;
mod encoder;
mod errors;

pub use decoder::Amf0Decoder;
pub use encoder::Amf0Encoder;
pub use errors::{Amf0DecodeError, Amf0EncodeError};

/// The type tag that introduces every encoded AMF0 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amf0Marker {
    Number = 0,
    Boolean = 1,
    String = 2,
    Object = 3,
    Null = 5,
    Undefined = 6,
    EcmaArray = 8,
    ObjectEnd = 9,
}

impl Amf0Marker {
    pub fn from_byte(byte: u8) -> Result<Amf0Marker, Amf0DecodeError> {
        match byte {
            0 => Ok(Amf0Marker::Number),
            1 => Ok(Amf0Marker::Boolean),
            2 => Ok(Amf0Marker::String),
            3 => Ok(Amf0Marker::Object),
            5 => Ok(Amf0Marker::Null),
            6 => Ok(Amf0Marker::Undefined),
            8 => Ok(Amf0Marker::EcmaArray),
            9 => Ok(Amf0Marker::ObjectEnd),
            marker => Err(Amf0DecodeError::Unsupported { marker }),
        }
    }
}

/// An AMF0 value in the supported variant set.
///
/// Object and ecma-array properties keep their wire order.
#[derive(PartialEq, Debug, Clone)]
pub enum Amf0Value {
    Number(f64),
    Boolean(bool),
    Utf8String(String),
    Object(Vec<(String, Amf0Value)>),
    EcmaArray(Vec<(String, Amf0Value)>),
    Null,
    Undefined,
}

impl Amf0Value {
    pub fn marker(&self) -> Amf0Marker {
        match *self {
            Amf0Value::Number(_) => Amf0Marker::Number,
            Amf0Value::Boolean(_) => Amf0Marker::Boolean,
            Amf0Value::Utf8String(_) => Amf0Marker::String,
            Amf0Value::Object(_) => Amf0Marker::Object,
            Amf0Value::EcmaArray(_) => Amf0Marker::EcmaArray,
            Amf0Value::Null => Amf0Marker::Null,
            Amf0Value::Undefined => Amf0Marker::Undefined,
        }
    }

    pub fn get_number(self) -> Option<f64> {
        match self {
            Amf0Value::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_boolean(self) -> Option<bool> {
        match self {
            Amf0Value::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_string(self) -> Option<String> {
        match self {
            Amf0Value::Utf8String(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inlet_bitbuf::{ReadBuffer, WriteBuffer};

    fn round_trip(value: Amf0Value) -> Amf0Value {
        let mut output = WriteBuffer::new();
        Amf0Encoder::new(&mut output).write_value(&value).unwrap();

        let bytes = output.take();
        let mut input = ReadBuffer::with_capacity(bytes.len());
        input.append(&bytes);
        Amf0Decoder::new(&mut input).read_value().unwrap()
    }

    #[test]
    fn every_variant_survives_a_round_trip() {
        let values = vec![
            Amf0Value::Number(332.5),
            Amf0Value::Boolean(true),
            Amf0Value::Boolean(false),
            Amf0Value::Utf8String("stream key".to_string()),
            Amf0Value::Null,
            Amf0Value::Undefined,
            Amf0Value::Object(vec![
                ("app".to_string(), Amf0Value::Utf8String("live".to_string())),
                (
                    "nested".to_string(),
                    Amf0Value::Object(vec![("x".to_string(), Amf0Value::Number(1.0))]),
                ),
            ]),
            Amf0Value::EcmaArray(vec![
                ("width".to_string(), Amf0Value::Number(1280.0)),
                ("height".to_string(), Amf0Value::Number(720.0)),
            ]),
        ];

        for value in values {
            assert_eq!(round_trip(value.clone()), value, "value {:?}", value);
        }
    }
}

use crate::errors::Amf0EncodeError;
use crate::{Amf0Marker, Amf0Value};
use inlet_bitbuf::WriteBuffer;

/// Encodes AMF0 values into a [`WriteBuffer`].
///
/// Numbers are IEEE-754 doubles in network byte order.  Objects are emitted
/// as `(u16 key length, key bytes, value)` pairs terminated by the
/// `00 00 09` sentinel.
pub struct Amf0Encoder<'a> {
    buffer: &'a mut WriteBuffer,
}

impl<'a> Amf0Encoder<'a> {
    pub fn new(buffer: &'a mut WriteBuffer) -> Amf0Encoder<'a> {
        Amf0Encoder { buffer }
    }

    pub fn write_number(&mut self, value: f64) -> Result<(), Amf0EncodeError> {
        self.write_marker(Amf0Marker::Number)?;
        self.buffer.write_bits_be(value.to_bits(), 64)?;
        Ok(())
    }

    pub fn write_boolean(&mut self, value: bool) -> Result<(), Amf0EncodeError> {
        self.write_marker(Amf0Marker::Boolean)?;
        self.buffer.write_bits_be(u64::from(value), 8)?;
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), Amf0EncodeError> {
        self.write_marker(Amf0Marker::String)?;
        self.write_utf8(value)
    }

    pub fn write_null(&mut self) -> Result<(), Amf0EncodeError> {
        self.write_marker(Amf0Marker::Null)
    }

    pub fn write_undefined(&mut self) -> Result<(), Amf0EncodeError> {
        self.write_marker(Amf0Marker::Undefined)
    }

    pub fn write_object_start(&mut self) -> Result<(), Amf0EncodeError> {
        self.write_marker(Amf0Marker::Object)
    }

    /// Writes a property key (a length-prefixed string with no marker byte).
    pub fn write_object_key(&mut self, key: &str) -> Result<(), Amf0EncodeError> {
        self.write_utf8(key)
    }

    pub fn write_object_end(&mut self) -> Result<(), Amf0EncodeError> {
        self.buffer.write_bits_be(0, 16)?;
        self.write_marker(Amf0Marker::ObjectEnd)
    }

    pub fn write_ecma_array_start(&mut self, count: u32) -> Result<(), Amf0EncodeError> {
        self.write_marker(Amf0Marker::EcmaArray)?;
        self.buffer.write_bits_be(u64::from(count), 32)?;
        Ok(())
    }

    /// Writes one complete value, recursing through objects and ecma arrays.
    pub fn write_value(&mut self, value: &Amf0Value) -> Result<(), Amf0EncodeError> {
        match *value {
            Amf0Value::Number(number) => self.write_number(number),
            Amf0Value::Boolean(boolean) => self.write_boolean(boolean),
            Amf0Value::Utf8String(ref string) => self.write_string(string),
            Amf0Value::Null => self.write_null(),
            Amf0Value::Undefined => self.write_undefined(),
            Amf0Value::Object(ref properties) => {
                self.write_object_start()?;
                self.write_properties(properties)
            }
            Amf0Value::EcmaArray(ref properties) => {
                self.write_ecma_array_start(properties.len() as u32)?;
                self.write_properties(properties)
            }
        }
    }

    fn write_properties(&mut self, properties: &[(String, Amf0Value)]) -> Result<(), Amf0EncodeError> {
        for (key, value) in properties {
            self.write_object_key(key)?;
            self.write_value(value)?;
        }

        self.write_object_end()
    }

    fn write_marker(&mut self, marker: Amf0Marker) -> Result<(), Amf0EncodeError> {
        self.buffer.write_bits_be(marker as u64, 8)?;
        Ok(())
    }

    fn write_utf8(&mut self, value: &str) -> Result<(), Amf0EncodeError> {
        if value.len() > usize::from(u16::MAX) {
            return Err(Amf0EncodeError::StringTooLong);
        }

        self.buffer.write_bits_be(value.len() as u64, 16)?;
        self.buffer.write_bytes(value.as_bytes());
        Ok(())
    }
}

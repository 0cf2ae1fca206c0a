use crate::errors::Amf0DecodeError;
use crate::{Amf0Marker, Amf0Value};
use inlet_bitbuf::{Endianness, ReadBuffer};

/// The three byte sequence (empty key, object-end marker) that terminates
/// objects and ecma arrays.
const OBJECT_END_SENTINEL: u64 = Amf0Marker::ObjectEnd as u64;

/// Decodes AMF0 values from a [`ReadBuffer`] cursor.
///
/// All reads go through the buffer's transactional cursor, so a decoder can
/// run under an active snapshot and be rolled back as a unit.
pub struct Amf0Decoder<'a> {
    buffer: &'a mut ReadBuffer,
}

impl<'a> Amf0Decoder<'a> {
    pub fn new(buffer: &'a mut ReadBuffer) -> Amf0Decoder<'a> {
        Amf0Decoder { buffer }
    }

    /// True once every buffered byte has been consumed.
    pub fn is_finished(&self) -> bool {
        self.buffer.remaining() == 0
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    /// Peeks at the marker introducing the next value without consuming it.
    ///
    /// With `inside_object` set, a cursor standing on the `00 00 09` object
    /// terminator reports [`Amf0Marker::ObjectEnd`] instead of interpreting
    /// the bytes as a property key.
    pub fn next_marker(&self, inside_object: bool) -> Result<Amf0Marker, Amf0DecodeError> {
        if inside_object && self.at_object_end()? {
            return Ok(Amf0Marker::ObjectEnd);
        }

        let byte = self.buffer.peek_uint(1, Endianness::Big, 0)? as u8;
        Amf0Marker::from_byte(byte)
    }

    pub fn read_number(&mut self) -> Result<f64, Amf0DecodeError> {
        self.expect_marker(Amf0Marker::Number)?;
        let bits = self.buffer.read_uint(8, Endianness::Big)?;
        Ok(f64::from_bits(bits))
    }

    pub fn read_boolean(&mut self) -> Result<bool, Amf0DecodeError> {
        self.expect_marker(Amf0Marker::Boolean)?;
        Ok(self.buffer.read_byte()? != 0)
    }

    pub fn read_string(&mut self) -> Result<String, Amf0DecodeError> {
        self.expect_marker(Amf0Marker::String)?;
        self.read_utf8()
    }

    pub fn read_null(&mut self) -> Result<(), Amf0DecodeError> {
        self.expect_marker(Amf0Marker::Null)
    }

    pub fn read_undefined(&mut self) -> Result<(), Amf0DecodeError> {
        self.expect_marker(Amf0Marker::Undefined)
    }

    /// Reads a property key (a length-prefixed string with no marker byte).
    pub fn read_object_key(&mut self) -> Result<String, Amf0DecodeError> {
        self.read_utf8()
    }

    pub fn read_object_start(&mut self) -> Result<(), Amf0DecodeError> {
        self.expect_marker(Amf0Marker::Object)
    }

    /// Consumes an ecma-array marker and returns its associative count.
    ///
    /// The count is a hint only; termination always follows the object-end
    /// sentinel, which is what real encoders emit.
    pub fn read_ecma_array_start(&mut self) -> Result<u32, Amf0DecodeError> {
        self.expect_marker(Amf0Marker::EcmaArray)?;
        Ok(self.buffer.read_uint(4, Endianness::Big)? as u32)
    }

    /// Consumes the three byte object terminator.
    pub fn skip_object_end(&mut self) -> Result<(), Amf0DecodeError> {
        self.buffer.skip(3)?;
        Ok(())
    }

    /// Consumes exactly one value of the given type, recursing through
    /// objects and ecma arrays.  Used to ignore fields the caller does not
    /// recognise.
    pub fn skip_value(&mut self, marker: Amf0Marker) -> Result<(), Amf0DecodeError> {
        match marker {
            Amf0Marker::Number => {
                self.read_number()?;
            }
            Amf0Marker::Boolean => {
                self.read_boolean()?;
            }
            Amf0Marker::String => {
                self.read_string()?;
            }
            Amf0Marker::Null => self.read_null()?,
            Amf0Marker::Undefined => self.read_undefined()?,
            Amf0Marker::Object => {
                self.read_object_start()?;
                self.skip_properties()?;
            }
            Amf0Marker::EcmaArray => {
                self.read_ecma_array_start()?;
                self.skip_properties()?;
            }
            Amf0Marker::ObjectEnd => {
                return Err(Amf0DecodeError::Unsupported {
                    marker: Amf0Marker::ObjectEnd as u8,
                })
            }
        }

        Ok(())
    }

    /// Reads one complete value, recursing through objects and ecma arrays.
    pub fn read_value(&mut self) -> Result<Amf0Value, Amf0DecodeError> {
        match self.next_marker(false)? {
            Amf0Marker::Number => self.read_number().map(Amf0Value::Number),
            Amf0Marker::Boolean => self.read_boolean().map(Amf0Value::Boolean),
            Amf0Marker::String => self.read_string().map(Amf0Value::Utf8String),
            Amf0Marker::Null => self.read_null().map(|_| Amf0Value::Null),
            Amf0Marker::Undefined => self.read_undefined().map(|_| Amf0Value::Undefined),
            Amf0Marker::Object => {
                self.read_object_start()?;
                self.read_properties().map(Amf0Value::Object)
            }
            Amf0Marker::EcmaArray => {
                self.read_ecma_array_start()?;
                self.read_properties().map(Amf0Value::EcmaArray)
            }
            Amf0Marker::ObjectEnd => Err(Amf0DecodeError::Unsupported {
                marker: Amf0Marker::ObjectEnd as u8,
            }),
        }
    }

    fn at_object_end(&self) -> Result<bool, Amf0DecodeError> {
        Ok(self.buffer.peek_uint(3, Endianness::Big, 0)? == OBJECT_END_SENTINEL)
    }

    fn expect_marker(&mut self, expected: Amf0Marker) -> Result<(), Amf0DecodeError> {
        let found = self.buffer.read_byte()?;
        if found != expected as u8 {
            return Err(Amf0DecodeError::Unexpected { found, expected });
        }

        Ok(())
    }

    fn read_utf8(&mut self) -> Result<String, Amf0DecodeError> {
        let length = self.buffer.read_uint(2, Endianness::Big)? as usize;
        let bytes = self.buffer.read_bytes(length)?;
        Ok(String::from_utf8(bytes)?)
    }

    fn read_properties(&mut self) -> Result<Vec<(String, Amf0Value)>, Amf0DecodeError> {
        let mut properties = Vec::new();
        loop {
            if self.at_object_end()? {
                self.skip_object_end()?;
                return Ok(properties);
            }

            let key = self.read_object_key()?;
            let value = self.read_value()?;
            properties.push((key, value));
        }
    }

    fn skip_properties(&mut self) -> Result<(), Amf0DecodeError> {
        loop {
            if self.at_object_end()? {
                return self.skip_object_end();
            }

            self.read_object_key()?;
            let marker = self.next_marker(false)?;
            self.skip_value(marker)?;
        }
    }
}

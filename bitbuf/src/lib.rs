//! Byte and bit level buffer primitives shared by the inlet RTMP crates.
//!
//! The read side (`ReadBuffer`) is a linear byte buffer that network reads
//! append to and protocol parsers consume from.  Its snapshot mechanism turns
//! streaming parsing into a transactional retry loop: a parser snapshots the
//! cursor, attempts a parse, and on [`BufferError::InsufficientData`] restores
//! the cursor to exactly where it was and waits for more bytes.
//!
//! The write side (`WriteBuffer`) is an append-only buffer that accepts
//! integers of arbitrary bit widths, which is what the RTMP chunk header
//! format (2-bit format tags, 6-bit stream ids, 24-bit lengths) needs.

mod errors;
mod read_buffer;
mod write_buffer;

pub use errors::BufferError;
pub use read_buffer::{Endianness, ReadBuffer};
pub use write_buffer::WriteBuffer;

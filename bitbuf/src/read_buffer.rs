use crate::errors::BufferError;

/// Byte order for multi-byte integer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// A linear byte buffer with a read cursor and a write cursor.
///
/// Network reads append at the write cursor; parsers consume from the read
/// cursor.  Every read operation fails with
/// [`BufferError::InsufficientData`] when fewer bytes than requested are
/// buffered, leaving the cursor untouched.
///
/// # Snapshots
///
/// `snapshot()` records the read cursor so that a parse attempt spanning
/// several reads can be undone as a unit with `restore()`.  Snapshots do not
/// nest, and appending while a snapshot is active is a contract violation
/// (both panic): the unread tail may be relocated during an append, which
/// would invalidate the saved cursor.
pub struct ReadBuffer {
    storage: Vec<u8>,
    read_position: usize,
    write_position: usize,
    snapshot_position: Option<usize>,
}

impl ReadBuffer {
    pub fn with_capacity(capacity: usize) -> ReadBuffer {
        ReadBuffer {
            storage: vec![0; capacity],
            read_position: 0,
            write_position: 0,
            snapshot_position: None,
        }
    }

    /// The number of buffered bytes that have not been read yet.
    pub fn remaining(&self) -> usize {
        self.write_position - self.read_position
    }

    /// Appends bytes at the write cursor, growing the storage if needed.
    ///
    /// When the append would run past the end of the storage the unread tail
    /// is first compacted to offset 0; the storage only grows (amortised
    /// doubling) if the bytes still do not fit after compaction.
    pub fn append(&mut self, data: &[u8]) {
        assert!(
            self.snapshot_position.is_none(),
            "append while a snapshot is active"
        );

        if self.write_position + data.len() > self.storage.len() {
            let unread = self.remaining();
            self.storage
                .copy_within(self.read_position..self.write_position, 0);
            self.read_position = 0;
            self.write_position = unread;

            while self.write_position + data.len() > self.storage.len() {
                let grown = (self.storage.len() * 2).max(self.write_position + data.len());
                self.storage.resize(grown, 0);
            }
        }

        self.storage[self.write_position..self.write_position + data.len()].copy_from_slice(data);
        self.write_position += data.len();
    }

    pub fn skip(&mut self, count: usize) -> Result<(), BufferError> {
        if self.remaining() < count {
            return Err(BufferError::InsufficientData);
        }

        self.read_position += count;
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8, BufferError> {
        if self.remaining() < 1 {
            return Err(BufferError::InsufficientData);
        }

        let byte = self.storage[self.read_position];
        self.read_position += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, BufferError> {
        if self.remaining() < count {
            return Err(BufferError::InsufficientData);
        }

        let bytes = self.storage[self.read_position..self.read_position + count].to_vec();
        self.read_position += count;
        Ok(bytes)
    }

    /// Reads an unsigned integer of `width` bytes (1 through 8).
    pub fn read_uint(&mut self, width: usize, endianness: Endianness) -> Result<u64, BufferError> {
        let value = self.peek_uint(width, endianness, 0)?;
        self.read_position += width;
        Ok(value)
    }

    /// Reads an integer like [`ReadBuffer::read_uint`] but without consuming,
    /// starting `offset` bytes past the read cursor.
    pub fn peek_uint(
        &self,
        width: usize,
        endianness: Endianness,
        offset: usize,
    ) -> Result<u64, BufferError> {
        if !(1..=8).contains(&width) {
            return Err(BufferError::InvalidWidth {
                bits: width as u32 * 8,
            });
        }

        if self.remaining() < offset + width {
            return Err(BufferError::InsufficientData);
        }

        let start = self.read_position + offset;
        let mut value = 0_u64;
        for index in 0..width {
            let byte = u64::from(self.storage[start + index]);
            match endianness {
                Endianness::Big => value |= byte << (8 * (width - index - 1)),
                Endianness::Little => value |= byte << (8 * index),
            }
        }

        Ok(value)
    }

    /// Records the read cursor so a failed parse attempt can be undone.
    pub fn snapshot(&mut self) {
        assert!(self.snapshot_position.is_none(), "snapshots do not nest");
        self.snapshot_position = Some(self.read_position);
    }

    /// Rewinds the read cursor to the active snapshot and clears it.
    pub fn restore(&mut self) {
        match self.snapshot_position.take() {
            Some(position) => self.read_position = position,
            None => panic!("restore without an active snapshot"),
        }
    }

    /// Clears the active snapshot, keeping the cursor where it is.
    pub fn discard_snapshot(&mut self) {
        self.snapshot_position = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_read_appended_bytes_in_order() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[1, 2, 3]);
        buffer.append(&[4]);

        assert_eq!(buffer.remaining(), 4);
        assert_eq!(buffer.read_byte().unwrap(), 1);
        assert_eq!(buffer.read_bytes(3).unwrap(), vec![2, 3, 4]);
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn read_past_end_returns_insufficient_data_and_keeps_cursor() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[1, 2]);

        assert_eq!(buffer.read_bytes(3), Err(BufferError::InsufficientData));
        assert_eq!(buffer.remaining(), 2);
        assert_eq!(buffer.read_bytes(2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn can_read_big_and_little_endian_integers() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[0x01, 0x02, 0x03, 0x04]);

        assert_eq!(buffer.read_uint(3, Endianness::Big).unwrap(), 0x010203);

        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[0x01, 0x02, 0x03, 0x04]);

        assert_eq!(buffer.read_uint(4, Endianness::Little).unwrap(), 0x04030201);
    }

    #[test]
    fn can_read_full_width_integer() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[0xff, 0xee, 0xdd, 0xcc, 0xbb, 0xaa, 0x99, 0x88]);

        assert_eq!(
            buffer.read_uint(8, Endianness::Big).unwrap(),
            0xffeeddccbbaa9988
        );
    }

    #[test]
    fn peek_does_not_consume_and_honors_offset() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[0x01, 0x02, 0x03, 0x04]);

        assert_eq!(buffer.peek_uint(2, Endianness::Big, 1).unwrap(), 0x0203);
        assert_eq!(buffer.remaining(), 4);
        assert_eq!(buffer.read_byte().unwrap(), 0x01);
    }

    #[test]
    fn invalid_widths_are_rejected() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[0; 16]);

        assert_eq!(
            buffer.read_uint(0, Endianness::Big),
            Err(BufferError::InvalidWidth { bits: 0 })
        );
        assert_eq!(
            buffer.read_uint(9, Endianness::Big),
            Err(BufferError::InvalidWidth { bits: 72 })
        );
    }

    #[test]
    fn restore_rewinds_to_the_snapshot_point() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[1, 2, 3, 4, 5]);

        buffer.read_byte().unwrap();
        buffer.snapshot();
        buffer.read_bytes(3).unwrap();
        buffer.restore();

        assert_eq!(buffer.remaining(), 4);
        assert_eq!(buffer.read_byte().unwrap(), 2);
    }

    #[test]
    fn discard_snapshot_keeps_the_cursor() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[1, 2, 3]);

        buffer.snapshot();
        buffer.read_bytes(2).unwrap();
        buffer.discard_snapshot();

        assert_eq!(buffer.remaining(), 1);
        assert_eq!(buffer.read_byte().unwrap(), 3);
    }

    #[test]
    #[should_panic(expected = "append while a snapshot is active")]
    fn append_during_snapshot_panics() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.append(&[1]);
        buffer.snapshot();
        buffer.append(&[2]);
    }

    #[test]
    #[should_panic(expected = "snapshots do not nest")]
    fn nested_snapshot_panics() {
        let mut buffer = ReadBuffer::with_capacity(16);
        buffer.snapshot();
        buffer.snapshot();
    }

    #[test]
    fn append_compacts_the_unread_tail_before_growing() {
        let mut buffer = ReadBuffer::with_capacity(4);
        buffer.append(&[1, 2, 3, 4]);
        buffer.read_bytes(3).unwrap();

        // One unread byte; three more fit into the existing capacity once the
        // tail moves to offset 0.
        buffer.append(&[5, 6, 7]);
        assert_eq!(buffer.remaining(), 4);
        assert_eq!(buffer.read_bytes(4).unwrap(), vec![4, 5, 6, 7]);
    }

    #[test]
    fn append_grows_when_compaction_is_not_enough() {
        let mut buffer = ReadBuffer::with_capacity(2);
        buffer.append(&[1, 2]);
        buffer.read_byte().unwrap();

        buffer.append(&[3, 4, 5, 6, 7]);
        assert_eq!(buffer.remaining(), 6);
        assert_eq!(buffer.read_bytes(6).unwrap(), vec![2, 3, 4, 5, 6, 7]);
    }
}

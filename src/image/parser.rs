//! Cursor over a class image buffer.
//!
//! [`Parser`] keeps a position into a borrowed byte slice and offers the
//! primitive reads the image format is made of: little-endian integers, 7-bit
//! encoded lengths, length-prefixed UTF-8 strings and raw byte runs. Every read is
//! bounds-checked and advances the position only on success.

use crate::{
    image::io::{read_le_at, ImageIO},
    Result,
};

/// A bounds-checked reader over a class image.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a parser positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current position
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns true while unread bytes remain
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of unread bytes
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Read a little-endian value and advance past it
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
    pub fn read_le<T: ImageIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    /// Read a 7-bit encoded unsigned integer (at most five bytes).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation and
    /// [`crate::Error::Malformed`] if the value does not fit into 32 bits.
    pub fn read_7bit_encoded_int(&mut self) -> Result<u32> {
        let mut value = 0u32;
        let mut shift = 0;
        let mut cursor = self.position;

        loop {
            let Some(&byte) = self.data.get(cursor) else {
                return Err(out_of_bounds_error!());
            };
            cursor += 1;

            if shift == 28 && byte > 0x0F {
                return Err(malformed_error!(
                    "7-bit encoded integer at offset {} exceeds 32 bits",
                    self.position
                ));
            }

            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        self.position = cursor;
        Ok(value)
    }

    /// Read `length` raw bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(bytes)
    }

    /// Read a 7-bit length-prefixed byte blob
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the blob is truncated.
    pub fn read_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let start = self.position;
        let length = self.read_7bit_encoded_int()? as usize;
        self.read_bytes(length).inspect_err(|_| self.position = start)
    }

    /// Read a 7-bit length-prefixed UTF-8 string
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the string is truncated and
    /// [`crate::Error::Malformed`] if it is not valid UTF-8.
    pub fn read_prefixed_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let bytes = self.read_prefixed_bytes()?;

        match std::str::from_utf8(bytes) {
            Ok(value) => Ok(value.to_string()),
            Err(e) => {
                self.position = start;
                Err(malformed_error!(
                    "Invalid UTF-8 string at offset {}: {}",
                    start,
                    e
                ))
            }
        }
    }

    /// Read a one-byte presence flag followed by the value when present
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for flags other than 0 and 1, and
    /// whatever `read` returns.
    pub fn read_optional<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        match self.read_le::<u8>()? {
            0 => Ok(None),
            1 => read(self).map(Some),
            flag => Err(malformed_error!(
                "Invalid presence flag {} at offset {}",
                flag,
                self.position - 1
            )),
        }
    }
}

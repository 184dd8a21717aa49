//! Bounds-checked little-endian reads and growing writes for class images.
//!
//! All reads return [`crate::Error::OutOfBounds`] instead of panicking when the
//! buffer is too short. Writes append to a `Vec<u8>` and cannot fail.

use crate::Result;

/// Primitive values that can be read from and written to a class image.
pub trait ImageIO: Sized + Copy {
    /// Fixed-size byte representation of the value
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode as little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_image_io {
    ($($ty:ty => $n:literal),* $(,)?) => {
        $(
            impl ImageIO for $ty {
                type Bytes = [u8; $n];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_image_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Read a value of type `T` at `offset` and advance the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: ImageIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(bytes) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(bytes))
}

/// Read a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn read_le<T: ImageIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Append `value` in little-endian byte order.
pub fn write_le<T: ImageIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Append `value` as a 7-bit encoded integer (low groups first, high bit = continuation).
pub fn write_7bit_encoded_int(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Append a 7-bit length-prefixed UTF-8 string.
pub fn write_prefixed_string_utf8(out: &mut Vec<u8>, value: &str) {
    write_prefixed_bytes(out, value.as_bytes());
}

/// Append a 7-bit length-prefixed byte blob.
pub fn write_prefixed_bytes(out: &mut Vec<u8>, value: &[u8]) {
    // image blobs are bounded well below 4 GiB
    write_7bit_encoded_int(out, u32::try_from(value.len()).unwrap_or(u32::MAX));
    out.extend_from_slice(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_read_sequence() {
        let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00];
        let mut offset = 0;

        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 1);
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 2);
        assert_eq!(read_le_at::<u32>(&data, &mut offset).unwrap(), 3);
        assert_eq!(offset, 8);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let data = [0x01, 0x02, 0x03];
        let mut offset = 0;

        assert!(matches!(
            read_le_at::<u32>(&data, &mut offset),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(offset, 0);

        offset = usize::MAX;
        assert!(read_le_at::<u8>(&data, &mut offset).is_err());
    }

    #[test]
    fn test_write() {
        let mut out = Vec::new();
        write_le(&mut out, 0x0102_u16);
        write_le(&mut out, -1_i32);
        assert_eq!(out, [0x02, 0x01, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(read_le::<u16>(&out).unwrap(), 0x0102);
    }

    #[test]
    fn test_7bit_encoding() {
        let mut out = Vec::new();
        write_7bit_encoded_int(&mut out, 0x7F);
        assert_eq!(out, [0x7F]);

        out.clear();
        write_7bit_encoded_int(&mut out, 300);
        assert_eq!(out, [0xAC, 0x02]);
    }
}

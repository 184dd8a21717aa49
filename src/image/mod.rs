//! The `CLNK` class image format.
//!
//! Loaders hand every fetched byte stream to a [`ClassDecoder`]. The crate ships
//! [`ImageDecoder`] for the format below; embedders with their own encoding plug in
//! another decoder through [`crate::RuntimeBuilder::decoder`].
//!
//! # Layout
//!
//! All integers are little-endian. `str` is a 7-bit encoded byte length followed
//! by UTF-8, `blob` the same for raw bytes, `opt<T>` a `0`/`1` presence byte
//! followed by `T` when present, and `list<T>` a 7-bit encoded count followed by
//! the elements.
//!
//! ```text
//! magic        b"CLNK"
//! version      u16            (1)
//! name         str
//! kind         u8             0 = class, 1 = interface
//! flags        u16            TypeFlags
//! super        opt<str>
//! interfaces   list<str>
//! fields       list<{ name: str, type: str, flags: u16, constant: opt<tag u8 + value> }>
//! methods      list<{ name: str, descriptor: str, flags: u16, body: opt<blob> }>
//! references   list<{ kind: u8, owner: str, name: str, descriptor: str }>
//! initializer  opt<blob>
//! ```
//!
//! Constant tags: `0` boolean (u8), `1` char (u16), `2` byte (i8), `3` short
//! (i16), `4` int (i32), `5` long (i64), `6` float (f32), `7` double (f64),
//! `8` string (str). Trailing bytes after the initializer are rejected.

mod codec;
mod io;
mod parser;

pub use codec::{encode, ClassDecoder, ImageDecoder};
pub use io::{read_le, read_le_at, ImageIO};
pub use parser::Parser;

/// Leading bytes of every class image
pub const IMAGE_MAGIC: &[u8; 4] = b"CLNK";

/// The image format version this crate reads and writes
pub const IMAGE_VERSION: u16 = 1;

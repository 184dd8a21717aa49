//! Byte stream sources.
//!
//! A [`ByteStreamSource`] is the medium a loader node fetches class images from.
//! The runtime never interprets where the bytes come from; filesystems, archives
//! and network fetchers are embedder concerns. Two sources are supplied:
//! [`MemorySource`] for in-process images and [`TransformSource`], which rewrites
//! the bytes of another source before they are decoded (e.g. decrypting images that
//! are shipped encrypted).

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use dashmap::DashMap;

use crate::{typesystem::ClassDescriptor, Result};

/// Supplies raw class byte streams by qualified name.
pub trait ByteStreamSource: Send + Sync {
    /// Fetch the byte stream for `name`.
    ///
    /// # Returns
    /// `Ok(None)` if the source has no byte stream for the name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Source`] if the medium itself failed.
    fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

impl<T: ByteStreamSource + ?Sized> ByteStreamSource for Arc<T> {
    fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
        (**self).fetch(name)
    }
}

/// Concurrent in-memory name → bytes map
#[derive(Default)]
pub struct MemorySource {
    entries: DashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MemorySource {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a byte stream
    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(name.into(), bytes);
    }

    /// Encode a descriptor and add it under its own name
    pub fn insert_class(&self, descriptor: &ClassDescriptor) {
        self.insert(descriptor.name.clone(), descriptor.to_bytes());
    }

    /// Builder-style [`MemorySource::insert`]
    #[must_use]
    pub fn with(self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    /// Builder-style [`MemorySource::insert_class`]
    #[must_use]
    pub fn with_class(self, descriptor: &ClassDescriptor) -> Self {
        self.insert_class(descriptor);
        self
    }

    /// Remove a byte stream
    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        self.entries.remove(name).map(|(_, bytes)| bytes)
    }

    /// Returns true if a byte stream is present for `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of byte streams held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no byte stream is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `fetch` calls served so far, hits and misses alike
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl ByteStreamSource for MemorySource {
    fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.get(name).map(|bytes| bytes.clone()))
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("entries", &self.entries.len())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

/// Byte rewrite applied by a [`TransformSource`]: `(name, bytes) -> bytes`
pub type ByteTransform = dyn Fn(&str, Vec<u8>) -> Result<Vec<u8>> + Send + Sync;

/// Wraps another source and rewrites every fetched byte stream
pub struct TransformSource {
    inner: Arc<dyn ByteStreamSource>,
    transform: Box<ByteTransform>,
}

impl TransformSource {
    /// Wrap `inner`, applying `transform` to every byte stream it returns
    pub fn new<F>(inner: Arc<dyn ByteStreamSource>, transform: F) -> Self
    where
        F: Fn(&str, Vec<u8>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        TransformSource {
            inner,
            transform: Box::new(transform),
        }
    }

    /// Wrap `inner`, undoing a single-byte XOR scrambling of its images
    pub fn xor(inner: Arc<dyn ByteStreamSource>, key: u8) -> Self {
        Self::new(inner, move |_, mut bytes| {
            for byte in &mut bytes {
                *byte ^= key;
            }
            Ok(bytes)
        })
    }
}

impl ByteStreamSource for TransformSource {
    fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.inner.fetch(name)? {
            Some(bytes) => (self.transform)(name, bytes).map(Some),
            None => Ok(None),
        }
    }
}

//! The `(loader, name)` → record table.
//!
//! [`TypeDescriptorRegistry`] is the union of all loader caches. It does not hold
//! a table of its own: it tracks the live loader nodes by [`LoaderId`] and routes
//! every lookup and registration into the owning node's cache. There is no lookup
//! by name alone; every query carries the loader half of the identity.
//!
//! # Thread Safety
//!
//! - Loader nodes are tracked in a lock-free `SkipMap`, ordered by identity
//! - Each loader cache is a `DashMap`; registration is a compare-and-register on
//!   the per-key entry, so there is no global lock
//! - Loader identities are handed out from an atomic counter

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};

use crossbeam_skiplist::SkipMap;

use crate::{
    loader::{LoaderNode, LoaderRc},
    typesystem::{LoaderId, TypeIdentity, TypeRecordRc},
    Error, Result,
};

/// Outcome of a compare-and-register.
#[derive(Debug, Clone)]
pub enum Registration {
    /// The offered record is now the registered one
    Registered(TypeRecordRc),
    /// Another record was registered first; it is returned and must be adopted
    AlreadyExists(TypeRecordRc),
}

impl Registration {
    /// The record that is registered under the identity, whoever won
    #[must_use]
    pub fn record(&self) -> &TypeRecordRc {
        match self {
            Registration::Registered(record) | Registration::AlreadyExists(record) => record,
        }
    }

    /// Consumes the outcome, returning the registered record
    #[must_use]
    pub fn into_record(self) -> TypeRecordRc {
        match self {
            Registration::Registered(record) | Registration::AlreadyExists(record) => record,
        }
    }

    /// Returns true if the offered record won
    #[must_use]
    pub fn is_registered(&self) -> bool {
        matches!(self, Registration::Registered(_))
    }
}

/// Identity-keyed view over all loader caches.
pub struct TypeDescriptorRegistry {
    /// Live loader nodes by identity
    loaders: SkipMap<LoaderId, Weak<LoaderNode>>,
    /// Next identity for a custom loader
    next_loader: AtomicU64,
}

impl Default for TypeDescriptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeDescriptorRegistry {
    /// Create an empty registry. Custom loader identities start at 1.
    #[must_use]
    pub fn new() -> Self {
        TypeDescriptorRegistry {
            loaders: SkipMap::new(),
            next_loader: AtomicU64::new(1),
        }
    }

    /// Reserve a fresh identity for a custom loader
    pub(crate) fn next_loader_id(&self) -> LoaderId {
        LoaderId(self.next_loader.fetch_add(1, Ordering::Relaxed))
    }

    /// Start tracking a loader node
    pub(crate) fn add_loader(&self, loader: &LoaderRc) {
        self.loaders.insert(loader.id(), Arc::downgrade(loader));
    }

    /// Get a live loader node by identity
    #[must_use]
    pub fn loader(&self, id: LoaderId) -> Option<LoaderRc> {
        self.loaders.get(&id)?.value().upgrade()
    }

    /// All live loader nodes, ordered by identity
    #[must_use]
    pub fn loaders(&self) -> Vec<LoaderRc> {
        self.loaders
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect()
    }

    /// Forget loader nodes that have been dropped.
    ///
    /// # Returns
    /// The number of entries removed.
    pub fn prune(&self) -> usize {
        let dead: Vec<LoaderId> = self
            .loaders
            .iter()
            .filter(|entry| entry.value().strong_count() == 0)
            .map(|entry| *entry.key())
            .collect();

        for id in &dead {
            self.loaders.remove(id);
        }
        dead.len()
    }

    /// Look up the record registered under `identity`.
    ///
    /// Only the cache of the identity's loader is consulted, so a type defined by
    /// a parent is not found under a child's identity.
    #[must_use]
    pub fn lookup(&self, identity: &TypeIdentity) -> Option<TypeRecordRc> {
        self.loader(identity.loader())?.cached(identity.name())
    }

    /// Compare-and-register `record` under `identity`.
    ///
    /// Exactly one record is ever registered per identity. A losing caller gets
    /// [`Registration::AlreadyExists`] with the winner and must discard its own
    /// record.
    ///
    /// # Errors
    /// Returns [`Error::LoaderUnavailable`] if the identity's loader is gone, and
    /// [`Error::Error`] if `record` carries a different identity.
    pub fn register(&self, identity: &TypeIdentity, record: TypeRecordRc) -> Result<Registration> {
        if record.identity() != identity {
            return Err(Error::Error(format!(
                "Record {} cannot be registered as {}",
                record.identity(),
                identity
            )));
        }

        let loader = self
            .loader(identity.loader())
            .ok_or(Error::LoaderUnavailable(identity.loader().value()))?;
        Ok(loader.define(record))
    }

    /// Number of records across all live loader caches
    #[must_use]
    pub fn len(&self) -> usize {
        self.loaders().iter().map(|loader| loader.len()).sum()
    }

    /// Returns true if no live loader has a cached record
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records across all live loader caches
    #[must_use]
    pub fn loaded_types(&self) -> Vec<TypeRecordRc> {
        self.loaders()
            .iter()
            .flat_map(|loader| loader.loaded_types())
            .collect()
    }
}

//! Loader nodes and the parent-first delegation protocol.
//!
//! Every type is defined by exactly one [`LoaderNode`]. Nodes form a forest:
//! each node has at most one parent, and parents always exist before their
//! children, so the relation can never become cyclic. The bootstrap node is the
//! root that every non-isolated loader eventually delegates to.
//!
//! # Loading protocol
//!
//! [`LoaderNode::load_type`] resolves a name in four steps:
//!
//! 1. a hit in the node's own cache is returned as is;
//! 2. a node with a parent hands the request up first, and a parent success is
//!    the result;
//! 3. only if the parent chain reports `NotFound` does the node fetch from its own
//!    source, decode the bytes, and compare-and-register the new record under
//!    `(node, name)`. Losers of a concurrent definition race adopt the winner;
//! 4. array names (`[...`) are never fetched. The component type is loaded through
//!    the same protocol and the array record is synthesized by the component's
//!    defining loader (the bootstrap loader for primitive components).
//!
//! Only the defining loader caches a record. `NotFound` is never cached, a later
//! attempt sees the source's state at that time.
//!
//! # Ownership
//!
//! A node holds its parent weakly and its records strongly; records hold their
//! defining node weakly. Dropping the last handle to a custom loader therefore
//! drops the loader together with the types it defined.

mod array;
mod source;

use std::{
    fmt,
    sync::{Arc, Weak},
};

use dashmap::{mapref::entry::Entry, DashMap};
use sha1::{Digest, Sha1};
use tracing::{debug, trace};

pub use source::{ByteStreamSource, ByteTransform, MemorySource, TransformSource};

use crate::{
    diagnostics::{Diagnostics, EventKind},
    image::ClassDecoder,
    runtime::RuntimeConfig,
    typesystem::{
        LoaderId, Registration, TypeDescriptorRegistry, TypeIdentity, TypeRecord, TypeRecordRc,
    },
    Error, Result,
};

/// Reference to a `LoaderNode`
pub type LoaderRc = Arc<LoaderNode>;

/// Everything a loader needs besides itself while loading.
pub(crate) struct LoadContext<'a> {
    pub registry: &'a TypeDescriptorRegistry,
    pub decoder: &'a dyn ClassDecoder,
    pub diagnostics: &'a Diagnostics,
    pub config: &'a RuntimeConfig,
}

/// A node of the delegation forest.
pub struct LoaderNode {
    /// Identity token, part of every type identity this node defines
    id: LoaderId,
    /// Display name
    name: String,
    /// Parent node, weak
    parent: Option<Weak<LoaderNode>>,
    /// Identity of the parent, kept for diagnostics after the parent is gone
    parent_id: Option<LoaderId>,
    /// Where this node fetches byte streams from
    source: Option<Arc<dyn ByteStreamSource>>,
    /// Records defined by this node
    cache: DashMap<String, TypeRecordRc>,
}

impl LoaderNode {
    pub(crate) fn new(
        id: LoaderId,
        name: impl Into<String>,
        parent: Option<&LoaderRc>,
        source: Option<Arc<dyn ByteStreamSource>>,
    ) -> Self {
        LoaderNode {
            id,
            name: name.into(),
            parent: parent.map(Arc::downgrade),
            parent_id: parent.map(|p| p.id()),
            source,
            cache: DashMap::new(),
        }
    }

    /// Identity token of this node
    #[must_use]
    pub fn id(&self) -> LoaderId {
        self.id
    }

    /// Display name of this node
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true for the bootstrap node
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        self.id.is_bootstrap()
    }

    /// Identity of the parent node, if this node has one
    #[must_use]
    pub fn parent_id(&self) -> Option<LoaderId> {
        self.parent_id
    }

    /// The parent node.
    ///
    /// # Errors
    /// Returns [`Error::LoaderUnavailable`] if the node has a parent that was dropped.
    pub fn parent(&self) -> Result<Option<LoaderRc>> {
        match &self.parent {
            None => Ok(None),
            Some(weak) => weak
                .upgrade()
                .map(Some)
                .ok_or(Error::LoaderUnavailable(self.parent_id.map_or(0, |id| id.value()))),
        }
    }

    /// Identities from this node up to the root of its delegation chain
    #[must_use]
    pub fn delegation_chain(&self) -> Vec<LoaderId> {
        let mut chain = vec![self.id];
        let mut current = self.parent.as_ref().and_then(Weak::upgrade);
        while let Some(node) = current {
            chain.push(node.id);
            current = node.parent.as_ref().and_then(Weak::upgrade);
        }
        chain
    }

    /// Returns true if this node has a byte stream source
    #[must_use]
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// The record this node defined under `name`, if any
    #[must_use]
    pub fn cached(&self, name: &str) -> Option<TypeRecordRc> {
        self.cache.get(name).map(|entry| entry.value().clone())
    }

    /// Number of records defined by this node
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns true if this node has not defined any record
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// All records defined by this node
    #[must_use]
    pub fn loaded_types(&self) -> Vec<TypeRecordRc> {
        self.cache.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Compare-and-register in this node's cache. The per-key entry lock is the
    /// only lock taken.
    pub(crate) fn define(&self, record: TypeRecordRc) -> Registration {
        match self.cache.entry(record.name().to_string()) {
            Entry::Occupied(existing) => Registration::AlreadyExists(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Registration::Registered(record)
            }
        }
    }

    /// Load `name` through this node.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if no node of the chain can supply the name,
    /// decoding errors for damaged byte streams, [`Error::NameMismatch`] if the
    /// byte stream defines another name and [`Error::Source`] for failing media.
    pub(crate) fn load_type(
        self: &Arc<Self>,
        ctx: &LoadContext<'_>,
        name: &str,
    ) -> Result<TypeRecordRc> {
        if let Some(record) = self.cached(name) {
            trace!(loader = %self.id, name, "cache hit");
            return Ok(record);
        }

        if name.starts_with('[') {
            return array::load_array(self, ctx, name);
        }

        if let Some(parent) = self.parent()? {
            trace!(loader = %self.id, parent = %parent.id, name, "delegating");
            ctx.diagnostics.record(
                EventKind::Delegated,
                &TypeIdentity::new(self.id, name),
                format!("to {}", parent.id),
            );

            match parent.load_type(ctx, name) {
                Ok(record) => return Ok(record),
                Err(Error::NotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }

        self.define_from_source(ctx, name)
    }

    fn define_from_source(
        self: &Arc<Self>,
        ctx: &LoadContext<'_>,
        name: &str,
    ) -> Result<TypeRecordRc> {
        let Some(source) = &self.source else {
            return Err(Error::NotFound(name.to_string()));
        };
        let Some(bytes) = source.fetch(name)? else {
            return Err(Error::NotFound(name.to_string()));
        };

        let descriptor = ctx.decoder.decode(name, &bytes)?;
        if descriptor.name != name {
            return Err(Error::NameMismatch {
                requested: name.to_string(),
                found: descriptor.name,
            });
        }

        let digest: [u8; 20] = Sha1::digest(&bytes).into();
        let record = Arc::new(TypeRecord::from_descriptor(self, descriptor, digest));
        let identity = record.identity().clone();

        let outcome = ctx.registry.register(&identity, record)?;
        if outcome.is_registered() {
            debug!(%identity, kind = %outcome.record().kind(), "defined");
            ctx.diagnostics
                .record(EventKind::Defined, &identity, format!("{} bytes", bytes.len()));
        } else {
            trace!(%identity, "lost definition race, adopting winner");
        }

        Ok(outcome.into_record())
    }
}

impl fmt::Debug for LoaderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent_id)
            .field("types", &self.cache.len())
            .finish_non_exhaustive()
    }
}

//! Type records and the data they are built from.
//!
//! This module holds the central entity of the runtime, the [`TypeRecord`], together
//! with the value objects it is made of and the [`TypeDescriptorRegistry`] that maps
//! `(loader, name)` identities onto records.
//!
//! # Key Components
//!
//! - [`TypeIdentity`] / [`LoaderId`]: the identity of a loaded type
//! - [`ClassDescriptor`]: the decoded content of a class byte stream
//! - [`TypeRecord`]: a loaded type with its link and initialization state
//! - [`TypeRecordRef`]: a weak handle used for every record-to-record link
//! - [`StaticFieldStorage`], [`DispatchTable`], [`FieldLayout`]: built during preparation
//! - [`TypeDescriptorRegistry`]: the union of all loader caches
//! - [`ClassBuilder`]: fluent construction of descriptors
//!
//! # Ownership
//!
//! A loader's cache holds the only strong reference to the records it defines.
//! Records point back at their loader weakly and at each other only through
//! [`TypeRecordRef`] handles, so mutually referencing types never form ownership
//! cycles.

mod base;
mod builder;
mod descriptor;
mod dispatch;
mod identity;
mod registry;
mod statics;
mod value;

use std::sync::{Arc, Mutex, OnceLock, Weak};

pub use base::TypeRecordRef;
pub use builder::ClassBuilder;
pub use descriptor::{
    ClassDescriptor, FieldDecl, FieldFlags, FieldType, MethodDecl, MethodFlags, ReferenceDecl,
    ReferenceKind, TypeFlags, TypeKind,
};
pub use dispatch::{DispatchEntry, DispatchTable, FieldLayout, MethodImpl};
pub use identity::{LoaderId, TypeIdentity};
pub(crate) use identity::package_of;
pub use registry::{Registration, TypeDescriptorRegistry};
pub use statics::StaticFieldStorage;
pub use value::Value;

use crate::{
    init::{InitCell, InitState},
    link::{LinkState, SymbolicReference},
    loader::{LoaderNode, LoaderRc},
    Error, Result,
};

/// Reference to a `TypeRecord`
pub type TypeRecordRc = Arc<TypeRecord>;

/// A loaded type.
///
/// Created by a loader from a [`ClassDescriptor`] (or synthesized for arrays) and
/// registered in exactly one loader's cache under its [`TypeIdentity`]. The
/// descriptor and the symbolic reference table are immutable; everything that is
/// computed later (hierarchy links, field layout, dispatch table, static storage,
/// reference bindings) is write-once, and the link and initialization state are
/// serialized per record.
pub struct TypeRecord {
    /// Identity under which the record is registered
    identity: TypeIdentity,
    /// Defining loader, weak
    loader: Weak<LoaderNode>,
    /// Kind of the type
    kind: TypeKind,
    /// Decoded content of the defining byte stream
    descriptor: ClassDescriptor,
    /// Element type of an array record
    component: Option<TypeRecordRef>,
    /// SHA-1 of the defining byte stream (none for synthesized records)
    digest: Option<[u8; 20]>,
    /// Symbolic references in table order, each memoizing its own binding
    references: Vec<SymbolicReference>,
    /// Supertype, linked lazily during preparation
    supertype: OnceLock<Option<TypeRecordRef>>,
    /// Direct superinterfaces, linked lazily during preparation
    interfaces: OnceLock<Vec<TypeRecordRef>>,
    /// Static field storage block
    statics: StaticFieldStorage,
    /// Field slots and instance size
    layout: OnceLock<FieldLayout>,
    /// Virtual dispatch table
    dispatch: OnceLock<DispatchTable>,
    /// Link state machine
    pub(crate) link: Mutex<LinkState>,
    /// Initialization state machine
    pub(crate) init: InitCell,
}

impl TypeRecord {
    /// Create a record for a class or interface backed by a byte stream.
    ///
    /// ## Arguments
    /// * 'loader'     - The defining loader
    /// * 'descriptor' - The decoded byte stream
    /// * 'digest'     - SHA-1 of the byte stream
    pub(crate) fn from_descriptor(
        loader: &LoaderRc,
        descriptor: ClassDescriptor,
        digest: [u8; 20],
    ) -> Self {
        let identity = TypeIdentity::new(loader.id(), descriptor.name.as_str());
        let references = descriptor
            .references
            .iter()
            .cloned()
            .map(SymbolicReference::new)
            .collect();

        TypeRecord {
            identity,
            loader: Arc::downgrade(loader),
            kind: descriptor.kind,
            descriptor,
            component: None,
            digest: Some(digest),
            references,
            supertype: OnceLock::new(),
            interfaces: OnceLock::new(),
            statics: StaticFieldStorage::new(),
            layout: OnceLock::new(),
            dispatch: OnceLock::new(),
            link: Mutex::new(LinkState::Loaded),
            init: InitCell::new(InitState::NotStarted),
        }
    }

    /// Create a synthesized array record.
    ///
    /// Arrays never pass through verification and have no initializer, they are
    /// born `Resolved` and `Initialized`.
    ///
    /// ## Arguments
    /// * 'loader'    - The defining loader (the component's defining loader)
    /// * 'name'      - The array descriptor, e.g. `[Ldemo.Point;`
    /// * 'component' - The component record, `None` for primitive components
    /// * 'flags'     - Access flags, taken over from the component
    pub(crate) fn array(
        loader: &LoaderRc,
        name: &str,
        component: Option<&TypeRecordRc>,
        flags: TypeFlags,
    ) -> Self {
        let mut descriptor = ClassDescriptor::new(name, TypeKind::Array);
        descriptor.flags = flags | TypeFlags::FINAL | TypeFlags::SYNTHETIC;

        let record = TypeRecord {
            identity: TypeIdentity::new(loader.id(), name),
            loader: Arc::downgrade(loader),
            kind: TypeKind::Array,
            descriptor,
            component: component.map(TypeRecordRef::new),
            digest: None,
            references: Vec::new(),
            supertype: OnceLock::new(),
            interfaces: OnceLock::new(),
            statics: StaticFieldStorage::new(),
            layout: OnceLock::new(),
            dispatch: OnceLock::new(),
            link: Mutex::new(LinkState::Resolved),
            init: InitCell::new(InitState::Initialized),
        };
        record.supertype.set(None).ok();
        record.interfaces.set(Vec::new()).ok();
        record.layout.set(FieldLayout::default()).ok();
        record.dispatch.set(DispatchTable::default()).ok();
        record.statics.allocate(Vec::new());
        record
    }

    /// The identity of this record
    #[must_use]
    pub fn identity(&self) -> &TypeIdentity {
        &self.identity
    }

    /// The qualified name
    #[must_use]
    pub fn name(&self) -> &str {
        self.identity.name()
    }

    /// The defining loader, if it is still alive
    #[must_use]
    pub fn loader(&self) -> Option<LoaderRc> {
        self.loader.upgrade()
    }

    /// The defining loader, or an error if it was dropped
    ///
    /// # Errors
    /// Returns [`Error::LoaderUnavailable`] if the loader no longer exists.
    pub fn defining_loader(&self) -> Result<LoaderRc> {
        self.loader
            .upgrade()
            .ok_or(Error::LoaderUnavailable(self.identity.loader().value()))
    }

    /// Kind of this type
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Returns true for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// Returns true for synthesized array types
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.kind == TypeKind::Array
    }

    /// Returns true if this type is visible outside of its package
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.descriptor.flags.contains(TypeFlags::PUBLIC)
    }

    /// The decoded content of the defining byte stream
    #[must_use]
    pub fn descriptor(&self) -> &ClassDescriptor {
        &self.descriptor
    }

    /// The component type of an array record
    #[must_use]
    pub fn component(&self) -> Option<TypeRecordRc> {
        self.component.as_ref().and_then(TypeRecordRef::upgrade)
    }

    /// SHA-1 of the defining byte stream
    #[must_use]
    pub fn digest(&self) -> Option<&[u8; 20]> {
        self.digest.as_ref()
    }

    /// The symbolic reference table
    #[must_use]
    pub fn references(&self) -> &[SymbolicReference] {
        &self.references
    }

    /// A single symbolic reference
    #[must_use]
    pub fn reference(&self, index: usize) -> Option<&SymbolicReference> {
        self.references.get(index)
    }

    /// The linked supertype, available once the hierarchy has been loaded
    #[must_use]
    pub fn supertype(&self) -> Option<TypeRecordRc> {
        self.supertype.get()?.as_ref()?.upgrade()
    }

    /// The linked direct superinterfaces, empty until the hierarchy has been loaded
    #[must_use]
    pub fn interfaces(&self) -> Vec<TypeRecordRc> {
        self.interfaces
            .get()
            .map(|list| list.iter().filter_map(TypeRecordRef::upgrade).collect())
            .unwrap_or_default()
    }

    /// All superinterfaces reachable through the direct superinterfaces, in
    /// depth-first order without duplicates. Interfaces reachable only through
    /// the supertype are not included.
    #[must_use]
    pub fn superinterfaces(&self) -> Vec<TypeRecordRc> {
        let mut result: Vec<TypeRecordRc> = Vec::new();
        let mut stack: Vec<TypeRecordRc> = self.interfaces().into_iter().rev().collect();

        while let Some(interface) = stack.pop() {
            if result.iter().any(|seen| seen.identity == interface.identity) {
                continue;
            }
            stack.extend(interface.interfaces().into_iter().rev());
            result.push(interface);
        }
        result
    }

    /// Returns true once supertype and superinterfaces are linked
    #[must_use]
    pub fn has_hierarchy(&self) -> bool {
        self.supertype.get().is_some() && self.interfaces.get().is_some()
    }

    pub(crate) fn set_hierarchy(
        &self,
        supertype: Option<&TypeRecordRc>,
        interfaces: &[TypeRecordRc],
    ) {
        self.supertype.set(supertype.map(TypeRecordRef::new)).ok();
        self.interfaces
            .set(interfaces.iter().map(TypeRecordRef::new).collect())
            .ok();
    }

    /// Static field storage
    #[must_use]
    pub fn statics(&self) -> &StaticFieldStorage {
        &self.statics
    }

    /// Field layout, available once prepared
    #[must_use]
    pub fn layout(&self) -> Option<&FieldLayout> {
        self.layout.get()
    }

    pub(crate) fn set_layout(&self, layout: FieldLayout) {
        self.layout.set(layout).ok();
    }

    /// Dispatch table, available once prepared
    #[must_use]
    pub fn dispatch_table(&self) -> Option<&DispatchTable> {
        self.dispatch.get()
    }

    pub(crate) fn set_dispatch_table(&self, table: DispatchTable) {
        self.dispatch.set(table).ok();
    }

    /// A snapshot of the current link state
    #[must_use]
    pub fn link_state(&self) -> LinkState {
        lock!(self.link).clone()
    }

    /// A snapshot of the current initialization state
    #[must_use]
    pub fn init_state(&self) -> InitState {
        self.init.state()
    }

    /// Returns true once the record reached `Resolved`
    #[must_use]
    pub fn is_linked(&self) -> bool {
        matches!(*lock!(self.link), LinkState::Resolved)
    }

    /// Returns true once the record reached `Initialized`
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self.init_state(), InitState::Initialized)
    }

    /// Returns true if `self` equals `other` or inherits from it.
    ///
    /// Identity is compared by `(loader, name)`, so equally named types from
    /// different loaders are never assignable to each other. Only the part of the
    /// hierarchy that has already been linked is consulted.
    #[must_use]
    pub fn is_assignable_to(&self, other: &TypeRecord) -> bool {
        if self.identity == other.identity {
            return true;
        }

        if self.is_array() {
            if !other.is_array() {
                return false;
            }
            return match (self.component(), other.component()) {
                (Some(mine), Some(theirs)) => mine.is_assignable_to(&theirs),
                _ => false,
            };
        }

        if let Some(supertype) = self.supertype() {
            if supertype.is_assignable_to(other) {
                return true;
            }
        }
        self.interfaces()
            .iter()
            .any(|iface| iface.is_assignable_to(other))
    }

    /// Find a declared field: `(declaration index, declaration)`
    #[must_use]
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDecl)> {
        self.descriptor.field(name)
    }

    /// Find a declared method: `(declaration index, declaration)`
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<(usize, &MethodDecl)> {
        self.descriptor.method(name, descriptor)
    }
}

impl std::fmt::Debug for TypeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRecord")
            .field("identity", &self.identity)
            .field("kind", &self.kind)
            .field("link", &self.link_state())
            .field("init", &self.init_state())
            .finish_non_exhaustive()
    }
}

use std::sync::{Arc, Weak};

use crate::{
    typesystem::{TypeIdentity, TypeRecord, TypeRecordRc},
    Error, Result,
};

/// A smart reference to a `TypeRecord` that holds it weakly.
///
/// Records never own each other: supertype links, superinterface links and
/// resolved bindings all go through this handle, while the strong reference lives
/// in the defining loader's cache. This keeps cyclic type graphs free of
/// ownership cycles. The identity is stored alongside so a dangling handle still
/// names its target.
#[derive(Clone, Debug)]
pub struct TypeRecordRef {
    identity: TypeIdentity,
    weak_ref: Weak<TypeRecord>,
}

impl TypeRecordRef {
    /// Create a new `TypeRecordRef` from a strong reference
    pub fn new(strong_ref: &TypeRecordRc) -> Self {
        Self {
            identity: strong_ref.identity().clone(),
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference to the record, returning None if the record has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<TypeRecordRc> {
        self.weak_ref.upgrade()
    }

    /// Get a strong reference to the record, or an error naming the dropped target
    ///
    /// # Errors
    /// Returns [`Error::LoaderUnavailable`] if the defining loader and its cache are gone.
    pub fn get(&self) -> Result<TypeRecordRc> {
        self.upgrade()
            .ok_or(Error::LoaderUnavailable(self.identity.loader().value()))
    }

    /// Check if the referenced record is still alive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.weak_ref.strong_count() > 0
    }

    /// The identity of the referenced record
    #[must_use]
    pub fn identity(&self) -> &TypeIdentity {
        &self.identity
    }

    #[cfg(test)]
    pub(crate) fn dangling(identity: TypeIdentity) -> Self {
        Self {
            identity,
            weak_ref: Weak::new(),
        }
    }

    /// Returns true if this handle points at exactly `record`
    #[must_use]
    pub fn points_to(&self, record: &TypeRecordRc) -> bool {
        std::ptr::eq(self.weak_ref.as_ptr(), Arc::as_ptr(record))
    }
}

impl From<&TypeRecordRc> for TypeRecordRef {
    fn from(strong_ref: &TypeRecordRc) -> Self {
        Self::new(strong_ref)
    }
}

impl PartialEq for TypeRecordRef {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && Weak::ptr_eq(&self.weak_ref, &other.weak_ref)
    }
}

impl Eq for TypeRecordRef {}

//! Per-record dispatch tables and field layout.
//!
//! Both structures are built once during preparation. Polymorphic call sites
//! index into the [`DispatchTable`] by slot; a subtype's table starts with a copy
//! of its supertype's entries, so a slot number resolved against a supertype stays
//! valid for every subtype.

use crate::typesystem::{TypeIdentity, TypeRecordRef};

/// A concrete method implementation: the declaring record and the method's index
/// in that record's method declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodImpl {
    /// The record declaring the implementation
    pub declarer: TypeRecordRef,
    /// Index into the declarer's method list
    pub index: usize,
}

impl MethodImpl {
    /// Identity of the declaring type
    #[must_use]
    pub fn declarer_identity(&self) -> &TypeIdentity {
        self.declarer.identity()
    }
}

/// One slot of a dispatch table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEntry {
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// The implementation selected for this record; `None` for abstract slots
    pub implementation: Option<MethodImpl>,
}

/// Virtual method table of a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTable {
    entries: Vec<DispatchEntry>,
}

impl DispatchTable {
    /// Creates a table starting with the inherited entries
    #[must_use]
    pub fn inherit(base: Option<&DispatchTable>) -> Self {
        DispatchTable {
            entries: base.map(|b| b.entries.clone()).unwrap_or_default(),
        }
    }

    /// Override the slot with the same signature, or append a new one.
    ///
    /// # Returns
    /// The slot number used.
    pub fn define(&mut self, entry: DispatchEntry) -> usize {
        match self.slot_of(&entry.name, &entry.descriptor) {
            Some(slot) => {
                self.entries[slot] = entry;
                slot
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        }
    }

    /// Append an entry only if no slot with the same signature exists yet.
    ///
    /// Abstract slots count as absent and are filled in place.
    pub fn define_if_absent(&mut self, entry: DispatchEntry) -> usize {
        match self.slot_of(&entry.name, &entry.descriptor) {
            Some(slot) => {
                if self.entries[slot].implementation.is_none() {
                    self.entries[slot] = entry;
                }
                slot
            }
            None => self.define(entry),
        }
    }

    /// Slot number of a method signature
    #[must_use]
    pub fn slot_of(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name == name && e.descriptor == descriptor)
    }

    /// Entry at a slot
    #[must_use]
    pub fn entry(&self, slot: usize) -> Option<&DispatchEntry> {
        self.entries.get(slot)
    }

    /// All entries in slot order
    #[must_use]
    pub fn entries(&self) -> &[DispatchEntry] {
        &self.entries
    }

    /// Number of slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Field layout of a prepared record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldLayout {
    /// For every declared field (by declaration index): its static slot or instance offset
    pub slots: Vec<usize>,
    /// Total number of instance fields, inherited ones included
    pub instance_size: usize,
}

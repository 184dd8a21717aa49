//! Static field storage of a type record.
//!
//! Each record owns one [`StaticFieldStorage`] block. The block is empty until the
//! record is prepared; preparation allocates one slot per static field, fills it
//! with the zero-equivalent default and stores compile-time constants directly.
//! Non-constant fields keep their defaults until the initializer body runs.
//!
//! # Thread Safety
//!
//! All operations use interior mutability via `RwLock` for thread-safe access.

use std::sync::{OnceLock, RwLock};

use crate::{
    typesystem::{TypeIdentity, Value},
    Error, Result,
};

/// Storage for the static fields of a single type.
#[derive(Debug, Default)]
pub struct StaticFieldStorage {
    /// Field names in slot order, fixed at allocation
    names: OnceLock<Vec<String>>,
    /// Slot values, indexed by the static slot number
    slots: RwLock<Vec<Value>>,
}

impl StaticFieldStorage {
    /// Creates new, unallocated storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the slots. Only the first allocation takes effect.
    ///
    /// # Arguments
    ///
    /// * `layout` - `(name, initial value)` pairs in slot order
    ///
    /// # Returns
    ///
    /// `true` if this call performed the allocation.
    pub(crate) fn allocate(&self, layout: Vec<(String, Value)>) -> bool {
        let (names, values): (Vec<_>, Vec<_>) = layout.into_iter().unzip();
        if self.names.set(names).is_err() {
            return false;
        }
        *write_lock!(self.slots) = values;
        true
    }

    /// Returns `true` once preparation allocated the slots.
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.names.get().is_some()
    }

    /// Gets a static field value by slot.
    ///
    /// # Returns
    ///
    /// `Some(Value)` if the slot exists, `None` otherwise.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<Value> {
        read_lock!(self.slots).get(slot).cloned()
    }

    /// Sets a static field value by slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Error`] if the slot does not exist.
    pub fn set(&self, slot: usize, value: Value) -> Result<()> {
        let mut slots = write_lock!(self.slots);
        match slots.get_mut(slot) {
            Some(entry) => {
                *entry = value;
                Ok(())
            }
            None => Err(Error::Error(format!("Static slot {slot} does not exist"))),
        }
    }

    /// Returns the slot of a static field by name.
    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.names.get()?.iter().position(|n| n == name)
    }

    /// Gets a static field value by name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Value> {
        self.get(self.slot_of(name)?)
    }

    /// Sets a static field value by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Error`] if the type declares no such static field.
    pub fn set_by_name(&self, owner: &TypeIdentity, name: &str, value: Value) -> Result<()> {
        match self.slot_of(name) {
            Some(slot) => self.set(slot, value),
            None => Err(Error::Error(format!(
                "{owner} declares no static field '{name}'"
            ))),
        }
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock!(self.slots).len()
    }

    /// Returns `true` if no slots are allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read_lock!(self.slots).is_empty()
    }

    /// Returns a snapshot of `(name, value)` pairs in slot order.
    ///
    /// Useful for debugging and diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let Some(names) = self.names.get() else {
            return Vec::new();
        };
        let slots = read_lock!(self.slots);
        names.iter().cloned().zip(slots.iter().cloned()).collect()
    }
}

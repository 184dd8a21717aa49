//! Structural verification gate.
//!
//! The verifier runs after the supertype and superinterfaces have been loaded and
//! before preparation. It answers pass or fail; a failure is stored on the record
//! and makes the type permanently unusable.
//!
//! [`StructuralVerifier`] checks the rules below in this order:
//! 1. **Hierarchy** - the supertype is a non-final class, every listed
//!    interface is an interface
//! 2. **Interface shape** - interfaces declare only static fields
//! 3. **Member uniqueness** - no duplicate field names or method signatures
//! 4. **Constants** - only on static fields, of a kind matching the field type
//! 5. **Abstract methods** - carry no body and appear only in abstract classes
//!    and interfaces
//! 6. **Reference table** - every entry names a target

use std::collections::HashSet;

use crate::{
    typesystem::{ReferenceKind, TypeFlags, TypeKind, TypeRecord},
    Error, Result,
};

/// Pass/fail gate over a loaded record.
///
/// Implementations must not trigger loading or initialization; the supertype and
/// superinterfaces are already linked into the record when `verify` runs.
pub trait Verifier: Send + Sync {
    /// Verify `record`.
    ///
    /// # Errors
    /// Returns [`Error::VerificationFailure`] describing the first violated rule.
    fn verify(&self, record: &TypeRecord) -> Result<()>;

    /// Name of the verifier, for diagnostics
    fn name(&self) -> &'static str;
}

/// The structural rule set.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralVerifier;

impl StructuralVerifier {
    /// Creates a new verifier
    #[must_use]
    pub fn new() -> Self {
        StructuralVerifier
    }

    fn fail(record: &TypeRecord, message: String) -> Error {
        Error::VerificationFailure {
            identity: record.identity().clone(),
            message,
        }
    }

    fn verify_hierarchy(record: &TypeRecord) -> Result<()> {
        if let Some(supertype) = record.supertype() {
            if supertype.kind() != TypeKind::Class {
                return Err(Self::fail(
                    record,
                    format!("supertype {} is not a class", supertype.name()),
                ));
            }
            if supertype.descriptor().flags.contains(TypeFlags::FINAL) {
                return Err(Self::fail(
                    record,
                    format!("cannot extend final class {}", supertype.name()),
                ));
            }
        }

        for interface in record.interfaces() {
            if !interface.is_interface() {
                return Err(Self::fail(
                    record,
                    format!("{} is not an interface", interface.name()),
                ));
            }
        }

        Ok(())
    }

    fn verify_interface_shape(record: &TypeRecord) -> Result<()> {
        if !record.is_interface() {
            return Ok(());
        }

        if let Some(field) = record.descriptor().fields.iter().find(|f| !f.is_static()) {
            return Err(Self::fail(
                record,
                format!("interface declares instance field '{}'", field.name),
            ));
        }
        Ok(())
    }

    fn verify_unique_members(record: &TypeRecord) -> Result<()> {
        let descriptor = record.descriptor();

        let mut fields = HashSet::new();
        for field in &descriptor.fields {
            if !fields.insert(field.name.as_str()) {
                return Err(Self::fail(
                    record,
                    format!("duplicate field '{}'", field.name),
                ));
            }
        }

        let mut methods = HashSet::new();
        for method in &descriptor.methods {
            if !methods.insert((method.name.as_str(), method.descriptor.as_str())) {
                return Err(Self::fail(
                    record,
                    format!("duplicate method '{}{}'", method.name, method.descriptor),
                ));
            }
        }

        Ok(())
    }

    fn verify_constants(record: &TypeRecord) -> Result<()> {
        for field in &record.descriptor().fields {
            let Some(constant) = &field.constant else {
                continue;
            };

            if !field.is_static() {
                return Err(Self::fail(
                    record,
                    format!("instance field '{}' carries a constant", field.name),
                ));
            }
            if !constant.is_constant_kind() || !constant.fits(&field.field_type) {
                return Err(Self::fail(
                    record,
                    format!(
                        "constant {} does not match type {} of field '{}'",
                        constant, field.field_type, field.name
                    ),
                ));
            }
        }
        Ok(())
    }

    fn verify_abstract_methods(record: &TypeRecord) -> Result<()> {
        let descriptor = record.descriptor();
        let may_be_abstract =
            record.is_interface() || descriptor.flags.contains(TypeFlags::ABSTRACT);

        for method in descriptor.methods.iter().filter(|m| m.is_abstract()) {
            if method.body.is_some() {
                return Err(Self::fail(
                    record,
                    format!("abstract method '{}{}' has a body", method.name, method.descriptor),
                ));
            }
            if !may_be_abstract {
                return Err(Self::fail(
                    record,
                    format!(
                        "concrete class declares abstract method '{}{}'",
                        method.name, method.descriptor
                    ),
                ));
            }
        }
        Ok(())
    }

    fn verify_references(record: &TypeRecord) -> Result<()> {
        for (index, reference) in record.references().iter().enumerate() {
            let decl = reference.decl();
            let complete = match decl.kind {
                ReferenceKind::Type => !decl.owner.is_empty(),
                _ => !decl.owner.is_empty() && !decl.name.is_empty() && !decl.descriptor.is_empty(),
            };
            if !complete {
                return Err(Self::fail(
                    record,
                    format!("reference #{index} ({}) has no target", decl.kind),
                ));
            }
        }
        Ok(())
    }
}

impl Verifier for StructuralVerifier {
    fn verify(&self, record: &TypeRecord) -> Result<()> {
        Self::verify_hierarchy(record)?;
        Self::verify_interface_shape(record)?;
        Self::verify_unique_members(record)?;
        Self::verify_constants(record)?;
        Self::verify_abstract_methods(record)?;
        Self::verify_references(record)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "StructuralVerifier"
    }
}

//! Fluent construction of [`ClassDescriptor`]s.
//!
//! [`ClassBuilder`] is the authoring side of the class image format: embedders and
//! tests describe a type member by member, then either take the descriptor or its
//! encoded bytes. Field descriptors are parsed as they are added; the first
//! invalid one is reported by [`ClassBuilder::build`].
//!
//! # Example
//!
//! ```rust
//! use classlink::prelude::*;
//!
//! let bytes = ClassBuilder::class("demo.Counter")
//!     .static_constant("LIMIT", "I", Value::Int(10))
//!     .static_field("count", "I")
//!     .initializer(vec![0x01])
//!     .to_bytes()?;
//! # Ok::<(), classlink::Error>(())
//! ```

use crate::{
    typesystem::{
        ClassDescriptor, FieldDecl, FieldFlags, FieldType, MethodDecl, MethodFlags, ReferenceDecl,
        ReferenceKind, TypeFlags, TypeKind, Value,
    },
    Error, Result,
};

/// Provides a fluent API for building class descriptors
pub struct ClassBuilder {
    /// Descriptor under construction
    descriptor: ClassDescriptor,
    /// First error encountered while adding members
    error: Option<Error>,
}

impl ClassBuilder {
    /// Start a public class
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Class)
    }

    /// Start a public abstract class
    pub fn abstract_class(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Class).flags(TypeFlags::PUBLIC | TypeFlags::ABSTRACT)
    }

    /// Start a public interface
    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Interface).flags(TypeFlags::PUBLIC | TypeFlags::ABSTRACT)
    }

    fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        ClassBuilder {
            descriptor: ClassDescriptor::new(name, kind),
            error: None,
        }
    }

    /// Replace the type flags
    #[must_use]
    pub fn flags(mut self, flags: TypeFlags) -> Self {
        self.descriptor.flags = flags;
        self
    }

    /// Set the supertype
    #[must_use]
    pub fn extends(mut self, super_name: impl Into<String>) -> Self {
        self.descriptor.super_name = Some(super_name.into());
        self
    }

    /// Add a directly implemented (or, for interfaces, extended) interface
    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.descriptor.interfaces.push(interface.into());
        self
    }

    /// Add a field with explicit flags and optional constant
    #[must_use]
    pub fn field_with(
        mut self,
        name: impl Into<String>,
        descriptor: &str,
        flags: FieldFlags,
        constant: Option<Value>,
    ) -> Self {
        match FieldType::parse(descriptor) {
            Ok(field_type) => self.descriptor.fields.push(FieldDecl {
                name: name.into(),
                field_type,
                flags,
                constant,
            }),
            Err(error) => {
                self.error.get_or_insert(error);
            }
        }
        self
    }

    /// Add a public instance field
    #[must_use]
    pub fn field(self, name: impl Into<String>, descriptor: &str) -> Self {
        self.field_with(name, descriptor, FieldFlags::PUBLIC, None)
    }

    /// Add a public static field without constant
    #[must_use]
    pub fn static_field(self, name: impl Into<String>, descriptor: &str) -> Self {
        self.field_with(
            name,
            descriptor,
            FieldFlags::PUBLIC | FieldFlags::STATIC,
            None,
        )
    }

    /// Add a public static final field carrying a compile-time constant
    #[must_use]
    pub fn static_constant(self, name: impl Into<String>, descriptor: &str, value: Value) -> Self {
        self.field_with(
            name,
            descriptor,
            FieldFlags::PUBLIC | FieldFlags::STATIC | FieldFlags::FINAL,
            Some(value),
        )
    }

    /// Add a method with explicit flags and optional body
    #[must_use]
    pub fn method_with(
        mut self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        flags: MethodFlags,
        body: Option<Vec<u8>>,
    ) -> Self {
        self.descriptor.methods.push(MethodDecl {
            name: name.into(),
            descriptor: descriptor.into(),
            flags,
            body,
        });
        self
    }

    /// Add a public instance method; on an interface this declares a default method
    #[must_use]
    pub fn method(
        self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        self.method_with(name, descriptor, MethodFlags::PUBLIC, Some(body))
    }

    /// Add a public abstract method
    #[must_use]
    pub fn abstract_method(self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.method_with(
            name,
            descriptor,
            MethodFlags::PUBLIC | MethodFlags::ABSTRACT,
            None,
        )
    }

    /// Add a public static method
    #[must_use]
    pub fn static_method(
        self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        self.method_with(
            name,
            descriptor,
            MethodFlags::PUBLIC | MethodFlags::STATIC,
            Some(body),
        )
    }

    /// Add a public no-argument constructor
    #[must_use]
    pub fn constructor(self) -> Self {
        self.method_with(
            MethodDecl::CONSTRUCTOR,
            "()V",
            MethodFlags::PUBLIC,
            Some(Vec::new()),
        )
    }

    /// Append a raw symbolic reference
    #[must_use]
    pub fn reference(mut self, reference: ReferenceDecl) -> Self {
        self.descriptor.references.push(reference);
        self
    }

    /// Append a type reference
    #[must_use]
    pub fn type_ref(self, target: impl Into<String>) -> Self {
        self.reference(ReferenceDecl {
            kind: ReferenceKind::Type,
            owner: target.into(),
            name: String::new(),
            descriptor: String::new(),
        })
    }

    /// Append a field reference
    #[must_use]
    pub fn field_ref(
        self,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        self.reference(ReferenceDecl {
            kind: ReferenceKind::Field,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        })
    }

    /// Append a class method reference
    #[must_use]
    pub fn method_ref(
        self,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        self.reference(ReferenceDecl {
            kind: ReferenceKind::Method,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        })
    }

    /// Append an interface method reference
    #[must_use]
    pub fn interface_method_ref(
        self,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        self.reference(ReferenceDecl {
            kind: ReferenceKind::InterfaceMethod,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        })
    }

    /// Set the static initializer body
    #[must_use]
    pub fn initializer(mut self, body: Vec<u8>) -> Self {
        self.descriptor.initializer = Some(body);
        self
    }

    /// Finish the descriptor
    ///
    /// # Errors
    /// Returns the first error encountered while adding members.
    pub fn build(self) -> Result<ClassDescriptor> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.descriptor),
        }
    }

    /// Finish the descriptor and encode it
    ///
    /// # Errors
    /// Returns the first error encountered while adding members.
    pub fn to_bytes(self) -> Result<Vec<u8>> {
        Ok(self.build()?.to_bytes())
    }
}

//! Decoded, structurally typed view of a class byte stream.
//!
//! A [`ClassDescriptor`] is what a [`crate::image::ClassDecoder`] produces from raw
//! bytes: the type kind, supertype and superinterface names, field and method
//! declarations with their constant values, the symbolic reference table and the
//! initializer body. Everything in it is still symbolic; names are resolved to
//! records only during linking.

use std::fmt;

use bitflags::bitflags;

use crate::{typesystem::Value, Result};

bitflags! {
    /// Access and property flags of a type declaration
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u16 {
        /// Visible outside of its package
        const PUBLIC = 0x0001;
        /// May not be subclassed
        const FINAL = 0x0010;
        /// May not be instantiated
        const ABSTRACT = 0x0400;
        /// Produced by the runtime rather than a byte stream
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Access and property flags of a field declaration
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u16 {
        /// Accessible from everywhere
        const PUBLIC = 0x0001;
        /// Accessible only from the declaring type
        const PRIVATE = 0x0002;
        /// Accessible from subtypes and the declaring package
        const PROTECTED = 0x0004;
        /// Class-level field, stored in the static storage block
        const STATIC = 0x0008;
        /// Assigned at most once
        const FINAL = 0x0010;
    }
}

bitflags! {
    /// Access and property flags of a method declaration
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u16 {
        /// Accessible from everywhere
        const PUBLIC = 0x0001;
        /// Accessible only from the declaring type
        const PRIVATE = 0x0002;
        /// Accessible from subtypes and the declaring package
        const PROTECTED = 0x0004;
        /// Invoked without a receiver
        const STATIC = 0x0008;
        /// May not be overridden
        const FINAL = 0x0010;
        /// Declared without a body
        const ABSTRACT = 0x0400;
    }
}

/// The kind of a type record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TypeKind {
    /// A class backed by a byte stream
    Class,
    /// An interface backed by a byte stream
    Interface,
    /// An array type synthesized by the runtime
    Array,
}

/// Declared type of a field.
///
/// Uses the familiar single-letter descriptor encoding: `Z C B S I J F D` for the
/// primitives and `L<name>;` or `[<component>` for references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `Z`
    Boolean,
    /// `C`
    Char,
    /// `B`
    Byte,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `L<name>;`
    Object(String),
    /// `[<component>`, holds the full array descriptor
    Array(String),
}

impl FieldType {
    /// The type of string constants
    pub const STRING: &'static str = "java.lang.String";

    /// Parse a field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown or truncated descriptors.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut chars = descriptor.chars();
        let field_type = match chars.next() {
            Some('Z') => FieldType::Boolean,
            Some('C') => FieldType::Char,
            Some('B') => FieldType::Byte,
            Some('S') => FieldType::Short,
            Some('I') => FieldType::Int,
            Some('J') => FieldType::Long,
            Some('F') => FieldType::Float,
            Some('D') => FieldType::Double,
            Some('L') => {
                let Some(name) = descriptor[1..].strip_suffix(';') else {
                    return Err(malformed_error!("Unterminated field descriptor - {}", descriptor));
                };
                if name.is_empty() || name.contains(';') {
                    return Err(malformed_error!("Invalid field descriptor - {}", descriptor));
                }
                return Ok(FieldType::Object(name.to_string()));
            }
            Some('[') => {
                // validates the component
                FieldType::parse(&descriptor[1..])?;
                return Ok(FieldType::Array(descriptor.to_string()));
            }
            _ => return Err(malformed_error!("Invalid field descriptor - {}", descriptor)),
        };

        if chars.next().is_some() {
            return Err(malformed_error!("Trailing data in field descriptor - {}", descriptor));
        }
        Ok(field_type)
    }

    /// Encode this type as a field descriptor
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            FieldType::Boolean => "Z".to_string(),
            FieldType::Char => "C".to_string(),
            FieldType::Byte => "B".to_string(),
            FieldType::Short => "S".to_string(),
            FieldType::Int => "I".to_string(),
            FieldType::Long => "J".to_string(),
            FieldType::Float => "F".to_string(),
            FieldType::Double => "D".to_string(),
            FieldType::Object(name) => format!("L{name};"),
            FieldType::Array(descriptor) => descriptor.clone(),
        }
    }

    /// Returns true for the primitive kinds
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Returns true for the string class
    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::Object(name) if name == Self::STRING)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

/// A field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Declared type
    pub field_type: FieldType,
    /// Access flags
    pub flags: FieldFlags,
    /// Compile-time constant, assigned during preparation
    pub constant: Option<Value>,
}

impl FieldDecl {
    /// Returns true for class-level fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }
}

/// A method declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Method descriptor, e.g. `(I)V`
    pub descriptor: String,
    /// Access flags
    pub flags: MethodFlags,
    /// Opaque bytecode, interpreted by the execution engine
    pub body: Option<Vec<u8>>,
}

impl MethodDecl {
    /// Name of instance constructors
    pub const CONSTRUCTOR: &'static str = "<init>";

    /// Returns true for methods invoked without a receiver
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Returns true for methods without a body
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodFlags::ABSTRACT)
    }

    /// Returns true for private methods
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.flags.contains(MethodFlags::PRIVATE)
    }

    /// Returns true for instance constructors
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == Self::CONSTRUCTOR
    }

    /// Returns true if calls to this method are dispatched through the dispatch table
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        !self.is_static() && !self.is_private() && !self.is_constructor()
    }

    /// Returns true if `self` and `other` have the same name and descriptor
    #[must_use]
    pub fn same_signature(&self, name: &str, descriptor: &str) -> bool {
        self.name == name && self.descriptor == descriptor
    }
}

/// Kind of a symbolic reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ReferenceKind {
    /// A type, by name
    Type,
    /// A field, by owner, name and type descriptor
    Field,
    /// A class method, by owner, name and descriptor
    Method,
    /// An interface method, by owner, name and descriptor
    InterfaceMethod,
}

impl ReferenceKind {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ReferenceKind::Type => 0,
            ReferenceKind::Field => 1,
            ReferenceKind::Method => 2,
            ReferenceKind::InterfaceMethod => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ReferenceKind::Type),
            1 => Ok(ReferenceKind::Field),
            2 => Ok(ReferenceKind::Method),
            3 => Ok(ReferenceKind::InterfaceMethod),
            _ => Err(malformed_error!("Invalid reference kind - {}", value)),
        }
    }
}

/// An entry of the raw symbolic reference table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceDecl {
    /// What the reference points at
    pub kind: ReferenceKind,
    /// Qualified name of the target type (or of the member's owner)
    pub owner: String,
    /// Member name, empty for type references
    pub name: String,
    /// Member descriptor, empty for type references
    pub descriptor: String,
}

impl fmt::Display for ReferenceDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReferenceKind::Type => write!(f, "{}", self.owner),
            ReferenceKind::Field => write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor),
            ReferenceKind::Method | ReferenceKind::InterfaceMethod => {
                write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
            }
        }
    }
}

/// The structurally typed content of a class byte stream
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    /// Qualified name declared by the byte stream
    pub name: String,
    /// Class or interface (arrays are never described by byte streams)
    pub kind: TypeKind,
    /// Type flags
    pub flags: TypeFlags,
    /// Name of the supertype, if any
    pub super_name: Option<String>,
    /// Names of the directly implemented / extended interfaces
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldDecl>,
    /// Declared methods
    pub methods: Vec<MethodDecl>,
    /// Raw symbolic reference table
    pub references: Vec<ReferenceDecl>,
    /// Consolidated static initializer body, opaque to the runtime
    pub initializer: Option<Vec<u8>>,
}

impl ClassDescriptor {
    /// Creates an empty descriptor of the given kind
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        ClassDescriptor {
            name: name.into(),
            kind,
            flags: TypeFlags::PUBLIC,
            super_name: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            references: Vec::new(),
            initializer: None,
        }
    }

    /// Returns true for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// Returns true if this is an interface declaring at least one default-bodied method
    #[must_use]
    pub fn declares_default_methods(&self) -> bool {
        self.is_interface()
            && self
                .methods
                .iter()
                .any(|m| !m.is_static() && !m.is_abstract() && m.body.is_some())
    }

    /// Find a declared field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDecl)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// Find a declared method by name and descriptor
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<(usize, &MethodDecl)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.same_signature(name, descriptor))
    }

    /// Encode this descriptor in the class image format
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::image::encode(self)
    }
}

use std::{fmt, sync::Arc};

use crate::typesystem::FieldType;

/// A value held by a static field slot or declared as a field constant.
///
/// Constants are restricted to the primitive kinds and strings; `Ref` carries an
/// opaque object handle owned by the execution engine and never appears in a
/// byte stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The null reference, default of every reference-typed field
    #[default]
    Null,
    /// Boolean value
    Boolean(bool),
    /// 16-bit UTF-16 code unit
    Char(u16),
    /// 8-bit signed integer
    Byte(i8),
    /// 16-bit signed integer
    Short(i16),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// String value
    Str(Arc<str>),
    /// Opaque engine-side object handle
    Ref(u64),
}

impl Value {
    /// The zero-equivalent default of a field of the given type
    #[must_use]
    pub fn default_for(field_type: &FieldType) -> Value {
        match field_type {
            FieldType::Boolean => Value::Boolean(false),
            FieldType::Char => Value::Char(0),
            FieldType::Byte => Value::Byte(0),
            FieldType::Short => Value::Short(0),
            FieldType::Int => Value::Int(0),
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => Value::Null,
        }
    }

    /// Returns true if this value may be stored in a field of the given type
    #[must_use]
    pub fn fits(&self, field_type: &FieldType) -> bool {
        match (self, field_type) {
            (Value::Boolean(_), FieldType::Boolean)
            | (Value::Char(_), FieldType::Char)
            | (Value::Byte(_), FieldType::Byte)
            | (Value::Short(_), FieldType::Short)
            | (Value::Int(_), FieldType::Int)
            | (Value::Long(_), FieldType::Long)
            | (Value::Float(_), FieldType::Float)
            | (Value::Double(_), FieldType::Double)
            | (Value::Null | Value::Ref(_), FieldType::Object(_) | FieldType::Array(_)) => true,
            (Value::Str(_), field_type) => field_type.is_string(),
            _ => false,
        }
    }

    /// Returns true for values that can be compile-time constants
    #[must_use]
    pub fn is_constant_kind(&self) -> bool {
        !matches!(self, Value::Null | Value::Ref(_))
    }

    /// Try to convert to a boolean value
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(value) => Some(*value),
            Value::Int(value) => Some(*value != 0),
            _ => None,
        }
    }

    /// Try to convert to an integer value
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Boolean(value) => Some(i32::from(*value)),
            Value::Char(value) => Some(i32::from(*value)),
            Value::Byte(value) => Some(i32::from(*value)),
            Value::Short(value) => Some(i32::from(*value)),
            Value::Int(value) => Some(*value),
            Value::Long(value) => i32::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Try to convert to a 64-bit integer value
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(value) => Some(*value),
            other => other.as_i32().map(i64::from),
        }
    }

    /// Try to view as a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "'\\u{v:04x}'"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v}f"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "\"{v}\""),
            Value::Ref(v) => write!(f, "@{v:x}"),
        }
    }
}

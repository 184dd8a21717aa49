use crate::{
    image::{
        io::{write_7bit_encoded_int, write_le, write_prefixed_bytes, write_prefixed_string_utf8},
        Parser, IMAGE_MAGIC, IMAGE_VERSION,
    },
    typesystem::{
        ClassDescriptor, FieldDecl, FieldFlags, FieldType, MethodDecl, MethodFlags, ReferenceDecl,
        ReferenceKind, TypeFlags, TypeKind, Value,
    },
    Result,
};

/// Turns a raw class byte stream into a [`ClassDescriptor`].
///
/// The runtime owns exactly one decoder and applies it to every byte stream its
/// loaders fetch. Decoders must not check the requested name against the decoded
/// one; the loader does that uniformly for all decoders.
pub trait ClassDecoder: Send + Sync {
    /// Decode `bytes`, fetched for the type `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for
    /// byte streams that are not well-formed.
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<ClassDescriptor>;
}

/// Decoder for the `CLNK` class image format.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl ClassDecoder for ImageDecoder {
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<ClassDescriptor> {
        let mut parser = Parser::new(bytes);

        let magic = parser.read_bytes(IMAGE_MAGIC.len())?;
        if magic != IMAGE_MAGIC {
            return Err(malformed_error!("Byte stream for {} is not a class image", name));
        }

        let version = parser.read_le::<u16>()?;
        if version != IMAGE_VERSION {
            return Err(malformed_error!(
                "Unsupported class image version {} for {}",
                version,
                name
            ));
        }

        let decoded_name = parser.read_prefixed_string_utf8()?;
        let kind = match parser.read_le::<u8>()? {
            0 => TypeKind::Class,
            1 => TypeKind::Interface,
            other => return Err(malformed_error!("Invalid type kind {} in {}", other, name)),
        };
        let flags = TypeFlags::from_bits_retain(parser.read_le::<u16>()?);
        let super_name = parser.read_optional(Parser::read_prefixed_string_utf8)?;

        let mut descriptor = ClassDescriptor::new(decoded_name, kind);
        descriptor.flags = flags;
        descriptor.super_name = super_name;

        let count = read_count(&mut parser)?;
        for _ in 0..count {
            descriptor.interfaces.push(parser.read_prefixed_string_utf8()?);
        }

        let count = read_count(&mut parser)?;
        for _ in 0..count {
            descriptor.fields.push(read_field(&mut parser)?);
        }

        let count = read_count(&mut parser)?;
        for _ in 0..count {
            descriptor.methods.push(read_method(&mut parser)?);
        }

        let count = read_count(&mut parser)?;
        for _ in 0..count {
            descriptor.references.push(read_reference(&mut parser)?);
        }

        descriptor.initializer =
            parser.read_optional(|p| p.read_prefixed_bytes().map(<[u8]>::to_vec))?;

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after class image of {}",
                parser.remaining(),
                name
            ));
        }

        Ok(descriptor)
    }
}

/// Element counts are bounded by the unread bytes, every element takes at least one.
fn read_count(parser: &mut Parser<'_>) -> Result<usize> {
    let count = parser.read_7bit_encoded_int()? as usize;
    if count > parser.remaining() {
        return Err(malformed_error!(
            "Element count {} exceeds remaining {} bytes",
            count,
            parser.remaining()
        ));
    }
    Ok(count)
}

fn read_field(parser: &mut Parser<'_>) -> Result<FieldDecl> {
    let name = parser.read_prefixed_string_utf8()?;
    let field_type = FieldType::parse(&parser.read_prefixed_string_utf8()?)?;
    let flags = FieldFlags::from_bits_retain(parser.read_le::<u16>()?);
    let constant = parser.read_optional(read_constant)?;

    Ok(FieldDecl {
        name,
        field_type,
        flags,
        constant,
    })
}

fn read_constant(parser: &mut Parser<'_>) -> Result<Value> {
    Ok(match parser.read_le::<u8>()? {
        0 => Value::Boolean(parser.read_le::<u8>()? != 0),
        1 => Value::Char(parser.read_le::<u16>()?),
        2 => Value::Byte(parser.read_le::<i8>()?),
        3 => Value::Short(parser.read_le::<i16>()?),
        4 => Value::Int(parser.read_le::<i32>()?),
        5 => Value::Long(parser.read_le::<i64>()?),
        6 => Value::Float(parser.read_le::<f32>()?),
        7 => Value::Double(parser.read_le::<f64>()?),
        8 => Value::from(parser.read_prefixed_string_utf8()?.as_str()),
        tag => return Err(malformed_error!("Invalid constant tag {}", tag)),
    })
}

fn read_method(parser: &mut Parser<'_>) -> Result<MethodDecl> {
    let name = parser.read_prefixed_string_utf8()?;
    let descriptor = parser.read_prefixed_string_utf8()?;
    let flags = MethodFlags::from_bits_retain(parser.read_le::<u16>()?);
    let body = parser.read_optional(|p| p.read_prefixed_bytes().map(<[u8]>::to_vec))?;

    Ok(MethodDecl {
        name,
        descriptor,
        flags,
        body,
    })
}

fn read_reference(parser: &mut Parser<'_>) -> Result<ReferenceDecl> {
    let kind = ReferenceKind::from_u8(parser.read_le::<u8>()?)?;
    Ok(ReferenceDecl {
        kind,
        owner: parser.read_prefixed_string_utf8()?,
        name: parser.read_prefixed_string_utf8()?,
        descriptor: parser.read_prefixed_string_utf8()?,
    })
}

/// Encode a descriptor in the `CLNK` class image format.
///
/// Array descriptors are encoded with the class kind; arrays are never decoded
/// from byte streams. Field constants that are not constant kinds (`Null`, `Ref`)
/// are written as absent.
#[must_use]
pub fn encode(descriptor: &ClassDescriptor) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);

    out.extend_from_slice(IMAGE_MAGIC);
    write_le(&mut out, IMAGE_VERSION);
    write_prefixed_string_utf8(&mut out, &descriptor.name);
    write_le(&mut out, u8::from(descriptor.kind == TypeKind::Interface));
    write_le(&mut out, descriptor.flags.bits());
    write_optional(&mut out, descriptor.super_name.as_deref(), |out, name| {
        write_prefixed_string_utf8(out, name);
    });

    write_count(&mut out, descriptor.interfaces.len());
    for interface in &descriptor.interfaces {
        write_prefixed_string_utf8(&mut out, interface);
    }

    write_count(&mut out, descriptor.fields.len());
    for field in &descriptor.fields {
        write_prefixed_string_utf8(&mut out, &field.name);
        write_prefixed_string_utf8(&mut out, &field.field_type.descriptor());
        write_le(&mut out, field.flags.bits());
        let constant = field.constant.as_ref().filter(|c| c.is_constant_kind());
        write_optional(&mut out, constant, write_constant);
    }

    write_count(&mut out, descriptor.methods.len());
    for method in &descriptor.methods {
        write_prefixed_string_utf8(&mut out, &method.name);
        write_prefixed_string_utf8(&mut out, &method.descriptor);
        write_le(&mut out, method.flags.bits());
        write_optional(&mut out, method.body.as_deref(), write_prefixed_bytes);
    }

    write_count(&mut out, descriptor.references.len());
    for reference in &descriptor.references {
        write_le(&mut out, reference.kind.to_u8());
        write_prefixed_string_utf8(&mut out, &reference.owner);
        write_prefixed_string_utf8(&mut out, &reference.name);
        write_prefixed_string_utf8(&mut out, &reference.descriptor);
    }

    write_optional(&mut out, descriptor.initializer.as_deref(), write_prefixed_bytes);
    out
}

fn write_count(out: &mut Vec<u8>, count: usize) {
    write_7bit_encoded_int(out, u32::try_from(count).unwrap_or(u32::MAX));
}

fn write_optional<T>(out: &mut Vec<u8>, value: Option<T>, write: impl FnOnce(&mut Vec<u8>, T)) {
    match value {
        Some(value) => {
            out.push(1);
            write(out, value);
        }
        None => out.push(0),
    }
}

fn write_constant(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Boolean(v) => {
            out.push(0);
            out.push(u8::from(*v));
        }
        Value::Char(v) => {
            out.push(1);
            write_le(out, *v);
        }
        Value::Byte(v) => {
            out.push(2);
            write_le(out, *v);
        }
        Value::Short(v) => {
            out.push(3);
            write_le(out, *v);
        }
        Value::Int(v) => {
            out.push(4);
            write_le(out, *v);
        }
        Value::Long(v) => {
            out.push(5);
            write_le(out, *v);
        }
        Value::Float(v) => {
            out.push(6);
            write_le(out, *v);
        }
        Value::Double(v) => {
            out.push(7);
            write_le(out, *v);
        }
        Value::Str(v) => {
            out.push(8);
            write_prefixed_string_utf8(out, v);
        }
        // filtered out by the caller
        Value::Null | Value::Ref(_) => {}
    }
}

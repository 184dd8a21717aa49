//! Array type synthesis.
//!
//! Array types have no byte stream. The component is loaded through the normal
//! protocol, then the array record is created by the component's defining loader,
//! or by the bootstrap loader for primitive components, and registered there.

use std::sync::Arc;

use tracing::debug;

use crate::{
    diagnostics::EventKind,
    loader::{LoadContext, LoaderRc},
    typesystem::{FieldType, LoaderId, TypeFlags, TypeRecord, TypeRecordRc},
    Error, Result,
};

pub(super) fn load_array(
    initiating: &LoaderRc,
    ctx: &LoadContext<'_>,
    name: &str,
) -> Result<TypeRecordRc> {
    let dimensions = name.bytes().take_while(|b| *b == b'[').count();
    if dimensions > ctx.config.max_array_dimensions {
        return Err(malformed_error!(
            "Array type {} has {} dimensions, at most {} are allowed",
            name,
            dimensions,
            ctx.config.max_array_dimensions
        ));
    }

    let component = match FieldType::parse(&name[1..])? {
        FieldType::Object(component) => Some(initiating.load_type(ctx, &component)?),
        FieldType::Array(component) => Some(initiating.load_type(ctx, &component)?),
        _ => None,
    };

    let (defining, flags) = match &component {
        Some(component) => (
            component.defining_loader()?,
            component.descriptor().flags & TypeFlags::PUBLIC,
        ),
        None => (
            ctx.registry
                .loader(LoaderId::BOOTSTRAP)
                .ok_or(Error::LoaderUnavailable(LoaderId::BOOTSTRAP.value()))?,
            TypeFlags::PUBLIC,
        ),
    };

    if let Some(existing) = defining.cached(name) {
        return Ok(existing);
    }

    let record = Arc::new(TypeRecord::array(&defining, name, component.as_ref(), flags));
    let identity = record.identity().clone();
    let outcome = ctx.registry.register(&identity, record)?;
    if outcome.is_registered() {
        debug!(%identity, "synthesized array type");
        ctx.diagnostics.record(
            EventKind::ArraySynthesized,
            &identity,
            format!("{dimensions} dimension(s)"),
        );
    }

    Ok(outcome.into_record())
}

#[cfg(test)]
mod tests {
    use crate::{
        init::InitState,
        link::LinkState,
        loader::MemorySource,
        test::TestLoaders,
        typesystem::{ClassBuilder, TypeKind},
        Error,
    };

    #[test]
    fn test_primitive_array_belongs_to_bootstrap() {
        let loaders = TestLoaders::new();
        let ctx = loaders.context();

        let record = loaders.app.load_type(&ctx, "[I").unwrap();
        assert_eq!(record.kind(), TypeKind::Array);
        assert!(record.identity().loader().is_bootstrap());
        assert!(record.component().is_none());
        assert!(matches!(record.link_state(), LinkState::Resolved));
        assert!(matches!(record.init_state(), InitState::Initialized));
    }

    #[test]
    fn test_object_array_belongs_to_component_loader() {
        let loaders = TestLoaders::with_sources(
            MemorySource::new(),
            MemorySource::new().with_class(&ClassBuilder::class("demo.Point").build().unwrap()),
        );
        let ctx = loaders.context();

        let array = loaders.app.load_type(&ctx, "[[Ldemo.Point;").unwrap();
        assert_eq!(array.identity().loader(), loaders.app.id());

        let inner = array.component().unwrap();
        assert_eq!(inner.name(), "[Ldemo.Point;");
        assert_eq!(inner.component().unwrap().name(), "demo.Point");

        let again = loaders.app.load_type(&ctx, "[[Ldemo.Point;").unwrap();
        assert!(std::sync::Arc::ptr_eq(&array, &again));
    }

    #[test]
    fn test_invalid_array_names() {
        let loaders = TestLoaders::new();
        let ctx = loaders.context();

        assert!(loaders.app.load_type(&ctx, "[Q").is_err());
        assert!(loaders.app.load_type(&ctx, "[").is_err());
        assert!(matches!(
            loaders.app.load_type(&ctx, "[Ldemo.Missing;"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_dimension_limit() {
        let loaders = TestLoaders::new();
        let ctx = loaders.context();

        let name = format!("{}I", "[".repeat(256));
        assert!(matches!(
            loaders.app.load_type(&ctx, &name),
            Err(Error::Malformed { .. })
        ));
        assert!(loaders.app.load_type(&ctx, &format!("{}I", "[".repeat(255))).is_ok());
    }
}

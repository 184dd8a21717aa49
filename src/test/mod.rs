//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::{
    diagnostics::Diagnostics,
    image::ImageDecoder,
    loader::{ByteStreamSource, LoadContext, LoaderNode, LoaderRc, MemorySource},
    runtime::RuntimeConfig,
    typesystem::{
        ClassDescriptor, LoaderId, TypeDescriptorRegistry, TypeIdentity, TypeKind, TypeRecord,
        TypeRecordRc, TypeRecordRef,
    },
};

// A handle to a record that never existed
pub fn dangling_ref(name: &str) -> TypeRecordRef {
    TypeRecordRef::dangling(TypeIdentity::new(LoaderId::BOOTSTRAP, name))
}

// An unregistered, empty class record defined by `loader`
pub fn class_record(loader: &LoaderRc, name: &str) -> TypeRecordRc {
    record_of(loader, ClassDescriptor::new(name, TypeKind::Class))
}

// An unregistered record for `descriptor`, defined by `loader`
pub fn record_of(loader: &LoaderRc, descriptor: ClassDescriptor) -> TypeRecordRc {
    Arc::new(TypeRecord::from_descriptor(loader, descriptor, [0; 20]))
}

/// A bootstrap loader and an application loader below it, registered in their
/// own registry, plus everything needed to build a [`LoadContext`].
pub struct TestLoaders {
    pub registry: TypeDescriptorRegistry,
    pub bootstrap: LoaderRc,
    pub app: LoaderRc,
    pub decoder: ImageDecoder,
    pub diagnostics: Diagnostics,
    pub config: RuntimeConfig,
}

impl TestLoaders {
    pub fn new() -> Self {
        Self::with_sources(MemorySource::new(), MemorySource::new())
    }

    pub fn with_sources(bootstrap: MemorySource, app: MemorySource) -> Self {
        Self::build(Arc::new(bootstrap), Arc::new(app))
    }

    pub fn with_shared_app_source(bootstrap: MemorySource, app: Arc<MemorySource>) -> Self {
        Self::build(Arc::new(bootstrap), app)
    }

    fn build(bootstrap: Arc<dyn ByteStreamSource>, app: Arc<dyn ByteStreamSource>) -> Self {
        let registry = TypeDescriptorRegistry::new();
        let bootstrap = Arc::new(LoaderNode::new(
            LoaderId::BOOTSTRAP,
            "bootstrap",
            None,
            Some(bootstrap),
        ));
        registry.add_loader(&bootstrap);

        let app = Arc::new(LoaderNode::new(
            registry.next_loader_id(),
            "app",
            Some(&bootstrap),
            Some(app),
        ));
        registry.add_loader(&app);

        TestLoaders {
            registry,
            bootstrap,
            app,
            decoder: ImageDecoder,
            diagnostics: Diagnostics::new(),
            config: RuntimeConfig::default(),
        }
    }

    pub fn context(&self) -> LoadContext<'_> {
        LoadContext {
            registry: &self.registry,
            decoder: &self.decoder,
            diagnostics: &self.diagnostics,
            config: &self.config,
        }
    }
}

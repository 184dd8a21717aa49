//! The runtime facade.
//!
//! [`Runtime`] owns everything a running program's type system consists of: the
//! bootstrap loader, the registry of live loaders, the linker, the initialization
//! coordinator and the diagnostics log. It is the only public entry point for
//! loading, linking, resolving and initializing types; the components underneath
//! are wired together here and nowhere else.
//!
//! # Example
//!
//! ```rust
//! use classlink::prelude::*;
//!
//! let platform = MemorySource::new()
//!     .with_class(&ClassBuilder::class("demo.lang.Base").build()?);
//! let app = MemorySource::new().with_class(
//!     &ClassBuilder::class("demo.app.Main")
//!         .extends("demo.lang.Base")
//!         .static_constant("VERSION", "I", Value::Int(3))
//!         .build()?,
//! );
//!
//! let runtime = Runtime::builder().bootstrap_source(platform).build();
//! let loader = runtime.create_loader("app", runtime.bootstrap(), app)?;
//!
//! let main = runtime.entry_point(&loader, "demo.app.Main")?;
//! assert!(main.is_initialized());
//! assert_eq!(main.statics().get_by_name("VERSION"), Some(Value::Int(3)));
//! assert!(main.supertype().unwrap().identity().loader().is_bootstrap());
//! # Ok::<(), classlink::Error>(())
//! ```

mod config;

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

pub use config::{ResolutionStrategy, RuntimeConfig};

use crate::{
    diagnostics::Diagnostics,
    image::{ClassDecoder, ImageDecoder},
    init::{InitializationCoordinator, InitializerEngine, NoopEngine, TriggerEvent},
    link::{ConcreteBinding, DispatchMode, Linker, StructuralVerifier, Verifier},
    loader::{ByteStreamSource, LoadContext, LoaderNode, LoaderRc},
    typesystem::{
        LoaderId, TypeDescriptorRegistry, TypeFlags, TypeIdentity, TypeRecordRc, Value,
    },
    BindingErrorKind, Error, Result,
};

/// Builder for a [`Runtime`]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    bootstrap_source: Option<Arc<dyn ByteStreamSource>>,
    decoder: Arc<dyn ClassDecoder>,
    verifier: Arc<dyn Verifier>,
    engine: Arc<dyn InitializerEngine>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Default configuration, no bootstrap source, the `CLNK` decoder, the
    /// structural verifier and an engine that ignores initializer bodies
    #[must_use]
    pub fn new() -> Self {
        RuntimeBuilder {
            config: RuntimeConfig::default(),
            bootstrap_source: None,
            decoder: Arc::new(ImageDecoder),
            verifier: Arc::new(StructuralVerifier::new()),
            engine: Arc::new(NoopEngine),
        }
    }

    /// Use `config`
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Where the bootstrap loader fetches platform types from
    #[must_use]
    pub fn bootstrap_source(mut self, source: impl ByteStreamSource + 'static) -> Self {
        self.bootstrap_source = Some(Arc::new(source));
        self
    }

    /// Decode byte streams with `decoder`
    #[must_use]
    pub fn decoder(mut self, decoder: impl ClassDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Gate linking with `verifier`
    #[must_use]
    pub fn verifier(mut self, verifier: impl Verifier + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    /// Run initializer bodies with `engine`
    #[must_use]
    pub fn engine(mut self, engine: impl InitializerEngine + 'static) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    /// Create the runtime and its bootstrap loader
    #[must_use]
    pub fn build(self) -> Runtime {
        let registry = TypeDescriptorRegistry::new();
        let bootstrap = Arc::new(LoaderNode::new(
            LoaderId::BOOTSTRAP,
            "bootstrap",
            None,
            self.bootstrap_source,
        ));
        registry.add_loader(&bootstrap);

        let diagnostics = Diagnostics::new();
        diagnostics.set_enabled(self.config.record_events);

        info!(
            resolution = %self.config.resolution,
            verify = self.config.verify,
            "runtime created"
        );

        Runtime {
            config: self.config,
            registry,
            bootstrap,
            decoder: self.decoder,
            diagnostics,
            linker: Linker::new(self.verifier),
            coordinator: InitializationCoordinator::new(self.engine),
        }
    }
}

/// A managed runtime's type system.
pub struct Runtime {
    config: RuntimeConfig,
    registry: TypeDescriptorRegistry,
    bootstrap: LoaderRc,
    decoder: Arc<dyn ClassDecoder>,
    diagnostics: Diagnostics,
    linker: Linker,
    coordinator: InitializationCoordinator,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime with every default and an empty bootstrap loader
    #[must_use]
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    /// Start configuring a runtime
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The root of the delegation forest
    #[must_use]
    pub fn bootstrap(&self) -> &LoaderRc {
        &self.bootstrap
    }

    /// The configuration in effect
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The identity-keyed view over all loader caches
    #[must_use]
    pub fn registry(&self) -> &TypeDescriptorRegistry {
        &self.registry
    }

    /// The pipeline event log
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The linker, for inspecting the configured verifier
    #[must_use]
    pub fn linker(&self) -> &Linker {
        &self.linker
    }

    pub(crate) fn load_context(&self) -> LoadContext<'_> {
        LoadContext {
            registry: &self.registry,
            decoder: self.decoder.as_ref(),
            diagnostics: &self.diagnostics,
            config: &self.config,
        }
    }

    fn check_owned(&self, loader: &LoaderRc) -> Result<()> {
        match self.registry.loader(loader.id()) {
            Some(known) if Arc::ptr_eq(&known, loader) => Ok(()),
            _ => Err(Error::Error(format!(
                "loader {} does not belong to this runtime",
                loader.id()
            ))),
        }
    }

    /// Create a loader delegating to `parent`.
    ///
    /// # Errors
    /// Returns an error if `parent` was created by another runtime.
    pub fn create_loader(
        &self,
        name: &str,
        parent: &LoaderRc,
        source: impl ByteStreamSource + 'static,
    ) -> Result<LoaderRc> {
        self.check_owned(parent)?;
        let loader = Arc::new(LoaderNode::new(
            self.registry.next_loader_id(),
            name,
            Some(parent),
            Some(Arc::new(source)),
        ));
        self.registry.add_loader(&loader);

        debug!(loader = %loader.id(), parent = %parent.id(), name, "loader created");
        Ok(loader)
    }

    /// Create a loader without a parent. It can only see the types of its own
    /// source; not even the bootstrap types are visible through it.
    #[must_use]
    pub fn create_isolated_loader(
        &self,
        name: &str,
        source: impl ByteStreamSource + 'static,
    ) -> LoaderRc {
        let loader = Arc::new(LoaderNode::new(
            self.registry.next_loader_id(),
            name,
            None,
            Some(Arc::new(source)),
        ));
        self.registry.add_loader(&loader);

        debug!(loader = %loader.id(), name, "isolated loader created");
        loader
    }

    /// Load `name` through `loader`, delegating parent-first.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if no loader of the chain can supply the name,
    /// decoding errors for damaged byte streams and [`Error::NameMismatch`] if the
    /// byte stream defines a different name.
    pub fn load_type(&self, loader: &LoaderRc, name: &str) -> Result<TypeRecordRc> {
        self.check_owned(loader)?;
        loader.load_type(&self.load_context(), name)
    }

    /// Look up an already loaded type by identity, without loading anything
    #[must_use]
    pub fn find_type(&self, identity: &TypeIdentity) -> Option<TypeRecordRc> {
        self.registry.lookup(identity)
    }

    /// Link `record`: verify and prepare its hierarchy and itself, and with eager
    /// resolution bind every symbolic reference.
    ///
    /// # Errors
    /// Returns the record's permanent link failure, if any.
    pub fn link(&self, record: &TypeRecordRc) -> Result<()> {
        self.linker.link(&self.load_context(), record)
    }

    /// Resolve symbolic reference `index` of `record`, linking the record first.
    ///
    /// # Errors
    /// Returns the memoized [`Error::Binding`] of the reference, or the link
    /// failure of the record or target.
    pub fn resolve(&self, record: &TypeRecordRc, index: usize) -> Result<ConcreteBinding> {
        self.link(record)?;
        self.linker.resolve(&self.load_context(), record, index)
    }

    /// Ensure `record` is initialized
    ///
    /// # Errors
    /// Returns the record's link failure or its permanent initialization failure.
    pub fn ensure_initialized(&self, record: &TypeRecordRc) -> Result<()> {
        self.coordinator.ensure_initialized(self, record)
    }

    /// Report `event` on `record`, initializing it.
    ///
    /// # Errors
    /// Instantiating an interface, an abstract class or an array type through
    /// [`TriggerEvent::New`] is rejected with an
    /// [`BindingErrorKind::IncompatibleKind`] binding error; otherwise as
    /// [`Runtime::ensure_initialized`].
    pub fn trigger(&self, event: TriggerEvent, record: &TypeRecordRc) -> Result<()> {
        if event == TriggerEvent::New
            && (record.is_interface()
                || record.is_array()
                || record.descriptor().flags.contains(TypeFlags::ABSTRACT))
        {
            return Err(Error::Binding {
                reference: record.name().to_string(),
                kind: BindingErrorKind::IncompatibleKind,
                message: format!("{} cannot be instantiated", record.identity()),
            });
        }

        self.ensure_initialized(record)
    }

    /// Load `name` through `loader` and initialize it as the program's entry point
    ///
    /// # Errors
    /// Returns the load, link or initialization error of the type.
    pub fn entry_point(&self, loader: &LoaderRc, name: &str) -> Result<TypeRecordRc> {
        let record = self.load_type(loader, name)?;
        self.trigger(TriggerEvent::EntryPoint, &record)?;
        Ok(record)
    }

    fn static_field(
        &self,
        owner: &TypeRecordRc,
        index: usize,
    ) -> Result<(TypeRecordRc, usize, usize)> {
        let binding = self.resolve(owner, index)?;
        let ConcreteBinding::Field {
            declarer,
            index: field,
            slot,
            is_static: true,
        } = binding
        else {
            return Err(Error::Binding {
                reference: Self::reference_name(owner, index),
                kind: BindingErrorKind::IncompatibleKind,
                message: "not a static field".to_string(),
            });
        };

        let declarer = declarer.get()?;
        self.trigger(TriggerEvent::StaticFieldAccess, &declarer)?;
        Ok((declarer, field, slot))
    }

    fn reference_name(owner: &TypeRecordRc, index: usize) -> String {
        owner
            .reference(index)
            .map_or_else(|| format!("#{index}"), |reference| reference.decl().to_string())
    }

    /// Read the static field named by reference `index` of `owner`, initializing
    /// the field's declaring type first.
    ///
    /// # Errors
    /// Returns the binding error of the reference, a binding error if the reference
    /// names an instance field, or the initialization failure of the declarer.
    pub fn get_static(&self, owner: &TypeRecordRc, index: usize) -> Result<Value> {
        let (declarer, _, slot) = self.static_field(owner, index)?;
        declarer.statics().get(slot).ok_or_else(|| {
            Error::Error(format!(
                "{} has no static slot {slot}",
                declarer.identity()
            ))
        })
    }

    /// Write the static field named by reference `index` of `owner`, initializing
    /// the field's declaring type first.
    ///
    /// # Errors
    /// As [`Runtime::get_static`]; additionally fails if `value` does not fit the
    /// field's type.
    pub fn put_static(&self, owner: &TypeRecordRc, index: usize, value: Value) -> Result<()> {
        let (declarer, field, slot) = self.static_field(owner, index)?;
        let field_type = &declarer.descriptor().fields[field].field_type;
        if !value.fits(field_type) {
            return Err(Error::Error(format!(
                "{value} cannot be stored in a field of type {field_type}"
            )));
        }
        declarer.statics().set(slot, value)
    }

    /// Resolve method reference `index` of `owner` for a static invocation and
    /// initialize the method's declaring type.
    ///
    /// # Errors
    /// Returns the binding error of the reference, a binding error if the method
    /// is not static, or the initialization failure of the declarer.
    pub fn invoke_static(&self, owner: &TypeRecordRc, index: usize) -> Result<ConcreteBinding> {
        let binding = self.resolve(owner, index)?;
        let ConcreteBinding::Method {
            declarer,
            dispatch: DispatchMode::Static,
            ..
        } = &binding
        else {
            return Err(Error::Binding {
                reference: Self::reference_name(owner, index),
                kind: BindingErrorKind::IncompatibleKind,
                message: "not a static method".to_string(),
            });
        };

        self.trigger(TriggerEvent::InvokeStatic, &declarer.get()?)?;
        Ok(binding)
    }

    /// Load and link `names` through `loader` in parallel.
    ///
    /// # Returns
    /// One outcome per name, in input order.
    pub fn preload(&self, loader: &LoaderRc, names: &[&str]) -> Vec<Result<TypeRecordRc>> {
        names
            .par_iter()
            .map(|name| -> Result<TypeRecordRc> {
                let record = self.load_type(loader, name)?;
                self.link(&record)?;
                Ok(record)
            })
            .collect()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("loaders", &self.registry.loaders().len())
            .field("types", &self.registry.len())
            .field("linker", &self.linker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        init::ScriptedEngine,
        loader::MemorySource,
        typesystem::{ClassBuilder, ClassDescriptor},
    };

    fn source(classes: &[ClassDescriptor]) -> MemorySource {
        classes
            .iter()
            .fold(MemorySource::new(), |source, class| source.with_class(class))
    }

    #[test]
    fn test_foreign_loader_rejected() {
        let first = Runtime::new();
        let second = Runtime::new();

        assert!(second.load_type(first.bootstrap(), "demo.A").is_err());
        assert!(second
            .create_loader("app", first.bootstrap(), MemorySource::new())
            .is_err());
    }

    #[test]
    fn test_static_access_initializes_declarer() {
        let engine = ScriptedEngine::new().on("demo.Config", |ctx| {
            ctx.put_static("limit", Value::Int(42))
        });
        let runtime = Runtime::builder()
            .bootstrap_source(source(&[
                ClassBuilder::class("demo.Config")
                    .static_field("limit", "I")
                    .initializer(vec![1])
                    .build()
                    .unwrap(),
                ClassBuilder::class("demo.User")
                    .field_ref("demo.Config", "limit", "I")
                    .build()
                    .unwrap(),
            ]))
            .engine(engine)
            .build();

        let user = runtime.load_type(runtime.bootstrap(), "demo.User").unwrap();
        let config = runtime.load_type(runtime.bootstrap(), "demo.Config").unwrap();
        runtime.link(&user).unwrap();
        assert!(!config.is_initialized());

        assert_eq!(runtime.get_static(&user, 0).unwrap(), Value::Int(42));
        assert!(config.is_initialized());

        runtime.put_static(&user, 0, Value::Int(7)).unwrap();
        assert_eq!(runtime.get_static(&user, 0).unwrap(), Value::Int(7));
        assert!(runtime.put_static(&user, 0, Value::Long(7)).is_err());
    }

    #[test]
    fn test_new_rejects_abstract_types() {
        let runtime = Runtime::builder()
            .bootstrap_source(source(&[
                ClassBuilder::interface("demo.Shape").build().unwrap(),
                ClassBuilder::abstract_class("demo.Base").build().unwrap(),
            ]))
            .build();

        for name in ["demo.Shape", "demo.Base", "[I"] {
            let record = runtime.load_type(runtime.bootstrap(), name).unwrap();
            let error = runtime.trigger(TriggerEvent::New, &record).unwrap_err();
            assert_eq!(
                error.binding_kind(),
                Some(BindingErrorKind::IncompatibleKind)
            );
        }
    }

    #[test]
    fn test_invoke_static() {
        let runtime = Runtime::builder()
            .bootstrap_source(source(&[
                ClassBuilder::class("demo.Util")
                    .static_method("max", "(II)I", vec![1])
                    .method("run", "()V", vec![1])
                    .build()
                    .unwrap(),
                ClassBuilder::class("demo.User")
                    .method_ref("demo.Util", "max", "(II)I")
                    .method_ref("demo.Util", "run", "()V")
                    .build()
                    .unwrap(),
            ]))
            .build();

        let user = runtime.load_type(runtime.bootstrap(), "demo.User").unwrap();
        let binding = runtime.invoke_static(&user, 0).unwrap();
        assert!(binding.target().upgrade().unwrap().is_initialized());

        let error = runtime.invoke_static(&user, 1).unwrap_err();
        assert_eq!(
            error.binding_kind(),
            Some(BindingErrorKind::IncompatibleKind)
        );
    }

    #[test]
    fn test_preload_keeps_order() {
        let runtime = Runtime::builder()
            .bootstrap_source(source(&[
                ClassBuilder::class("demo.A").build().unwrap(),
                ClassBuilder::class("demo.B").extends("demo.A").build().unwrap(),
            ]))
            .build();

        let outcomes =
            runtime.preload(runtime.bootstrap(), &["demo.B", "demo.Missing", "demo.A"]);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].as_ref().unwrap().name(), "demo.B");
        assert!(matches!(outcomes[1], Err(Error::NotFound(_))));
        assert!(outcomes[2].as_ref().unwrap().is_linked());
    }

    #[test]
    fn test_events_can_be_disabled() {
        let config = RuntimeConfig {
            record_events: false,
            ..RuntimeConfig::default()
        };
        let runtime = Runtime::builder()
            .config(config)
            .bootstrap_source(source(&[ClassBuilder::class("demo.A").build().unwrap()]))
            .build();

        runtime.load_type(runtime.bootstrap(), "demo.A").unwrap();
        assert!(runtime.diagnostics().is_empty());
    }
}

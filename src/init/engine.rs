//! Execution of initializer bodies.
//!
//! The runtime treats initializer bodies as opaque bytes. An [`InitializerEngine`]
//! gives them meaning: it is called once per type, by the context that owns the
//! initialization claim, with an [`InitContext`] for reading and writing the
//! type's static fields and for requiring other types.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use dashmap::DashMap;

use crate::{
    init::TriggerEvent,
    typesystem::{StaticFieldStorage, TypeIdentity, TypeRecordRc, Value},
    Error, Result, Runtime,
};

/// Executes initializer bodies.
pub trait InitializerEngine: Send + Sync {
    /// Run the initializer of `ctx.record()`.
    ///
    /// # Errors
    /// Any error returned here fails the type's initialization permanently and is
    /// wrapped as the cause of an [`Error::InitializationFailure`].
    fn run_initializer(&self, ctx: &InitContext<'_>) -> Result<()>;
}

/// What an initializer body can see while it runs.
pub struct InitContext<'a> {
    runtime: &'a Runtime,
    record: &'a TypeRecordRc,
}

impl<'a> InitContext<'a> {
    pub(crate) fn new(runtime: &'a Runtime, record: &'a TypeRecordRc) -> Self {
        InitContext { runtime, record }
    }

    /// The runtime the type lives in
    #[must_use]
    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    /// The type being initialized
    #[must_use]
    pub fn record(&self) -> &'a TypeRecordRc {
        self.record
    }

    /// The opaque initializer body
    #[must_use]
    pub fn body(&self) -> &'a [u8] {
        self.record
            .descriptor()
            .initializer
            .as_deref()
            .unwrap_or_default()
    }

    /// Static storage of the type being initialized
    #[must_use]
    pub fn statics(&self) -> &'a StaticFieldStorage {
        self.record.statics()
    }

    /// Read one of the type's own static fields
    #[must_use]
    pub fn get_static(&self, name: &str) -> Option<Value> {
        self.record.statics().get_by_name(name)
    }

    /// Write one of the type's own static fields.
    ///
    /// # Errors
    /// Returns [`Error::Initializer`] if the type declares no such static field or
    /// the value does not fit the field's type.
    pub fn put_static(&self, name: &str, value: Value) -> Result<()> {
        let Some((_, field)) = self.record.field(name).filter(|(_, f)| f.is_static()) else {
            return Err(Error::Initializer(format!(
                "{} declares no static field '{name}'",
                self.record.identity()
            )));
        };
        if !value.fits(&field.field_type) {
            return Err(Error::Initializer(format!(
                "{value} cannot be stored in '{name}' of type {}",
                field.field_type
            )));
        }
        self.record
            .statics()
            .set_by_name(self.record.identity(), name, value)
    }

    /// Load `name` through the initializing type's defining loader and initialize
    /// it, as a static access from inside this initializer would.
    ///
    /// # Errors
    /// Returns the load, link or initialization error of the required type.
    pub fn require(&self, name: &str) -> Result<TypeRecordRc> {
        let loader = self.record.defining_loader()?;
        let record = self.runtime.load_type(&loader, name)?;
        self.runtime
            .trigger(TriggerEvent::StaticFieldAccess, &record)?;
        Ok(record)
    }
}

impl fmt::Debug for InitContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitContext")
            .field("record", self.record.identity())
            .finish_non_exhaustive()
    }
}

/// An engine that accepts every body without doing anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEngine;

impl InitializerEngine for NoopEngine {
    fn run_initializer(&self, _ctx: &InitContext<'_>) -> Result<()> {
        Ok(())
    }
}

type Script = dyn Fn(&InitContext<'_>) -> Result<()> + Send + Sync;

/// An engine driven by closures registered per type.
///
/// A script registered with [`ScriptedEngine::on_type`] applies to exactly one
/// type identity and takes precedence over a script registered with
/// [`ScriptedEngine::on`], which applies to every type of that name, whichever
/// loader defined it. Types without a script initialize successfully. Every run
/// is counted per identity, which makes the engine convenient for asserting
/// exactly-once behavior.
///
/// ```rust
/// use classlink::prelude::*;
///
/// let engine = ScriptedEngine::new().on("demo.Config", |ctx| {
///     ctx.put_static("ready", Value::Boolean(true))
/// });
/// assert_eq!(engine.runs("demo.Config"), 0);
/// ```
#[derive(Default)]
pub struct ScriptedEngine {
    by_name: DashMap<String, Arc<Script>>,
    by_identity: DashMap<TypeIdentity, Arc<Script>>,
    runs: DashMap<TypeIdentity, AtomicUsize>,
}

impl ScriptedEngine {
    /// Creates an engine without scripts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the script for every type named `name`, replacing any earlier one
    #[must_use]
    pub fn on<F>(self, name: impl Into<String>, script: F) -> Self
    where
        F: Fn(&InitContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.by_name.insert(name.into(), Arc::new(script));
        self
    }

    /// Register the script for the single type `identity`
    #[must_use]
    pub fn on_type<F>(self, identity: TypeIdentity, script: F) -> Self
    where
        F: Fn(&InitContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.set_type_script(identity, script);
        self
    }

    /// Register the script for the single type `identity` on a shared engine.
    ///
    /// Loader ids are only known once loaders exist, so identity scripts are
    /// often added after the runtime was built. The script applies to
    /// initializations that start afterwards.
    pub fn set_type_script<F>(&self, identity: TypeIdentity, script: F)
    where
        F: Fn(&InitContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.by_identity.insert(identity, Arc::new(script));
    }

    /// How many times initializers of types named `name` were run, summed over
    /// all defining loaders
    #[must_use]
    pub fn runs(&self, name: &str) -> usize {
        self.runs
            .iter()
            .filter(|entry| entry.key().name() == name)
            .map(|entry| entry.value().load(Ordering::SeqCst))
            .sum()
    }

    /// How many times the initializer of `identity` was run
    #[must_use]
    pub fn runs_of(&self, identity: &TypeIdentity) -> usize {
        self.runs
            .get(identity)
            .map_or(0, |count| count.load(Ordering::SeqCst))
    }
}

impl InitializerEngine for ScriptedEngine {
    fn run_initializer(&self, ctx: &InitContext<'_>) -> Result<()> {
        let identity = ctx.record().identity();
        self.runs
            .entry(identity.clone())
            .or_default()
            .fetch_add(1, Ordering::SeqCst);

        // Cloned out so nested initialization never runs under a shard lock.
        let script = self
            .by_identity
            .get(identity)
            .map(|entry| entry.value().clone())
            .or_else(|| {
                self.by_name
                    .get(identity.name())
                    .map(|entry| entry.value().clone())
            });
        match script {
            Some(script) => script(ctx),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("by_name", &self.by_name.len())
            .field("by_identity", &self.by_identity.len())
            .finish_non_exhaustive()
    }
}

impl<T: InitializerEngine + ?Sized> InitializerEngine for Arc<T> {
    fn run_initializer(&self, ctx: &InitContext<'_>) -> Result<()> {
        (**self).run_initializer(ctx)
    }
}

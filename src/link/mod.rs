//! Linking: verification, preparation and resolution.
//!
//! A loaded record moves through `Loaded -> Verified -> Prepared -> Resolved`.
//! Before a record is verified its supertype and every direct superinterface are
//! loaded through the record's defining loader and prepared themselves, so a
//! prepared record always sits on top of a prepared hierarchy.
//!
//! # Failure handling
//!
//! Verification and preparation failures are stored in the record's state and
//! returned again, as clones, on every later attempt. A supertype that cannot be
//! loaded, or that failed itself, fails the subtype permanently too. Only
//! transient conditions (a failing byte stream source, a dropped loader) are
//! reported without touching the state.
//!
//! # Cycles
//!
//! Every call carries the chain of records currently being prepared. A supertype
//! that is already on that chain means the hierarchy loops back to itself: the
//! record reports [`Error::ClassCircularity`], and so does every record whose
//! supertype failed that way.
//!
//! # Locking
//!
//! A record's state lock is taken only around its own verify and prepare steps,
//! after the whole hierarchy above it has been handled. No thread ever waits on a
//! second record's state lock while holding one, so concurrent linking of
//! mutually dependent records cannot deadlock.

mod prepare;
mod resolver;
mod verifier;

use std::sync::Arc;

use tracing::{debug, warn};

pub use resolver::{ConcreteBinding, DispatchMode, SymbolResolver, SymbolicReference};
pub use verifier::{StructuralVerifier, Verifier};

use crate::{
    diagnostics::EventKind,
    loader::LoadContext,
    runtime::ResolutionStrategy,
    typesystem::{TypeIdentity, TypeRecordRc},
    Error, Result,
};

/// Link state of a record.
#[derive(Debug, Clone, strum::Display)]
pub enum LinkState {
    /// Defined by a loader, nothing checked yet
    Loaded,
    /// Passed the verifier gate
    Verified,
    /// Static storage, layout and dispatch table are built
    Prepared,
    /// Fully linked
    Resolved,
    /// Rejected by the verifier, or by a broken hierarchy. Permanent.
    VerificationFailed(Error),
    /// Storage or dispatch table construction failed. Permanent.
    PreparationFailed(Error),
}

impl LinkState {
    /// Returns true for the two failure states
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            LinkState::VerificationFailed(_) | LinkState::PreparationFailed(_)
        )
    }

    /// The stored error of a failure state
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            LinkState::VerificationFailed(error) | LinkState::PreparationFailed(error) => {
                Some(error)
            }
            _ => None,
        }
    }

    /// Returns true once storage, layout and dispatch table exist
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        matches!(self, LinkState::Prepared | LinkState::Resolved)
    }
}

/// Drives records through verification, preparation and resolution.
pub struct Linker {
    verifier: Arc<dyn Verifier>,
    resolver: SymbolResolver,
}

impl Default for Linker {
    fn default() -> Self {
        Self::new(Arc::new(StructuralVerifier::new()))
    }
}

impl Linker {
    /// Creates a linker using the given verifier gate
    #[must_use]
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Linker {
            verifier,
            resolver: SymbolResolver::new(),
        }
    }

    /// Name of the configured verifier
    #[must_use]
    pub fn verifier_name(&self) -> &'static str {
        self.verifier.name()
    }

    /// Verify and prepare `record`, after preparing its hierarchy.
    pub(crate) fn prepare(&self, ctx: &LoadContext<'_>, record: &TypeRecordRc) -> Result<()> {
        let mut path = Vec::new();
        self.prepare_with_path(ctx, record, &mut path)
    }

    /// Link `record` completely. With eager resolution every symbolic reference is
    /// resolved first; reference failures are memoized on the reference and do not
    /// fail the link.
    pub(crate) fn link(&self, ctx: &LoadContext<'_>, record: &TypeRecordRc) -> Result<()> {
        self.prepare(ctx, record)?;
        if matches!(*lock!(record.link), LinkState::Resolved) {
            return Ok(());
        }

        if ctx.config.resolution == ResolutionStrategy::Eager {
            for index in 0..record.references().len() {
                let outcome = self.resolve(ctx, record, index);
                if let Err(
                    error @ (Error::Source(_)
                    | Error::LoaderUnavailable(_)
                    | Error::RecursionLimit(_)),
                ) = outcome
                {
                    return Err(error);
                }
            }
        }

        let mut state = lock!(record.link);
        if matches!(*state, LinkState::Prepared) {
            *state = LinkState::Resolved;
            drop(state);

            debug!(identity = %record.identity(), "linked");
            ctx.diagnostics.record(
                EventKind::Resolved,
                record.identity(),
                format!("{} reference(s)", record.references().len()),
            );
        }
        Ok(())
    }

    /// Resolve reference `index` of `record`.
    pub(crate) fn resolve(
        &self,
        ctx: &LoadContext<'_>,
        record: &TypeRecordRc,
        index: usize,
    ) -> Result<ConcreteBinding> {
        self.resolver.resolve(ctx, self, record, index)
    }

    fn prepare_with_path(
        &self,
        ctx: &LoadContext<'_>,
        record: &TypeRecordRc,
        path: &mut Vec<TypeIdentity>,
    ) -> Result<()> {
        {
            let state = lock!(record.link);
            if state.is_prepared() {
                return Ok(());
            }
            if let Some(error) = state.error() {
                return Err(error.clone());
            }
        }

        if path.len() >= ctx.config.max_hierarchy_depth {
            return Err(Error::RecursionLimit(ctx.config.max_hierarchy_depth));
        }

        path.push(record.identity().clone());
        let outcome = self.prepare_hierarchy(ctx, record, path);
        path.pop();

        if let Err(error) = outcome {
            return match error {
                Error::Source(_) | Error::LoaderUnavailable(_) | Error::RecursionLimit(_) => {
                    Err(error)
                }
                error => Err(Self::store_failure(ctx, record, error)),
            };
        }

        self.verify_and_prepare(ctx, record)
    }

    /// Load the supertype and superinterfaces, link them into `record` and
    /// prepare them. Errors returned here are already phrased for `record`.
    fn prepare_hierarchy(
        &self,
        ctx: &LoadContext<'_>,
        record: &TypeRecordRc,
        path: &mut Vec<TypeIdentity>,
    ) -> Result<()> {
        let descriptor = record.descriptor();
        let supertype = match &descriptor.super_name {
            Some(name) => Some(Self::load_super(ctx, record, name)?),
            None => None,
        };
        let interfaces = descriptor
            .interfaces
            .iter()
            .map(|name| Self::load_super(ctx, record, name))
            .collect::<Result<Vec<_>>>()?;

        record.set_hierarchy(supertype.as_ref(), &interfaces);

        for parent in supertype.iter().chain(interfaces.iter()) {
            if path.contains(parent.identity()) {
                return Err(Error::ClassCircularity(record.identity().clone()));
            }

            match self.prepare_with_path(ctx, parent, path) {
                Ok(()) => {}
                Err(
                    error @ (Error::Source(_)
                    | Error::LoaderUnavailable(_)
                    | Error::RecursionLimit(_)),
                ) => return Err(error),
                Err(Error::ClassCircularity(_)) => {
                    return Err(Error::ClassCircularity(record.identity().clone()))
                }
                Err(error) => {
                    return Err(Error::VerificationFailure {
                        identity: record.identity().clone(),
                        message: format!("{} failed to link: {error}", parent.identity()),
                    })
                }
            }
        }

        Ok(())
    }

    fn load_super(
        ctx: &LoadContext<'_>,
        record: &TypeRecordRc,
        name: &str,
    ) -> Result<TypeRecordRc> {
        if name == record.name() {
            return Err(Error::ClassCircularity(record.identity().clone()));
        }

        let loader = record.defining_loader()?;
        match loader.load_type(ctx, name) {
            Ok(parent) => Ok(parent),
            Err(error @ (Error::Source(_) | Error::LoaderUnavailable(_))) => Err(error),
            Err(error) => Err(Error::VerificationFailure {
                identity: record.identity().clone(),
                message: format!("cannot load {name}: {error}"),
            }),
        }
    }

    fn verify_and_prepare(&self, ctx: &LoadContext<'_>, record: &TypeRecordRc) -> Result<()> {
        let mut state = lock!(record.link);
        match &*state {
            LinkState::Prepared | LinkState::Resolved => return Ok(()),
            LinkState::VerificationFailed(error) | LinkState::PreparationFailed(error) => {
                return Err(error.clone())
            }
            LinkState::Loaded | LinkState::Verified => {}
        }

        if ctx.config.verify && matches!(*state, LinkState::Loaded) {
            if let Err(error) = self.verifier.verify(record) {
                warn!(
                    identity = %record.identity(),
                    verifier = self.verifier.name(),
                    %error,
                    "verification failed"
                );
                ctx.diagnostics
                    .record(EventKind::LinkFailed, record.identity(), error.to_string());
                *state = LinkState::VerificationFailed(error.clone());
                return Err(error);
            }
            ctx.diagnostics
                .record(EventKind::Verified, record.identity(), self.verifier.name());
        }
        *state = LinkState::Verified;

        if let Err(error) = prepare::prepare(record) {
            warn!(identity = %record.identity(), %error, "preparation failed");
            ctx.diagnostics
                .record(EventKind::LinkFailed, record.identity(), error.to_string());
            *state = LinkState::PreparationFailed(error.clone());
            return Err(error);
        }
        *state = LinkState::Prepared;

        ctx.diagnostics.record(
            EventKind::Prepared,
            record.identity(),
            format!("{} static slot(s)", record.statics().len()),
        );
        Ok(())
    }

    /// Store `error` as the record's permanent failure, unless another thread got
    /// there first, and return whatever the record now holds.
    fn store_failure(ctx: &LoadContext<'_>, record: &TypeRecordRc, error: Error) -> Error {
        let mut state = lock!(record.link);
        if let Some(existing) = state.error() {
            return existing.clone();
        }
        if state.is_prepared() {
            return error;
        }

        warn!(identity = %record.identity(), %error, "linking failed");
        ctx.diagnostics
            .record(EventKind::LinkFailed, record.identity(), error.to_string());
        *state = LinkState::VerificationFailed(error.clone());
        error
    }
}

impl std::fmt::Debug for Linker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linker")
            .field("verifier", &self.verifier.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        loader::MemorySource,
        test::TestLoaders,
        typesystem::{ClassBuilder, ClassDescriptor},
        BindingErrorKind,
    };

    fn app_with(classes: &[ClassDescriptor]) -> TestLoaders {
        let source = classes
            .iter()
            .fold(MemorySource::new(), |source, class| source.with_class(class));
        TestLoaders::with_sources(MemorySource::new(), source)
    }

    #[test]
    fn test_link_hierarchy() {
        let loaders = app_with(&[
            ClassBuilder::interface("demo.Shape").build().unwrap(),
            ClassBuilder::class("demo.Base").field("a", "I").build().unwrap(),
            ClassBuilder::class("demo.Square")
                .extends("demo.Base")
                .implements("demo.Shape")
                .field("side", "I")
                .build()
                .unwrap(),
        ]);
        let ctx = loaders.context();
        let linker = Linker::default();

        let square = loaders.app.load_type(&ctx, "demo.Square").unwrap();
        linker.link(&ctx, &square).unwrap();

        assert!(square.is_linked());
        let base = square.supertype().unwrap();
        assert_eq!(base.name(), "demo.Base");
        assert!(base.link_state().is_prepared());
        assert_eq!(square.interfaces()[0].name(), "demo.Shape");
        assert_eq!(square.layout().unwrap().slots, vec![1]);
    }

    #[test]
    fn test_missing_supertype_is_permanent() {
        let loaders = app_with(&[ClassBuilder::class("demo.A")
            .extends("demo.Missing")
            .build()
            .unwrap()]);
        let ctx = loaders.context();
        let linker = Linker::default();

        let record = loaders.app.load_type(&ctx, "demo.A").unwrap();
        let first = linker.link(&ctx, &record).unwrap_err();
        assert!(matches!(first, Error::VerificationFailure { .. }));
        assert!(record.link_state().is_failed());

        let second = linker.link(&ctx, &record).unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_class_circularity() {
        let loaders = app_with(&[
            ClassBuilder::class("demo.A").extends("demo.B").build().unwrap(),
            ClassBuilder::class("demo.B").extends("demo.A").build().unwrap(),
            ClassBuilder::class("demo.C").extends("demo.A").build().unwrap(),
        ]);
        let ctx = loaders.context();
        let linker = Linker::default();

        let a = loaders.app.load_type(&ctx, "demo.A").unwrap();
        match linker.link(&ctx, &a) {
            Err(Error::ClassCircularity(identity)) => assert_eq!(identity.name(), "demo.A"),
            other => panic!("unexpected {other:?}"),
        }

        let b = loaders.app.load_type(&ctx, "demo.B").unwrap();
        assert!(matches!(
            linker.link(&ctx, &b),
            Err(Error::ClassCircularity(_))
        ));

        let c = loaders.app.load_type(&ctx, "demo.C").unwrap();
        assert!(matches!(
            linker.link(&ctx, &c),
            Err(Error::ClassCircularity(_))
        ));
    }

    #[test]
    fn test_self_extension() {
        let loaders = app_with(&[ClassBuilder::class("demo.A")
            .extends("demo.A")
            .build()
            .unwrap()]);
        let ctx = loaders.context();

        let a = loaders.app.load_type(&ctx, "demo.A").unwrap();
        assert!(matches!(
            Linker::default().link(&ctx, &a),
            Err(Error::ClassCircularity(_))
        ));
    }

    #[test]
    fn test_failed_supertype_fails_subtype() {
        let loaders = app_with(&[
            ClassBuilder::class("demo.Base")
                .abstract_method("run", "()V")
                .build()
                .unwrap(),
            ClassBuilder::class("demo.Derived")
                .extends("demo.Base")
                .build()
                .unwrap(),
        ]);
        let ctx = loaders.context();
        let linker = Linker::default();

        let derived = loaders.app.load_type(&ctx, "demo.Derived").unwrap();
        match linker.link(&ctx, &derived) {
            Err(Error::VerificationFailure { identity, message }) => {
                assert_eq!(identity.name(), "demo.Derived");
                assert!(message.contains("demo.Base"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(derived.supertype().unwrap().link_state().is_failed());
    }

    #[test]
    fn test_eager_resolution_memoizes_failures() {
        let loaders = app_with(&[
            ClassBuilder::class("demo.Target")
                .static_field("count", "I")
                .build()
                .unwrap(),
            ClassBuilder::class("demo.User")
                .field_ref("demo.Target", "count", "I")
                .field_ref("demo.Target", "missing", "I")
                .type_ref("demo.Absent")
                .build()
                .unwrap(),
        ]);
        let ctx = loaders.context();
        let linker = Linker::default();

        let user = loaders.app.load_type(&ctx, "demo.User").unwrap();
        linker.link(&ctx, &user).unwrap();
        assert!(user.is_linked());

        assert!(user.reference(0).unwrap().is_bound());
        let missing = user.reference(1).unwrap().outcome().unwrap().clone();
        assert_eq!(
            missing.unwrap_err().binding_kind(),
            Some(BindingErrorKind::Missing)
        );
        assert!(user.reference(2).unwrap().outcome().unwrap().is_err());
    }

    #[test]
    fn test_lazy_resolution_defers_references() {
        let mut loaders = app_with(&[ClassBuilder::class("demo.User")
            .type_ref("demo.Absent")
            .build()
            .unwrap()]);
        loaders.config = crate::runtime::RuntimeConfig::lazy();
        let ctx = loaders.context();
        let linker = Linker::default();

        let user = loaders.app.load_type(&ctx, "demo.User").unwrap();
        linker.link(&ctx, &user).unwrap();
        assert!(user.reference(0).unwrap().outcome().is_none());

        assert!(linker.resolve(&ctx, &user, 0).is_err());
        assert!(user.reference(0).unwrap().outcome().is_some());
    }
}

//! Exactly-once type initialization.
//!
//! Every record carries an [`InitCell`]: its [`InitState`] behind a mutex plus a
//! condition variable for waiters. [`InitializationCoordinator`] drives the cell
//! through the protocol below; the initializer body itself is executed by a
//! pluggable [`InitializerEngine`].
//!
//! # Protocol
//!
//! 1. the record is linked first, a link failure is returned as is;
//! 2. a context finding the record `NotStarted` claims it (`InProgress` with its
//!    own thread id) and becomes the only context that may run the body;
//! 3. the claimer initializes the supertype, then every superinterface that
//!    declares default methods (for classes and subinterfaces alike; interfaces
//!    without default methods are left alone), then runs the body;
//! 4. the outcome is published (`Initialized` or `Failed`) and all waiters are
//!    woken.
//!
//! A context that finds the record `InProgress` under another thread blocks until
//! the outcome is published, or until the configured wait timeout expires. A
//! context that finds its own claim (the initializer of `A` touching `A`, directly
//! or through a cycle of initializers) returns immediately and sees the statics
//! as they are at that point.
//!
//! # Failure
//!
//! A failing body, or a failing supertype, leaves the record `Failed` for good:
//! every later request receives a clone of the same
//! [`Error::InitializationFailure`], sharing its cause. A panic inside the engine
//! is turned into such a failure as well, so waiters never hang on a dead claim.
//! Wait timeouts and failing byte stream sources are transient; the claim is
//! released and a later request starts over.

mod engine;

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread::{self, ThreadId},
    time::Instant,
};

use tracing::{debug, trace, warn};

pub use engine::{InitContext, InitializerEngine, NoopEngine, ScriptedEngine};

use crate::{diagnostics::EventKind, typesystem::TypeRecordRc, Error, Result, Runtime};

/// Initialization state of a record.
#[derive(Debug, Clone, strum::Display)]
pub enum InitState {
    /// No context has claimed the record yet
    NotStarted,
    /// The named thread is running the initialization
    InProgress(ThreadId),
    /// The initializer completed
    Initialized,
    /// The initializer, or a supertype's, failed. Permanent.
    Failed(Error),
}

/// State cell of a single record.
pub(crate) struct InitCell {
    state: Mutex<InitState>,
    ready: Condvar,
}

impl InitCell {
    pub(crate) fn new(state: InitState) -> Self {
        InitCell {
            state: Mutex::new(state),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> InitState {
        lock!(self.state).clone()
    }

    fn publish(&self, state: InitState) {
        *lock!(self.state) = state;
        self.ready.notify_all();
    }
}

impl fmt::Debug for InitCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InitCell({})", self.state())
    }
}

/// Events that require a type to be initialized before they proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TriggerEvent {
    /// The type is the program entry point
    EntryPoint,
    /// An instance of the type is created
    New,
    /// A static method of the type is invoked
    InvokeStatic,
    /// A static field of the type is read or written
    StaticFieldAccess,
    /// The type is initialized through reflection
    Reflection,
    /// A method handle bound to the type is invoked for the first time
    MethodHandle,
}

/// Releases an abandoned claim if the initializing thread unwinds.
struct ClaimGuard<'a> {
    record: &'a TypeRecordRc,
    armed: bool,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let error = Error::InitializationFailure {
                identity: self.record.identity().clone(),
                cause: Arc::new(Error::Initializer("initializer panicked".to_string())),
            };
            self.record.init.publish(InitState::Failed(error));
        }
    }
}

/// Runs each type's initialization exactly once.
pub struct InitializationCoordinator {
    engine: Arc<dyn InitializerEngine>,
}

impl Default for InitializationCoordinator {
    fn default() -> Self {
        Self::new(Arc::new(NoopEngine))
    }
}

impl InitializationCoordinator {
    /// Creates a coordinator that executes bodies with `engine`
    #[must_use]
    pub fn new(engine: Arc<dyn InitializerEngine>) -> Self {
        InitializationCoordinator { engine }
    }

    /// Ensure `record` is initialized, running its initialization if this context
    /// is the first to ask.
    ///
    /// # Errors
    /// Returns the record's link error, its permanent
    /// [`Error::InitializationFailure`], or [`Error::InitializationTimeout`] if
    /// another context held the claim for longer than the configured timeout.
    pub fn ensure_initialized(&self, runtime: &Runtime, record: &TypeRecordRc) -> Result<()> {
        if record.is_initialized() {
            return Ok(());
        }
        runtime.link(record)?;

        if !self.claim(runtime, record)? {
            return Ok(());
        }

        let mut guard = ClaimGuard {
            record,
            armed: true,
        };
        debug!(identity = %record.identity(), "initializing");
        runtime
            .diagnostics()
            .record(EventKind::InitStarted, record.identity(), "claimed");

        let outcome = self.initialize(runtime, record);
        guard.armed = false;

        match outcome {
            Ok(()) => {
                record.init.publish(InitState::Initialized);
                runtime
                    .diagnostics()
                    .record(EventKind::Initialized, record.identity(), "done");
                Ok(())
            }
            Err(
                error @ (Error::InitializationTimeout(_)
                | Error::Source(_)
                | Error::LoaderUnavailable(_)
                | Error::RecursionLimit(_)),
            ) => {
                trace!(identity = %record.identity(), %error, "releasing claim");
                record.init.publish(InitState::NotStarted);
                Err(error)
            }
            Err(cause) => {
                let error = Error::InitializationFailure {
                    identity: record.identity().clone(),
                    cause: Arc::new(cause),
                };
                warn!(identity = %record.identity(), %error, "initialization failed");
                runtime
                    .diagnostics()
                    .record(EventKind::InitFailed, record.identity(), error.to_string());
                record.init.publish(InitState::Failed(error.clone()));
                Err(error)
            }
        }
    }

    /// Wait for or take the claim on `record`.
    ///
    /// # Returns
    /// `true` if this context now owns the initialization, `false` if there is
    /// nothing left to do.
    fn claim(&self, runtime: &Runtime, record: &TypeRecordRc) -> Result<bool> {
        let me = thread::current().id();
        let deadline = runtime
            .config()
            .init_wait_timeout
            .map(|timeout| Instant::now() + timeout);
        let mut waited = false;

        let mut state = lock!(record.init.state);
        loop {
            match &*state {
                InitState::Initialized => return Ok(false),
                InitState::Failed(error) => return Err(error.clone()),
                InitState::InProgress(owner) if *owner == me => {
                    trace!(identity = %record.identity(), "recursive initialization request");
                    return Ok(false);
                }
                InitState::NotStarted => {
                    *state = InitState::InProgress(me);
                    return Ok(true);
                }
                InitState::InProgress(_) => {
                    if !waited {
                        waited = true;
                        runtime.diagnostics().record(
                            EventKind::InitWaited,
                            record.identity(),
                            format!("{me:?}"),
                        );
                    }

                    state = match deadline {
                        None => record
                            .init
                            .ready
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner),
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return Err(Error::InitializationTimeout(
                                    record.identity().clone(),
                                ));
                            }
                            record
                                .init
                                .ready
                                .wait_timeout(state, deadline - now)
                                .unwrap_or_else(PoisonError::into_inner)
                                .0
                        }
                    };
                }
            }
        }
    }

    /// Supertype, default-method superinterfaces, then the body.
    fn initialize(&self, runtime: &Runtime, record: &TypeRecordRc) -> Result<()> {
        if let Some(supertype) = record.supertype() {
            self.ensure_initialized(runtime, &supertype)?;
        }

        for interface in record.superinterfaces() {
            if interface.descriptor().declares_default_methods() {
                self.ensure_initialized(runtime, &interface)?;
            }
        }

        if record.descriptor().initializer.is_some() {
            let ctx = InitContext::new(runtime, record);
            self.engine.run_initializer(&ctx)?;
        }
        Ok(())
    }
}

impl fmt::Debug for InitializationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializationCoordinator")
            .finish_non_exhaustive()
    }
}

//! Ordered event log of the loading pipeline.
//!
//! Every phase transition of every record can be reported here: delegation steps,
//! definitions, array synthesis, link phases, binding failures and initialization
//! starts, completions, failures and waits. The log is append-only and shared
//! between all threads driving the runtime.
//!
//! The [`Diagnostics`] container uses `boxcar::Vec` for thread-safe, lock-free
//! append operations, so events from concurrent loads never contend on a lock.
//!
//! # Key Components
//!
//! - [`Diagnostics`] - Thread-safe container for events
//! - [`Event`] - Individual entry with sequence number, kind and type identity
//! - [`EventKind`] - What happened
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use classlink::prelude::*;
//!
//! let runtime = RuntimeBuilder::new().build();
//! // ... load and initialize types ...
//! for event in runtime.diagnostics().of_kind(EventKind::Initialized) {
//!     println!("{event}");
//! }
//! if runtime.diagnostics().has_failures() {
//!     eprintln!("{}", runtime.diagnostics().summary());
//! }
//! ```

use std::{
    fmt::{self, Write},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use crate::typesystem::TypeIdentity;

/// What a diagnostic event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum EventKind {
    /// A loader handed a request to its parent
    Delegated,
    /// A record was created from a byte stream and registered
    Defined,
    /// An array record was synthesized
    ArraySynthesized,
    /// The verifier accepted a record
    Verified,
    /// Static storage and dispatch table were built
    Prepared,
    /// A record reached the `Resolved` link state
    Resolved,
    /// Verification or preparation failed permanently
    LinkFailed,
    /// A symbolic reference could not be bound
    BindingFailed,
    /// A context claimed a record for initialization
    InitStarted,
    /// A record reached the `Initialized` state
    Initialized,
    /// A record's initializer failed
    InitFailed,
    /// A context blocked on another context's initialization
    InitWaited,
}

impl EventKind {
    /// Returns true for events reporting a permanent failure
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventKind::LinkFailed | EventKind::BindingFailed | EventKind::InitFailed
        )
    }
}

/// A single entry of the event log.
#[derive(Debug, Clone)]
pub struct Event {
    /// Global order of the event
    pub sequence: usize,

    /// What happened
    pub kind: EventKind,

    /// The record the event is about
    pub identity: TypeIdentity,

    /// Human-readable detail
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}] {}", self.sequence, self.kind, self.identity)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Thread-safe container for pipeline events.
///
/// Uses `boxcar::Vec` internally for lock-free concurrent append operations.
#[derive(Debug)]
pub struct Diagnostics {
    entries: boxcar::Vec<Event>,
    sequence: AtomicUsize,
    enabled: AtomicBool,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Creates a new, recording container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
            sequence: AtomicUsize::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    /// Creates a container that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        let diagnostics = Self::new();
        diagnostics.set_enabled(false);
        diagnostics
    }

    /// Turns recording on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Returns true if events are being recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Appends an event.
    ///
    /// # Arguments
    ///
    /// * `kind` - What happened
    /// * `identity` - The record concerned
    /// * `message` - Human-readable detail, may be empty
    pub fn record(&self, kind: EventKind, identity: &TypeIdentity, message: impl Into<String>) {
        if !self.is_enabled() {
            return;
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.entries.push(Event {
            sequence,
            kind,
            identity: identity.clone(),
            message: message.into(),
        });
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.count()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.count() == 0
    }

    /// Returns an iterator over all events in append order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter().map(|(_, e)| e)
    }

    /// Returns all events of one kind, in sequence order.
    pub fn of_kind(&self, kind: EventKind) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.iter().filter(|e| e.kind == kind).collect();
        events.sort_by_key(|e| e.sequence);
        events
    }

    /// Returns all events concerning one record, in sequence order.
    pub fn for_type(&self, identity: &TypeIdentity) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.iter().filter(|e| &e.identity == identity).collect();
        events.sort_by_key(|e| e.sequence);
        events
    }

    /// Returns true if any permanent failure was recorded.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.iter().any(|e| e.kind.is_failure())
    }

    /// Formats a summary of the log for display.
    ///
    /// Lists the failure events after a one-line count.
    pub fn summary(&self) -> String {
        let mut output = String::new();
        let failures: Vec<&Event> = self.iter().filter(|e| e.kind.is_failure()).collect();

        let _ = writeln!(
            output,
            "Diagnostics: {} event(s), {} failure(s)",
            self.len(),
            failures.len()
        );

        if !failures.is_empty() {
            output.push_str("\nFailures:\n");
            for event in failures {
                let _ = writeln!(output, "  {event}");
            }
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

//! Runtime configuration
//!
//! Knobs that change how eagerly references are bound, whether the verifier
//! gate runs, how long initialization waiters block and how deep hierarchies and
//! array types may nest.

use std::time::Duration;

/// When symbolic references are bound to concrete targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum ResolutionStrategy {
    /// Every reference is resolved while the owning record is linked. Failures are
    /// cached per reference and reported, they do not fail the link.
    #[default]
    Eager,
    /// References are resolved on first use
    Lazy,
}

/// Configuration of a [`crate::Runtime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Resolution strategy applied during linking
    pub resolution: ResolutionStrategy,

    /// Run the verifier gate before preparation (recommended: always true)
    pub verify: bool,

    /// Record pipeline events in the runtime's [`crate::Diagnostics`]
    pub record_events: bool,

    /// Upper bound for blocking on another context's initialization; `None` waits
    /// until the holder finishes
    pub init_wait_timeout: Option<Duration>,

    /// Maximum depth of a supertype/superinterface chain (default: 256)
    pub max_hierarchy_depth: usize,

    /// Maximum number of array dimensions (default: 255)
    pub max_array_dimensions: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            resolution: ResolutionStrategy::Eager,
            verify: true,
            record_events: true,
            init_wait_timeout: None,
            max_hierarchy_depth: 256,
            max_array_dimensions: 255,
        }
    }
}

impl RuntimeConfig {
    /// Defaults, with references resolved on first use
    #[must_use]
    pub fn lazy() -> Self {
        Self {
            resolution: ResolutionStrategy::Lazy,
            ..Self::default()
        }
    }

    /// Defaults, with the verifier gate skipped.
    ///
    /// **Warning**: Use only for byte streams produced by a trusted encoder.
    #[must_use]
    pub fn unverified() -> Self {
        Self {
            verify: false,
            ..Self::default()
        }
    }

    /// Sets the initialization wait timeout
    #[must_use]
    pub fn with_init_wait_timeout(mut self, timeout: Duration) -> Self {
        self.init_wait_timeout = Some(timeout);
        self
    }
}

use std::sync::Arc;

use thiserror::Error;

use crate::typesystem::TypeIdentity;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// Classification of a failed symbolic reference resolution.
///
/// Every variant is permanent: once a reference fails with one of these, the
/// same error is reported on every later use of that reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BindingErrorKind {
    /// The target type or member does not exist.
    Missing,
    /// More than one equally specific candidate matched.
    Ambiguous,
    /// The target exists but is not accessible from the referencing type.
    Inaccessible,
    /// The target exists but has the wrong kind (e.g. a class where an interface was expected).
    IncompatibleKind,
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the lifecycle of a type: loading (`NotFound`, `Malformed`,
/// `NameMismatch`), linking (`VerificationFailure`, `PreparationFailure`,
/// `ClassCircularity`, `Binding`) and initialization (`InitializationFailure`,
/// `InitializationTimeout`, `Initializer`).
///
/// # Permanence
///
/// `NotFound` and the decoding errors are never cached, a later attempt with a
/// different source state may succeed. Every linking and initialization error is
/// stored on the record (or reference) that produced it and handed out again as a
/// clone, which is why `Error` is `Clone` and wraps causes in [`Arc`].
///
/// # Examples
///
/// ```rust,no_run
/// use classlink::{Error, Runtime};
///
/// let runtime = Runtime::builder().build();
/// match runtime.load_type(runtime.bootstrap(), "demo.Missing") {
///     Ok(record) => println!("loaded {}", record.identity()),
///     Err(Error::NotFound(name)) => eprintln!("no byte stream for {name}"),
///     Err(e) => eprintln!("load failed: {e}"),
/// }
/// ```
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// No loader in the delegation chain could supply a byte stream for the name.
    #[error("Type not found - {0}")]
    NotFound(String),

    /// The byte stream is damaged and could not be decoded.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound read was attempted while decoding a byte stream.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The decoded byte stream declares a different name than the one requested.
    #[error("Requested '{requested}' but the byte stream defines '{found}'")]
    NameMismatch {
        /// Name that was requested from the source
        requested: String,
        /// Name declared inside the byte stream
        found: String,
    },

    /// The loader a record or child node refers to no longer exists.
    #[error("Loader {0} is no longer available")]
    LoaderUnavailable(u64),

    /// A byte stream source failed for a reason other than "not found".
    #[error("Byte stream source failed - {0}")]
    Source(String),

    /// The verifier rejected the type. Permanent.
    #[error("Verification of {identity} failed: {message}")]
    VerificationFailure {
        /// Type that failed verification
        identity: TypeIdentity,
        /// Reason reported by the verifier
        message: String,
    },

    /// The type's supertype chain loops back to itself. Permanent.
    #[error("Class circularity detected while linking {0}")]
    ClassCircularity(TypeIdentity),

    /// Storage or dispatch table construction failed. Permanent.
    #[error("Preparation of {identity} failed: {message}")]
    PreparationFailure {
        /// Type that failed preparation
        identity: TypeIdentity,
        /// Reason for the failure
        message: String,
    },

    /// A symbolic reference could not be bound. Permanent per reference.
    #[error("{kind} binding for {reference}: {message}")]
    Binding {
        /// Display form of the failing reference
        reference: String,
        /// Classification of the failure
        kind: BindingErrorKind,
        /// Details
        message: String,
    },

    /// The type's initializer raised an error. Permanent; wraps the original cause.
    #[error("Initialization of {identity} failed: {cause}")]
    InitializationFailure {
        /// Type whose initialization failed
        identity: TypeIdentity,
        /// The error that was raised while initializing
        cause: Arc<Error>,
    },

    /// Waiting for another context to finish initializing a type exceeded the configured timeout.
    #[error("Timed out waiting for initialization of {0}")]
    InitializationTimeout(TypeIdentity),

    /// An error raised from inside an initializer body by the execution engine.
    #[error("{0}")]
    Initializer(String),

    /// A type hierarchy is deeper than the configured limit. Not memoized.
    #[error("Type hierarchy exceeds the maximum depth of {0}")]
    RecursionLimit(usize),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns the original cause of an [`Error::InitializationFailure`], if this is one.
    #[must_use]
    pub fn cause(&self) -> Option<&Arc<Error>> {
        match self {
            Error::InitializationFailure { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Returns the binding failure kind, if this is an [`Error::Binding`].
    #[must_use]
    pub fn binding_kind(&self) -> Option<BindingErrorKind> {
        match self {
            Error::Binding { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` for errors that are memoized and re-reported identically.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::VerificationFailure { .. }
                | Error::ClassCircularity(_)
                | Error::PreparationFailure { .. }
                | Error::Binding { .. }
                | Error::InitializationFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typesystem::LoaderId;

    #[test]
    fn test_permanence() {
        assert!(!Error::NotFound("a.B".to_string()).is_permanent());
        assert!(!malformed_error!("bad magic").is_permanent());

        let identity = TypeIdentity::new(LoaderId::BOOTSTRAP, "a.B");
        let failure = Error::InitializationFailure {
            identity: identity.clone(),
            cause: Arc::new(Error::Initializer("boom".to_string())),
        };
        assert!(failure.is_permanent());
        assert!(Error::ClassCircularity(identity).is_permanent());
    }

    #[test]
    fn test_cause_is_shared_between_clones() {
        let failure = Error::InitializationFailure {
            identity: TypeIdentity::new(LoaderId::BOOTSTRAP, "a.B"),
            cause: Arc::new(Error::Initializer("boom".to_string())),
        };
        let copy = failure.clone();
        assert!(Arc::ptr_eq(
            failure.cause().unwrap(),
            copy.cause().unwrap()
        ));
        assert_eq!(failure.to_string(), copy.to_string());
    }

    #[test]
    fn test_binding_kind() {
        let err = Error::Binding {
            reference: "a.B.f:I".to_string(),
            kind: BindingErrorKind::Ambiguous,
            message: "found in a.I and a.J".to_string(),
        };
        assert_eq!(err.binding_kind(), Some(BindingErrorKind::Ambiguous));
        assert!(err.to_string().starts_with("Ambiguous binding"));
    }
}

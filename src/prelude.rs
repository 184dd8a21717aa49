//! # classlink Prelude
//!
//! The types most embedders need, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classlink operations
pub use crate::Error;

/// Classification of binding failures
pub use crate::BindingErrorKind;

/// The result type used throughout classlink
pub use crate::Result;

// ================================================================================================
// Runtime
// ================================================================================================

/// The runtime facade and its builder
pub use crate::runtime::{ResolutionStrategy, Runtime, RuntimeBuilder, RuntimeConfig};

/// The pipeline event log
pub use crate::diagnostics::{Diagnostics, Event, EventKind};

// ================================================================================================
// Loading
// ================================================================================================

/// Loader nodes and byte stream sources
pub use crate::loader::{ByteStreamSource, LoaderNode, LoaderRc, MemorySource, TransformSource};

/// Class image decoding
pub use crate::image::{ClassDecoder, ImageDecoder};

// ================================================================================================
// Type System
// ================================================================================================

/// Type records and identities
pub use crate::typesystem::{
    ClassBuilder, ClassDescriptor, FieldFlags, LoaderId, MethodFlags, TypeFlags, TypeIdentity,
    TypeKind, TypeRecord, TypeRecordRc, TypeRecordRef, Value,
};

// ================================================================================================
// Linking and Initialization
// ================================================================================================

/// Link states, verification and binding results
pub use crate::link::{ConcreteBinding, DispatchMode, LinkState, StructuralVerifier, Verifier};

/// Initialization states, triggers and engines
pub use crate::init::{
    InitContext, InitState, InitializerEngine, NoopEngine, ScriptedEngine, TriggerEvent,
};

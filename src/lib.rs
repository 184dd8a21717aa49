// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # classlink
//!
//! Class loading, linking and initialization for managed runtimes.
//!
//! `classlink` is the part of a virtual machine that turns named types into usable
//! ones. It fetches class images from pluggable byte stream sources through a
//! forest of delegating loaders, checks them, lays out their static storage and
//! dispatch tables, binds their symbolic references and runs each type's
//! initializer exactly once, no matter how many threads ask for it at the same
//! time. Executing bytecode is left to the embedder.
//!
//! ## Features
//!
//! - **Parent-first delegation** - every type identity is `(defining loader, name)`;
//!   equally named types from different loaders never mix
//! - **Compare-and-register definition** - concurrent loads of one name agree on a
//!   single record without a global lock
//! - **Permanent failures** - verification, preparation, binding and
//!   initialization errors are memoized and reported identically every time
//! - **Exactly-once initialization** - waiting, recursion and panics inside
//!   initializers are all handled
//! - **Pipeline diagnostics** - a lock-free event log of everything that happened
//!
//! ## Quick Start
//!
//! ```rust
//! use classlink::prelude::*;
//!
//! let platform = MemorySource::new()
//!     .with_class(&ClassBuilder::class("demo.lang.Counter")
//!         .static_field("count", "I")
//!         .initializer(vec![0x01])
//!         .build()?);
//!
//! let engine = ScriptedEngine::new().on("demo.lang.Counter", |ctx| {
//!     ctx.put_static("count", Value::Int(1))
//! });
//!
//! let runtime = Runtime::builder()
//!     .bootstrap_source(platform)
//!     .engine(engine)
//!     .build();
//!
//! let counter = runtime.entry_point(runtime.bootstrap(), "demo.lang.Counter")?;
//! assert_eq!(counter.statics().get_by_name("count"), Some(Value::Int(1)));
//! # Ok::<(), classlink::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`typesystem`] - identities, descriptors, type records and the registry
//! - [`image`] - the `CLNK` class image format and its decoder
//! - [`loader`] - loader nodes, delegation and byte stream sources
//! - [`link`] - verification, preparation and symbolic reference resolution
//! - [`init`] - the initialization protocol and initializer engines
//! - [`runtime`] - the [`Runtime`] facade wiring it all together
//! - [`diagnostics`] - the pipeline event log
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: `debug` for definitions, link and
//! initialization milestones, `warn` for permanent failures and `trace` for
//! delegation and cache hits. Install any subscriber to see them.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use classlink::prelude::*;
///
/// let runtime = Runtime::new();
/// assert!(runtime.bootstrap().is_bootstrap());
/// ```
pub mod prelude;

/// The pipeline event log
pub mod diagnostics;

/// The `CLNK` class image format
pub mod image;

/// Exactly-once type initialization
pub mod init;

/// Verification, preparation and symbolic reference resolution
pub mod link;

/// Loader nodes and parent-first delegation
pub mod loader;

/// The runtime facade and its configuration
pub mod runtime;

/// Type identities, descriptors, records and the registry
pub mod typesystem;

/// `classlink` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classlink` Error type
///
/// # Examples
///
/// ```rust
/// use classlink::{Error, Runtime};
///
/// let runtime = Runtime::new();
/// match runtime.load_type(runtime.bootstrap(), "demo.Missing") {
///     Err(Error::NotFound(name)) => assert_eq!(name, "demo.Missing"),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub use error::{BindingErrorKind, Error};

/// The runtime facade, see [`runtime::Runtime`]
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};

/// The pipeline event log, see [`diagnostics::Diagnostics`]
pub use diagnostics::Diagnostics;

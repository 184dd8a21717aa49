//! Loader and type identities.
//!
//! A type is identified by the pair of its defining loader and its qualified name.
//! The same byte stream defined by two different loaders yields two distinct,
//! mutually incompatible types, so every lookup must carry a loader context.

use std::{fmt, sync::Arc};

/// Identity token of a loader node.
///
/// The bootstrap loader always carries [`LoaderId::BOOTSTRAP`]; custom loaders are
/// numbered by the registry that tracks them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoaderId(pub u64);

impl LoaderId {
    /// The distinguished identity of the bootstrap loader
    pub const BOOTSTRAP: LoaderId = LoaderId(0);

    /// Returns the raw identity value
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns true if this is the bootstrap loader
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoaderId({self})")
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bootstrap() {
            write!(f, "bootstrap")
        } else {
            write!(f, "loader#{}", self.0)
        }
    }
}

/// The (loader, qualified name) pair naming a loaded type.
///
/// Equality requires both components to be equal. Cloning is cheap, the name is
/// shared.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeIdentity {
    loader: LoaderId,
    name: Arc<str>,
}

impl TypeIdentity {
    /// Creates a new identity
    ///
    /// ## Arguments
    /// * 'loader' - The defining loader
    /// * 'name'   - The qualified type name (e.g. `demo.app.Main` or `[I`)
    pub fn new(loader: LoaderId, name: impl Into<Arc<str>>) -> Self {
        TypeIdentity {
            loader,
            name: name.into(),
        }
    }

    /// The defining loader
    #[must_use]
    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    /// The qualified name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The package part of the name, empty for types in the unnamed package.
    ///
    /// Array descriptors report the package of their innermost element type.
    #[must_use]
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    /// Returns true if both identities belong to the same runtime package, i.e.
    /// the same defining loader and the same package name.
    #[must_use]
    pub fn same_package(&self, other: &TypeIdentity) -> bool {
        self.loader == other.loader && self.package() == other.package()
    }
}

/// Returns the package prefix of a qualified or array name.
pub(crate) fn package_of(name: &str) -> &str {
    let element = name.trim_start_matches('[');
    let element = element
        .strip_prefix('L')
        .and_then(|inner| inner.strip_suffix(';'))
        .unwrap_or(if element.len() == name.len() { name } else { "" });

    match element.rfind('.') {
        Some(pos) => &element[..pos],
        None => "",
    }
}

impl fmt::Debug for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeIdentity({self})")
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.loader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality() {
        let a = TypeIdentity::new(LoaderId(1), "demo.Point");
        let b = TypeIdentity::new(LoaderId(1), "demo.Point");
        let c = TypeIdentity::new(LoaderId(2), "demo.Point");
        let d = TypeIdentity::new(LoaderId(1), "demo.Line");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_packages() {
        let point = TypeIdentity::new(LoaderId(1), "demo.geo.Point");
        assert_eq!(point.package(), "demo.geo");

        let top = TypeIdentity::new(LoaderId(1), "Main");
        assert_eq!(top.package(), "");

        let array = TypeIdentity::new(LoaderId(1), "[[Ldemo.geo.Point;");
        assert_eq!(array.package(), "demo.geo");

        let primitive_array = TypeIdentity::new(LoaderId::BOOTSTRAP, "[I");
        assert_eq!(primitive_array.package(), "");
    }

    #[test]
    fn test_same_package_requires_same_loader() {
        let a = TypeIdentity::new(LoaderId(1), "demo.A");
        let b = TypeIdentity::new(LoaderId(1), "demo.B");
        let c = TypeIdentity::new(LoaderId(2), "demo.C");

        assert!(a.same_package(&b));
        assert!(!a.same_package(&c));
    }

    #[test]
    fn test_display() {
        assert_eq!(LoaderId::BOOTSTRAP.to_string(), "bootstrap");
        assert_eq!(
            TypeIdentity::new(LoaderId(3), "demo.A").to_string(),
            "demo.A@loader#3"
        );
    }
}

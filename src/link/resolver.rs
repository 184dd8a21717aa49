//! Symbolic reference resolution.
//!
//! Every entry of a record's reference table is a [`SymbolicReference`] that
//! memoizes its own outcome. The first completed attempt wins: its binding, or its
//! error, is stored on the reference and every later resolution returns a clone of
//! it without touching loaders again. Only transient failures (a failing byte
//! stream source, a dropped loader, an over-deep hierarchy) are not stored.
//!
//! Resolution loads and prepares target types through the owning record's
//! defining loader. It never initializes anything.
//!
//! # Lookup rules
//!
//! - **Fields**: the named type, then its superinterfaces (a name found in two
//!   unrelated interfaces is ambiguous), then the supertype chain
//! - **Class methods**: the class chain, then the maximally specific default
//!   method among all superinterfaces (several unrelated candidates are
//!   ambiguous), then any abstract interface declaration
//! - **Interface methods**: the interface itself, then its superinterfaces
//! - **Access**: private members only from the declaring type; protected members
//!   from subtypes and the runtime package; package-private members and
//!   non-public types only from the same runtime package

use std::sync::OnceLock;

use tracing::warn;

use crate::{
    diagnostics::EventKind,
    link::Linker,
    loader::LoadContext,
    typesystem::{
        FieldFlags, MethodDecl, MethodFlags, ReferenceDecl, ReferenceKind, TypeRecord,
        TypeRecordRc, TypeRecordRef,
    },
    BindingErrorKind, Error, Result,
};

/// How a resolved method is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// No receiver
    Static,
    /// Receiver, but no dispatch (private methods and constructors)
    Direct,
    /// Through the given dispatch table slot; valid for every subtype
    Virtual(usize),
    /// Through the receiver's interface implementation, by signature
    Interface,
}

/// The concrete target a symbolic reference was bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcreteBinding {
    /// A loaded type
    Type(TypeRecordRef),
    /// A field of a prepared type
    Field {
        /// The type declaring the field
        declarer: TypeRecordRef,
        /// Index into the declarer's field declarations
        index: usize,
        /// Static storage slot, or instance slot
        slot: usize,
        /// Whether `slot` refers to static storage
        is_static: bool,
    },
    /// A method of a prepared type
    Method {
        /// The type declaring the selected method
        declarer: TypeRecordRef,
        /// Index into the declarer's method declarations
        index: usize,
        /// How the method is invoked
        dispatch: DispatchMode,
    },
}

impl ConcreteBinding {
    /// The bound type, or the declarer of the bound member
    #[must_use]
    pub fn target(&self) -> &TypeRecordRef {
        match self {
            ConcreteBinding::Type(target) => target,
            ConcreteBinding::Field { declarer, .. } | ConcreteBinding::Method { declarer, .. } => {
                declarer
            }
        }
    }
}

/// An entry of a record's reference table together with its memoized outcome.
#[derive(Debug)]
pub struct SymbolicReference {
    decl: ReferenceDecl,
    binding: OnceLock<Result<ConcreteBinding>>,
}

impl SymbolicReference {
    pub(crate) fn new(decl: ReferenceDecl) -> Self {
        SymbolicReference {
            decl,
            binding: OnceLock::new(),
        }
    }

    /// The symbolic form of the reference
    #[must_use]
    pub fn decl(&self) -> &ReferenceDecl {
        &self.decl
    }

    /// The kind of the reference
    #[must_use]
    pub fn kind(&self) -> ReferenceKind {
        self.decl.kind
    }

    /// The memoized outcome, if an attempt has completed
    #[must_use]
    pub fn outcome(&self) -> Option<&Result<ConcreteBinding>> {
        self.binding.get()
    }

    /// Returns true if the reference has been bound successfully
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self.binding.get(), Some(Ok(_)))
    }
}

fn binding_error(
    decl: &ReferenceDecl,
    kind: BindingErrorKind,
    message: impl Into<String>,
) -> Error {
    Error::Binding {
        reference: decl.to_string(),
        kind,
        message: message.into(),
    }
}

/// Binds symbolic references to concrete targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymbolResolver;

impl SymbolResolver {
    /// Creates a new resolver
    #[must_use]
    pub fn new() -> Self {
        SymbolResolver
    }

    /// Resolve reference `index` of `owner`, memoizing the outcome on the reference.
    pub(crate) fn resolve(
        &self,
        ctx: &LoadContext<'_>,
        linker: &Linker,
        owner: &TypeRecordRc,
        index: usize,
    ) -> Result<ConcreteBinding> {
        let Some(reference) = owner.reference(index) else {
            return Err(Error::Error(format!(
                "{} has no symbolic reference #{index}",
                owner.identity()
            )));
        };

        if let Some(outcome) = reference.binding.get() {
            return outcome.clone();
        }

        let outcome = self.bind(ctx, linker, owner, &reference.decl);
        if matches!(
            outcome,
            Err(Error::Source(_) | Error::LoaderUnavailable(_) | Error::RecursionLimit(_))
        ) {
            return outcome;
        }

        if reference.binding.set(outcome).is_ok() {
            if let Some(Err(error)) = reference.binding.get() {
                warn!(owner = %owner.identity(), reference = %reference.decl, %error, "binding failed");
                ctx.diagnostics.record(
                    EventKind::BindingFailed,
                    owner.identity(),
                    format!("#{index} {}: {error}", reference.decl),
                );
            }
        }

        reference
            .binding
            .get()
            .cloned()
            .unwrap_or_else(|| Err(Error::Error("binding vanished".to_string())))
    }

    fn bind(
        &self,
        ctx: &LoadContext<'_>,
        linker: &Linker,
        owner: &TypeRecordRc,
        decl: &ReferenceDecl,
    ) -> Result<ConcreteBinding> {
        let target = Self::load_target(ctx, owner, decl)?;
        if !Self::type_accessible(owner, &target) {
            return Err(binding_error(
                decl,
                BindingErrorKind::Inaccessible,
                format!("{} is not accessible from {}", target.identity(), owner.identity()),
            ));
        }

        match decl.kind {
            ReferenceKind::Type => Ok(ConcreteBinding::Type(TypeRecordRef::new(&target))),
            ReferenceKind::Field => {
                linker.prepare(ctx, &target)?;
                self.bind_field(owner, &target, decl)
            }
            ReferenceKind::Method | ReferenceKind::InterfaceMethod => {
                linker.prepare(ctx, &target)?;
                self.bind_method(owner, &target, decl)
            }
        }
    }

    fn load_target(
        ctx: &LoadContext<'_>,
        owner: &TypeRecordRc,
        decl: &ReferenceDecl,
    ) -> Result<TypeRecordRc> {
        let loader = owner.defining_loader()?;
        match loader.load_type(ctx, &decl.owner) {
            Ok(target) => Ok(target),
            Err(Error::NotFound(name)) => Err(binding_error(
                decl,
                BindingErrorKind::Missing,
                format!("type {name} not found"),
            )),
            Err(error) => Err(error),
        }
    }

    fn type_accessible(owner: &TypeRecord, target: &TypeRecord) -> bool {
        if target.is_array() {
            return match target.component() {
                Some(component) => Self::type_accessible(owner, &component),
                None => true,
            };
        }
        target.is_public() || owner.identity().same_package(target.identity())
    }

    fn member_accessible(
        owner: &TypeRecord,
        declarer: &TypeRecord,
        private: bool,
        public: bool,
        protected: bool,
    ) -> bool {
        if owner.identity() == declarer.identity() {
            return true;
        }
        if private {
            return false;
        }
        if public {
            return true;
        }
        if owner.identity().same_package(declarer.identity()) {
            return true;
        }
        protected && owner.is_assignable_to(declarer)
    }

    fn bind_field(
        &self,
        owner: &TypeRecordRc,
        target: &TypeRecordRc,
        decl: &ReferenceDecl,
    ) -> Result<ConcreteBinding> {
        let Some((declarer, index)) = Self::find_field(target, decl)? else {
            return Err(binding_error(
                decl,
                BindingErrorKind::Missing,
                format!("no field '{}' in {}", decl.name, target.identity()),
            ));
        };

        let field = &declarer.descriptor().fields[index];
        let accessible = Self::member_accessible(
            owner,
            &declarer,
            field.flags.contains(FieldFlags::PRIVATE),
            field.flags.contains(FieldFlags::PUBLIC),
            field.flags.contains(FieldFlags::PROTECTED),
        );
        if !accessible {
            return Err(binding_error(
                decl,
                BindingErrorKind::Inaccessible,
                format!("field '{}' of {} is not accessible", field.name, declarer.identity()),
            ));
        }

        let slot = declarer
            .layout()
            .and_then(|layout| layout.slots.get(index).copied())
            .ok_or_else(|| {
                binding_error(
                    decl,
                    BindingErrorKind::IncompatibleKind,
                    format!("{} is not prepared", declarer.identity()),
                )
            })?;

        Ok(ConcreteBinding::Field {
            declarer: TypeRecordRef::new(&declarer),
            index,
            slot,
            is_static: field.is_static(),
        })
    }

    /// Field lookup: own declarations, superinterfaces, then the supertype chain.
    fn find_field(
        record: &TypeRecordRc,
        decl: &ReferenceDecl,
    ) -> Result<Option<(TypeRecordRc, usize)>> {
        if let Some((index, field)) = record.field(&decl.name) {
            if field.field_type.descriptor() == decl.descriptor {
                return Ok(Some((record.clone(), index)));
            }
        }

        let mut found: Option<(TypeRecordRc, usize)> = None;
        for interface in record.interfaces() {
            if let Some((declarer, index)) = Self::find_field(&interface, decl)? {
                match &found {
                    Some((existing, _)) if existing.identity() != declarer.identity() => {
                        return Err(binding_error(
                            decl,
                            BindingErrorKind::Ambiguous,
                            format!(
                                "field '{}' is declared by both {} and {}",
                                decl.name,
                                existing.identity(),
                                declarer.identity()
                            ),
                        ));
                    }
                    Some(_) => {}
                    None => found = Some((declarer, index)),
                }
            }
        }
        if found.is_some() {
            return Ok(found);
        }

        match record.supertype() {
            Some(supertype) => Self::find_field(&supertype, decl),
            None => Ok(None),
        }
    }

    fn bind_method(
        &self,
        owner: &TypeRecordRc,
        target: &TypeRecordRc,
        decl: &ReferenceDecl,
    ) -> Result<ConcreteBinding> {
        let wants_interface = decl.kind == ReferenceKind::InterfaceMethod;
        if target.is_interface() != wants_interface {
            return Err(binding_error(
                decl,
                BindingErrorKind::IncompatibleKind,
                format!(
                    "{} is {}, expected {}",
                    target.identity(),
                    if target.is_interface() { "an interface" } else { "not an interface" },
                    if wants_interface { "an interface" } else { "a class" }
                ),
            ));
        }

        let found = if wants_interface {
            match target.method(&decl.name, &decl.descriptor) {
                Some((index, _)) => Some((target.clone(), index)),
                None => Self::find_interface_method(&target.superinterfaces(), decl)?,
            }
        } else {
            match Self::find_class_method(target, decl) {
                Some(found) => Some(found),
                None => Self::find_interface_method(&Self::all_superinterfaces(target), decl)?,
            }
        };

        let Some((declarer, index)) = found else {
            return Err(binding_error(
                decl,
                BindingErrorKind::Missing,
                format!(
                    "no method '{}{}' in {}",
                    decl.name,
                    decl.descriptor,
                    target.identity()
                ),
            ));
        };

        let method = &declarer.descriptor().methods[index];
        let accessible = Self::member_accessible(
            owner,
            &declarer,
            method.flags.contains(MethodFlags::PRIVATE),
            method.flags.contains(MethodFlags::PUBLIC) || declarer.is_interface(),
            method.flags.contains(MethodFlags::PROTECTED),
        );
        if !accessible {
            return Err(binding_error(
                decl,
                BindingErrorKind::Inaccessible,
                format!(
                    "method '{}{}' of {} is not accessible",
                    method.name,
                    method.descriptor,
                    declarer.identity()
                ),
            ));
        }

        Ok(ConcreteBinding::Method {
            declarer: TypeRecordRef::new(&declarer),
            index,
            dispatch: Self::dispatch_mode(target, method),
        })
    }

    fn dispatch_mode(target: &TypeRecord, method: &MethodDecl) -> DispatchMode {
        if method.is_static() {
            return DispatchMode::Static;
        }
        if !method.is_virtual() {
            return DispatchMode::Direct;
        }
        if target.is_interface() {
            return DispatchMode::Interface;
        }
        target
            .dispatch_table()
            .and_then(|table| table.slot_of(&method.name, &method.descriptor))
            .map_or(DispatchMode::Interface, DispatchMode::Virtual)
    }

    fn find_class_method(
        record: &TypeRecordRc,
        decl: &ReferenceDecl,
    ) -> Option<(TypeRecordRc, usize)> {
        let mut current = Some(record.clone());
        while let Some(class) = current {
            if let Some((index, _)) = class.method(&decl.name, &decl.descriptor) {
                return Some((class, index));
            }
            current = class.supertype();
        }
        None
    }

    /// Every superinterface of the class chain, without duplicates.
    fn all_superinterfaces(record: &TypeRecordRc) -> Vec<TypeRecordRc> {
        let mut result: Vec<TypeRecordRc> = Vec::new();
        let mut current = Some(record.clone());
        while let Some(class) = current {
            for interface in class.superinterfaces() {
                if !result.iter().any(|seen| seen.identity() == interface.identity()) {
                    result.push(interface);
                }
            }
            current = class.supertype();
        }
        result
    }

    /// Select the maximally specific declaration among `candidates`.
    ///
    /// Concrete (default) declarations win over abstract ones. Among concrete
    /// declarations, one declared by a subinterface of another's declarer hides
    /// it; more than one remaining is ambiguous.
    fn find_interface_method(
        interfaces: &[TypeRecordRc],
        decl: &ReferenceDecl,
    ) -> Result<Option<(TypeRecordRc, usize)>> {
        let declared: Vec<(TypeRecordRc, usize)> = interfaces
            .iter()
            .filter_map(|interface| {
                interface
                    .method(&decl.name, &decl.descriptor)
                    .filter(|(_, method)| !method.is_static() && !method.is_private())
                    .map(|(index, _)| (interface.clone(), index))
            })
            .collect();

        let concrete: Vec<&(TypeRecordRc, usize)> = declared
            .iter()
            .filter(|(interface, index)| !interface.descriptor().methods[*index].is_abstract())
            .collect();

        let specific: Vec<&(TypeRecordRc, usize)> = concrete
            .iter()
            .filter(|(candidate, _)| {
                !concrete.iter().any(|(other, _)| {
                    other.identity() != candidate.identity() && other.is_assignable_to(candidate)
                })
            })
            .copied()
            .collect();

        match specific.as_slice() {
            [] => Ok(declared.into_iter().next()),
            [single] => Ok(Some((*single).clone())),
            [first, second, ..] => Err(binding_error(
                decl,
                BindingErrorKind::Ambiguous,
                format!(
                    "default method '{}{}' is inherited from both {} and {}",
                    decl.name,
                    decl.descriptor,
                    first.0.identity(),
                    second.0.identity()
                ),
            )),
        }
    }
}

//! Core identifier and context types

use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Name of an entity type (e.g., "Group", "Event")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(Arc<str>);

impl TypeName {
    /// Create a new type name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&TypeName> for TypeName {
    fn from(name: &TypeName) -> Self {
        name.clone()
    }
}

impl Borrow<str> for TypeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TypeName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for TypeName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Which class of access a rule set governs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Field reads on query results
    Read,
    /// Field writes on entity input
    Write,
    /// Field writes on a mutation's own arguments
    Mutation,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("Read"),
            Self::Write => f.write_str("Write"),
            Self::Mutation => f.write_str("Mutation"),
        }
    }
}

/// Identity of a compiled rule set
///
/// Parent-chain lookups compare these instead of class names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleSetId {
    /// Entity (or mutation) the rules were compiled from
    pub type_name: TypeName,

    /// Access class
    pub kind: RuleKind,
}

impl RuleSetId {
    /// Create a new rule set identifier
    pub fn new(type_name: impl Into<TypeName>, kind: RuleKind) -> Self {
        Self {
            type_name: type_name.into(),
            kind,
        }
    }

    /// Read rules of an entity
    pub fn read(type_name: impl Into<TypeName>) -> Self {
        Self::new(type_name, RuleKind::Read)
    }

    /// Write rules of an entity
    pub fn write(type_name: impl Into<TypeName>) -> Self {
        Self::new(type_name, RuleKind::Write)
    }

    /// Write rules of a mutation
    pub fn mutation(name: impl Into<TypeName>) -> Self {
        Self::new(name, RuleKind::Mutation)
    }
}

impl fmt::Display for RuleSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.type_name, self.kind)
    }
}

/// Opaque caller context (identity, claims, request-scoped handles)
///
/// The engine never inspects it; it is handed unchanged to every rule, prop
/// and resolver. Rules recover their own type with [`Context::get`].
#[derive(Clone)]
pub struct Context(Arc<dyn Any + Send + Sync>);

impl Context {
    /// Wrap a caller-defined value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// A context carrying nothing
    pub fn empty() -> Self {
        Self::new(())
    }

    /// Borrow the wrapped value if it has type `T`
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Context(..)")
    }
}

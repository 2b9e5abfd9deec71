//! Field types and entity references

use super::entity::BuiltEntity;
use crate::error::{AuthzError, Result};
use crate::query::Query;
use crate::types::TypeName;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Built-in scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Boolean,
    Int,
    Float,
    String,
    Id,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "Boolean",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::String => "String",
            Self::Id => "ID",
        };
        f.write_str(name)
    }
}

/// Reference to a built entity, possibly declared before the entity exists
///
/// Named references are bound by [`SchemaBuilder::build`](super::SchemaBuilder::build),
/// which lets entities refer to each other in any order, cycles included.
/// Clones share the binding.
#[derive(Clone)]
pub struct EntityRef {
    name: TypeName,
    slot: Arc<OnceLock<Arc<BuiltEntity>>>,
}

impl EntityRef {
    /// Unbound reference to the entity called `name`
    pub fn named(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            slot: Arc::new(OnceLock::new()),
        }
    }

    /// Reference already bound to `entity`
    pub fn bound(entity: &Arc<BuiltEntity>) -> Self {
        let slot = OnceLock::new();
        let _ = slot.set(Arc::clone(entity));
        Self {
            name: entity.name().clone(),
            slot: Arc::new(slot),
        }
    }

    pub fn name(&self) -> &TypeName {
        &self.name
    }

    pub fn is_bound(&self) -> bool {
        self.slot.get().is_some()
    }

    /// The referenced entity
    pub fn get(&self) -> Result<Arc<BuiltEntity>> {
        self.slot.get().cloned().ok_or_else(|| {
            AuthzError::configuration(format!("entity type {} is not registered", self.name))
        })
    }

    /// Bind to `entity`; rebinding to the same entity is a no-op
    pub(crate) fn bind(&self, entity: &Arc<BuiltEntity>) -> Result<()> {
        if entity.name() != &self.name {
            return Err(AuthzError::configuration(format!(
                "cannot bind reference to {} to entity {}",
                self.name,
                entity.name()
            )));
        }
        match self.slot.get() {
            Some(existing) if Arc::ptr_eq(existing, entity) => Ok(()),
            Some(_) => Err(AuthzError::configuration(format!(
                "entity type {} is bound twice",
                self.name
            ))),
            None => {
                let _ = self.slot.set(Arc::clone(entity));
                Ok(())
            }
        }
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("name", &self.name.as_str())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Type of a field, argument or query result
#[derive(Debug, Clone)]
pub enum FieldType {
    Scalar(ScalarType),
    Entity(EntityRef),
    List(Box<FieldType>),
    NonNull(Box<FieldType>),
}

impl FieldType {
    pub fn boolean() -> Self {
        Self::Scalar(ScalarType::Boolean)
    }

    pub fn int() -> Self {
        Self::Scalar(ScalarType::Int)
    }

    pub fn float() -> Self {
        Self::Scalar(ScalarType::Float)
    }

    pub fn string() -> Self {
        Self::Scalar(ScalarType::String)
    }

    pub fn id() -> Self {
        Self::Scalar(ScalarType::Id)
    }

    /// Entity referenced by name, bound when the schema is built
    pub fn entity(name: impl Into<TypeName>) -> Self {
        Self::Entity(EntityRef::named(name))
    }

    /// Entity that is already built
    pub fn built(entity: &Arc<BuiltEntity>) -> Self {
        Self::Entity(EntityRef::bound(entity))
    }

    pub fn list(inner: FieldType) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn non_null(inner: FieldType) -> Self {
        Self::NonNull(Box::new(inner))
    }

    /// Wrap in a list when `is_list` holds
    pub fn of_list(self, is_list: bool) -> Self {
        if is_list {
            Self::list(self)
        } else {
            self
        }
    }

    /// Type without its non-null wrapper
    pub fn nullable(&self) -> &FieldType {
        match self {
            Self::NonNull(inner) => inner.nullable(),
            other => other,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.nullable(), Self::List(_))
    }

    /// A scalar, or a scalar behind one wrapper (list or non-null)
    pub fn is_scalar_like(&self) -> bool {
        match self {
            Self::Scalar(_) => true,
            Self::List(inner) | Self::NonNull(inner) => matches!(**inner, Self::Scalar(_)),
            Self::Entity(_) => false,
        }
    }

    /// Underlying entity reference, looking through lists and non-null
    pub fn entity_ref(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::List(inner) | Self::NonNull(inner) => inner.entity_ref(),
            Self::Scalar(_) => None,
        }
    }

    /// Underlying built entity; an unbound reference is an error
    pub fn resolve_entity(&self) -> Result<Option<Arc<BuiltEntity>>> {
        self.entity_ref().map(EntityRef::get).transpose()
    }

    /// Name of the input counterpart (`Group` becomes `GroupInput`)
    pub fn input_name(&self) -> String {
        match self {
            Self::Scalar(scalar) => scalar.to_string(),
            Self::Entity(entity) => format!("{}Input", entity.name()),
            Self::List(inner) => format!("[{}]", inner.input_name()),
            Self::NonNull(inner) => format!("{}!", inner.input_name()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(scalar) => write!(f, "{}", scalar),
            Self::Entity(entity) => write!(f, "{}", entity.name()),
            Self::List(inner) => write!(f, "[{}]", inner),
            Self::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

impl From<ScalarType> for FieldType {
    fn from(scalar: ScalarType) -> Self {
        Self::Scalar(scalar)
    }
}

/// Field declaration on an entity definition
pub enum Field {
    /// Plain value read from the entity's data
    Value {
        ty: FieldType,
        description: Option<String>,
    },
    /// Computed field with its own resolver
    Query(Query),
}

impl Field {
    pub fn value(ty: FieldType) -> Self {
        Self::Value {
            ty,
            description: None,
        }
    }

    pub fn described(ty: FieldType, description: impl Into<String>) -> Self {
        Self::Value {
            ty,
            description: Some(description.into()),
        }
    }

    pub fn query(query: Query) -> Self {
        Self::Query(query)
    }
}

impl From<FieldType> for Field {
    fn from(ty: FieldType) -> Self {
        Self::value(ty)
    }
}

impl From<Query> for Field {
    fn from(query: Query) -> Self {
        Self::Query(query)
    }
}

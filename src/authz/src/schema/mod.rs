//! Field Wrapping Layer
//!
//! Entity definitions, their compiled output and input shapes, and the
//! registry that binds entities referring to each other.

mod entity;
mod field;
mod registry;
mod shape;

pub use entity::{build_entity, build_entity_with_config, BuiltEntity, EntityDefinition, RulePolicy};
pub use field::{EntityRef, Field, FieldType, ScalarType};
pub use registry::{Schema, SchemaBuilder};
pub use shape::{
    Argument, BuiltField, FieldResolution, InputField, InputShape, OutputShape, ResolveInfo,
    Resolved, ResolverFn,
};

pub(crate) use shape::into_object;

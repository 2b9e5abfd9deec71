//! Resolvable output and input shapes

use super::field::FieldType;
use crate::engine::apply_read_rules;
use crate::error::Result;
use crate::model::{FieldOutcome, RuleModel};
use crate::types::{Context, TypeName};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A value handed between resolvers
#[derive(Debug, Clone)]
pub enum Resolved {
    Null,
    /// Plain data, no rules attached
    Value(Value),
    /// Authorized entity instance; fields are read through its rules
    Model(RuleModel),
    List(Vec<Resolved>),
}

impl Resolved {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Value(Value::Null))
    }

    pub fn as_model(&self) -> Option<&RuleModel> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    /// Plain data view; models contribute their raw data
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Value(value) => value.clone(),
            Self::Model(model) => model.data().clone(),
            Self::List(items) => Value::Array(items.iter().map(Resolved::to_value).collect()),
        }
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            value => Self::Value(value),
        }
    }
}

impl From<RuleModel> for Resolved {
    fn from(model: RuleModel) -> Self {
        Self::Model(model)
    }
}

/// Where a resolver sits in the schema
#[derive(Debug, Clone)]
pub struct ResolveInfo {
    pub field_name: String,
    pub parent_type: TypeName,
}

/// Wrapped field resolver: `(source, args, context, info)`
pub type ResolverFn =
    Arc<dyn Fn(Resolved, Value, Context, ResolveInfo) -> BoxFuture<'static, Result<Resolved>> + Send + Sync>;

/// Declared field argument
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub ty: FieldType,
    pub description: Option<String>,
}

impl Argument {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            description: None,
        }
    }
}

/// How a built field obtains its value
#[derive(Clone)]
pub enum FieldResolution {
    /// Read the field off the source through the source's rules
    Property,
    /// Run a wrapped resolver
    Resolver(ResolverFn),
}

impl fmt::Debug for FieldResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property => f.write_str("Property"),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// A resolvable field of an output shape, or a root query/mutation
#[derive(Debug, Clone)]
pub struct BuiltField {
    pub name: String,
    pub ty: FieldType,
    pub description: Option<String>,
    pub args: Vec<Argument>,
    pub resolution: FieldResolution,
}

impl BuiltField {
    /// Resolve this field on `source`
    ///
    /// Plain fields on a model go through the model's field rule; a denial
    /// yields its substitute as-is. Permitted entity-typed values get the
    /// nested entity's read rules with the source model as parent.
    pub async fn resolve(
        &self,
        source: &Resolved,
        args: Value,
        context: &Context,
        parent_type: &TypeName,
    ) -> Result<Resolved> {
        match &self.resolution {
            FieldResolution::Resolver(resolver) => {
                let info = ResolveInfo {
                    field_name: self.name.clone(),
                    parent_type: parent_type.clone(),
                };
                resolver(source.clone(), args, context.clone(), info).await
            }
            FieldResolution::Property => match source {
                Resolved::Model(model) => match model.field(&self.name).await? {
                    FieldOutcome::Denied(substitute) => Ok(Resolved::from(substitute)),
                    FieldOutcome::Permitted(value) => {
                        self.read_nested(value, Some(model), context).await
                    }
                },
                other => {
                    let value = other
                        .to_value()
                        .get(&self.name)
                        .cloned()
                        .unwrap_or(Value::Null);
                    self.read_nested(value, None, context).await
                }
            },
        }
    }

    async fn read_nested(
        &self,
        value: Value,
        parent: Option<&RuleModel>,
        context: &Context,
    ) -> Result<Resolved> {
        match self.ty.resolve_entity()? {
            Some(entity) => apply_read_rules(Some(&*entity), value, parent, context).await,
            None => Ok(Resolved::from(value)),
        }
    }
}

/// Queryable shape of an entity
#[derive(Debug, Clone)]
pub struct OutputShape {
    pub name: TypeName,
    pub description: Option<String>,
    pub fields: Vec<BuiltField>,
}

impl OutputShape {
    pub fn field(&self, name: &str) -> Option<&BuiltField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Field of an input shape
#[derive(Debug, Clone)]
pub struct InputField {
    pub name: String,
    pub ty: FieldType,
    pub description: Option<String>,
}

/// Writable shape of an entity, named `<Entity>Input`
#[derive(Debug, Clone)]
pub struct InputShape {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<InputField>,
}

impl InputShape {
    pub fn field(&self, name: &str) -> Option<&InputField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Field names with their input type names, e.g. `("events", "[EventInput]")`
    pub fn describe_fields(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.ty.input_name()))
            .collect()
    }
}

/// Collect `(alias, value)` pairs into a JSON object
pub(crate) fn into_object(entries: Vec<(String, Value)>) -> Value {
    Value::Object(entries.into_iter().collect::<Map<String, Value>>())
}

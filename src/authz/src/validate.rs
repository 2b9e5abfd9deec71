//! Argument validation
//!
//! The engine treats validation as an external step: a [`Validator`]
//! receives the already-authorized arguments and returns them coerced, or
//! rejects them with a human-readable message that is surfaced verbatim.
//! [`TypedArgs`] validates through a typed argument struct.

use crate::error::{AuthzError, Result};
use crate::schema::{Argument, FieldType};
use async_trait::async_trait;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject, SingleOrVec};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use validator::Validate;

/// Validation collaborator
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate and coerce an argument object
    async fn validate(&self, args: Value) -> Result<Value>;

    /// Arguments this validator declares, typed for `owner`'s fields
    fn arguments(&self, owner: &str) -> Result<Vec<Argument>>;
}

/// Validation policy of a query or mutation
#[derive(Clone)]
pub enum Validation {
    /// Explicitly opted out
    Disabled,
    With(Arc<dyn Validator>),
}

impl Validation {
    pub async fn apply(&self, args: Value) -> Result<Value> {
        match self {
            Self::Disabled => Ok(args),
            Self::With(validator) => validator.validate(args).await,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

/// Add the validator's declared arguments that are not declared yet
pub fn to_args(args: &mut Vec<Argument>, validation: &Validation, owner: &str) -> Result<()> {
    let Validation::With(validator) = validation else {
        return Ok(());
    };
    for argument in validator.arguments(owner)? {
        if !args.iter().any(|declared| declared.name == argument.name) {
            args.push(argument);
        }
    }
    Ok(())
}

/// Validator backed by a typed argument struct
///
/// Arguments are deserialized into `T`, checked against its `validator`
/// rules and serialized back, so serde defaults fill in missing keys.
/// Declared arguments are read from `T`'s JSON schema: required fields
/// become non-null, doc comments become descriptions.
///
/// ```rust
/// use fieldguard_authz::validate::{TypedArgs, Validator};
/// use schemars::JsonSchema;
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
/// use validator::Validate;
///
/// #[derive(Serialize, Deserialize, Validate, JsonSchema)]
/// struct Greeting {
///     #[validate(length(min = 1))]
///     name: String,
///     #[serde(default)]
///     excited: bool,
/// }
///
/// # tokio_test::block_on(async {
/// let validator = TypedArgs::<Greeting>::new();
/// let args = validator.validate(json!({"name": "Ada"})).await.unwrap();
/// assert_eq!(args, json!({"name": "Ada", "excited": false}));
///
/// let names: Vec<_> = validator
///     .arguments("greet")
///     .unwrap()
///     .into_iter()
///     .map(|arg| format!("{}: {}", arg.name, arg.ty))
///     .collect();
/// assert_eq!(names, ["excited: Boolean", "name: String!"]);
/// # });
/// ```
pub struct TypedArgs<T> {
    marker: PhantomData<fn() -> T>,
}

impl<T> TypedArgs<T> {
    pub fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<T> Default for TypedArgs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedArgs<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypedArgs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedArgs<{}>", std::any::type_name::<T>())
    }
}

#[async_trait]
impl<T> Validator for TypedArgs<T>
where
    T: DeserializeOwned + Serialize + Validate + JsonSchema + Send + 'static,
{
    async fn validate(&self, args: Value) -> Result<Value> {
        let args = match args {
            Value::Null => Value::Object(Map::new()),
            args => args,
        };
        let typed: T =
            serde_json::from_value(args).map_err(|e| AuthzError::Validation(e.to_string()))?;
        Validate::validate(&typed).map_err(|e| AuthzError::Validation(e.to_string()))?;
        Ok(serde_json::to_value(&typed)?)
    }

    fn arguments(&self, owner: &str) -> Result<Vec<Argument>> {
        let root = SchemaGenerator::default().into_root_schema_for::<T>();
        let Some(object) = root.schema.object.as_deref() else {
            return Err(AuthzError::configuration(format!(
                "arguments of {} must be an object",
                owner
            )));
        };

        object
            .properties
            .iter()
            .map(|(key, schema)| {
                let ty = field_type(schema, &format!("{}.{}", owner, key))?;
                Ok(Argument {
                    name: key.clone(),
                    ty: if object.required.contains(key) {
                        FieldType::non_null(ty)
                    } else {
                        ty
                    },
                    description: description(schema),
                })
            })
            .collect()
    }
}

/// Argument type for a property schema; `name` locates it in messages
fn field_type(schema: &Schema, name: &str) -> Result<FieldType> {
    let Schema::Object(schema) = schema else {
        return Err(unsupported("any", name));
    };
    if schema.reference.is_some() {
        return Err(unsupported("object", name));
    }

    let types = match &schema.instance_type {
        Some(SingleOrVec::Single(ty)) => vec![(**ty).clone()],
        Some(SingleOrVec::Vec(types)) => types.clone(),
        None => Vec::new(),
    };
    // Option<T> shows up as [T, null]
    let mut concrete = types.into_iter().filter(|ty| *ty != InstanceType::Null);

    match (concrete.next(), concrete.next()) {
        (Some(InstanceType::Boolean), None) => Ok(FieldType::boolean()),
        (Some(InstanceType::Integer), None) => Ok(FieldType::int()),
        (Some(InstanceType::Number), None) => Ok(FieldType::float()),
        (Some(InstanceType::String), None) => Ok(FieldType::string()),
        (Some(InstanceType::Array), None) => list_type(schema, name),
        _ => Err(unsupported("object", name)),
    }
}

fn list_type(schema: &SchemaObject, name: &str) -> Result<FieldType> {
    match schema.array.as_ref().and_then(|array| array.items.as_ref()) {
        Some(SingleOrVec::Single(item)) => Ok(FieldType::list(field_type(
            item,
            &format!("{}.array", name),
        )?)),
        _ => Err(AuthzError::configuration(format!(
            "Array with multiple items in {} is not supported. \
             Please use a manual override by specifying args with a graphql type.",
            name
        ))),
    }
}

fn unsupported(kind: &str, name: &str) -> AuthzError {
    AuthzError::configuration(format!(
        "Type {} in {} is not supported. \
         Please use a manual override by specifying args with a graphql type.",
        kind, name
    ))
}

fn description(schema: &Schema) -> Option<String> {
    match schema {
        Schema::Object(object) => object
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.description.clone()),
        Schema::Bool(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, Validate, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct Register {
        /// Display name
        #[validate(length(min = 1, message = "name must not be empty"))]
        name: String,
        #[validate(range(min = 0, max = 150, message = "age must be between 0 and 150"))]
        age: Option<u32>,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        admin: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
    }

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct Filter {
        term: String,
    }

    #[derive(Debug, Serialize, Deserialize, Validate, JsonSchema)]
    struct Search {
        filter: Filter,
    }

    #[derive(Debug, Serialize, Deserialize, Validate, JsonSchema)]
    struct Range {
        bounds: (String, f64),
    }

    fn register() -> TypedArgs<Register> {
        TypedArgs::new()
    }

    #[test]
    fn test_arguments() {
        let args = register().arguments("User").unwrap();
        let described: Vec<_> = args.iter().map(|a| (a.name.as_str(), a.ty.to_string())).collect();
        assert_eq!(
            described,
            vec![
                ("admin", "Boolean".to_string()),
                ("age", "Int".to_string()),
                ("name", "String!".to_string()),
                ("score", "Float".to_string()),
                ("tags", "[String]".to_string()),
            ]
        );

        let name = args.iter().find(|a| a.name == "name").unwrap();
        assert_eq!(name.description.as_deref(), Some("Display name"));
    }

    #[test]
    fn test_object_argument_unsupported() {
        let err = TypedArgs::<Search>::new().arguments("Item").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Type object in Item.filter is not supported. \
             Please use a manual override by specifying args with a graphql type."
        );
    }

    #[test]
    fn test_multi_item_array_unsupported() {
        let err = TypedArgs::<Range>::new().arguments("Item").unwrap_err();
        assert!(err.to_string().contains("Array with multiple items in Item.bounds"));
    }

    #[test]
    fn test_to_args_keeps_declared() {
        let mut args = vec![Argument::new("age", FieldType::id())];
        to_args(&mut args, &Validation::With(Arc::new(register())), "User").unwrap();
        assert_eq!(args.len(), 5);
        assert_eq!(args[0].ty.to_string(), "ID");

        let mut untouched = Vec::new();
        to_args(&mut untouched, &Validation::Disabled, "User").unwrap();
        assert!(untouched.is_empty());
    }

    #[tokio::test]
    async fn test_validate_fills_defaults() {
        let validated = register().validate(json!({"name": "Ada", "age": 36})).await.unwrap();
        assert_eq!(
            validated,
            json!({"name": "Ada", "age": 36, "tags": [], "admin": false})
        );
    }

    #[tokio::test]
    async fn test_validate_required() {
        let err = register().validate(json!({"age": 3})).await.unwrap_err();
        assert!(matches!(err, AuthzError::Validation(_)));
        assert_eq!(err.to_string(), "missing field `name`");

        let err = register().validate(Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "missing field `name`");
    }

    #[tokio::test]
    async fn test_validate_unknown_key() {
        let err = register().validate(json!({"name": "Ada", "e": 1})).await.unwrap_err();
        assert!(err.to_string().starts_with("unknown field `e`"));
    }

    #[tokio::test]
    async fn test_validate_type_errors() {
        let err = register().validate(json!({"name": 5})).await.unwrap_err();
        assert!(err.to_string().starts_with("invalid type: integer `5`"));
    }

    #[tokio::test]
    async fn test_validate_rules() {
        let err = register().validate(json!({"name": "Ada", "age": 200})).await.unwrap_err();
        assert!(matches!(err, AuthzError::Validation(_)));
        assert!(err.to_string().contains("age must be between 0 and 150"));

        let err = register().validate(json!({"name": ""})).await.unwrap_err();
        assert!(err.to_string().contains("name must not be empty"));
    }

    #[tokio::test]
    async fn test_disabled_validation_is_identity() {
        let args = json!({"anything": [1, 2, 3]});
        assert_eq!(Validation::Disabled.apply(args.clone()).await.unwrap(), args);
    }
}

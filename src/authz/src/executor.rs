//! Selection executor
//!
//! Walks a selection tree through a built [`Schema`], resolving every
//! selected field through the authorization layers, and renders the result
//! as JSON. This is an embedding and testing aid; it does not parse query
//! text.

use crate::error::{AuthzError, Result};
use crate::schema::{into_object, BuiltField, FieldType, Resolved, Schema};
use crate::types::{Context, TypeName};
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::debug;

/// One selected field
#[derive(Debug, Clone)]
pub struct Selection {
    pub name: String,
    pub alias: Option<String>,
    pub args: Map<String, Value>,
    pub selections: Vec<Selection>,
}

impl Selection {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            args: Map::new(),
            selections: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.insert(name.into(), value);
        self
    }

    /// Select sub-fields
    pub fn select(mut self, selections: impl IntoIterator<Item = Selection>) -> Self {
        self.selections.extend(selections);
        self
    }

    fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// Root selections of one operation
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub selections: Vec<Selection>,
}

impl Operation {
    pub fn query(selections: impl IntoIterator<Item = Selection>) -> Self {
        Self {
            kind: OperationKind::Query,
            selections: selections.into_iter().collect(),
        }
    }

    pub fn mutation(selections: impl IntoIterator<Item = Selection>) -> Self {
        Self {
            kind: OperationKind::Mutation,
            selections: selections.into_iter().collect(),
        }
    }
}

impl Schema {
    /// Execute `operation` for the caller described by `context`
    ///
    /// Root query fields resolve concurrently; root mutation fields resolve
    /// one after another in selection order.
    pub async fn execute(&self, operation: &Operation, context: &Context) -> Result<Value> {
        let root = match operation.kind {
            OperationKind::Query => TypeName::from("Query"),
            OperationKind::Mutation => TypeName::from("Mutation"),
        };
        debug!(operation = %root, fields = operation.selections.len(), "executing operation");

        let entries = match operation.kind {
            OperationKind::Query => {
                let pending = operation
                    .selections
                    .iter()
                    .map(|selection| {
                        let field = self.root_field(operation.kind, &selection.name);
                        let root = &root;
                        async move {
                            let value =
                                execute_field(field?, &Resolved::Null, selection, context, root).await?;
                            Ok::<_, AuthzError>((selection.key().to_string(), value))
                        }
                    })
                    .collect::<Vec<_>>();
                try_join_all(pending).await?
            }
            OperationKind::Mutation => {
                let mut entries = Vec::with_capacity(operation.selections.len());
                for selection in &operation.selections {
                    let field = self.root_field(operation.kind, &selection.name)?;
                    let value = execute_field(field, &Resolved::Null, selection, context, &root).await?;
                    entries.push((selection.key().to_string(), value));
                }
                entries
            }
        };

        Ok(into_object(entries))
    }

    fn root_field(&self, kind: OperationKind, name: &str) -> Result<&BuiltField> {
        let (field, root) = match kind {
            OperationKind::Query => (self.query(name), "Query"),
            OperationKind::Mutation => (self.mutation(name), "Mutation"),
        };
        field.ok_or_else(|| {
            AuthzError::InvalidInput(format!(
                "Cannot query field \"{}\" on type \"{}\"",
                name, root
            ))
        })
    }
}

async fn execute_field(
    field: &BuiltField,
    source: &Resolved,
    selection: &Selection,
    context: &Context,
    parent_type: &TypeName,
) -> Result<Value> {
    let args = Value::Object(selection.args.clone());
    let resolved = field.resolve(source, args, context, parent_type).await?;
    complete(&field.ty, resolved, &selection.selections, context).await
}

/// Render a resolved value of type `ty`, resolving sub-selections
fn complete<'a>(
    ty: &'a FieldType,
    resolved: Resolved,
    selections: &'a [Selection],
    context: &'a Context,
) -> BoxFuture<'a, Result<Value>> {
    async move {
        if resolved.is_null() {
            return Ok(Value::Null);
        }

        match ty {
            FieldType::NonNull(inner) => complete(inner, resolved, selections, context).await,
            FieldType::List(inner) => {
                let items = match resolved {
                    Resolved::List(items) => items,
                    Resolved::Value(Value::Array(values)) => {
                        values.into_iter().map(Resolved::from).collect()
                    }
                    other => vec![other],
                };
                let completed = try_join_all(
                    items
                        .into_iter()
                        .map(|item| complete(inner, item, selections, context)),
                )
                .await?;
                Ok(Value::Array(completed))
            }
            FieldType::Scalar(_) => Ok(resolved.to_value()),
            FieldType::Entity(reference) => {
                let entity = reference.get()?;
                let pending = selections.iter().map(|selection| {
                    let entity = &entity;
                    let resolved = &resolved;
                    async move {
                        let key = selection.key().to_string();
                        if selection.name == "__typename" {
                            return Ok((key, Value::String(entity.name().to_string())));
                        }
                        let field = entity.output().field(&selection.name).ok_or_else(|| {
                            AuthzError::InvalidInput(format!(
                                "Cannot query field \"{}\" on type \"{}\"",
                                selection.name,
                                entity.name()
                            ))
                        })?;
                        let value =
                            execute_field(field, resolved, selection, context, entity.name()).await?;
                        Ok::<_, AuthzError>((key, value))
                    }
                });
                Ok(into_object(try_join_all(pending).await?))
            }
        }
    }
    .boxed()
}

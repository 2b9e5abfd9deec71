//! Query fields
//!
//! A [`Query`] pairs a business resolver with its result type, arguments
//! and validation policy. [`build_query`] wraps the resolver so arguments
//! are validated first and the result leaves through the result type's read
//! rules.

use crate::engine::apply_read_rules;
use crate::error::{AuthzError, Result};
use crate::schema::{Argument, BuiltField, FieldResolution, FieldType, ResolveInfo, Resolved, ResolverFn};
use crate::types::Context;
use crate::validate::{to_args, Validation, Validator};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Caller-supplied resolver: `(source, args, context, info)`
pub type BusinessResolver =
    Arc<dyn Fn(Resolved, Value, Context, ResolveInfo) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Declarative query
pub struct Query {
    ty: FieldType,
    description: Option<String>,
    args: Vec<Argument>,
    validate: Option<Validation>,
    resolve: BusinessResolver,
}

impl Query {
    /// Query with an asynchronous resolver
    pub fn new<F, Fut>(ty: FieldType, resolve: F) -> Self
    where
        F: Fn(Resolved, Value, Context, ResolveInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            ty,
            description: None,
            args: Vec::new(),
            validate: None,
            resolve: Arc::new(move |source, args, context, info| {
                resolve(source, args, context, info).boxed()
            }),
        }
    }

    /// Query with a synchronous resolver
    pub fn from_fn<F>(ty: FieldType, resolve: F) -> Self
    where
        F: Fn(Resolved, Value, Context) -> Result<Value> + Send + Sync + 'static,
    {
        let resolve = Arc::new(resolve);
        Self::new(ty, move |source, args, context, _| {
            let resolve = resolve.clone();
            async move { resolve(source, args, context) }
        })
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare an argument explicitly; it takes precedence over the
    /// validator's inferred type
    pub fn arg(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.args.push(Argument::new(name, ty));
        self
    }

    /// Validate arguments before resolving
    pub fn validate(mut self, validator: impl Validator + 'static) -> Self {
        self.validate = Some(Validation::With(Arc::new(validator)));
        self
    }

    /// Explicitly opt out of argument validation
    pub fn without_validation(mut self) -> Self {
        self.validate = Some(Validation::Disabled);
        self
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }
}

/// Build a query field
///
/// A query that declares arguments must state a validation policy.
pub fn build_query(name: &str, query: Query) -> Result<BuiltField> {
    let Query {
        ty,
        description,
        mut args,
        validate,
        resolve,
    } = query;

    let validation = match validate {
        Some(validation) => validation,
        None if args.is_empty() => Validation::Disabled,
        None => {
            return Err(AuthzError::configuration(format!(
                "validate is not specified for query {}, set to disabled to opt out",
                name
            )))
        }
    };

    let owner = ty
        .entity_ref()
        .map(|entity| entity.name().to_string())
        .unwrap_or_else(|| name.to_string());
    to_args(&mut args, &validation, &owner)?;

    let result_type = ty.clone();
    let resolver: ResolverFn = Arc::new(move |source, args, context, info| {
        let validation = validation.clone();
        let resolve = resolve.clone();
        let result_type = result_type.clone();
        async move {
            let args = validation.apply(args).await?;
            let parent = source.as_model().cloned();
            let result = resolve(source, args, context.clone(), info).await?;
            let entity = result_type.resolve_entity()?;
            apply_read_rules(entity.as_deref(), result, parent.as_ref(), &context).await
        }
        .boxed()
    });

    Ok(BuiltField {
        name: name.to_string(),
        ty,
        description,
        args,
        resolution: FieldResolution::Resolver(resolver),
    })
}

/// Build several queries, failing on the first error
pub fn build_queries(queries: impl IntoIterator<Item = (String, Query)>) -> Result<HashMap<String, BuiltField>> {
    queries
        .into_iter()
        .map(|(name, query)| build_query(&name, query).map(|built| (name, built)))
        .collect()
}

//! Mutation Authorization Flow
//!
//! Each invocation moves through:
//!
//! ```text
//! raw args ─→ write rules ─→ validation ─→ business resolver ─→ read rules
//!                 │ denied
//!                 └─→ null (business resolver never runs)
//! ```

use crate::config::EngineConfig;
use crate::engine::{apply_read_rules, apply_write_rules, RuleEngine};
use crate::error::{AuthzError, Result};
use crate::query::BusinessResolver;
use crate::rule::{Props, Rule};
use crate::schema::{Argument, BuiltField, FieldResolution, FieldType, ResolveInfo, Resolved, ResolverFn, RulePolicy};
use crate::types::{Context, RuleSetId};
use crate::validate::{to_args, Validation, Validator};
use crate::value::is_falsy;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Authorization options of a mutation
///
/// Unset options fall back to the shared options, then to the returned
/// entity's own settings.
#[derive(Clone, Debug, Default)]
pub struct MutationOptions {
    pub props: Option<Props>,
    pub default_write_rule: Option<Rule>,
    pub self_write: Option<Rule>,
    pub write_rules: Option<RulePolicy>,
}

impl MutationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// These options, with gaps filled from `shared`
    pub fn merged_over(&self, shared: &MutationOptions) -> MutationOptions {
        MutationOptions {
            props: self.props.clone().or_else(|| shared.props.clone()),
            default_write_rule: self
                .default_write_rule
                .clone()
                .or_else(|| shared.default_write_rule.clone()),
            self_write: self.self_write.clone().or_else(|| shared.self_write.clone()),
            write_rules: self.write_rules.clone().or_else(|| shared.write_rules.clone()),
        }
    }
}

/// Declarative mutation
pub struct Mutation {
    ty: FieldType,
    description: Option<String>,
    args: Vec<Argument>,
    validate: Option<Validation>,
    resolve: BusinessResolver,
    options: MutationOptions,
    default_write_opt_out: bool,
}

impl Mutation {
    /// Mutation with an asynchronous resolver
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
            options: MutationOptions::default(),
            default_write_opt_out: false,
        }
    }

    /// Mutation with a synchronous resolver
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

    pub fn arg(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.args.push(Argument::new(name, ty));
        self
    }

    pub fn validate(mut self, validator: impl Validator + 'static) -> Self {
        self.validate = Some(Validation::With(Arc::new(validator)));
        self
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = Some(Validation::Disabled);
        self
    }

    pub fn props(mut self, props: Props) -> Self {
        self.options.props = Some(props);
        self
    }

    pub fn write_rules(mut self, policy: RulePolicy) -> Self {
        self.options.write_rules = Some(policy);
        self
    }

    pub fn self_write(mut self, rule: Rule) -> Self {
        self.options.self_write = Some(rule);
        self
    }

    pub fn default_write_rule(mut self, rule: Rule) -> Self {
        self.options.default_write_rule = Some(rule);
        self
    }

    /// Arguments without a write rule are writable unless the returned
    /// entity supplies a default write rule
    pub fn without_default_write_rule(mut self) -> Self {
        self.default_write_opt_out = true;
        self
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    pub fn options(&self) -> &MutationOptions {
        &self.options
    }
}

/// Build a mutation field from `mutation` under the effective `options`
///
/// Entity-typed result and argument types must already be bound.
pub fn build_mutation(
    name: &str,
    mutation: Mutation,
    options: MutationOptions,
    config: Arc<EngineConfig>,
) -> Result<BuiltField> {
    let Mutation {
        ty,
        description,
        mut args,
        validate,
        resolve,
        default_write_opt_out,
        ..
    } = mutation;

    let returned = ty.resolve_entity()?;

    let mut arg_types = HashMap::new();
    for arg in &args {
        if let Some(entity) = arg.ty.entity_ref() {
            entity.get()?;
            arg_types.insert(arg.name.clone(), entity.clone());
        }
    }

    let validation = validate.ok_or_else(|| {
        AuthzError::configuration(format!(
            "validate is not specified for mutation {}, set to disabled to opt out",
            name
        ))
    })?;
    let write_policy = options.write_rules.ok_or_else(|| {
        AuthzError::configuration(format!(
            "writeRules is not specified for mutation {}, set to disabled to opt out",
            name
        ))
    })?;

    let owner = returned
        .as_ref()
        .map(|entity| entity.name().to_string())
        .unwrap_or_else(|| name.to_string());
    to_args(&mut args, &validation, &owner)?;

    let default_write_rule = match (&options.default_write_rule, &returned) {
        (Some(rule), _) => Some(rule.compile()),
        (None, Some(entity)) if entity.default_write_rule().is_some() => {
            entity.default_write_rule().cloned()
        }
        (None, _) if default_write_opt_out => None,
        (None, _) => Some(Rule::deny_with_access_error(format!("No access to mutation {}", name)).compile()),
    };

    let props = options
        .props
        .or_else(|| returned.as_ref().map(|entity| entity.props().clone()))
        .unwrap_or_default();

    let engine = match write_policy.compile(args.iter().map(|arg| arg.name.as_str())) {
        Some(rules) => RuleEngine::new(RuleSetId::mutation(name), props, rules, default_write_rule, config),
        None => RuleEngine::unrestricted(RuleSetId::mutation(name), props, config),
    };
    let engine = Arc::new(engine);

    let self_write = options
        .self_write
        .as_ref()
        .map(Rule::compile)
        .or_else(|| returned.as_ref().and_then(|entity| entity.self_write().cloned()));

    let mutation_name = name.to_string();
    let arg_types = Arc::new(arg_types);
    let resolver: ResolverFn = Arc::new(move |source, args, context, info| {
        let engine = engine.clone();
        let self_write = self_write.clone();
        let arg_types = arg_types.clone();
        let validation = validation.clone();
        let resolve = resolve.clone();
        let returned = returned.clone();
        let mutation_name = mutation_name.clone();

        async move {
            let parent = source.as_model().cloned();

            let authorized = apply_write_rules(
                &engine,
                self_write.as_ref(),
                &arg_types,
                args,
                parent.as_ref(),
                &context,
            )
            .await?;

            let args = match authorized {
                Some(args) if !is_falsy(&args) => args,
                _ => {
                    debug!(mutation = %mutation_name, "mutation input denied");
                    return Ok(Resolved::Null);
                }
            };

            let args = validation.apply(args).await?;
            let result = resolve(source, args, context.clone(), info).await?;
            apply_read_rules(returned.as_deref(), result, parent.as_ref(), &context).await
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

/// Build several mutations over shared options
pub fn build_mutations(
    mutations: impl IntoIterator<Item = (String, Mutation)>,
    shared: &MutationOptions,
    config: Arc<EngineConfig>,
) -> Result<HashMap<String, BuiltField>> {
    mutations
        .into_iter()
        .map(|(name, mutation)| {
            let options = mutation.options().merged_over(shared);
            build_mutation(&name, mutation, options, config.clone()).map(|built| (name, built))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeName;
    use crate::validate::TypedArgs;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use validator::Validate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> Arc<EngineConfig> {
        Arc::new(EngineConfig::default())
    }

    async fn run(field: &BuiltField, args: Value) -> Result<Value> {
        let resolved = field
            .resolve(&Resolved::Null, args, &Context::empty(), &TypeName::from("Mutation"))
            .await?;
        Ok(resolved.to_value())
    }

    fn echo() -> Mutation {
        Mutation::from_fn(FieldType::string(), |_, args, _| Ok(json!(args.to_string())))
    }

    #[test]
    fn test_missing_validate() {
        let err = build_mutation(
            "setName",
            echo(),
            MutationOptions {
                write_rules: Some(RulePolicy::Disabled),
                ..MutationOptions::default()
            },
            config(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: validate is not specified for mutation setName, set to disabled to opt out"
        );
    }

    #[test]
    fn test_missing_write_rules() {
        let err = build_mutation("setName", echo().without_validation(), MutationOptions::default(), config())
            .unwrap_err();
        assert!(err.to_string().contains("writeRules is not specified for mutation setName"));
    }

    #[tokio::test]
    async fn test_unlisted_argument_raises() {
        let mutation = echo()
            .without_validation()
            .write_rules(RulePolicy::fields([("name", Rule::Allow)]));
        let options = mutation.options().clone();
        let field = build_mutation("setName", mutation, options, config()).unwrap();

        let err = run(&field, json!({"name": "x", "admin": true})).await.unwrap_err();
        assert_eq!(err.to_string(), "Access denied: No access to mutation setName.admin");
    }

    #[tokio::test]
    async fn test_root_denial_skips_business_resolver() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mutation = Mutation::from_fn(FieldType::string(), move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!("done"))
        })
        .without_validation()
        .write_rules(RulePolicy::Blanket(Rule::Allow))
        .self_write(Rule::Deny)
        .default_write_rule(Rule::Deny);

        let options = mutation.options().clone();
        let field = build_mutation("doThing", mutation, options, config()).unwrap();

        assert_eq!(run(&field, json!({"x": 1})).await.unwrap(), Value::Null);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[derive(Serialize, Deserialize, Validate, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct SetNameArgs {
        name: String,
    }

    #[tokio::test]
    async fn test_validation_sees_authorized_args() {
        let mutation = echo()
            .validate(TypedArgs::<SetNameArgs>::new())
            .write_rules(RulePolicy::fields([("name", Rule::Allow), ("secret", Rule::Deny)]));
        let options = mutation.options().clone();
        let field = build_mutation("setName", mutation, options, config()).unwrap();

        // "secret" is dropped by its write rule before validation would reject it
        let result = run(&field, json!({"name": "x", "secret": "y"})).await.unwrap();
        assert_eq!(result, json!(json!({"name": "x"}).to_string()));
        assert_eq!(field.args.len(), 1);
    }

    #[tokio::test]
    async fn test_shared_options() {
        let shared = MutationOptions {
            write_rules: Some(RulePolicy::Blanket(Rule::Allow)),
            ..MutationOptions::default()
        };
        let built = build_mutations(
            vec![
                ("a".to_string(), echo().arg("name", FieldType::string()).without_validation()),
                (
                    "b".to_string(),
                    echo()
                        .arg("name", FieldType::string())
                        .without_validation()
                        .write_rules(RulePolicy::fields([("name", Rule::Deny)])),
                ),
            ],
            &shared,
            config(),
        )
        .unwrap();

        assert_eq!(run(&built["a"], json!({"name": "x"})).await.unwrap(), json!(r#"{"name":"x"}"#));
        assert_eq!(run(&built["b"], json!({"name": "x"})).await.unwrap(), json!("{}"));
    }

    #[test]
    fn test_merge_prefers_own_options() {
        let own = MutationOptions {
            self_write: Some(Rule::Allow),
            ..MutationOptions::default()
        };
        let shared = MutationOptions {
            self_write: Some(Rule::Deny),
            write_rules: Some(RulePolicy::Disabled),
            ..MutationOptions::default()
        };
        let merged = own.merged_over(&shared);
        assert!(matches!(merged.self_write, Some(Rule::Allow)));
        assert!(matches!(merged.write_rules, Some(RulePolicy::Disabled)));
    }
}

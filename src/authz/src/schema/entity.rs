//! Entity definitions and the Field Wrapping Layer
//!
//! [`build_entity`] turns a declarative [`EntityDefinition`] into a
//! [`BuiltEntity`]: an output shape whose computed fields short-circuit on
//! denial, an input shape for mutations, and the compiled read and write
//! rule engines.

use super::field::{EntityRef, Field, FieldType};
use super::shape::{
    BuiltField, FieldResolution, InputField, InputShape, OutputShape, Resolved, ResolverFn,
};
use crate::config::EngineConfig;
use crate::engine::RuleEngine;
use crate::error::{AuthzError, Result};
use crate::model::{FieldOutcome, RuleModel};
use crate::query::build_query;
use crate::rule::{wrap_rule, CompiledRule, Props, Rule};
use crate::types::{RuleSetId, TypeName};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Rule policy of one access class
#[derive(Clone, Debug)]
pub enum RulePolicy {
    /// Explicitly opted out; the class is not authorized
    Disabled,
    /// Per-field rules
    Fields(HashMap<String, Rule>),
    /// One rule for every declared field
    Blanket(Rule),
}

impl RulePolicy {
    /// Per-field policy from `(field, rule)` pairs
    pub fn fields<I, K>(rules: I) -> Self
    where
        I: IntoIterator<Item = (K, Rule)>,
        K: Into<String>,
    {
        Self::Fields(rules.into_iter().map(|(k, r)| (k.into(), r)).collect())
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Explicit rule for `field`, if any
    pub fn rule_for(&self, field: &str) -> Option<&Rule> {
        match self {
            Self::Disabled => None,
            Self::Fields(rules) => rules.get(field),
            Self::Blanket(rule) => Some(rule),
        }
    }

    /// Compile the rules for `names`, or `None` when disabled
    pub(crate) fn compile<'a>(
        &self,
        names: impl Iterator<Item = &'a str>,
    ) -> Option<HashMap<String, CompiledRule>> {
        match self {
            Self::Disabled => None,
            Self::Fields(rules) => Some(
                rules
                    .iter()
                    .map(|(name, rule)| (name.clone(), rule.compile()))
                    .collect(),
            ),
            Self::Blanket(rule) => {
                let compiled = rule.compile();
                Some(names.map(|name| (name.to_string(), compiled.clone())).collect())
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
enum DefaultWrite {
    #[default]
    Unset,
    Disabled,
    Rule(Rule),
}

/// Declarative description of an entity type
///
/// ```rust
/// use fieldguard_authz::rule::Rule;
/// use fieldguard_authz::schema::{build_entity, EntityDefinition, FieldType, RulePolicy};
///
/// let item = build_entity(
///     EntityDefinition::new("Item")
///         .field("name", FieldType::string())
///         .field("price", FieldType::int())
///         .read_rules(RulePolicy::Disabled)
///         .write_rules(RulePolicy::fields([("price", Rule::Deny)])),
/// )
/// .unwrap();
///
/// assert_eq!(item.input().name, "ItemInput");
/// ```
pub struct EntityDefinition {
    name: TypeName,
    description: Option<String>,
    fields: Vec<(String, Field)>,
    props: Props,
    read_rules: Option<RulePolicy>,
    write_rules: Option<RulePolicy>,
    self_read: Option<Rule>,
    self_write: Option<Rule>,
    default_read_rule: Option<Rule>,
    default_write_rule: DefaultWrite,
}

impl EntityDefinition {
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: Vec::new(),
            props: Props::new(),
            read_rules: None,
            write_rules: None,
            self_read: None,
            self_write: None,
            default_read_rule: None,
            default_write_rule: DefaultWrite::Unset,
        }
    }

    pub fn name(&self) -> &TypeName {
        &self.name
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a field; declaration order is kept
    pub fn field(mut self, name: impl Into<String>, field: impl Into<Field>) -> Self {
        self.fields.push((name.into(), field.into()));
        self
    }

    pub fn props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Declare one prop; see [`Props::with`] for the self-reference rule
    pub fn prop<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&RuleModel) -> Value + Send + Sync + 'static,
    {
        self.props = self.props.with(name, f);
        self
    }

    pub fn read_rules(mut self, policy: RulePolicy) -> Self {
        self.read_rules = Some(policy);
        self
    }

    pub fn write_rules(mut self, policy: RulePolicy) -> Self {
        self.write_rules = Some(policy);
        self
    }

    /// Object-level gate evaluated before any read rule
    pub fn self_read(mut self, rule: Rule) -> Self {
        self.self_read = Some(rule);
        self
    }

    /// Object-level gate evaluated before any write rule
    pub fn self_write(mut self, rule: Rule) -> Self {
        self.self_write = Some(rule);
        self
    }

    pub fn default_read_rule(mut self, rule: Rule) -> Self {
        self.default_read_rule = Some(rule);
        self
    }

    /// Replace the default write rule (which otherwise refuses every
    /// field without a write rule)
    pub fn default_write_rule(mut self, rule: Rule) -> Self {
        self.default_write_rule = DefaultWrite::Rule(rule);
        self
    }

    /// Remove the default write rule: fields without a write rule are
    /// writable
    pub fn without_default_write_rule(mut self) -> Self {
        self.default_write_rule = DefaultWrite::Disabled;
        self
    }
}

/// Compiled, request-independent form of an [`EntityDefinition`]
pub struct BuiltEntity {
    name: TypeName,
    description: Option<String>,
    output: OutputShape,
    input: InputShape,
    props: Props,
    read_engine: Arc<RuleEngine>,
    write_engine: Arc<RuleEngine>,
    self_read: Option<CompiledRule>,
    self_write: Option<CompiledRule>,
    default_write_rule: Option<CompiledRule>,
    nested_inputs: HashMap<String, EntityRef>,
}

impl BuiltEntity {
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn output(&self) -> &OutputShape {
        &self.output
    }

    pub fn input(&self) -> &InputShape {
        &self.input
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn read_engine(&self) -> &Arc<RuleEngine> {
        &self.read_engine
    }

    pub fn write_engine(&self) -> &Arc<RuleEngine> {
        &self.write_engine
    }

    pub fn self_read(&self) -> Option<&CompiledRule> {
        self.self_read.as_ref()
    }

    pub fn self_write(&self) -> Option<&CompiledRule> {
        self.self_write.as_ref()
    }

    /// Default write rule, kept even when the write policy is disabled so
    /// mutations returning this entity inherit it
    pub fn default_write_rule(&self) -> Option<&CompiledRule> {
        self.default_write_rule.as_ref()
    }

    /// Input fields typed as entities, by field name
    pub fn nested_inputs(&self) -> &HashMap<String, EntityRef> {
        &self.nested_inputs
    }

    /// Entity references in field, argument and input types
    pub(crate) fn references(&self) -> impl Iterator<Item = &EntityRef> {
        let output = self.output.fields.iter().flat_map(|field| {
            field
                .ty
                .entity_ref()
                .into_iter()
                .chain(field.args.iter().filter_map(|arg| arg.ty.entity_ref()))
        });
        output.chain(self.nested_inputs.values())
    }
}

impl fmt::Debug for BuiltEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltEntity")
            .field("name", &self.name.as_str())
            .field("read_engine", &self.read_engine)
            .field("write_engine", &self.write_engine)
            .finish()
    }
}

/// Build an entity with the default engine configuration
pub fn build_entity(definition: EntityDefinition) -> Result<Arc<BuiltEntity>> {
    build_entity_with_config(definition, Arc::new(EngineConfig::default()))
}

/// Build an entity
///
/// Fails when the definition does not state its read or write policy.
pub fn build_entity_with_config(
    definition: EntityDefinition,
    config: Arc<EngineConfig>,
) -> Result<Arc<BuiltEntity>> {
    let EntityDefinition {
        name,
        description,
        fields,
        props,
        read_rules,
        write_rules,
        self_read,
        self_write,
        default_read_rule,
        default_write_rule,
    } = definition;

    let read_policy = read_rules.ok_or_else(|| {
        AuthzError::configuration("readRules is not specified, set to disabled to opt out")
    })?;
    let write_policy = write_rules.ok_or_else(|| {
        AuthzError::configuration("writeRules is not specified, set to disabled to opt out")
    })?;

    let field_names: Vec<String> = fields.iter().map(|(name, _)| name.clone()).collect();
    let mut read_rules = HashMap::new();
    let mut output_fields = Vec::with_capacity(fields.len());
    let mut input_fields = Vec::new();
    let mut nested_inputs = HashMap::new();

    for (field_name, field) in fields {
        match field {
            Field::Query(query) => {
                // computed fields fail closed, so a missing rule denies
                if !read_policy.is_disabled() {
                    let rule = wrap_rule(read_policy.rule_for(&field_name));
                    read_rules.insert(field_name.clone(), rule.compile());
                }

                let mut built = build_query(&field_name, query)?;
                if !read_policy.is_disabled() {
                    built.resolution = match built.resolution {
                        FieldResolution::Resolver(inner) => {
                            FieldResolution::Resolver(short_circuit(&field_name, inner))
                        }
                        other => other,
                    };
                }
                output_fields.push(built);
            }
            Field::Value { ty, description } => {
                if let Some(rule) = read_policy.rule_for(&field_name) {
                    read_rules.insert(field_name.clone(), rule.compile());
                }

                if ty.is_scalar_like() {
                    input_fields.push(InputField {
                        name: field_name.clone(),
                        ty: ty.clone(),
                        description: description.clone(),
                    });
                } else if let Some(entity) = ty.entity_ref() {
                    nested_inputs.insert(field_name.clone(), entity.clone());
                    input_fields.push(InputField {
                        name: field_name.clone(),
                        ty: ty.clone(),
                        description: description.clone(),
                    });
                }

                output_fields.push(BuiltField {
                    name: field_name,
                    ty,
                    description,
                    args: Vec::new(),
                    resolution: FieldResolution::Property,
                });
            }
        }
    }

    let read_engine = if read_policy.is_disabled() {
        RuleEngine::unrestricted(RuleSetId::read(&name), props.clone(), config.clone())
    } else {
        RuleEngine::new(
            RuleSetId::read(&name),
            props.clone(),
            read_rules,
            default_read_rule.as_ref().map(Rule::compile),
            config.clone(),
        )
    };

    let default_write = match default_write_rule {
        DefaultWrite::Unset => Some(Rule::deny_with_access_error(format!("No access to set {}", name))),
        DefaultWrite::Disabled => None,
        DefaultWrite::Rule(rule) => Some(rule),
    }
    .map(|rule| rule.compile());
    let write_engine = match write_policy.compile(field_names.iter().map(String::as_str)) {
        Some(rules) => RuleEngine::new(
            RuleSetId::write(&name),
            props.clone(),
            rules,
            default_write.clone(),
            config,
        ),
        None => RuleEngine::unrestricted(RuleSetId::write(&name), props.clone(), config),
    };

    debug!(
        entity = %name,
        fields = output_fields.len(),
        input_fields = input_fields.len(),
        reads = read_engine.is_enforced(),
        writes = write_engine.is_enforced(),
        "entity built"
    );

    Ok(Arc::new(BuiltEntity {
        output: OutputShape {
            name: name.clone(),
            description: description.clone(),
            fields: output_fields,
        },
        input: InputShape {
            name: format!("{}Input", name),
            description: description.clone(),
            fields: input_fields,
        },
        name,
        description,
        props,
        read_engine: Arc::new(read_engine),
        write_engine: Arc::new(write_engine),
        self_read: self_read.as_ref().map(Rule::compile),
        self_write: self_write.as_ref().map(Rule::compile),
        default_write_rule: default_write,
        nested_inputs,
    }))
}

/// Guard a computed field: when the source model denies `field`, return the
/// denial payload without running `inner`
fn short_circuit(field: &str, inner: ResolverFn) -> ResolverFn {
    let field = field.to_string();
    Arc::new(move |source, args, context, info| {
        let inner = inner.clone();
        let field = field.clone();
        async move {
            if let Resolved::Model(model) = &source {
                if let FieldOutcome::Denied(payload) = model.field(&field).await? {
                    return Ok(Resolved::from(payload));
                }
            }
            inner(source, args, context, info).await
        }
        .boxed()
    })
}

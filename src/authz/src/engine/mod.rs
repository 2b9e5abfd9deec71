//! Rule Application Engine
//!
//! Decides, per instance, whether a caller may read or write an object and
//! each of its fields. The same gate drives both directions:
//!
//! ```text
//! object ─→ self rule ─→ RuleModel ─→ field rules ─→ value | substitute
//!              │ deny
//!              └─→ default rule's fallback ─→ substitute | None
//! ```
//!
//! [`apply_read_rules`] runs the gate over query results (filtering arrays),
//! [`apply_write_rules`] runs it recursively over mutation input.

mod read;
mod write;

pub use read::apply_read_rules;
pub use write::apply_write_rules;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::RuleModel;
use crate::rule::{CompiledRule, Denial, Props};
use crate::schema::Resolved;
use crate::types::{Context, RuleSetId};
use crate::value::is_falsy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Compiled rule set of one entity (or mutation) for one access class
///
/// Built once per definition and shared read-only by every request.
pub struct RuleEngine {
    id: RuleSetId,
    props: Props,
    rules: HashMap<String, CompiledRule>,
    default_rule: Option<CompiledRule>,
    config: Arc<EngineConfig>,
    enforced: bool,
}

impl RuleEngine {
    /// Create an engine enforcing `rules`, falling back to `default_rule`
    /// for fields without an entry
    pub fn new(
        id: RuleSetId,
        props: Props,
        rules: HashMap<String, CompiledRule>,
        default_rule: Option<CompiledRule>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            id,
            props,
            rules,
            default_rule,
            config,
            enforced: true,
        }
    }

    /// Engine for a rule class that was disabled
    ///
    /// Models built from it still expose props (self rules need them) but
    /// every field is permitted.
    pub fn unrestricted(id: RuleSetId, props: Props, config: Arc<EngineConfig>) -> Self {
        Self {
            enforced: false,
            ..Self::new(id, props, HashMap::new(), None, config)
        }
    }

    pub fn id(&self) -> &RuleSetId {
        &self.id
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether this engine carries a rule set
    pub fn is_enforced(&self) -> bool {
        self.enforced
    }

    /// Rule governing `key`: its own entry, else the default rule
    pub fn rule_for(&self, key: &str) -> Option<&CompiledRule> {
        self.rules.get(key).or(self.default_rule.as_ref())
    }

    pub fn default_rule(&self) -> Option<&CompiledRule> {
        self.default_rule.as_ref()
    }

    /// Wrap a raw value in a model governed by this engine
    pub fn instantiate(
        self: &Arc<Self>,
        data: Value,
        context: Context,
        parent: Option<RuleModel>,
    ) -> RuleModel {
        RuleModel::new(Arc::clone(self), data, context, parent)
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields: Vec<_> = self.rules.keys().collect();
        fields.sort_unstable();
        f.debug_struct("RuleEngine")
            .field("id", &self.id.to_string())
            .field("fields", &fields)
            .field("has_default", &self.default_rule.is_some())
            .field("enforced", &self.enforced)
            .finish()
    }
}

/// Outcome of gating one object
#[derive(Debug, Clone)]
pub enum Authorized {
    /// No rules apply; the object passes through untouched
    Unchecked(Value),
    /// Access granted; fields are read through the model's rules
    Model(RuleModel),
    /// Access denied; the default rule supplied this substitute
    Substitute(Value),
}

impl Authorized {
    pub fn into_resolved(self) -> Resolved {
        match self {
            Self::Unchecked(value) | Self::Substitute(value) => Resolved::from(value),
            Self::Model(model) => Resolved::Model(model),
        }
    }

    /// Falsy substitutes and unchecked values count as absent in arrays
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Unchecked(value) | Self::Substitute(value) => is_falsy(value),
            Self::Model(_) => false,
        }
    }
}

/// Object-level gate for one rule set, bound to a caller and a parent
pub struct RuleGate<'a> {
    engine: &'a Arc<RuleEngine>,
    self_rule: Option<&'a CompiledRule>,
    context: &'a Context,
    parent: Option<&'a RuleModel>,
}

/// Bind `engine` and `self_rule` to a caller context and parent model
pub fn apply_rules<'a>(
    engine: &'a Arc<RuleEngine>,
    self_rule: Option<&'a CompiledRule>,
    context: &'a Context,
    parent: Option<&'a RuleModel>,
) -> RuleGate<'a> {
    RuleGate {
        engine,
        self_rule,
        context,
        parent,
    }
}

impl<'a> RuleGate<'a> {
    /// Whether this gate can change anything
    pub fn is_noop(&self) -> bool {
        !self.engine.is_enforced() && self.self_rule.is_none()
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Gate one object
    ///
    /// `Ok(None)` means denied with nothing to substitute. Errors raised by
    /// the self rule or by the default rule's fallback propagate.
    pub async fn authorize(&self, object: Value) -> Result<Option<Authorized>> {
        if self.is_noop() {
            return Ok(Some(Authorized::Unchecked(object)));
        }
        if object.is_null() {
            return Ok(None);
        }

        let model = self
            .engine
            .instantiate(object, self.context.clone(), self.parent.cloned());

        let Some(self_rule) = self.self_rule else {
            return Ok(Some(Authorized::Model(model)));
        };

        if self_rule.permits(&model).await? {
            return Ok(Some(Authorized::Model(model)));
        }

        trace!(rule_set = %self.engine.id(), "object denied by self rule");

        match self.engine.default_rule() {
            Some(default) if default.has_fallback() => {
                let substitute = default.substitute(Denial::object(model)).await?;
                Ok((!substitute.is_null()).then_some(Authorized::Substitute(substitute)))
            }
            Some(default) => {
                if default.permits(&model).await? {
                    Ok(Some(Authorized::Model(model)))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use crate::rule::Rule;
    use serde_json::json;

    fn engine(rules: Vec<(&str, Rule)>, default_rule: Option<Rule>) -> Arc<RuleEngine> {
        Arc::new(RuleEngine::new(
            RuleSetId::read("Item"),
            Props::new(),
            rules
                .into_iter()
                .map(|(k, r)| (k.to_string(), r.compile()))
                .collect(),
            default_rule.map(|r| r.compile()),
            Arc::new(EngineConfig::default()),
        ))
    }

    fn unrestricted() -> Arc<RuleEngine> {
        Arc::new(RuleEngine::unrestricted(
            RuleSetId::read("Item"),
            Props::new(),
            Arc::new(EngineConfig::default()),
        ))
    }

    #[test]
    fn test_rule_for_falls_back_to_default() {
        let engine = engine(vec![("name", Rule::Allow)], Some(Rule::Deny));
        assert!(engine.rule_for("name").is_some());
        assert!(engine.rule_for("other").is_some());
        assert!(engine.is_enforced());

        let bare = self::engine(vec![], None);
        assert!(bare.rule_for("other").is_none());
    }

    #[tokio::test]
    async fn test_no_rules_passes_through() {
        let engine = unrestricted();
        let ctx = Context::empty();
        let gate = apply_rules(&engine, None, &ctx, None);
        assert!(gate.is_noop());

        let result = gate.authorize(json!({"a": 1})).await.unwrap();
        assert!(matches!(result, Some(Authorized::Unchecked(v)) if v == json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_null_object_is_rejected() {
        let engine = engine(vec![], None);
        let ctx = Context::empty();
        let gate = apply_rules(&engine, None, &ctx, None);
        assert!(gate.authorize(Value::Null).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_permitted_object_becomes_model() {
        let engine = engine(vec![], None);
        let ctx = Context::empty();
        let self_rule = Rule::Allow.compile();
        let gate = apply_rules(&engine, Some(&self_rule), &ctx, None);

        match gate.authorize(json!({"a": 1})).await.unwrap() {
            Some(Authorized::Model(model)) => assert_eq!(model.get("a"), &json!(1)),
            other => panic!("expected model, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_self_denial_without_default() {
        let engine = engine(vec![], None);
        let ctx = Context::empty();
        let self_rule = Rule::Deny.compile();
        let gate = apply_rules(&engine, Some(&self_rule), &ctx, None);
        assert!(gate.authorize(json!({"a": 1})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_self_denial_uses_default_fallback() {
        let engine = engine(vec![], Some(Rule::Deny.or_value(json!({"redacted": true}))));
        let ctx = Context::empty();
        let self_rule = Rule::Deny.compile();
        let gate = apply_rules(&engine, Some(&self_rule), &ctx, None);

        let result = gate.authorize(json!({"a": 1})).await.unwrap();
        assert!(matches!(result, Some(Authorized::Substitute(v)) if v == json!({"redacted": true})));
    }

    #[tokio::test]
    async fn test_self_denial_with_plain_default() {
        let ctx = Context::empty();
        let self_rule = Rule::Deny.compile();

        let allowing = engine(vec![], Some(Rule::Allow));
        let gate = apply_rules(&allowing, Some(&self_rule), &ctx, None);
        assert!(matches!(
            gate.authorize(json!({})).await.unwrap(),
            Some(Authorized::Model(_))
        ));

        let denying = engine(vec![], Some(Rule::Deny));
        let gate = apply_rules(&denying, Some(&self_rule), &ctx, None);
        assert!(gate.authorize(json!({})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_self_denial_raising_default() {
        let engine = engine(vec![], Some(Rule::deny_with_access_error("No access to set Item")));
        let ctx = Context::empty();
        let self_rule = Rule::Deny.compile();
        let gate = apply_rules(&engine, Some(&self_rule), &ctx, None);

        let err = gate.authorize(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Access denied: No access to set Item.*");
    }

    #[tokio::test]
    async fn test_self_rule_error_propagates() {
        let engine = engine(vec![], None);
        let ctx = Context::empty();
        let self_rule = Rule::try_when(|_| Err(AuthzError::Evaluation("lookup failed".into()))).compile();
        let gate = apply_rules(&engine, Some(&self_rule), &ctx, None);

        assert!(matches!(
            gate.authorize(json!({})).await,
            Err(AuthzError::Evaluation(_))
        ));
    }

    #[test]
    fn test_authorized_falsiness() {
        assert!(Authorized::Substitute(json!(false)).is_falsy());
        assert!(Authorized::Unchecked(Value::Null).is_falsy());
        assert!(!Authorized::Substitute(json!("x")).is_falsy());
    }
}

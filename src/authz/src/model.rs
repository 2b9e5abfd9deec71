//! Rule model instances
//!
//! A [`RuleModel`] binds one raw entity value to the caller's context and to
//! the model it was reached through. Rules and props are evaluated against
//! it. Models are request-scoped, cheap to clone, and immutable apart from
//! memoized props.

use crate::engine::RuleEngine;
use crate::error::Result;
use crate::rule::Denial;
use crate::types::{Context, RuleSetId, TypeName};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::trace;

static NULL: Value = Value::Null;

/// Result of reading one field through its rule
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    /// Access granted; the raw value (null when absent)
    Permitted(Value),
    /// Access denied; the substitute to return instead
    Denied(Value),
}

impl FieldOutcome {
    /// The value to hand back, whichever way the rule went
    pub fn into_value(self) -> Value {
        match self {
            Self::Permitted(value) | Self::Denied(value) => value,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

struct ModelInner {
    engine: Arc<RuleEngine>,
    data: Value,
    context: Context,
    parent: Option<RuleModel>,
    prop_cache: HashMap<String, OnceLock<Value>>,
}

/// An entity instance under authorization
#[derive(Clone)]
pub struct RuleModel {
    inner: Arc<ModelInner>,
}

impl RuleModel {
    /// Wrap `data` for evaluation under `engine`'s rules
    pub fn new(
        engine: Arc<RuleEngine>,
        data: Value,
        context: Context,
        parent: Option<RuleModel>,
    ) -> Self {
        let prop_cache = engine
            .props()
            .names()
            .map(|name| (name.to_string(), OnceLock::new()))
            .collect();

        Self {
            inner: Arc::new(ModelInner {
                engine,
                data,
                context,
                parent,
                prop_cache,
            }),
        }
    }

    /// Rule set this model was created by
    pub fn rule_set(&self) -> &RuleSetId {
        self.inner.engine.id()
    }

    /// Entity (or mutation) name of the rule set
    pub fn type_name(&self) -> &TypeName {
        &self.inner.engine.id().type_name
    }

    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.inner.engine
    }

    /// The raw wrapped value
    pub fn data(&self) -> &Value {
        &self.inner.data
    }

    /// Raw field value, bypassing rules; null when absent
    pub fn get(&self, key: &str) -> &Value {
        self.inner.data.get(key).unwrap_or(&NULL)
    }

    /// Keys present on the raw value
    pub fn keys(&self) -> Vec<String> {
        match &self.inner.data {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// The caller context
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// The model this one was reached through
    pub fn parent(&self) -> Option<&RuleModel> {
        self.inner.parent.as_ref()
    }

    /// Topmost model of the chain (this model when it has no parent)
    pub fn root(&self) -> &RuleModel {
        let max = self.inner.engine.config().max_ancestor_depth;
        let mut current = self;
        for _ in 0..max {
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    /// Value of a declared prop, computed on first access; null when the
    /// prop is not declared
    pub fn prop(&self, name: &str) -> Value {
        let (Some(cell), Some(prop)) = (
            self.inner.prop_cache.get(name),
            self.inner.engine.props().get(name),
        ) else {
            return Value::Null;
        };
        cell.get_or_init(|| prop(self)).clone()
    }

    /// Every declared prop, evaluated
    pub fn props(&self) -> Map<String, Value> {
        self.inner
            .prop_cache
            .keys()
            .map(|name| (name.clone(), self.prop(name)))
            .collect()
    }

    /// Nearest ancestor built from `type_name`'s rules (read, write or
    /// mutation). Walks stop after `max_ancestor_depth` parents and report
    /// no ancestor.
    pub fn find_ancestor_of_type(&self, type_name: &TypeName) -> Option<RuleModel> {
        self.find_ancestor_where(|model| model.type_name() == type_name)
    }

    /// Nearest ancestor built from exactly the `id` rule set
    pub fn find_ancestor(&self, id: &RuleSetId) -> Option<RuleModel> {
        self.find_ancestor_where(|model| model.rule_set() == id)
    }

    fn find_ancestor_where(&self, matches: impl Fn(&RuleModel) -> bool) -> Option<RuleModel> {
        let max = self.inner.engine.config().max_ancestor_depth;
        let mut current = self.parent();
        let mut depth = 0;

        while let Some(model) = current {
            if depth >= max {
                trace!(rule_set = %self.rule_set(), max, "ancestor walk exceeded depth");
                return None;
            }
            if matches(model) {
                return Some(model.clone());
            }
            current = model.parent();
            depth += 1;
        }

        None
    }

    /// Read `key` through its rule
    ///
    /// Uses the field's own rule, else the rule set's default rule; a field
    /// with neither is permitted.
    pub async fn field(&self, key: &str) -> Result<FieldOutcome> {
        let value = self.get(key).clone();

        let Some(rule) = self.inner.engine.rule_for(key) else {
            return Ok(FieldOutcome::Permitted(value));
        };

        if rule.permits(self).await? {
            return Ok(FieldOutcome::Permitted(value));
        }

        trace!(rule_set = %self.rule_set(), field = key, "field denied");
        let substitute = rule.substitute(Denial::field(self.clone(), key)).await?;
        Ok(FieldOutcome::Denied(substitute))
    }

    /// Whether two handles refer to the same instance
    pub fn ptr_eq(&self, other: &RuleModel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RuleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleModel")
            .field("rule_set", &self.rule_set().to_string())
            .field("data", &self.inner.data)
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

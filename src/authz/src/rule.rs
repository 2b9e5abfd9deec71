//! Rule definitions and rule helpers
//!
//! A rule decides one field (or one whole object) for one model instance.
//! Authors write [`Rule`]s in whichever shape is convenient; every shape is
//! compiled once into a [`CompiledRule`], a uniform `(permit, fallback)`
//! pair, so request-time evaluation never branches on how a rule was written.

use crate::error::{AuthzError, Result};
use crate::model::RuleModel;
use crate::types::TypeName;
use crate::value::{is_falsy, Thunk};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Permission predicate over a model instance
pub type Predicate = Thunk<bool, RuleModel>;

/// Substitute producer for a denied field or object
pub type Fallback = Thunk<Value, Denial>;

/// A denied access, handed to fallback producers
#[derive(Clone, Debug)]
pub struct Denial {
    /// Model whose access was denied
    pub model: RuleModel,

    /// Denied field, `None` when the whole object was denied
    pub field: Option<String>,
}

impl Denial {
    /// Denial of a single field
    pub fn field(model: RuleModel, field: impl Into<String>) -> Self {
        Self {
            model,
            field: Some(field.into()),
        }
    }

    /// Denial of the whole object
    pub fn object(model: RuleModel) -> Self {
        Self { model, field: None }
    }

    /// `Type.field`, or just `Type` for object denials
    pub fn path(&self) -> String {
        match &self.field {
            Some(field) => format!("{}.{}", self.model.type_name(), field),
            None => self.model.type_name().to_string(),
        }
    }
}

/// Access rule as written by schema authors
///
/// ```rust
/// use fieldguard_authz::rule::Rule;
/// use serde_json::json;
///
/// // public
/// let name = Rule::Allow;
///
/// // owners only, everyone else reads "hidden"
/// let email = Rule::when(|model| model.prop("isOwner") == json!(true))
///     .or_value(json!("hidden"));
/// # let _ = (name, email);
/// ```
#[derive(Clone, Debug)]
pub enum Rule {
    /// Always permit
    Allow,
    /// Always deny, substituting null
    Deny,
    /// Permit when the predicate holds, substituting null otherwise
    Predicate(Predicate),
    /// Predicate with an explicit substitute; a missing `read` denies
    Guarded {
        read: Option<Predicate>,
        fallback: Option<Fallback>,
    },
}

impl From<bool> for Rule {
    fn from(allow: bool) -> Self {
        if allow {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

impl Rule {
    /// Synchronous predicate rule
    pub fn when<F>(f: F) -> Self
    where
        F: Fn(RuleModel) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Thunk::from_fn(f))
    }

    /// Synchronous predicate that may fail
    pub fn try_when<F>(f: F) -> Self
    where
        F: Fn(RuleModel) -> Result<bool> + Send + Sync + 'static,
    {
        Self::Predicate(Thunk::try_from_fn(f))
    }

    /// Asynchronous predicate rule
    pub fn when_async<F, Fut>(f: F) -> Self
    where
        F: Fn(RuleModel) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        Self::Predicate(Thunk::from_async(f))
    }

    /// Attach a fallback producer
    pub fn with_fallback(self, fallback: Fallback) -> Self {
        let read = match self {
            Self::Allow => Some(Thunk::value(true)),
            Self::Deny => None,
            Self::Predicate(predicate) => Some(predicate),
            Self::Guarded { read, .. } => read,
        };
        Self::Guarded {
            read,
            fallback: Some(fallback),
        }
    }

    /// Substitute a constant on denial
    pub fn or_value(self, value: Value) -> Self {
        self.with_fallback(Thunk::value(value))
    }

    /// Compute the substitute from the denial
    pub fn or_else<F>(self, f: F) -> Self
    where
        F: Fn(Denial) -> Value + Send + Sync + 'static,
    {
        self.with_fallback(Thunk::from_fn(f))
    }

    /// Compute the substitute asynchronously
    pub fn or_else_async<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Denial) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.with_fallback(Thunk::from_async(f))
    }

    /// Raise an error on denial instead of substituting
    pub fn or_raise<F>(self, f: F) -> Self
    where
        F: Fn(&Denial) -> AuthzError + Send + Sync + 'static,
    {
        self.with_fallback(Thunk::try_from_fn(move |denial: Denial| Err(f(&denial))))
    }

    /// Deny and raise [`AuthzError::Access`] naming the denied path
    pub fn deny_with_access_error(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::Deny.or_raise(move |denial| {
            let field = denial.field.as_deref().unwrap_or("*");
            AuthzError::Access(format!("{}.{}", prefix, field))
        })
    }

    /// Compile to the uniform `(permit, fallback)` form
    pub fn compile(&self) -> CompiledRule {
        match self {
            Self::Allow => CompiledRule::new(Thunk::value(true), None),
            Self::Deny => CompiledRule::new(Thunk::value(false), None),
            Self::Predicate(predicate) => CompiledRule::new(predicate.clone(), None),
            Self::Guarded { read, fallback } => CompiledRule::new(
                read.clone().unwrap_or(Thunk::value(false)),
                fallback.clone(),
            ),
        }
    }
}

/// A rule reduced to a permission predicate and an optional substitute
#[derive(Clone, Debug)]
pub struct CompiledRule {
    permit: Predicate,
    fallback: Option<Fallback>,
}

impl CompiledRule {
    pub(crate) fn new(permit: Predicate, fallback: Option<Fallback>) -> Self {
        Self { permit, fallback }
    }

    /// Whether this rule carries a denial handler
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Evaluate the permission predicate
    pub async fn permits(&self, model: &RuleModel) -> Result<bool> {
        self.permit.resolve(model.clone()).await
    }

    /// Produce the substitute for a denial; null when there is no fallback
    pub async fn substitute(&self, denial: Denial) -> Result<Value> {
        match &self.fallback {
            Some(fallback) => fallback.resolve(denial).await,
            None => Ok(Value::Null),
        }
    }
}

impl From<Rule> for CompiledRule {
    fn from(rule: Rule) -> Self {
        rule.compile()
    }
}

/// Computed attribute of a model, e.g. `isOwner`
pub type Prop = Arc<dyn Fn(&RuleModel) -> Value + Send + Sync>;

/// Named props declared by an entity or mutation
#[derive(Clone, Default)]
pub struct Props {
    props: HashMap<String, Prop>,
}

impl Props {
    /// Empty prop set
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a prop
    ///
    /// A prop is computed at most once per model and may read other props
    /// through [`RuleModel::prop`], but never itself: a prop that reads its
    /// own name, directly or through a cycle, deadlocks on the memo.
    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&RuleModel) -> Value + Send + Sync + 'static,
    {
        self.props.insert(name.into(), Arc::new(f));
        self
    }

    /// Look up a prop by name
    pub fn get(&self, name: &str) -> Option<&Prop> {
        self.props.get(name)
    }

    /// Declared prop names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_tuple("Props").field(&names).finish()
    }
}

/// Rule attached to a query-shaped field
///
/// Computed fields fail closed: a field without a rule is denied, so nothing
/// reaches a nested resolver unless a rule says so.
pub fn wrap_rule(rule: Option<&Rule>) -> Rule {
    rule.cloned().unwrap_or(Rule::Deny)
}

/// Whether the nearest `type_name` ancestor of `model` has a truthy
/// `isOwner` prop. No such ancestor means no ownership.
pub fn is_owner(model: &RuleModel, type_name: &TypeName) -> bool {
    if model.parent().is_none() {
        return false;
    }
    model
        .find_ancestor_of_type(type_name)
        .map(|ancestor| !is_falsy(&ancestor.prop("isOwner")))
        .unwrap_or(false)
}

/// Rule granting access to owners of the enclosing `type_name` entity
pub fn is_owner_of(type_name: impl Into<TypeName>) -> Rule {
    let type_name = type_name.into();
    Rule::when(move |model| is_owner(&model, &type_name))
}

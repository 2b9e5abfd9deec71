//! Write authorization of mutation input

use super::{apply_rules, Authorized, RuleEngine};
use crate::error::Result;
use crate::model::RuleModel;
use crate::rule::CompiledRule;
use crate::schema::{BuiltEntity, EntityRef};
use crate::types::Context;
use crate::value::{is_falsy, ordered_map};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Authorize and sanitize one input object for writing
///
/// Returns `Ok(None)` when the object itself is denied. Otherwise every key
/// is read through its write rule; null results are dropped, and keys typed
/// as entities in `nested` are sanitized recursively with the current model
/// as parent. The result is a fresh object holding only what survived. A
/// substitute from the default rule is returned as-is.
pub fn apply_write_rules<'a>(
    engine: &'a Arc<RuleEngine>,
    self_write: Option<&'a CompiledRule>,
    nested: &'a HashMap<String, EntityRef>,
    object: Value,
    parent: Option<&'a RuleModel>,
    context: &'a Context,
) -> BoxFuture<'a, Result<Option<Value>>> {
    async move {
        let gate = apply_rules(engine, self_write, context, parent);
        if gate.is_noop() || is_falsy(&object) {
            return Ok(Some(object));
        }

        let model = match gate.authorize(object).await? {
            None => return Ok(None),
            Some(Authorized::Model(model)) => model,
            Some(Authorized::Unchecked(value)) | Some(Authorized::Substitute(value)) => {
                return Ok(Some(value))
            }
        };

        let mut authorized = Map::new();
        for key in model.keys() {
            let value = model.field(&key).await?.into_value();
            if value.is_null() {
                trace!(rule_set = %model.rule_set(), field = %key, "input field dropped");
                continue;
            }

            let value = match nested.get(&key) {
                Some(reference) => {
                    let entity = reference.get()?;
                    match write_nested(&entity, value, &model, context).await? {
                        Some(value) => value,
                        None => continue,
                    }
                }
                None => value,
            };
            authorized.insert(key, value);
        }

        Ok(Some(Value::Object(authorized)))
    }
    .boxed()
}

/// Sanitize a nested entity value (or array of them) under `entity`'s own
/// write rules, with `parent` as the owning model
async fn write_nested(
    entity: &BuiltEntity,
    value: Value,
    parent: &RuleModel,
    context: &Context,
) -> Result<Option<Value>> {
    let engine = entity.write_engine();
    match value {
        Value::Array(items) => {
            let concurrency = engine.config().concurrency_for(items.len());
            let written = ordered_map(items, concurrency, |item| {
                apply_write_rules(
                    engine,
                    entity.self_write(),
                    entity.nested_inputs(),
                    item,
                    Some(parent),
                    context,
                )
            })
            .await?;

            // denied elements keep their slot
            Ok(Some(Value::Array(
                written
                    .into_iter()
                    .map(|item| item.unwrap_or(Value::Null))
                    .collect(),
            )))
        }
        value => {
            apply_write_rules(
                engine,
                entity.self_write(),
                entity.nested_inputs(),
                value,
                Some(parent),
                context,
            )
            .await
        }
    }
}

//! Read authorization of query results

use super::{apply_rules, Authorized};
use crate::error::Result;
use crate::model::RuleModel;
use crate::schema::{BuiltEntity, Resolved};
use crate::types::Context;
use crate::value::{filter_map, is_falsy};
use serde_json::Value;
use tracing::trace;

/// Authorize a result of `entity`'s type for reading
///
/// Results pass through unchanged when there is no entity, when the entity
/// has no read rules and no self rule, or when the result is falsy. Arrays
/// are authorized element-wise and concurrently; elements that are denied
/// without a substitute are dropped and the survivors keep their order. A
/// single object becomes its model, its substitute, or null.
pub async fn apply_read_rules(
    entity: Option<&BuiltEntity>,
    result: Value,
    parent: Option<&RuleModel>,
    context: &Context,
) -> Result<Resolved> {
    let Some(entity) = entity else {
        return Ok(Resolved::from(result));
    };

    let gate = apply_rules(entity.read_engine(), entity.self_read(), context, parent);
    if gate.is_noop() || is_falsy(&result) {
        return Ok(Resolved::from(result));
    }

    match result {
        Value::Array(items) => {
            let total = items.len();
            let concurrency = gate.config().concurrency_for(total);
            let gate = &gate;

            let kept = filter_map(items, concurrency, |item| async move {
                let authorized = gate.authorize(item).await?;
                Ok(authorized
                    .filter(|authorized| !authorized.is_falsy())
                    .map(Authorized::into_resolved))
            })
            .await?;

            trace!(entity = %entity.name(), total, kept = kept.len(), "array read authorized");
            Ok(Resolved::List(kept))
        }
        object => Ok(gate
            .authorize(object)
            .await?
            .map(Authorized::into_resolved)
            .unwrap_or(Resolved::Null)),
    }
}

//! Value/thunk resolution
//!
//! Rules, fallbacks and props may each be given as a constant or as a
//! function of their arguments, and a function may be synchronous or
//! asynchronous. [`Thunk`] erases that distinction so callers simply
//! `resolve(args).await`.

use crate::error::Result;
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt, TryStreamExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Synchronous thunk body
pub type SyncFn<T, A> = Arc<dyn Fn(A) -> Result<T> + Send + Sync>;

/// Asynchronous thunk body
pub type AsyncFn<T, A> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A constant, or a callable producing the value from `A`
///
/// Multiple arguments are passed as a tuple.
pub enum Thunk<T, A> {
    /// Constant value, returned as-is
    Value(T),
    /// Synchronous callable
    Sync(SyncFn<T, A>),
    /// Asynchronous callable
    Async(AsyncFn<T, A>),
}

impl<T: Clone, A> Clone for Thunk<T, A> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(v) => Self::Value(v.clone()),
            Self::Sync(f) => Self::Sync(f.clone()),
            Self::Async(f) => Self::Async(f.clone()),
        }
    }
}

impl<T: fmt::Debug, A> fmt::Debug for Thunk<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Sync(_) => f.write_str("Sync(..)"),
            Self::Async(_) => f.write_str("Async(..)"),
        }
    }
}

impl<T, A> From<T> for Thunk<T, A> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: Clone, A> Thunk<T, A> {
    /// Constant thunk
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Infallible synchronous callable
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(A) -> T + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(move |args| Ok(f(args))))
    }

    /// Fallible synchronous callable; an `Err` propagates to the caller
    pub fn try_from_fn<F>(f: F) -> Self
    where
        F: Fn(A) -> Result<T> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Asynchronous callable
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::Async(Arc::new(move |args| f(args).boxed()))
    }

    /// The constant, if this thunk is one
    pub fn as_value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Apply the callable to `args`, or return the constant unchanged
    pub async fn resolve(&self, args: A) -> Result<T> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Sync(f) => f(args),
            Self::Async(f) => f(args).await,
        }
    }
}

/// JavaScript-style truthiness over JSON values
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Map `f` over `items` concurrently, keeping at most `concurrency` calls in
/// flight, and drop the `None` results.
///
/// Output order follows input order, not completion order. The first error
/// aborts the whole batch.
pub async fn filter_map<T, R, F, Fut>(items: Vec<T>, concurrency: usize, f: F) -> Result<Vec<R>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<Option<R>>>,
{
    let mapped: Vec<Option<R>> = stream::iter(items)
        .map(f)
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(mapped.into_iter().flatten().collect())
}

/// Like [`filter_map`] but keeps every result, so output index `i` always
/// corresponds to input index `i`.
pub async fn ordered_map<T, R, F, Fut>(items: Vec<T>, concurrency: usize, f: F) -> Result<Vec<R>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    stream::iter(items)
        .map(f)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_thunk_calls_function() {
        let add: Thunk<i64, (i64, i64)> = Thunk::from_fn(|(a, b)| a + b);
        assert_eq!(add.resolve((1, 2)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_thunk_returns_value() {
        let five: Thunk<i64, (i64, i64)> = Thunk::value(5);
        assert_eq!(five.resolve((1, 2)).await.unwrap(), 5);
        assert_eq!(five.as_value(), Some(&5));
    }

    #[tokio::test]
    async fn test_async_thunk() {
        let double: Thunk<i64, i64> = Thunk::from_async(|n| async move {
            tokio::task::yield_now().await;
            Ok::<_, AuthzError>(n * 2)
        });
        assert_eq!(double.resolve(21).await.unwrap(), 42);
        assert!(double.as_value().is_none());
    }

    #[tokio::test]
    async fn test_thunk_error_propagates() {
        let failing: Thunk<bool, ()> =
            Thunk::try_from_fn(|_| Err(AuthzError::Evaluation("boom".to_string())));
        assert!(matches!(
            failing.resolve(()).await,
            Err(AuthzError::Evaluation(msg)) if msg == "boom"
        ));
    }

    #[test]
    fn test_falsy_values() {
        assert!(is_falsy(&json!(null)));
        assert!(is_falsy(&json!(false)));
        assert!(is_falsy(&json!(0)));
        assert!(is_falsy(&json!(0.0)));
        assert!(is_falsy(&json!("")));

        assert!(!is_falsy(&json!(true)));
        assert!(!is_falsy(&json!(1)));
        assert!(!is_falsy(&json!("x")));
        assert!(!is_falsy(&json!([])));
        assert!(!is_falsy(&json!({})));
    }

    #[tokio::test]
    async fn test_filter_map_keeps_input_order() {
        // Later elements finish first
        let items = vec![30u64, 20, 10, 0];
        let result = filter_map(items, 4, |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, AuthzError>(if delay == 20 { None } else { Some(delay) })
        })
        .await
        .unwrap();

        assert_eq!(result, vec![30, 10, 0]);
    }

    #[tokio::test]
    async fn test_filter_map_propagates_first_error() {
        let result: Result<Vec<u32>> = filter_map(vec![1u32, 2, 3], 2, |n| async move {
            if n == 2 {
                Err(AuthzError::Evaluation(format!("rule failed on {}", n)))
            } else {
                Ok(Some(n))
            }
        })
        .await;

        assert!(matches!(result, Err(AuthzError::Evaluation(_))));
    }

    #[tokio::test]
    async fn test_ordered_map_keeps_every_slot() {
        let result = ordered_map(vec![3u64, 1, 2], 1, |n| async move {
            Ok::<_, AuthzError>(if n == 1 { None } else { Some(n) })
        })
        .await
        .unwrap();

        assert_eq!(result, vec![Some(3), None, Some(2)]);
    }
}

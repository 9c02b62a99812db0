//! Prop loading strategies.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::ProviderError;

/// Props declared by a page, keyed by prop name.
pub type Props = BTreeMap<String, PropSpec>;

/// Boxed future produced by invoking a provider.
pub type ProviderFuture = BoxFuture<'static, Result<Value, ProviderError>>;

/// A deferred computation of one prop value.
///
/// Wrapping a closure never runs it. The engine invokes a provider only after
/// deciding the prop is part of the response, and at most once.
pub struct Provider {
    call: Box<dyn FnOnce() -> ProviderFuture + Send>,
    timeout: Option<Duration>,
}

impl Provider {
    /// Wrap a synchronous computation.
    ///
    /// The closure runs on tokio's blocking pool so it neither stalls sibling
    /// providers nor escapes the timeout. A timed-out or cancelled call stops
    /// waiting and discards the result; the blocking thread itself runs to
    /// completion.
    pub fn from_fn<F, T>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Serialize,
    {
        Self::new(move || {
            let mut guard = AbortOnDrop(tokio::task::spawn_blocking(move || {
                f().map_err(|e| ProviderError::Evaluation(format!("{:#}", e)))
                    .and_then(to_json)
            }));
            async move {
                match (&mut guard.0).await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => {
                        Err(ProviderError::Evaluation("provider panicked".to_string()))
                    }
                    Err(e) => Err(ProviderError::Evaluation(e.to_string())),
                }
            }
            .boxed()
        })
    }

    /// Wrap an asynchronous computation.
    pub fn from_future<F, Fut, T>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize,
    {
        Self::new(move || {
            async move {
                let value = f()
                    .await
                    .map_err(|e| ProviderError::Evaluation(format!("{:#}", e)))?;
                to_json(value)
            }
            .boxed()
        })
    }

    fn new(call: impl FnOnce() -> ProviderFuture + Send + 'static) -> Self {
        Self {
            call: Box::new(call),
            timeout: None,
        }
    }

    /// Override the engine's default timeout for this provider.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Per-provider timeout, if set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn invoke(self) -> ProviderFuture {
        (self.call)()
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Aborts a blocking provider that has not started yet once nobody waits for it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value, ProviderError> {
    serde_json::to_value(value).map_err(|e| ProviderError::Serialization(e.to_string()))
}

/// A prop payload that is either already known or still to be computed.
#[derive(Debug)]
pub enum Payload {
    /// Concrete value.
    Ready(Value),
    /// Computed on inclusion.
    Pending(Provider),
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Ready(value)
    }
}

impl From<Provider> for Payload {
    fn from(provider: Provider) -> Self {
        Self::Pending(provider)
    }
}

/// How the client combines a merge prop with data it already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Append new items after existing ones.
    Append,
    /// Insert new items before existing ones.
    Prepend,
    /// Recursively merge objects.
    Deep,
}

/// Merge metadata carried next to a merge prop's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeMeta {
    /// Merge strategy.
    pub strategy: MergeStrategy,
    /// Fields identifying matching items (e.g. `id`).
    pub match_on: Vec<String>,
}

/// Default group for deferred props.
pub const DEFAULT_DEFERRED_GROUP: &str = "default";

/// Loading strategy of a single prop.
#[derive(Debug)]
pub enum PropSpec {
    /// Always eligible; included unless filtered out.
    Immediate(Value),
    /// Never removed by exclusion filtering.
    Always(Payload),
    /// Only included when a partial reload asks for it.
    Lazy(Provider),
    /// Announced on first render, fetched by the client in a follow-up request.
    Deferred { provider: Provider, group: String },
    /// Included on full render; client-side caching is the client's concern.
    Once(Provider),
    /// Only included when a partial reload names this exact key.
    Optional(Provider),
    /// Value plus merge metadata.
    Merge { payload: Payload, meta: MergeMeta },
}

/// Discriminant of [`PropSpec`], for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    Immediate,
    Always,
    Lazy,
    Deferred,
    Once,
    Optional,
    Merge,
}

impl PropKind {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Always => "always",
            Self::Lazy => "lazy",
            Self::Deferred => "deferred",
            Self::Once => "once",
            Self::Optional => "optional",
            Self::Merge => "merge",
        }
    }
}

impl PropSpec {
    /// Concrete value.
    pub fn immediate(value: impl Into<Value>) -> Self {
        Self::Immediate(value.into())
    }

    /// Value that survives exclusion filtering.
    pub fn always(payload: impl Into<Payload>) -> Self {
        Self::Always(payload.into())
    }

    /// Value computed only when explicitly requested.
    pub fn lazy(provider: Provider) -> Self {
        Self::Lazy(provider)
    }

    /// Deferred prop in the default group.
    pub fn deferred(provider: Provider) -> Self {
        Self::deferred_in(provider, DEFAULT_DEFERRED_GROUP)
    }

    /// Deferred prop in a named group.
    pub fn deferred_in(provider: Provider, group: impl Into<String>) -> Self {
        Self::Deferred {
            provider,
            group: group.into(),
        }
    }

    /// Prop the client may cache after first load.
    pub fn once(provider: Provider) -> Self {
        Self::Once(provider)
    }

    /// Prop fetched only on exact request.
    pub fn optional(provider: Provider) -> Self {
        Self::Optional(provider)
    }

    /// Merge prop appended to existing client data.
    pub fn merge(payload: impl Into<Payload>) -> Self {
        Self::merge_with(payload, MergeStrategy::Append)
    }

    /// Merge prop prepended to existing client data.
    pub fn prepend(payload: impl Into<Payload>) -> Self {
        Self::merge_with(payload, MergeStrategy::Prepend)
    }

    /// Merge prop deep-merged into existing client data.
    pub fn deep_merge(payload: impl Into<Payload>) -> Self {
        Self::merge_with(payload, MergeStrategy::Deep)
    }

    /// Merge prop with an explicit strategy.
    pub fn merge_with(payload: impl Into<Payload>, strategy: MergeStrategy) -> Self {
        Self::Merge {
            payload: payload.into(),
            meta: MergeMeta {
                strategy,
                match_on: Vec::new(),
            },
        }
    }

    /// Add a match field to a merge prop. No effect on other strategies.
    pub fn match_on(mut self, field: impl Into<String>) -> Self {
        if let Self::Merge { meta, .. } = &mut self {
            meta.match_on.push(field.into());
        }
        self
    }

    /// The loading strategy.
    pub fn kind(&self) -> PropKind {
        match self {
            Self::Immediate(_) => PropKind::Immediate,
            Self::Always(_) => PropKind::Always,
            Self::Lazy(_) => PropKind::Lazy,
            Self::Deferred { .. } => PropKind::Deferred,
            Self::Once(_) => PropKind::Once,
            Self::Optional(_) => PropKind::Optional,
            Self::Merge { .. } => PropKind::Merge,
        }
    }

    /// Group name for deferred props.
    pub fn deferred_group(&self) -> Option<&str> {
        match self {
            Self::Deferred { group, .. } => Some(group),
            _ => None,
        }
    }
}

impl From<Value> for PropSpec {
    fn from(value: Value) -> Self {
        Self::Immediate(value)
    }
}

//! Concurrent prop evaluation.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::{MergeMeta, PageError, Payload, PropSpec, Props, Provider, ProviderError};

/// Default number of providers evaluated at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default provider timeout.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// A prop after evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProp {
    /// Concrete value; `null` if the provider failed.
    pub value: Value,
    /// Merge metadata, carried through untouched.
    pub merge: Option<MergeMeta>,
    /// Provider failure message.
    pub error: Option<String>,
}

impl ResolvedProp {
    fn ok(value: Value, merge: Option<MergeMeta>) -> Self {
        Self {
            value,
            merge,
            error: None,
        }
    }
}

struct Task {
    key: String,
    always: bool,
    merge: Option<MergeMeta>,
    provider: Provider,
}

/// Evaluates selected props with bounded concurrency.
///
/// Providers are only invoked for keys in the selection and are awaited
/// inside the caller's future. Dropping that future cancels every in-flight
/// async provider and abandons the result of any synchronous one.
#[derive(Debug, Clone, Copy)]
pub struct PropResolver {
    concurrency: usize,
    default_timeout: Duration,
}

impl Default for PropResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY, DEFAULT_PROVIDER_TIMEOUT)
    }
}

impl PropResolver {
    /// Create a resolver. A zero limit is treated as one.
    pub fn new(concurrency: usize, default_timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            default_timeout,
        }
    }

    /// Concurrency limit.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Evaluate `props` restricted to `selected`.
    ///
    /// Unselected specs are dropped without invoking their providers. A
    /// failing `Always` prop fails the whole call; other failures become a
    /// `null` value with an error message.
    pub async fn resolve(
        &self,
        props: Props,
        selected: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, ResolvedProp>, PageError> {
        let mut resolved = BTreeMap::new();
        let mut tasks = Vec::new();

        for (key, spec) in props {
            if !selected.contains(&key) {
                continue;
            }
            let (always, merge, payload) = match spec {
                PropSpec::Immediate(value) => (false, None, Payload::Ready(value)),
                PropSpec::Always(payload) => (true, None, payload),
                PropSpec::Merge { payload, meta } => (false, Some(meta), payload),
                PropSpec::Lazy(provider)
                | PropSpec::Once(provider)
                | PropSpec::Optional(provider)
                | PropSpec::Deferred { provider, .. } => (false, None, Payload::Pending(provider)),
            };
            match payload {
                Payload::Ready(value) => {
                    resolved.insert(key, ResolvedProp::ok(value, merge));
                }
                Payload::Pending(provider) => tasks.push(Task {
                    key,
                    always,
                    merge,
                    provider,
                }),
            }
        }

        if tasks.is_empty() {
            return Ok(resolved);
        }

        tracing::debug!(
            providers = tasks.len(),
            concurrency = self.concurrency,
            "evaluating props"
        );

        let default_timeout = self.default_timeout;
        let mut running = stream::iter(tasks.into_iter().map(|task| async move {
            let Task {
                key,
                always,
                merge,
                provider,
            } = task;
            let timeout = provider.timeout().unwrap_or(default_timeout);
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, provider.invoke()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout)),
            };
            (key, always, merge, started.elapsed(), result)
        }))
        .buffer_unordered(self.concurrency);

        while let Some((key, always, merge, elapsed, result)) = running.next().await {
            let duration_ms = elapsed.as_millis() as u64;
            match result {
                Ok(value) => {
                    tracing::debug!(prop = %key, duration_ms, "prop resolved");
                    resolved.insert(key, ResolvedProp::ok(value, merge));
                }
                Err(source) if always => {
                    tracing::error!(prop = %key, duration_ms, error = %source, "always prop failed");
                    return Err(PageError::AlwaysPropFailed { prop: key, source });
                }
                Err(source) => {
                    tracing::warn!(prop = %key, duration_ms, error = %source, "prop failed");
                    resolved.insert(
                        key,
                        ResolvedProp {
                            value: Value::Null,
                            merge,
                            error: Some(source.to_string()),
                        },
                    );
                }
            }
        }

        Ok(resolved)
    }
}

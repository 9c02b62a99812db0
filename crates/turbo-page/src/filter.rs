//! Partial reload key selection.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{PropKind, Props, RequestContext};

/// Whether an exclude directive can remove an `Always` prop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlwaysPrecedence {
    /// `Always` props are included no matter what the client excludes.
    #[default]
    Unconditional,
    /// An explicit exclude removes `Always` props too.
    ExcludeWins,
}

/// Keys chosen for one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Keys to evaluate and send.
    pub include: BTreeSet<String>,
    /// Deferred keys announced for a follow-up fetch, by group.
    pub deferred: BTreeMap<String, Vec<String>>,
    /// Whether the request was honoured as a partial reload.
    pub partial: bool,
}

impl Selection {
    /// Whether a key was selected.
    pub fn contains(&self, key: &str) -> bool {
        self.include.contains(key)
    }
}

/// Computes the effective key set from request directives.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialReloadFilter {
    precedence: AlwaysPrecedence,
}

impl PartialReloadFilter {
    /// Create a filter.
    pub fn new(precedence: AlwaysPrecedence) -> Self {
        Self { precedence }
    }

    /// Select the keys of `props` to include for `component`.
    pub fn select(&self, ctx: &RequestContext, component: &str, props: &Props) -> Selection {
        let partial = match (&ctx.partial_component, ctx.protocol) {
            (Some(target), true) if target == component => true,
            (Some(target), true) => {
                tracing::warn!(
                    component,
                    requested = %target,
                    "partial reload targets another component, rendering in full"
                );
                false
            }
            _ => false,
        };

        if partial {
            self.select_partial(ctx, props)
        } else {
            select_full(props)
        }
    }

    fn select_partial(&self, ctx: &RequestContext, props: &Props) -> Selection {
        let mut include = BTreeSet::new();
        let mut requested_groups = BTreeSet::new();

        for (key, spec) in props {
            let wanted = ctx.include.is_empty() || ctx.include.contains(key);
            match spec.kind() {
                PropKind::Immediate | PropKind::Once | PropKind::Merge | PropKind::Lazy => {
                    if wanted {
                        include.insert(key.clone());
                    }
                }
                PropKind::Optional => {
                    if ctx.include.contains(key) {
                        include.insert(key.clone());
                    }
                }
                PropKind::Deferred => {
                    if ctx.include.contains(key) {
                        if let Some(group) = spec.deferred_group() {
                            requested_groups.insert(group.to_string());
                        }
                    }
                }
                PropKind::Always => {}
            }
        }

        // A requested deferred key pulls in its whole group.
        for (key, spec) in props {
            if let Some(group) = spec.deferred_group() {
                if requested_groups.contains(group) {
                    include.insert(key.clone());
                }
            }
        }

        include.retain(|key| !ctx.exclude.contains(key));

        for (key, spec) in props {
            if spec.kind() != PropKind::Always {
                continue;
            }
            let excluded = ctx.exclude.contains(key);
            if excluded && self.precedence == AlwaysPrecedence::ExcludeWins {
                tracing::debug!(prop = %key, "always prop excluded by request");
                continue;
            }
            include.insert(key.clone());
        }

        tracing::debug!(
            selected = include.len(),
            groups = ?requested_groups,
            "partial reload selection"
        );

        Selection {
            include,
            deferred: BTreeMap::new(),
            partial: true,
        }
    }
}

fn select_full(props: &Props) -> Selection {
    let mut selection = Selection::default();
    for (key, spec) in props {
        match spec.kind() {
            PropKind::Immediate | PropKind::Always | PropKind::Once | PropKind::Merge => {
                selection.include.insert(key.clone());
            }
            PropKind::Deferred => {
                if let Some(group) = spec.deferred_group() {
                    selection
                        .deferred
                        .entry(group.to_string())
                        .or_default()
                        .push(key.clone());
                }
            }
            PropKind::Lazy | PropKind::Optional => {}
        }
    }
    selection
}

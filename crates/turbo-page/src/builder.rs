//! Page object composition.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use turbo_session::{FlashChannel, HistoryController, SessionStore};

use crate::{
    Errors, MergeStrategy, PageDefinition, PageError, PageObject, PartialReloadFilter,
    PropResolver, Props, RequestContext,
};

/// Supplies site-wide props for every page.
///
/// Shared props go through the same filtering as handler props. A handler
/// prop with the same key replaces the shared one.
pub trait PropSharer: Send + Sync {
    /// Props to share with the page being built for `ctx`.
    fn share(&self, ctx: &RequestContext) -> Props;
}

impl<F> PropSharer for F
where
    F: Fn(&RequestContext) -> Props + Send + Sync,
{
    fn share(&self, ctx: &RequestContext) -> Props {
        self(ctx)
    }
}

/// Composes filtering, prop evaluation, history flags and flash into a
/// [`PageObject`].
#[derive(Clone, Default)]
pub struct PageObjectBuilder {
    filter: PartialReloadFilter,
    resolver: PropResolver,
    encrypt_history: bool,
    sharers: Vec<Arc<dyn PropSharer>>,
}

impl PageObjectBuilder {
    /// Create a builder.
    pub fn new(filter: PartialReloadFilter, resolver: PropResolver) -> Self {
        Self {
            filter,
            resolver,
            encrypt_history: false,
            sharers: Vec::new(),
        }
    }

    /// Global history encryption default.
    pub fn with_encrypt_history(mut self, encrypt: bool) -> Self {
        self.encrypt_history = encrypt;
        self
    }

    /// Add a shared prop source. Later sharers override earlier ones.
    pub fn with_sharer(mut self, sharer: Arc<dyn PropSharer>) -> Self {
        self.sharers.push(sharer);
        self
    }

    /// Add a shared prop source in place.
    pub fn add_sharer(&mut self, sharer: Arc<dyn PropSharer>) {
        self.sharers.push(sharer);
    }

    fn collect_props(&self, ctx: &RequestContext, page_props: Props) -> Props {
        let mut props = Props::new();
        for sharer in &self.sharers {
            props.extend(sharer.share(ctx));
        }
        props.extend(page_props);
        props
    }

    /// Build the page object for `page`.
    ///
    /// Flash messages, validation errors and the pending history flag are only
    /// consumed once every prop has resolved, so a failed build leaves them in
    /// the session.
    pub async fn build(
        &self,
        ctx: &RequestContext,
        page: PageDefinition,
        session: &dyn SessionStore,
        version: &str,
    ) -> Result<PageObject, PageError> {
        let PageDefinition {
            component,
            props,
            encrypt_history,
            clear_history,
            ..
        } = page;

        let props = self.collect_props(ctx, props);
        let selection = self.filter.select(ctx, &component, &props);
        let resolved = self.resolver.resolve(props, &selection.include).await?;

        let mut object = PageObject::new(component, ctx.url.clone(), version);
        object.deferred_props = selection.deferred;
        object.reset_props = ctx.reset.iter().cloned().collect();

        for (key, prop) in resolved {
            if let Some(error) = prop.error {
                object.prop_errors.insert(key.clone(), error);
            }
            if let Some(merge) = prop.merge {
                if !ctx.reset.contains(&key) {
                    match merge.strategy {
                        MergeStrategy::Append => object.merge_props.push(key.clone()),
                        MergeStrategy::Prepend => object.prepend_props.push(key.clone()),
                        MergeStrategy::Deep => object.deep_merge_props.push(key.clone()),
                    }
                    if !merge.match_on.is_empty() {
                        object.match_props_on.insert(key.clone(), merge.match_on);
                    }
                }
            }
            object.props.insert(key, prop.value);
        }

        let mut history = HistoryController::new(session, self.encrypt_history)
            .with_encrypt(encrypt_history)
            .with_clear(clear_history);
        object.clear_history = history.should_clear().await;
        object.encrypt_history = history.should_encrypt();

        let mut channel = FlashChannel::new(session);
        let errors = channel.take_errors(ctx.error_bag.as_deref()).await;
        object.errors = match &ctx.error_bag {
            Some(bag) if !errors.is_empty() => Errors::Bags(BTreeMap::from([(bag.clone(), errors)])),
            _ => Errors::Fields(errors),
        };
        object.flash = channel.take_flash().await;

        tracing::debug!(
            component = %object.component,
            props = object.props.len(),
            deferred_groups = object.deferred_props.len(),
            prop_errors = object.prop_errors.len(),
            "page object built"
        );

        Ok(object)
    }

    /// Resolve the selected props without the page object envelope.
    ///
    /// Session state is left untouched.
    pub async fn resolve_props(
        &self,
        ctx: &RequestContext,
        page: PageDefinition,
    ) -> Result<BTreeMap<String, Value>, PageError> {
        let props = self.collect_props(ctx, page.props);
        let selection = self.filter.select(ctx, &page.component, &props);
        let resolved = self.resolver.resolve(props, &selection.include).await?;
        Ok(resolved
            .into_iter()
            .map(|(key, prop)| (key, prop.value))
            .collect())
    }
}

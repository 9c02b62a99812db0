//! Read-once flash messages and validation errors.

use std::collections::BTreeMap;

use crate::store::{ERRORS_KEY, FLASH_KEY};
use crate::{SessionError, SessionStore};

/// Flash messages grouped by category (e.g. `success`, `error`).
pub type FlashMessages = BTreeMap<String, Vec<String>>;

/// Validation errors keyed by field.
pub type ErrorMap = BTreeMap<String, String>;

/// Bag name used for errors stored without an explicit bag.
pub const DEFAULT_ERROR_BAG: &str = "default";

/// One-shot session messaging for a single response build.
///
/// Each store is consumed at most once per channel: the first `take_*` call
/// pops it from the session, later calls return an empty result without
/// touching the session again. An unavailable session reads as empty.
pub struct FlashChannel<'a> {
    store: &'a dyn SessionStore,
    flash_taken: bool,
    errors_taken: bool,
}

impl<'a> FlashChannel<'a> {
    /// Create a channel over the request's session.
    pub fn new(store: &'a dyn SessionStore) -> Self {
        Self {
            store,
            flash_taken: false,
            errors_taken: false,
        }
    }

    /// Append a message to a flash category.
    pub async fn flash(&self, category: &str, message: impl Into<String>) -> Result<(), SessionError> {
        let mut messages = self
            .store
            .get_as::<FlashMessages>(FLASH_KEY)
            .await?
            .unwrap_or_default();
        messages
            .entry(category.to_string())
            .or_default()
            .push(message.into());
        self.store.set_as(FLASH_KEY, &messages).await
    }

    /// Store validation errors, optionally under a named bag.
    ///
    /// Replaces whatever was stored for the same bag.
    pub async fn put_errors(&self, bag: Option<&str>, errors: ErrorMap) -> Result<(), SessionError> {
        let mut bags = self
            .store
            .get_as::<BTreeMap<String, ErrorMap>>(ERRORS_KEY)
            .await?
            .unwrap_or_default();
        bags.insert(bag.unwrap_or(DEFAULT_ERROR_BAG).to_string(), errors);
        self.store.set_as(ERRORS_KEY, &bags).await
    }

    /// Read then clear flash messages. Empty store yields `{}`.
    pub async fn take_flash(&mut self) -> FlashMessages {
        if std::mem::replace(&mut self.flash_taken, true) {
            return FlashMessages::new();
        }
        match self.store.pop_as::<FlashMessages>(FLASH_KEY).await {
            Ok(messages) => messages.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "flash unavailable, continuing without it");
                FlashMessages::new()
            }
        }
    }

    /// Read then clear validation errors.
    ///
    /// `bag = None` reads the unscoped errors only; a named bag reads only that
    /// bag. The whole error store is cleared either way.
    pub async fn take_errors(&mut self, bag: Option<&str>) -> ErrorMap {
        if std::mem::replace(&mut self.errors_taken, true) {
            return ErrorMap::new();
        }
        match self
            .store
            .pop_as::<BTreeMap<String, ErrorMap>>(ERRORS_KEY)
            .await
        {
            Ok(Some(mut bags)) => bags
                .remove(bag.unwrap_or(DEFAULT_ERROR_BAG))
                .unwrap_or_default(),
            Ok(None) => ErrorMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "validation errors unavailable, continuing without them");
                ErrorMap::new()
            }
        }
    }
}

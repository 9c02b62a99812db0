//! Browser history encryption and clearing flags.

use serde_json::Value;

use crate::store::CLEAR_HISTORY_KEY;
use crate::{SessionError, SessionStore};

/// Resolves the `encryptHistory` / `clearHistory` flags for one response.
///
/// Precedence, highest first: per-response override, pending session flag
/// (clear only), global default.
pub struct HistoryController<'a> {
    store: &'a dyn SessionStore,
    default_encrypt: bool,
    default_clear: bool,
    encrypt_override: Option<bool>,
    clear_override: Option<bool>,
    clear_resolved: Option<bool>,
}

impl<'a> HistoryController<'a> {
    /// Create a controller with the global defaults.
    pub fn new(store: &'a dyn SessionStore, default_encrypt: bool) -> Self {
        Self {
            store,
            default_encrypt,
            default_clear: false,
            encrypt_override: None,
            clear_override: None,
            clear_resolved: None,
        }
    }

    /// Set the global clear default.
    pub fn with_default_clear(mut self, clear: bool) -> Self {
        self.default_clear = clear;
        self
    }

    /// Per-response encrypt override.
    pub fn with_encrypt(mut self, encrypt: Option<bool>) -> Self {
        self.encrypt_override = encrypt;
        self
    }

    /// Per-response clear override.
    pub fn with_clear(mut self, clear: Option<bool>) -> Self {
        self.clear_override = clear;
        self
    }

    /// Mark the session so the next rendered page clears client history.
    ///
    /// Intended for out-of-band flows such as logout.
    pub async fn request_clear(store: &dyn SessionStore) -> Result<(), SessionError> {
        store.set(CLEAR_HISTORY_KEY, Value::Bool(true)).await
    }

    /// Whether the client should clear its history.
    ///
    /// Reading a pending session flag consumes it; the answer is memoized so
    /// repeated calls within one build agree.
    pub async fn should_clear(&mut self) -> bool {
        if let Some(clear) = self.clear_override {
            return clear;
        }
        if let Some(clear) = self.clear_resolved {
            return clear;
        }

        let pending = match self.store.pop(CLEAR_HISTORY_KEY).await {
            Ok(value) => value.and_then(|v| v.as_bool()),
            Err(e) => {
                tracing::warn!(error = %e, "history flag unavailable, using default");
                None
            }
        };
        let clear = pending.unwrap_or(self.default_clear);
        self.clear_resolved = Some(clear);
        clear
    }

    /// Whether the client should encrypt its history entry.
    pub fn should_encrypt(&self) -> bool {
        self.encrypt_override.unwrap_or(self.default_encrypt)
    }
}

//! Session store seam and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::SessionError;

/// Session key holding flash messages (category -> messages).
pub const FLASH_KEY: &str = "_flash";
/// Session key holding validation errors (bag -> field -> message).
pub const ERRORS_KEY: &str = "_errors";
/// Session key holding the pending "clear history" flag.
pub const CLEAR_HISTORY_KEY: &str = "_clear_history";

/// Opaque key-value interface over the current request's session.
///
/// Consistency is whatever the backing deployment provides; the engine only
/// relies on `pop` returning the value it removes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a value without removing it.
    async fn get(&self, key: &str) -> Result<Option<Value>, SessionError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<(), SessionError>;

    /// Remove a value and return it.
    async fn pop(&self, key: &str) -> Result<Option<Value>, SessionError>;
}

impl dyn SessionStore + '_ {
    /// Read and deserialize a value.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Remove and deserialize a value.
    pub async fn pop_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        match self.pop(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a value.
    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        self.set(key, serde_json::to_value(value)?).await
    }
}

/// In-process session store.
///
/// Clones share the same underlying map, so a handler and the page engine can
/// hold separate handles to one session.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    values: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemorySession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Whether the session holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Check if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.lock().contains_key(key)
    }
}

#[async_trait]
impl SessionStore for MemorySession {
    async fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), SessionError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.values.lock().remove(key))
    }
}

/// A store for requests that have no session at all.
///
/// Every operation fails with [`SessionError::Unavailable`], which the flash
/// and history components treat as "feature disabled".
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSession;

#[async_trait]
impl SessionStore for NoSession {
    async fn get(&self, _key: &str) -> Result<Option<Value>, SessionError> {
        Err(SessionError::Unavailable("no session for this request".to_string()))
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<(), SessionError> {
        Err(SessionError::Unavailable("no session for this request".to_string()))
    }

    async fn pop(&self, _key: &str) -> Result<Option<Value>, SessionError> {
        Err(SessionError::Unavailable("no session for this request".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_session_get_set_pop() {
        let session = MemorySession::new();
        assert!(session.is_empty());

        session.set("k", json!({"a": 1})).await.unwrap();
        assert_eq!(session.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(session.len(), 1);

        assert_eq!(session.pop("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(session.pop("k").await.unwrap(), None);
        assert!(!session.contains("k"));
    }

    #[tokio::test]
    async fn test_memory_session_clones_share_state() {
        let a = MemorySession::new();
        let b = a.clone();
        a.set("shared", json!(true)).await.unwrap();
        assert_eq!(b.get("shared").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let session = MemorySession::new();
        let store: &dyn SessionStore = &session;

        store.set_as("n", &42u32).await.unwrap();
        assert_eq!(store.get_as::<u32>("n").await.unwrap(), Some(42));
        assert_eq!(store.pop_as::<u32>("n").await.unwrap(), Some(42));
        assert_eq!(store.get_as::<u32>("n").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_typed_helpers_reject_wrong_shape() {
        let session = MemorySession::new();
        session.set("n", json!("not a number")).await.unwrap();

        let store: &dyn SessionStore = &session;
        let err = store.get_as::<u32>("n").await.unwrap_err();
        assert!(matches!(err, SessionError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_no_session_is_unavailable() {
        let err = NoSession.get("k").await.unwrap_err();
        assert!(matches!(err, SessionError::Unavailable(_)));
        assert!(NoSession.set("k", json!(1)).await.is_err());
        assert!(NoSession.pop("k").await.is_err());
    }
}

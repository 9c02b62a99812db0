//! Session-backed request state for TurboCommerce pages.
//!
//! The page engine never owns session storage. It talks to whatever store the
//! deployment provides through the [`SessionStore`] seam and performs at most
//! one get-and-clear per response for each piece of one-shot state.
//!
//! This crate provides:
//! - `SessionStore` - Async get/set/pop interface over an external session
//! - `MemorySession` - In-process store for tests and single-node setups
//! - `FlashChannel` - Read-once flash messages and validation errors
//! - `HistoryController` - Encrypt/clear history flag resolution
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_session::{FlashChannel, MemorySession};
//!
//! let session = MemorySession::new();
//!
//! // In the POST handler, before redirecting
//! FlashChannel::new(&session).flash("success", "Saved").await;
//!
//! // While building the next page
//! let mut channel = FlashChannel::new(&session);
//! let flash = channel.take_flash().await;
//! ```

mod error;
mod flash;
mod history;
mod store;

pub use error::SessionError;
pub use flash::*;
pub use history::*;
pub use store::*;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{FlashChannel, HistoryController, MemorySession, SessionError, SessionStore};
}

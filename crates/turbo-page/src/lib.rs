//! Page-response protocol engine for TurboCommerce.
//!
//! Decides per request whether to answer with a full document, a page object
//! for client-side navigation, a stale-version signal or a redirect, and
//! computes which props to evaluate under each loading strategy.
//!
//! This crate provides:
//! - `PropSpec` / `Provider` - Loading strategies and deferred prop computations
//! - `PartialReloadFilter` - Effective key selection from partial reload directives
//! - `PropResolver` - Bounded concurrent prop evaluation with timeouts
//! - `PageObjectBuilder` - Page object composition with flash, errors and history flags
//! - `ResponseNegotiator` - The response state machine
//! - `ShellRenderer` - Default HTML document renderer
//! - `PageConfig` - File-backed engine configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_page::prelude::*;
//!
//! let negotiator = ResponseNegotiator::from_config(PageConfig::load("page.toml")?)?;
//!
//! let ctx = RequestContext::from_parts(&parts);
//! if let Some(stale) = negotiator.check_version(&ctx) {
//!     return stale;
//! }
//!
//! let page = PageDefinition::new("Users/Index")
//!     .prop("users", json!(users))
//!     .prop("stats", PropSpec::lazy(Provider::from_future(|| load_stats())))
//!     .prop("activity", PropSpec::deferred(Provider::from_future(|| load_activity())));
//!
//! negotiator.respond(&ctx, &session, page.into()).await
//! ```

mod builder;
mod config;
mod context;
mod error;
mod filter;
mod headers;
pub mod logging;
mod negotiator;
mod object;
mod page;
mod prop;
mod render;
mod resolver;

pub use builder::*;
pub use config::*;
pub use context::*;
pub use error::{PageError, ProviderError};
pub use filter::*;
pub use headers::*;
pub use negotiator::*;
pub use object::*;
pub use page::*;
pub use prop::*;
pub use render::*;
pub use resolver::*;

pub use turbo_assets::{AssetMode, AssetRefs, AssetVersioner};
pub use turbo_session::{FlashChannel, HistoryController, MemorySession, NoSession, SessionStore};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Outcome, PageConfig, PageDefinition, PageError, PropSpec, Provider, RequestContext,
        ResponseNegotiator, SessionStore,
    };
}

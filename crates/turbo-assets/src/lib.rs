//! Build manifest loading and asset versioning for TurboCommerce pages.
//!
//! This crate provides:
//! - `Manifest` - Content-addressed build manifest (entry -> output chunk)
//! - `AssetVersioner` - Version token derivation for built and live asset sources
//! - `AssetRefs` - Resolved output file plus stylesheets and imports for an entry
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_assets::AssetVersioner;
//!
//! let versioner = AssetVersioner::built("public/build/manifest.json")?;
//! let token = versioner.version();
//! let refs = versioner.resolve("src/main.ts")?;
//! ```

mod error;
mod manifest;
mod version;

pub use error::AssetError;
pub use manifest::*;
pub use version::*;

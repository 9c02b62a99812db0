//! Page engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use turbo_assets::{AssetMode, AssetVersioner, Manifest, DEFAULT_BASE_URL};

use crate::{AlwaysPrecedence, PageError};

/// Upper bound for the provider concurrency limit.
pub const MAX_CONCURRENCY: usize = 64;

/// Front-end asset settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Built or live assets.
    pub mode: AssetMode,
    /// Build manifest location.
    pub manifest_path: PathBuf,
    /// File advertising the live dev server URL.
    pub hot_file: PathBuf,
    /// Public path prefix of built assets.
    pub base_url: String,
    /// Entry point passed to the document renderer.
    pub entry: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            mode: AssetMode::Built,
            manifest_path: PathBuf::from("public/build/manifest.json"),
            hot_file: PathBuf::from("public/hot"),
            base_url: DEFAULT_BASE_URL.to_string(),
            entry: "src/main.ts".to_string(),
        }
    }
}

/// Page engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Providers evaluated at once per request.
    pub concurrency_limit: usize,
    /// Default provider timeout in milliseconds.
    pub provider_timeout_ms: u64,
    /// Encrypt history entries unless a response says otherwise.
    pub encrypt_history: bool,
    /// Whether exclude can remove `Always` props.
    pub always_precedence: AlwaysPrecedence,
    /// Asset settings.
    pub assets: AssetConfig,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            provider_timeout_ms: 5_000,
            encrypt_history: false,
            always_precedence: AlwaysPrecedence::Unconditional,
            assets: AssetConfig::default(),
        }
    }
}

impl PageConfig {
    /// Load from a TOML or JSON file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page config: {}", path.display()))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid page config: {}", path.display()))?;
        Ok(config)
    }

    /// Check values that have no sensible fallback.
    pub fn validate(&self) -> Result<(), PageError> {
        if self.provider_timeout_ms == 0 {
            return Err(PageError::Config("provider_timeout_ms must be positive".into()));
        }
        if self.assets.entry.trim().is_empty() {
            return Err(PageError::Config("assets.entry must not be empty".into()));
        }
        Ok(())
    }

    /// Set the concurrency limit.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Set the default provider timeout.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the history encryption default.
    pub fn with_encrypt_history(mut self, encrypt: bool) -> Self {
        self.encrypt_history = encrypt;
        self
    }

    /// Set the `Always` precedence.
    pub fn with_always_precedence(mut self, precedence: AlwaysPrecedence) -> Self {
        self.always_precedence = precedence;
        self
    }

    /// Set the asset entry point.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.assets.entry = entry.into();
        self
    }

    /// Concurrency limit clamped to `1..=MAX_CONCURRENCY`.
    pub fn concurrency(&self) -> usize {
        self.concurrency_limit.clamp(1, MAX_CONCURRENCY)
    }

    /// Default provider timeout.
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Build the asset versioner for the configured mode.
    ///
    /// Fails only in built mode when the manifest is missing or invalid.
    pub fn build_versioner(&self) -> Result<AssetVersioner, PageError> {
        match self.assets.mode {
            AssetMode::Built => {
                let manifest = Manifest::load(&self.assets.manifest_path)?
                    .with_base_url(self.assets.base_url.clone());
                tracing::info!(
                    manifest = %self.assets.manifest_path.display(),
                    version = manifest.version(),
                    "using built assets"
                );
                Ok(AssetVersioner::from_manifest(manifest))
            }
            AssetMode::Live => {
                tracing::info!(hot_file = %self.assets.hot_file.display(), "using live assets");
                Ok(AssetVersioner::live(
                    self.assets.hot_file.clone(),
                    Some(&self.assets.manifest_path),
                ))
            }
        }
    }
}

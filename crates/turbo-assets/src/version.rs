//! Version tokens for built and live asset sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{AssetError, AssetRefs, Manifest};

/// How front-end assets are produced for this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetMode {
    /// Compiled assets described by a manifest. A missing manifest is fatal.
    #[default]
    Built,
    /// A live development server advertises itself through a hot file.
    Live,
}

#[derive(Debug, Clone)]
enum Source {
    Built(Manifest),
    Live {
        hot_file: PathBuf,
        manifest: Option<Manifest>,
        booted_at: DateTime<Utc>,
        hot: Arc<Mutex<Option<HotEntry>>>,
    },
    Fixed(String),
}

/// Hot file contents, valid while its modification time and length hold.
#[derive(Debug, Clone)]
struct HotEntry {
    modified: SystemTime,
    len: u64,
    url: String,
    version: String,
}

/// Derives the asset version token and resolves entry points.
///
/// The token is a pure function of the manifest content in built mode. In
/// live mode it is derived from the dev server's advertised endpoint and the
/// hot file's modification time, so restarting the dev server changes it.
/// Live mode is meant for development: each call stats the hot file with
/// blocking I/O and only rereads it when the file changed.
#[derive(Debug, Clone)]
pub struct AssetVersioner {
    source: Source,
}

impl AssetVersioner {
    /// Load a built manifest. Fails with `ManifestNotFound` if it is absent.
    pub fn built(manifest_path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let manifest = Manifest::load(manifest_path)?;
        tracing::debug!(
            manifest = %manifest.path().display(),
            version = manifest.version(),
            "loaded asset manifest"
        );
        Ok(Self {
            source: Source::Built(manifest),
        })
    }

    /// Use an already parsed manifest.
    pub fn from_manifest(manifest: Manifest) -> Self {
        Self {
            source: Source::Built(manifest),
        }
    }

    /// Track a live asset source. Never fails: a missing or unreadable manifest
    /// only removes the fallback.
    pub fn live(hot_file: impl Into<PathBuf>, manifest_path: Option<&Path>) -> Self {
        let manifest = manifest_path.and_then(|path| match Manifest::load(path) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::debug!(error = %e, "no manifest fallback for live assets");
                None
            }
        });
        Self {
            source: Source::Live {
                hot_file: hot_file.into(),
                manifest,
                booted_at: Utc::now(),
                hot: Arc::new(Mutex::new(None)),
            },
        }
    }

    /// A constant token, for tests and for deployments that version externally.
    pub fn fixed(version: impl Into<String>) -> Self {
        Self {
            source: Source::Fixed(version.into()),
        }
    }

    /// Current version token.
    pub fn version(&self) -> String {
        match &self.source {
            Source::Built(manifest) => manifest.version().to_string(),
            Source::Fixed(version) => version.clone(),
            Source::Live {
                hot_file,
                manifest,
                booted_at,
                hot,
            } => {
                if let Some(entry) = hot_entry(hot_file, hot) {
                    return entry.version;
                }
                if let Some(manifest) = manifest {
                    return manifest.version().to_string();
                }
                tracing::warn!(
                    hot_file = %hot_file.display(),
                    "live asset source unavailable, using synthetic version"
                );
                digest(&format!(
                    "synthetic\n{}",
                    booted_at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
                ))
            }
        }
    }

    /// Resolve an entry point into asset references.
    pub fn resolve(&self, entry: &str) -> Result<AssetRefs, AssetError> {
        match &self.source {
            Source::Built(manifest) => manifest.resolve(entry),
            Source::Fixed(_) => Ok(AssetRefs {
                file: entry.to_string(),
                ..Default::default()
            }),
            Source::Live {
                hot_file,
                manifest,
                hot,
                ..
            } => {
                if let Some(live) = hot_entry(hot_file, hot) {
                    let url = live.url.trim_end_matches('/');
                    return Ok(AssetRefs {
                        file: format!("{}/{}", url, entry.trim_start_matches('/')),
                        css: Vec::new(),
                        imports: vec![format!("{}/@vite/client", url)],
                    });
                }
                match manifest {
                    Some(manifest) => manifest.resolve(entry),
                    None => Err(AssetError::ManifestNotFound(hot_file.clone())),
                }
            }
        }
    }

    /// The configured mode.
    pub fn mode(&self) -> AssetMode {
        match self.source {
            Source::Live { .. } => AssetMode::Live,
            Source::Built(_) | Source::Fixed(_) => AssetMode::Built,
        }
    }
}

/// Current hot file entry, reread only when its metadata changed.
fn hot_entry(hot_file: &Path, cache: &Mutex<Option<HotEntry>>) -> Option<HotEntry> {
    let Ok(metadata) = std::fs::metadata(hot_file) else {
        *cache.lock() = None;
        return None;
    };
    let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
    let len = metadata.len();

    let mut cache = cache.lock();
    if let Some(entry) = cache.as_ref() {
        if entry.modified == modified && entry.len == len {
            return Some(entry.clone());
        }
    }

    let entry = read_hot_url(hot_file).map(|url| {
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let version = digest(&format!("live\n{}\n{}", url, nanos));
        tracing::debug!(hot_file = %hot_file.display(), url = %url, "live asset source changed");
        HotEntry {
            modified,
            len,
            url,
            version,
        }
    });
    cache.clone_from(&entry);
    entry
}

fn read_hot_url(hot_file: &Path) -> Option<String> {
    let url = std::fs::read_to_string(hot_file).ok()?;
    let url = url.trim();
    (!url.is_empty()).then(|| url.to_string())
}

fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

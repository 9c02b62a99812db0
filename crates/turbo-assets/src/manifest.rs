//! Content-addressed build manifest.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::AssetError;

/// Public path prefix the build output is served from.
pub const DEFAULT_BASE_URL: &str = "/build/";

/// One output chunk of the build, keyed in the manifest by its source entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChunk {
    /// Output file, relative to the build directory.
    pub file: String,
    /// Source file this chunk was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Whether this chunk is an entry point.
    #[serde(default, rename = "isEntry")]
    pub is_entry: bool,
    /// Stylesheets emitted for this chunk.
    #[serde(default)]
    pub css: Vec<String>,
    /// Manifest keys of statically imported chunks.
    #[serde(default)]
    pub imports: Vec<String>,
}

/// Resolved references for a logical entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRefs {
    /// Script to load for the entry.
    pub file: String,
    /// Stylesheets of the entry and everything it imports.
    pub css: Vec<String>,
    /// Scripts of imported chunks (for modulepreload).
    pub imports: Vec<String>,
}

/// A parsed build manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    base_url: String,
    chunks: BTreeMap<String, ManifestChunk>,
    digest: String,
}

impl Manifest {
    /// Load a manifest from disk.
    ///
    /// A missing file maps to [`AssetError::ManifestNotFound`] so callers can
    /// decide whether absence is fatal for their deployment mode.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AssetError::ManifestNotFound(path.to_path_buf())
            } else {
                AssetError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_slice(path, &bytes)
    }

    /// Parse a manifest from raw JSON bytes.
    pub fn from_slice(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self, AssetError> {
        let path = path.into();
        let parse_err = |message: String| AssetError::ManifestParse {
            path: path.clone(),
            message,
        };

        let raw: Value = serde_json::from_slice(bytes).map_err(|e| parse_err(e.to_string()))?;
        if !raw.is_object() {
            return Err(parse_err("top level must be an object".to_string()));
        }

        let mut canonical = String::with_capacity(bytes.len());
        write_canonical(&raw, &mut canonical);
        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));

        let chunks: BTreeMap<String, ManifestChunk> =
            serde_json::from_value(raw).map_err(|e| parse_err(e.to_string()))?;

        Ok(Self {
            path,
            base_url: DEFAULT_BASE_URL.to_string(),
            chunks,
            digest,
        })
    }

    /// Set the public prefix prepended to resolved files.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base = base_url.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.base_url = base;
        self
    }

    /// Version token: SHA-256 over the sorted-key serialization of the manifest.
    pub fn version(&self) -> &str {
        &self.digest
    }

    /// Path the manifest was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a chunk by manifest key.
    pub fn chunk(&self, entry: &str) -> Option<&ManifestChunk> {
        self.chunks.get(entry)
    }

    /// Iterate over entry-point keys.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.chunks
            .iter()
            .filter(|(_, c)| c.is_entry)
            .map(|(k, _)| k.as_str())
    }

    /// Resolve an entry into its output file plus side assets.
    ///
    /// Imports are followed transitively; stylesheets of imported chunks are
    /// collected in first-seen order without duplicates.
    pub fn resolve(&self, entry: &str) -> Result<AssetRefs, AssetError> {
        let chunk = self
            .chunks
            .get(entry)
            .ok_or_else(|| AssetError::UnknownEntry(entry.to_string()))?;

        let mut refs = AssetRefs {
            file: self.public(&chunk.file),
            ..Default::default()
        };
        let mut seen_css = HashSet::new();
        let mut visited = HashSet::new();
        visited.insert(entry.to_string());
        self.collect(chunk, &mut refs, &mut seen_css, &mut visited);
        Ok(refs)
    }

    fn collect(
        &self,
        chunk: &ManifestChunk,
        refs: &mut AssetRefs,
        seen_css: &mut HashSet<String>,
        visited: &mut HashSet<String>,
    ) {
        for css in &chunk.css {
            if seen_css.insert(css.clone()) {
                refs.css.push(self.public(css));
            }
        }
        for key in &chunk.imports {
            if !visited.insert(key.clone()) {
                continue;
            }
            // Dangling import keys are a build-tool bug; skip rather than fail the page.
            let Some(imported) = self.chunks.get(key) else {
                tracing::warn!(import = %key, "manifest import has no chunk");
                continue;
            };
            refs.imports.push(self.public(&imported.file));
            self.collect(imported, refs, seen_css, visited);
        }
    }

    fn public(&self, file: &str) -> String {
        format!("{}{}", self.base_url, file.trim_start_matches('/'))
    }
}

/// Serialize JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

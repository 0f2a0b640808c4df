//! `package.json` manifests and their cache.
//!
//! Only the entry-point fields resolution needs are parsed. Cached entries
//! carry an mtime/size stamp and are dropped when the file changes.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::UNIX_EPOCH;

/// Entry-point fields of a `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub types: Option<String>,
    #[serde(default)]
    pub typings: Option<String>,
}

impl PackageManifest {
    /// Read and parse a manifest. Unreadable or malformed files yield `None`.
    #[must_use]
    pub fn read(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "ignoring malformed package.json");
                None
            }
        }
    }

    /// `types`, falling back to `typings`.
    #[must_use]
    pub fn types_entry(&self) -> Option<&str> {
        self.types.as_deref().or(self.typings.as_deref())
    }
}

/// File stamp for cache invalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestStamp {
    /// Modification time in milliseconds since epoch.
    pub mtime_ms: Option<u64>,
    /// File size in bytes.
    pub size: Option<u64>,
}

impl ManifestStamp {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let Ok(meta) = path.metadata() else {
            return Self::default();
        };
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);
        Self {
            mtime_ms,
            size: Some(meta.len()),
        }
    }

    /// Whether the file on disk still has this stamp.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.size.is_some() && *self == Self::from_path(path)
    }
}

/// Cache of parsed manifests, keyed by `package.json` path.
pub trait ManifestCache: Send + Sync {
    /// Manifest at `path`, reading it on a miss.
    fn manifest(&self, path: &Path) -> Option<Arc<PackageManifest>>;
}

/// Always reads from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoManifestCache;

impl ManifestCache for NoManifestCache {
    fn manifest(&self, path: &Path) -> Option<Arc<PackageManifest>> {
        PackageManifest::read(path).map(Arc::new)
    }
}

/// Process-wide manifest cache shared by concurrent fetches.
#[derive(Debug, Default)]
pub struct SharedManifestCache {
    entries: RwLock<HashMap<PathBuf, (ManifestStamp, Arc<PackageManifest>)>>,
}

impl SharedManifestCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ManifestCache for SharedManifestCache {
    fn manifest(&self, path: &Path) -> Option<Arc<PackageManifest>> {
        if let Some((stamp, manifest)) = self.entries.read().unwrap().get(path) {
            if stamp.matches(path) {
                return Some(Arc::clone(manifest));
            }
        }

        let stamp = ManifestStamp::from_path(path);
        let Some(manifest) = PackageManifest::read(path).map(Arc::new) else {
            self.entries.write().unwrap().remove(path);
            return None;
        };
        self.entries
            .write()
            .unwrap()
            .insert(path.to_path_buf(), (stamp, Arc::clone(&manifest)));
        Some(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_manifest_fields() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("package.json");
        fs::write(
            &file,
            r#"{"name": "pkg", "main": "lib/index.js", "typings": "index.d.ts", "version": "1.0.0"}"#,
        )
        .unwrap();

        let manifest = PackageManifest::read(&file).unwrap();
        assert_eq!(manifest.main.as_deref(), Some("lib/index.js"));
        assert_eq!(manifest.types_entry(), Some("index.d.ts"));
    }

    #[test]
    fn test_malformed_manifest_is_none() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("package.json");
        fs::write(&file, "{ not json").unwrap();
        assert!(PackageManifest::read(&file).is_none());
    }

    #[test]
    fn test_stamp_nonexistent_file() {
        let dir = tempdir().unwrap();
        let stamp = ManifestStamp::from_path(&dir.path().join("missing.json"));
        assert!(stamp.size.is_none());
        assert!(!stamp.matches(&dir.path().join("missing.json")));
    }

    #[test]
    fn test_shared_cache_reloads_after_change() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("package.json");
        fs::write(&file, r#"{"main": "a.js"}"#).unwrap();

        let cache = SharedManifestCache::new();
        assert_eq!(cache.manifest(&file).unwrap().main.as_deref(), Some("a.js"));
        assert_eq!(cache.len(), 1);

        // Size changes, so the stamp no longer matches.
        fs::write(&file, r#"{"main": "lib/b.js"}"#).unwrap();
        assert_eq!(
            cache.manifest(&file).unwrap().main.as_deref(),
            Some("lib/b.js")
        );
    }

    #[test]
    fn test_no_cache_reads_every_time() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("package.json");
        fs::write(&file, r#"{"main": "a.js"}"#).unwrap();
        assert!(NoManifestCache.manifest(&file).is_some());
        fs::remove_file(&file).unwrap();
        assert!(NoManifestCache.manifest(&file).is_none());
    }
}

//! `tsconfig.json` discovery and the options resolution uses.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Maximum `extends` chain length.
const MAX_EXTENDS_DEPTH: usize = 8;

/// Errors loading a TypeScript project config.
#[derive(Debug, thiserror::Error)]
pub enum TsConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("tsconfig extends chain starting at {path} is too deep or cyclic")]
    ExtendsDepth { path: PathBuf },
}

/// The resolution-relevant part of a TypeScript project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsConfig {
    /// The `tsconfig.json` this was loaded from.
    pub path: PathBuf,
    /// `compilerOptions.baseUrl`, absolute.
    pub base_url: Option<PathBuf>,
    /// `compilerOptions.paths` patterns and their targets.
    pub paths: BTreeMap<String, Vec<String>>,
    /// Directory `paths` targets are relative to: `baseUrl` when set,
    /// otherwise the directory of the config declaring `paths`.
    pub paths_base: PathBuf,
}

impl TsConfig {
    #[must_use]
    pub fn has_paths(&self) -> bool {
        !self.paths.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTsConfig {
    #[serde(default)]
    extends: Option<String>,
    #[serde(default)]
    compiler_options: RawCompilerOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompilerOptions {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    paths: Option<BTreeMap<String, Vec<String>>>,
}

/// Nearest `tsconfig.json` at or above `start`.
#[must_use]
pub fn find_tsconfig(start: &Path) -> Option<PathBuf> {
    mdxp_util::fs::find_up(start, "tsconfig.json")
}

/// Find and load the project config for a document directory.
///
/// A config that fails to load is logged and treated as absent.
#[must_use]
pub fn discover_tsconfig(start: &Path) -> Option<TsConfig> {
    let path = find_tsconfig(start)?;
    match load_tsconfig(&path) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), paths = config.paths.len(), "loaded tsconfig");
            Some(config)
        }
        Err(err) => {
            tracing::warn!(error = %err, "ignoring tsconfig");
            None
        }
    }
}

/// Load a `tsconfig.json`, following relative `extends` chains.
pub fn load_tsconfig(path: &Path) -> Result<TsConfig, TsConfigError> {
    let mut base_url: Option<PathBuf> = None;
    let mut paths: Option<(BTreeMap<String, Vec<String>>, PathBuf)> = None;

    let mut current = Some(path.to_path_buf());
    let mut depth = 0;
    while let Some(file) = current.take() {
        depth += 1;
        if depth > MAX_EXTENDS_DEPTH {
            return Err(TsConfigError::ExtendsDepth {
                path: path.to_path_buf(),
            });
        }

        let raw = read_raw(&file)?;
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();

        // Options of the extending config win, so only fill what is unset.
        if base_url.is_none() {
            base_url = raw.compiler_options.base_url.map(|b| dir.join(b));
        }
        if paths.is_none() {
            paths = raw.compiler_options.paths.map(|p| (p, dir.clone()));
        }

        current = raw.extends.and_then(|ext| extends_path(&dir, &ext));
    }

    let (paths, paths_dir) = paths.unwrap_or_default();
    let paths_base = base_url
        .clone()
        .or(Some(paths_dir).filter(|d| !d.as_os_str().is_empty()))
        .or_else(|| path.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    Ok(TsConfig {
        path: path.to_path_buf(),
        base_url,
        paths,
        paths_base,
    })
}

fn read_raw(path: &Path) -> Result<RawTsConfig, TsConfigError> {
    let text = mdxp_util::fs::read_to_string_lossy(path).map_err(|source| TsConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = mdxp_util::jsonc::strip(&text);
    if text.trim().is_empty() {
        return Ok(RawTsConfig::default());
    }
    serde_json::from_str(&text).map_err(|source| TsConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve an `extends` value. Only path-like values are followed.
fn extends_path(dir: &Path, value: &str) -> Option<PathBuf> {
    if !(value.starts_with('.') || Path::new(value).is_absolute()) {
        tracing::debug!(extends = value, "not following package tsconfig extends");
        return None;
    }
    let target = dir.join(value);
    if target.is_file() {
        return Some(target);
    }
    let with_json = PathBuf::from(format!("{}.json", target.display()));
    with_json.is_file().then_some(with_json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_url_and_comments() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{
  // project options
  "compilerOptions": {
    "baseUrl": "./src",
    "paths": { "@/*": ["*"], "ui": ["components/ui/index.ts"], },
  },
}"#,
        )
        .unwrap();

        let config = load_tsconfig(&dir.path().join("tsconfig.json")).unwrap();
        assert_eq!(config.base_url, Some(dir.path().join("./src")));
        assert_eq!(config.paths_base, dir.path().join("./src"));
        assert_eq!(config.paths["@/*"], vec!["*".to_string()]);
        assert!(config.has_paths());
    }

    #[test]
    fn test_extends_chain() {
        let dir = tempdir().unwrap();
        let configs = dir.path().join("configs");
        fs::create_dir(&configs).unwrap();
        fs::write(
            configs.join("base.json"),
            r#"{"compilerOptions": {"paths": {"~/*": ["../src/*"]}}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{"extends": "./configs/base", "compilerOptions": {"strict": true}}"#,
        )
        .unwrap();

        let config = load_tsconfig(&dir.path().join("tsconfig.json")).unwrap();
        assert!(config.base_url.is_none());
        assert_eq!(config.paths_base, configs);
        assert!(config.paths.contains_key("~/*"));
    }

    #[test]
    fn test_cyclic_extends_errors() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("tsconfig.json"), r#"{"extends": "./tsconfig.json"}"#).unwrap();
        let err = load_tsconfig(&dir.path().join("tsconfig.json")).unwrap_err();
        assert!(matches!(err, TsConfigError::ExtendsDepth { .. }));
    }

    #[test]
    fn test_discover_walks_up_and_tolerates_errors() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();
        let config = discover_tsconfig(&nested).unwrap();
        assert_eq!(config.path, dir.path().join("tsconfig.json"));
        assert!(!config.has_paths());

        fs::write(dir.path().join("tsconfig.json"), "{ broken").unwrap();
        assert!(discover_tsconfig(&nested).is_none());
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;

/// File names searched for preview settings, in priority order per directory.
pub const CONFIG_FILE_NAMES: &[&str] = &[".mdxp.json", "mdxp.config.json"];

/// Content security policy applied under [`SecurityPolicy::Strict`].
pub const STRICT_CSP: &str = "default-src 'none'; connect-src vscode-resource: https:; img-src vscode-resource: https:; script-src vscode-resource: 'unsafe-inline';style-src vscode-resource: 'unsafe-inline' http: https: data:;";

/// Runtime configuration for the mdxp CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// How much the preview surface is locked down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityPolicy {
    /// Restrictive content security policy.
    #[default]
    Strict,
    /// No content security policy at all.
    Disabled,
}

impl SecurityPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Disabled => "disabled",
        }
    }

    /// The CSP header value for this policy; empty when disabled.
    #[must_use]
    pub fn content_security_policy(&self) -> &'static str {
        match self {
            Self::Strict => STRICT_CSP,
            Self::Disabled => "",
        }
    }
}

impl std::str::FromStr for SecurityPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "disabled" => Ok(Self::Disabled),
            other => Err(Error::other(format!("unknown security policy: {other}"))),
        }
    }
}

/// Preview settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewConfig {
    /// Use unsaved editor buffers instead of on-disk contents.
    pub preview_on_change: bool,
    /// Wrap markup without a default export in the built-in themed layout.
    pub use_vscode_markdown_styles: bool,
    /// Force the light theme of the built-in layout.
    pub use_white_background: bool,
    /// Layout component injected into markup without a default export.
    /// Empty means none.
    pub custom_layout_file_path: String,
    pub security_policy: SecurityPolicy,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            preview_on_change: true,
            use_vscode_markdown_styles: true,
            use_white_background: false,
            custom_layout_file_path: String::new(),
            security_policy: SecurityPolicy::default(),
        }
    }
}

impl PreviewConfig {
    /// Custom layout path, if configured.
    #[must_use]
    pub fn custom_layout(&self) -> Option<&Path> {
        let trimmed = self.custom_layout_file_path.trim();
        (!trimmed.is_empty()).then(|| Path::new(trimmed))
    }

    #[must_use]
    pub fn content_security_policy(&self) -> &'static str {
        self.security_policy.content_security_policy()
    }
}

/// Find the nearest settings file walking up from `start`.
#[must_use]
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_FILE_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        dir = current.parent();
    }
    None
}

/// Parse a settings file. Comments and trailing commas are accepted.
pub fn read_config(path: &Path) -> Result<PreviewConfig, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&mdxp_util::jsonc::strip(&text)).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Discover and parse the nearest settings file.
///
/// Returns `Ok(None)` when no settings file exists above `start`.
pub fn load_config(start: &Path) -> Result<Option<(PathBuf, PreviewConfig)>, Error> {
    match find_config(start) {
        Some(path) => {
            let config = read_config(&path)?;
            tracing::debug!(path = %path.display(), "loaded preview config");
            Ok(Some((path, config)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PreviewConfig::default();
        assert!(config.preview_on_change);
        assert!(config.use_vscode_markdown_styles);
        assert!(!config.use_white_background);
        assert!(config.custom_layout().is_none());
        assert_eq!(config.content_security_policy(), STRICT_CSP);
    }

    #[test]
    fn test_partial_camel_case_file() {
        let config: PreviewConfig =
            serde_json::from_str(r#"{ "useWhiteBackground": true, "securityPolicy": "disabled" }"#)
                .unwrap();
        assert!(config.use_white_background);
        assert!(config.preview_on_change);
        assert_eq!(config.security_policy, SecurityPolicy::Disabled);
        assert_eq!(config.content_security_policy(), "");
    }

    #[test]
    fn test_load_config_walks_up() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("docs/guide");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            dir.path().join(".mdxp.json"),
            "{\n  // layout for docs\n  \"customLayoutFilePath\": \"layouts/Doc.js\",\n}",
        )
        .unwrap();

        let (path, config) = load_config(&nested).unwrap().unwrap();
        assert_eq!(path, dir.path().join(".mdxp.json"));
        assert_eq!(config.custom_layout(), Some(Path::new("layouts/Doc.js")));
    }

    #[test]
    fn test_load_config_missing_and_invalid() {
        let dir = tempdir().unwrap();
        assert!(load_config(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join("mdxp.config.json"), "{ nope").unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_security_policy_from_str() {
        assert_eq!("strict".parse::<SecurityPolicy>().unwrap(), SecurityPolicy::Strict);
        assert!("lax".parse::<SecurityPolicy>().is_err());
    }
}

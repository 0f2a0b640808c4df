pub mod check;
pub mod fetch;
pub mod preview;
pub mod version;

use mdxp_core::config::load_config;
use mdxp_core::{Document, Fetcher, LiveBuffers, PreviewConfig, PreviewSink, Sandbox, SecurityPolicy, Session};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Preview settings that override the settings file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Ignore unsaved buffers and always read from disk
    #[arg(long)]
    pub no_live: bool,

    /// Do not wrap markup in the built-in themed layout
    #[arg(long)]
    pub no_markdown_styles: bool,

    /// Force the light theme of the built-in layout
    #[arg(long)]
    pub white_background: bool,

    /// Layout component for markup without a default export
    #[arg(long, value_name = "FILE")]
    pub layout: Option<PathBuf>,

    /// Content security policy of the preview (strict or disabled)
    #[arg(long, value_name = "POLICY")]
    pub security_policy: Option<SecurityPolicy>,
}

impl ConfigArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, mut config: PreviewConfig) -> PreviewConfig {
        if self.no_live {
            config.preview_on_change = false;
        }
        if self.no_markdown_styles {
            config.use_vscode_markdown_styles = false;
        }
        if self.white_background {
            config.use_white_background = true;
        }
        if let Some(layout) = &self.layout {
            config.custom_layout_file_path = layout.display().to_string();
        }
        if let Some(policy) = self.security_policy {
            config.security_policy = policy;
        }
        config
    }
}

/// Make `path` absolute against `cwd`.
pub fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Settings for a document: the nearest settings file, then the flags.
pub fn preview_config(document: &Path, overrides: &ConfigArgs) -> Result<PreviewConfig> {
    let start = document.parent().unwrap_or(document);
    let base = match load_config(start).into_diagnostic()? {
        Some((path, config)) => {
            tracing::info!(path = %path.display(), "using settings file");
            config
        }
        None => PreviewConfig::default(),
    };
    Ok(overrides.apply(base))
}

/// A session and fetcher for one document.
pub struct Host {
    pub session: Arc<Session>,
    pub fetcher: Fetcher,
    pub document_path: PathBuf,
}

/// Open `file` for preview with the given workspace folders.
pub fn open_host(
    cwd: &Path,
    file: &Path,
    workspaces: &[PathBuf],
    overrides: &ConfigArgs,
    buffers: Arc<dyn LiveBuffers>,
    sink: Arc<dyn PreviewSink>,
) -> Result<Host> {
    let document_path = absolute(cwd, file);
    let text = mdxp_util::fs::read_to_string_lossy(&document_path)
        .map_err(|e| miette::miette!("cannot read {}: {e}", document_path.display()))?;

    let roots: Vec<PathBuf> = if workspaces.is_empty() {
        vec![cwd.to_path_buf()]
    } else {
        workspaces.iter().map(|w| absolute(cwd, w)).collect()
    };

    let config = preview_config(&document_path, overrides)?;
    let document = Document::from_path(&document_path, text).into_diagnostic()?;
    let session = Arc::new(Session::new(document, config, roots.first().cloned()));

    let sandbox = Arc::new(Sandbox::new(&roots));
    tracing::debug!(roots = ?sandbox.roots(), "workspace folders");
    if let Some(entry_dir) = session.snapshot().entry_dir.as_deref() {
        if sandbox.root_for(entry_dir).is_none() {
            tracing::warn!(
                entry_dir = %entry_dir.display(),
                "document is outside every workspace folder, module fetches will be denied"
            );
        }
    }

    Ok(Host {
        session,
        fetcher: Fetcher::new(sandbox, buffers, sink),
        document_path: mdxp_util::fs::canonicalize_or_keep(&document_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_args_override_only_given_flags() {
        let args = ConfigArgs {
            white_background: true,
            security_policy: Some(SecurityPolicy::Disabled),
            ..ConfigArgs::default()
        };
        let config = args.apply(PreviewConfig::default());
        assert!(config.use_white_background);
        assert!(config.preview_on_change);
        assert!(config.use_vscode_markdown_styles);
        assert_eq!(config.security_policy, SecurityPolicy::Disabled);
    }

    #[test]
    fn test_flags_win_over_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".mdxp.json"),
            r#"{ "previewOnChange": true, "useVscodeMarkdownStyles": false }"#,
        )
        .unwrap();
        let doc = dir.path().join("doc.mdx");
        let args = ConfigArgs {
            no_live: true,
            ..ConfigArgs::default()
        };
        let config = preview_config(&doc, &args).unwrap();
        assert!(!config.preview_on_change);
        assert!(!config.use_vscode_markdown_styles);
    }
}

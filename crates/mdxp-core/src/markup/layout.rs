//! Layout injection for markup documents without a default export.

use std::path::{Path, PathBuf};

use super::default_export::strip_front_matter;
use crate::config::PreviewConfig;

/// Inputs of the layout precedence rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Explicit layout component file. Relative paths are taken from the
    /// document directory.
    pub custom_layout: Option<PathBuf>,
    /// Directory of the previewed document; `None` for untitled buffers.
    pub document_dir: Option<PathBuf>,
    pub use_vscode_markdown_styles: bool,
    pub use_white_background: bool,
}

impl LayoutOptions {
    #[must_use]
    pub fn from_config(config: &PreviewConfig, document_dir: Option<&Path>) -> Self {
        Self {
            custom_layout: config.custom_layout().map(Path::to_path_buf),
            document_dir: document_dir.map(Path::to_path_buf),
            use_vscode_markdown_styles: config.use_vscode_markdown_styles,
            use_white_background: config.use_white_background,
        }
    }
}

/// Insert the layout chosen by precedence: custom layout, then the
/// built-in themed layout, then nothing.
///
/// The layout block goes after any front matter so the document still
/// starts with it.
#[must_use]
pub fn inject_layout(text: &str, options: &LayoutOptions) -> String {
    match layout_block(options) {
        Some(block) => {
            let body = strip_front_matter(text);
            let front_matter = &text[..text.len() - body.len()];
            if front_matter.is_empty() {
                format!("{block}{body}")
            } else {
                format!("{front_matter}\n{block}{body}")
            }
        }
        None => text.to_string(),
    }
}

fn layout_block(options: &LayoutOptions) -> Option<String> {
    if let Some(custom) = &options.custom_layout {
        let Some(document_dir) = &options.document_dir else {
            tracing::warn!(
                layout = %custom.display(),
                "custom layout needs a saved document, leaving markup unwrapped"
            );
            return None;
        };
        let absolute = if custom.is_absolute() {
            custom.clone()
        } else {
            document_dir.join(custom)
        };
        let relative = mdxp_util::path::relative_to(&absolute, document_dir)
            .to_string_lossy()
            .replace('\\', "/");
        return Some(format!(
            "import Layout from './{relative}';\n\nexport default Layout;\n\n"
        ));
    }

    if options.use_vscode_markdown_styles {
        let layout_options = if options.use_white_background {
            "{ forceLightTheme: true }"
        } else {
            "{}"
        };
        return Some(format!(
            "import {{ createLayout }} from 'vscode-markdown-layout';\n\nexport default createLayout({layout_options});\n\n"
        ));
    }

    None
}

//! Markup (Markdown/MDX) documents.
//!
//! A markup document goes through three steps: a layout is injected when
//! the document has no `export default` of its own, the markup is compiled
//! into a JSX module, and that module is wrapped with the imports the
//! preview runtime expects.

pub mod default_export;
pub mod layout;
pub mod mdx;

pub use default_export::has_default_export;
pub use layout::{inject_layout, LayoutOptions};

/// Errors from compiling markup.
#[derive(Debug, thiserror::Error)]
pub enum MarkupError {
    #[error("failed to parse markup: {0}")]
    Parse(String),

    #[error("markup can only contain one `export default`")]
    MultipleDefaultExports,
}

/// Markup dialect, chosen by file extension or document language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkupFlavor {
    #[default]
    Mdx,
    /// `.md`: raw HTML is allowed and braces are plain text.
    Markdown,
}

impl MarkupFlavor {
    #[must_use]
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("md") => Self::Markdown,
            _ => Self::Mdx,
        }
    }
}

/// How a compiled document is used by the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupRole {
    /// The previewed document: rendered into the preview root.
    Entry,
    /// A markup file imported by another module.
    Dependency,
}

const ENTRY_PRELUDE: &str = "import React from 'react';\nimport ReactDOM from 'react-dom';\nimport { MDXTag } from '@mdx-js/tag';\n";
const DEPENDENCY_PRELUDE: &str = "import React from 'react';\nimport { MDXTag } from '@mdx-js/tag';\n";
const ENTRY_RENDER: &str = "\nReactDOM.render(<MDXContent></MDXContent>, document.getElementById('vscode-mdx-preview_root'));";

/// Compile a markup document into a JSX module for `role`.
///
/// The result still contains JSX and ESM; the script chain lowers it.
pub fn transpile_markup(
    text: &str,
    flavor: MarkupFlavor,
    role: MarkupRole,
    layout: &LayoutOptions,
) -> Result<String, MarkupError> {
    let text = text.replace("\r\n", "\n");
    let source = if has_default_export(&text) {
        text
    } else {
        inject_layout(&text, layout)
    };
    let compiled = match flavor {
        MarkupFlavor::Mdx => mdx::compile(&source)?,
        MarkupFlavor::Markdown => mdx::compile_markdown(&source)?,
    };
    Ok(wrap(&compiled, role))
}

fn wrap(compiled: &str, role: MarkupRole) -> String {
    match role {
        MarkupRole::Entry => format!("{ENTRY_PRELUDE}{compiled}{ENTRY_RENDER}"),
        MarkupRole::Dependency => format!("{DEPENDENCY_PRELUDE}{compiled}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_wrap() {
        let out = transpile_markup("# Hi", MarkupFlavor::Mdx, MarkupRole::Entry, &LayoutOptions::default()).unwrap();
        assert!(out.starts_with(ENTRY_PRELUDE));
        assert!(out.ends_with(ENTRY_RENDER));
        assert!(out.contains("name=\"h1\""));
    }

    #[test]
    fn test_dependency_wrap_has_no_render() {
        let out =
            transpile_markup("# Hi", MarkupFlavor::Mdx, MarkupRole::Dependency, &LayoutOptions::default()).unwrap();
        assert!(out.starts_with(DEPENDENCY_PRELUDE));
        assert!(!out.contains("ReactDOM"));
    }

    #[test]
    fn test_markdown_styles_layout_injected() {
        let options = LayoutOptions {
            use_vscode_markdown_styles: true,
            use_white_background: true,
            ..LayoutOptions::default()
        };
        let out = transpile_markup("Hello", MarkupFlavor::Mdx, MarkupRole::Dependency, &options).unwrap();
        assert!(out.contains("import { createLayout } from 'vscode-markdown-layout';"));
        assert!(out.contains("const MDXLayout = createLayout({ forceLightTheme: true });"));
        assert!(out.contains("this.layout = MDXLayout;"));
    }

    #[test]
    fn test_own_default_export_wins() {
        let options = LayoutOptions {
            use_vscode_markdown_styles: true,
            ..LayoutOptions::default()
        };
        let out = transpile_markup(
            "import L from './L'\n\nexport default L\n\nHello",
            MarkupFlavor::Mdx,
            MarkupRole::Dependency,
            &options,
        )
        .unwrap();
        assert!(!out.contains("createLayout"));
        assert!(out.contains("const MDXLayout = L"));
    }

    #[test]
    fn test_layout_keeps_front_matter() {
        let options = LayoutOptions {
            use_vscode_markdown_styles: true,
            ..LayoutOptions::default()
        };
        let out = transpile_markup(
            "---\r\ntitle: x\r\n---\r\n\r\n# FM",
            MarkupFlavor::Mdx,
            MarkupRole::Dependency,
            &options,
        )
        .unwrap();
        assert!(!out.contains("name=\"hr\""));
        assert!(!out.contains("title: x"));
        assert!(out.contains("const MDXLayout = createLayout({});"));
        assert!(out.contains("<MDXTag name=\"h1\" components={components}>{`FM`}</MDXTag>"));
    }

    #[test]
    fn test_markdown_flavor_by_extension() {
        assert_eq!(MarkupFlavor::from_path(std::path::Path::new("a.MD")), MarkupFlavor::Markdown);
        assert_eq!(MarkupFlavor::from_path(std::path::Path::new("a.mdx")), MarkupFlavor::Mdx);
        let out = transpile_markup(
            "<!-- note -->\n\nHello",
            MarkupFlavor::Markdown,
            MarkupRole::Dependency,
            &LayoutOptions::default(),
        )
        .unwrap();
        assert!(out.contains("{`Hello`}"));
    }
}

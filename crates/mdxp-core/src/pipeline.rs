//! Transform stage: markup compile, then the script chain.
//!
//! The entry document and its dependencies differ only in the markup wrap
//! and in the dependency-directory rule; both end in the same chain.

use std::path::Path;
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::compiler::{CompilerError, TranspileChain, TranspileSpec};
use crate::markup::{transpile_markup, LayoutOptions, MarkupError, MarkupFlavor, MarkupRole};
use crate::session::{Document, Language};

/// Errors from the transform stage.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error(transparent)]
    Compile(#[from] CompilerError),
}

/// Whether text contains ES module syntax at a statement start.
///
/// Files inside dependency directories are only transformed when this
/// matches; CommonJS packages pass through untouched.
#[must_use]
pub fn looks_like_es_module(text: &str) -> bool {
    static ESM: OnceLock<Option<Regex>> = OnceLock::new();
    ESM.get_or_init(|| Regex::new(r"(?m)(;|^)(import|export)(\s|\{)").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

/// Transform the previewed document's text.
pub fn transform_entry(
    chain: &TranspileChain,
    document: &Document,
    text: &str,
    layout: &LayoutOptions,
) -> Result<String, TransformError> {
    let input_path = document
        .file_path()
        .unwrap_or_else(|| Path::new(document.uri.path()).to_path_buf());

    let code = if document.needs_markup() {
        let flavor = if document.language == Language::Markdown {
            MarkupFlavor::Markdown
        } else {
            MarkupFlavor::Mdx
        };
        transpile_markup(text, flavor, MarkupRole::Entry, layout)?
    } else {
        text.to_string()
    };

    let spec = TranspileSpec::new(input_path);
    Ok(chain.transpile(&spec, &code)?.code)
}

/// Transform a dependency module read from `path`.
pub fn transform_dependency(
    chain: &TranspileChain,
    path: &Path,
    text: &str,
    markup: bool,
    layout: &LayoutOptions,
) -> Result<String, TransformError> {
    let code = if markup {
        transpile_markup(text, MarkupFlavor::from_path(path), MarkupRole::Dependency, layout)?
    } else {
        text.to_string()
    };

    if mdxp_util::path::in_dependency_dir(path) && !looks_like_es_module(&code) {
        tracing::trace!(path = %path.display(), "passing CommonJS dependency through");
        return Ok(code);
    }

    tracing::debug!(path = %path.display(), "transpiling");
    let output = chain.transpile(&TranspileSpec::new(path), &code)?;
    for diagnostic in &output.diagnostics {
        tracing::trace!(
            path = %path.display(),
            strategy = ?diagnostic.code,
            message = %diagnostic.message,
            "earlier strategy failed"
        );
    }
    Ok(output.code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_es_module_detection() {
        assert!(looks_like_es_module("import React from 'react'"));
        assert!(looks_like_es_module("'use strict';export{a}"));
        assert!(looks_like_es_module("\nexport default 1"));
        assert!(!looks_like_es_module("module.exports = require('./x');"));
        assert!(!looks_like_es_module("const reimport = 1; exports.x = 2;"));
    }

    #[test]
    fn test_dependency_dir_commonjs_passes_through() {
        let chain = TranspileChain::standard();
        let path = PathBuf::from("/w/node_modules/pkg/index.js");
        let text = "module.exports = function () { return 1 < 2; };";
        let out =
            transform_dependency(&chain, &path, text, false, &LayoutOptions::default()).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_dependency_dir_esm_is_transformed() {
        let chain = TranspileChain::standard();
        let path = PathBuf::from("/w/node_modules/pkg/index.js");
        let out = transform_dependency(
            &chain,
            &path,
            "export const a = 1;",
            false,
            &LayoutOptions::default(),
        )
        .unwrap();
        assert!(out.contains("exports"));
        assert!(!out.contains("export const"));
    }

    #[test]
    fn test_markup_dependency() {
        let chain = TranspileChain::standard();
        let out = transform_dependency(
            &chain,
            Path::new("/w/docs/intro.mdx"),
            "# Intro",
            true,
            &LayoutOptions::default(),
        )
        .unwrap();
        assert!(out.contains("var React = _interopDefault(require('react'));"));
        assert!(out.contains("React.createElement(MDXTag"));
        assert!(!out.contains("ReactDOM"));
    }

    #[test]
    fn test_untitled_entry_is_markup() {
        let chain = TranspileChain::standard();
        let doc = Document::untitled("Untitled-1", "").unwrap();
        let out = transform_entry(&chain, &doc, "Hello *world*", &LayoutOptions::default()).unwrap();
        assert!(out.contains("var ReactDOM = _interopDefault(require('react-dom'));"));
        assert!(out.contains("ReactDOM.render(React.createElement(MDXContent, null)"));
    }
}

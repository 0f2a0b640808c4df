//! Module classification by file extension.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a fetched module is delivered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Transformed script code.
    Script,
    /// `module.exports = <json>`.
    Json,
    /// Raw stylesheet in `css`, empty code.
    Css,
    /// `module.exports = "<resource url>"`.
    Binary,
    /// Stand-in module with no behavior.
    NoopShim,
}

impl PayloadKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Json => "json",
            Self::Css => "css",
            Self::Binary => "binary",
            Self::NoopShim => "noop_shim",
        }
    }
}

/// Result of classifying a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: PayloadKind,
    /// Script that must go through the markup compiler first.
    pub markup: bool,
}

const BINARY_EXTENSIONS: &[&str] = &["gif", "png", "jpg", "jpeg", "svg"];

/// Classify `path` by its extension (ASCII case-insensitive).
#[must_use]
pub fn classify(path: &Path) -> Classification {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (kind, markup) = match ext.as_str() {
        "json" => (PayloadKind::Json, false),
        "css" => (PayloadKind::Css, false),
        e if BINARY_EXTENSIONS.contains(&e) => (PayloadKind::Binary, false),
        "md" | "mdx" => (PayloadKind::Script, true),
        _ => (PayloadKind::Script, false),
    };
    Classification { kind, markup }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify(Path::new("a/data.JSON")).kind, PayloadKind::Json);
        assert_eq!(classify(Path::new("style.css")).kind, PayloadKind::Css);
        for image in ["a.gif", "a.PNG", "a.jpg", "a.jpeg", "a.svg"] {
            assert_eq!(classify(Path::new(image)).kind, PayloadKind::Binary, "{image}");
        }
        assert_eq!(classify(Path::new("a.webp")).kind, PayloadKind::Script);
    }

    #[test]
    fn test_markup_flag() {
        let doc = classify(Path::new("Readme.MDX"));
        assert_eq!(doc.kind, PayloadKind::Script);
        assert!(doc.markup);
        assert!(classify(Path::new("notes.md")).markup);
        assert!(!classify(Path::new("app.tsx")).markup);
        assert!(!classify(Path::new("Makefile")).markup);
    }
}

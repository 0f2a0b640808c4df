//! Transpilation specification types.
//!
//! A `TranspileSpec` captures every option a strategy needs, so the same
//! spec and source always produce the same output. Output is always a
//! CommonJS module with classic `React.createElement` JSX, which is what
//! the preview evaluator runs.

use std::path::{Path, PathBuf};

/// Source dialect, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceSyntax {
    /// JavaScript with JSX allowed anywhere (`.js`, `.jsx`, `.mjs`, compiled markup).
    JavaScript,
    /// TypeScript without JSX (`.ts`, `.mts`, `.cts`).
    TypeScript,
    /// TypeScript with JSX (`.tsx`).
    Tsx,
}

impl SourceSyntax {
    /// Pick the dialect for a path by extension, ASCII case-insensitive.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("ts" | "mts" | "cts") => Self::TypeScript,
            Some("tsx") => Self::Tsx,
            _ => Self::JavaScript,
        }
    }

    #[must_use]
    pub fn is_typescript(self) -> bool {
        matches!(self, Self::TypeScript | Self::Tsx)
    }

    #[must_use]
    pub fn allows_jsx(self) -> bool {
        matches!(self, Self::JavaScript | Self::Tsx)
    }
}

/// A failure reported by one strategy of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Strategy-specific code, if any.
    pub code: Option<String>,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Diagnostic {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    /// Set the diagnostic code (usually the strategy name).
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, file: PathBuf, line: u32, column: u32) -> Self {
        self.file = Some(file);
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

/// Everything a strategy needs to know besides the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranspileSpec {
    /// Path of the module being transformed (used for dialect and messages).
    pub input_path: PathBuf,
    pub syntax: SourceSyntax,
}

impl TranspileSpec {
    /// Spec for `input_path` with the dialect derived from its extension.
    #[must_use]
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        let input_path = input_path.into();
        let syntax = SourceSyntax::for_path(&input_path);
        Self { input_path, syntax }
    }
}

/// Output from a successful transpilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOutput {
    pub code: String,
    /// Name of the strategy that produced the output.
    pub strategy: &'static str,
    /// Errors of strategies that were tried before the successful one.
    pub diagnostics: Vec<Diagnostic>,
}

impl TranspileOutput {
    #[must_use]
    pub fn new(code: impl Into<String>, strategy: &'static str) -> Self {
        Self {
            code: code.into(),
            strategy,
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

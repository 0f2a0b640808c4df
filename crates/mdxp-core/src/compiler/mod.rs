//! Script transpilation.
//!
//! Every strategy implements [`CompilerBackend`]; a [`TranspileChain`] tries
//! them in order and keeps the first success. Nothing outside this module
//! talks to a concrete strategy directly.
//!
//! ## Usage
//!
//! ```ignore
//! use mdxp_core::compiler::{TranspileChain, TranspileSpec};
//!
//! let chain = TranspileChain::standard();
//! let output = chain.transpile(&TranspileSpec::new("src/App.jsx"), source)?;
//! println!("{} via {}", output.code, output.strategy);
//! ```

pub mod chain;
pub mod cjs;
pub mod fast;
pub mod jsx;
pub mod lexer;
pub mod spec;
pub mod swc;

pub use chain::TranspileChain;
pub use fast::FastBackend;
pub use spec::{Diagnostic, SourceSyntax, TranspileOutput, TranspileSpec};
pub use swc::SwcBackend;

use std::fmt;

/// Error during compilation.
#[derive(Debug)]
pub struct CompilerError {
    /// Error code.
    pub code: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// Compiler diagnostics (if available).
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilerError {
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new("COMPILER_PARSE_ERROR", message)
    }

    #[must_use]
    pub fn transform_error(message: impl Into<String>) -> Self {
        Self::new("COMPILER_TRANSFORM_ERROR", message)
    }

    /// The strategy does not handle this input at all.
    #[must_use]
    pub fn unsupported_file(message: impl Into<String>) -> Self {
        Self::new("COMPILER_UNSUPPORTED_FILE", message)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for diag in &self.diagnostics {
            write!(f, "\n  - error")?;
            if let Some(code) = &diag.code {
                write!(f, " [{code}]")?;
            }
            write!(f, ": {}", diag.message)?;
            if let (Some(file), Some(line), Some(col)) = (&diag.file, diag.line, diag.column) {
                write!(f, " at {}:{}:{}", file.display(), line, col)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CompilerError {}

/// Compiler backend trait for transpilation.
///
/// The trait is `Send + Sync` so one chain can serve concurrent fetches.
///
/// ## Implementations
///
/// - `FastBackend` - syntax-only JSX lowering and module rewriting
/// - `SwcBackend` - full parse and transform through SWC (`swc` feature)
pub trait CompilerBackend: Send + Sync {
    /// Strategy name used in logs and failure reports (e.g. "fast", "swc").
    fn name(&self) -> &'static str;

    /// Transpile `source` according to `spec`.
    ///
    /// # Errors
    ///
    /// Returns a `CompilerError` if:
    /// - The source code has syntax errors
    /// - The transformation fails
    /// - The strategy declines the input (`COMPILER_UNSUPPORTED_FILE`)
    fn transpile(&self, spec: &TranspileSpec, source: &str) -> Result<TranspileOutput, CompilerError>;
}

/// 1-based line and column of a byte offset.
pub(crate) fn line_col(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = &source.as_bytes()[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count() + 1;
    let line_start = before.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    let column = offset - line_start + 1;
    (
        u32::try_from(line).unwrap_or(u32::MAX),
        u32::try_from(column).unwrap_or(u32::MAX),
    )
}

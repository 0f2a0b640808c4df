//! Syntax-only transpile strategy.
//!
//! Lowers JSX and rewrites module syntax without building an AST. It covers
//! the JavaScript that previews usually contain and declines anything it
//! cannot handle, leaving it to the next strategy in the chain.

use super::{
    cjs, jsx,
    lexer::{ScanError, Scanner, TokenKind},
    line_col, CompilerBackend, CompilerError, Diagnostic,
    TranspileOutput, TranspileSpec,
};

/// In-crate scanner based backend.
#[derive(Debug, Clone, Default)]
pub struct FastBackend {
    _private: (),
}

impl FastBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn scan_error(spec: &TranspileSpec, source: &str, err: &ScanError) -> CompilerError {
        let (line, column) = line_col(source, err.offset);
        CompilerError::parse_error(err.message.clone()).with_diagnostics(vec![Diagnostic::error(
            err.message.clone(),
        )
        .with_location(spec.input_path.clone(), line, column)])
    }
}

/// Offset of the first decorator `@` outside strings, comments and
/// templates. Run on JSX-lowered code so JSX text is already quoted.
fn find_decorator(source: &str) -> Result<Option<usize>, ScanError> {
    let mut scanner = Scanner::new(source);
    while let Some(token) = scanner.next_token()? {
        if token.kind == TokenKind::Punct && scanner.text(&token) == "@" {
            return Ok(Some(token.start));
        }
    }
    Ok(None)
}

impl CompilerBackend for FastBackend {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn transpile(
        &self,
        spec: &TranspileSpec,
        source: &str,
    ) -> Result<TranspileOutput, CompilerError> {
        if spec.syntax.is_typescript() {
            return Err(CompilerError::unsupported_file(
                "TypeScript needs a type-stripping strategy",
            ));
        }

        let lowered = if spec.syntax.allows_jsx() {
            jsx::lower(source).map_err(|e| Self::scan_error(spec, source, &e))?
        } else {
            source.to_string()
        };

        if let Some(offset) =
            find_decorator(&lowered).map_err(|e| Self::scan_error(spec, &lowered, &e))?
        {
            let (line, column) = line_col(&lowered, offset);
            tracing::trace!(line, column, "decorator found, declining");
            return Err(CompilerError::unsupported_file(
                "decorators are not supported by the fast strategy",
            ));
        }

        let code =
            cjs::to_commonjs(&lowered).map_err(|e| Self::scan_error(spec, &lowered, &e))?;

        Ok(TranspileOutput::new(code, self.name()))
    }
}

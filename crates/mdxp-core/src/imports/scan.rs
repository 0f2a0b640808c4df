//! Token-based dependency scanner.
//!
//! Finds `import ... from`, side-effect imports, `export ... from`,
//! `require(...)` and `import(...)` without parsing the whole program.
//! Comments and string contents are skipped by the lexer.

use crate::compiler::lexer::{ScanError, Scanner, Token, TokenKind};

use super::{DependencyExtractor, ExtractedDependency};

/// Default extractor backed by the JavaScript scanner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanExtractor;

impl DependencyExtractor for ScanExtractor {
    fn extract(&self, text: &str) -> Vec<ExtractedDependency> {
        scan_dependencies(text)
    }
}

/// Scan `source` for module dependencies in source order.
///
/// Duplicates are kept. A scan error stops the scan; whatever was found
/// before it is returned.
#[must_use]
pub fn scan_dependencies(source: &str) -> Vec<ExtractedDependency> {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err((tokens, err)) => {
            tracing::debug!(error = %err, "dependency scan stopped early");
            tokens
        }
    };
    let walker = Walker { src: source, tokens };
    walker.run()
}

fn tokenize(source: &str) -> Result<Vec<Token>, (Vec<Token>, ScanError)> {
    let mut scanner = Scanner::new(source);
    let mut tokens = Vec::new();
    loop {
        match scanner.next_token() {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => return Ok(tokens),
            Err(err) => return Err((tokens, err)),
        }
    }
}

struct Walker<'a> {
    src: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Walker<'a> {
    fn text(&self, i: usize) -> &'a str {
        self.tokens
            .get(i)
            .map_or("", |t| &self.src[t.start..t.end])
    }

    fn kind(&self, i: usize) -> Option<TokenKind> {
        self.tokens.get(i).map(|t| t.kind)
    }

    fn is_punct(&self, i: usize, text: &str) -> bool {
        self.kind(i) == Some(TokenKind::Punct) && self.text(i) == text
    }

    fn after_dot(&self, i: usize) -> bool {
        i > 0 && matches!(self.text(i - 1), "." | "?.")
    }

    fn run(&self) -> Vec<ExtractedDependency> {
        let mut found = Vec::new();
        let mut i = 0;
        while i < self.tokens.len() {
            if self.kind(i) != Some(TokenKind::Ident) || self.after_dot(i) {
                i += 1;
                continue;
            }
            i = match self.text(i) {
                "import" => self.import(i, &mut found),
                "export" => self.export(i, &mut found),
                "require" if self.is_punct(i + 1, "(") => self.call(i + 1, &mut found),
                _ => i + 1,
            };
        }
        found
    }

    fn import(&self, i: usize, found: &mut Vec<ExtractedDependency>) -> usize {
        if self.is_punct(i + 1, "(") {
            return self.call(i + 1, found);
        }
        if self.is_punct(i + 1, ".") {
            // import.meta
            return i + 2;
        }
        if let Some(value) = self.literal(i + 1) {
            found.push(ExtractedDependency::Static(value));
            return i + 2;
        }
        self.from_clause(i + 1, found)
    }

    fn export(&self, i: usize, found: &mut Vec<ExtractedDependency>) -> usize {
        let mut j = i + 1;
        if self.is_punct(j, "{") {
            match self.matching_close(j) {
                Some(close) => j = close + 1,
                None => return j,
            }
        } else if self.is_punct(j, "*") {
            j += 1;
            if self.text(j) == "as" {
                j += 2;
            }
        } else {
            return j;
        }
        if self.text(j) == "from" {
            if let Some(value) = self.literal(j + 1) {
                found.push(ExtractedDependency::Static(value));
                return j + 2;
            }
        }
        j
    }

    /// Look for `from '<spec>'` before the statement ends.
    fn from_clause(&self, start: usize, found: &mut Vec<ExtractedDependency>) -> usize {
        let mut j = start;
        while j < self.tokens.len() && !self.is_punct(j, ";") {
            if self.kind(j) == Some(TokenKind::Ident) && self.text(j) == "from" {
                if let Some(value) = self.literal(j + 1) {
                    found.push(ExtractedDependency::Static(value));
                    return j + 2;
                }
            }
            let keyword = matches!(self.text(j), "import" | "export" | "require");
            if j > start && self.kind(j) == Some(TokenKind::Ident) && keyword {
                return j;
            }
            j += 1;
        }
        j
    }

    /// `open` is the `(` of a `require(` or `import(` call.
    fn call(&self, open: usize, found: &mut Vec<ExtractedDependency>) -> usize {
        let Some(close) = self.matching_close(open) else {
            found.push(ExtractedDependency::Unknown);
            return open + 1;
        };
        let mut last = close;
        if last > open + 1 && self.is_punct(last - 1, ",") {
            last -= 1;
        }
        match (last - open, self.literal(open + 1)) {
            (2, Some(value)) => found.push(ExtractedDependency::Static(value)),
            _ => found.push(ExtractedDependency::Unknown),
        }
        // Nested calls in the argument are scanned too.
        open + 1
    }

    fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for j in open..self.tokens.len() {
            if self.kind(j) != Some(TokenKind::Punct) {
                continue;
            }
            match self.text(j) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(j);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Value of a string literal or substitution-free template at `i`.
    fn literal(&self, i: usize) -> Option<String> {
        let text = self.text(i);
        match self.kind(i)? {
            TokenKind::Str => unquote(text),
            TokenKind::Template if !text.contains("${") => unquote(text),
            _ => None,
        }
    }
}

/// Decode a quoted JavaScript string literal.
fn unquote(literal: &str) -> Option<String> {
    let inner = literal.get(1..literal.len().checked_sub(1)?)?;
    if !inner.contains('\\') {
        return Some(inner.to_string());
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            '\n' => {}
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            'u' => {
                let rest = chars.as_str();
                let (hex, consumed) = if let Some(braced) = rest.strip_prefix('{') {
                    let end = braced.find('}')?;
                    (&braced[..end], end + 2)
                } else {
                    (rest.get(..4)?, 4)
                };
                out.push(char::from_u32(u32::from_str_radix(hex, 16).ok()?)?);
                chars = rest.get(consumed..)?.chars();
            }
            other => out.push(other),
        }
    }
    Some(out)
}

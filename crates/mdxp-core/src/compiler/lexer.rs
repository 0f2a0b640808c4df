//! Minimal JavaScript token scanner.
//!
//! Shared by the fast transpile strategy (JSX lowering, module rewriting)
//! and the dependency extractor. It knows just enough of the grammar to
//! step over strings, template literals, regular expressions and comments,
//! and to tell whether a `<` starts a JSX element.

use std::fmt;

/// Kind of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Template,
    Regex,
    Punct,
    /// A `<` in expression position while JSX scanning is enabled.
    /// The scanner does not consume it.
    JsxStart,
}

/// A token as a byte range into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// A line terminator appeared between the previous token and this one.
    pub newline_before: bool,
}

/// Scan failure: unterminated literal or unsupported construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub message: String,
    pub offset: usize,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for ScanError {}

/// Keywords after which an expression (and therefore a regex or JSX) may start.
const EXPR_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await", "extends", "default",
];

const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>",
];

/// Streaming scanner over a JavaScript source string.
pub struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    expr_allowed: bool,
    jsx: bool,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        let mut scanner = Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            expr_allowed: true,
            jsx: false,
        };
        if src.starts_with("#!") {
            scanner.pos = src.find('\n').unwrap_or(src.len());
        }
        scanner
    }

    /// Report `<` in expression position as [`TokenKind::JsxStart`].
    #[must_use]
    pub fn with_jsx(mut self, jsx: bool) -> Self {
        self.jsx = jsx;
        self
    }

    /// Start scanning at `pos` as if at the beginning of an expression.
    #[must_use]
    pub fn starting_at(mut self, pos: usize) -> Self {
        self.pos = pos;
        self
    }

    #[must_use]
    pub fn source(&self) -> &'a str {
        self.src
    }

    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Text of a token.
    #[must_use]
    pub fn text(&self, token: &Token) -> &'a str {
        &self.src[token.start..token.end]
    }

    /// Continue after an externally consumed expression (e.g. a JSX element)
    /// that ended at `pos`.
    pub fn resume_after_expression(&mut self, pos: usize) {
        self.pos = pos;
        self.expr_allowed = false;
    }

    /// Scan the next significant token, skipping whitespace and comments.
    pub fn next_token(&mut self) -> Result<Option<Token>, ScanError> {
        let newline_before = self.skip_trivia()?;
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }

        let start = self.pos;
        let b = self.bytes[start];
        let kind = match b {
            b'"' | b'\'' => {
                self.scan_string(b)?;
                TokenKind::Str
            }
            b'`' => {
                self.scan_template()?;
                TokenKind::Template
            }
            b'0'..=b'9' => {
                self.scan_number();
                TokenKind::Number
            }
            b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.scan_number();
                TokenKind::Number
            }
            b'/' if self.expr_allowed => {
                self.scan_regex()?;
                TokenKind::Regex
            }
            b'<' if self.jsx && self.expr_allowed => {
                return Ok(Some(Token {
                    kind: TokenKind::JsxStart,
                    start,
                    end: start,
                    newline_before,
                }));
            }
            b'#' | b'$' | b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                self.pos += 1;
                self.scan_ident_rest();
                TokenKind::Ident
            }
            c if c >= 0x80 => {
                self.scan_ident_rest();
                TokenKind::Ident
            }
            _ => {
                self.scan_punct();
                TokenKind::Punct
            }
        };

        let token = Token {
            kind,
            start,
            end: self.pos,
            newline_before,
        };
        self.expr_allowed = self.allows_expression_after(&token);
        Ok(Some(token))
    }

    fn allows_expression_after(&self, token: &Token) -> bool {
        let text = self.text(token);
        match token.kind {
            TokenKind::Ident => EXPR_KEYWORDS.contains(&text),
            TokenKind::Punct => !matches!(text, ")" | "]" | "++" | "--"),
            TokenKind::JsxStart => true,
            TokenKind::Number | TokenKind::Str | TokenKind::Template | TokenKind::Regex => false,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn error(&self, message: &str, offset: usize) -> ScanError {
        ScanError {
            message: message.to_string(),
            offset,
        }
    }

    /// Skip whitespace and comments. Returns whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ScanError> {
        let mut newline = false;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\n' | b'\r' => {
                    newline = true;
                    self.pos += 1;
                }
                b' ' | b'\t' | 0x0b | 0x0c => self.pos += 1,
                b'/' if self.peek(1) == Some(b'/') => {
                    self.pos = self.src[self.pos..]
                        .find('\n')
                        .map_or(self.bytes.len(), |i| self.pos + i);
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    let start = self.pos;
                    let end = self.src[self.pos + 2..]
                        .find("*/")
                        .ok_or_else(|| self.error("unterminated comment", start))?;
                    if self.src[self.pos..self.pos + 2 + end].contains('\n') {
                        newline = true;
                    }
                    self.pos += 2 + end + 2;
                }
                0xc2 if self.peek(1) == Some(0xa0) => self.pos += 2,
                0xef if self.peek(1) == Some(0xbb) && self.peek(2) == Some(0xbf) => self.pos += 3,
                0xe2 if self.peek(1) == Some(0x80)
                    && matches!(self.peek(2), Some(0xa8 | 0xa9)) =>
                {
                    newline = true;
                    self.pos += 3;
                }
                _ => break,
            }
        }
        Ok(newline)
    }

    fn scan_string(&mut self, quote: u8) -> Result<(), ScanError> {
        let start = self.pos;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => self.pos += 2,
                b'\n' => return Err(self.error("unterminated string literal", start)),
                c if c == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(self.error("unterminated string literal", start))
    }

    fn scan_template(&mut self) -> Result<(), ScanError> {
        let start = self.pos;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'$' if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.skip_template_expression(start)?;
                }
                _ => self.pos += 1,
            }
        }
        Err(self.error("unterminated template literal", start))
    }

    /// Skip a `${ ... }` substitution, leaving `pos` after the closing brace.
    fn skip_template_expression(&mut self, template_start: usize) -> Result<(), ScanError> {
        let saved_allowed = self.expr_allowed;
        self.expr_allowed = true;
        let mut depth = 1usize;
        loop {
            let Some(token) = self.next_token()? else {
                return Err(self.error("unterminated template literal", template_start));
            };
            match (token.kind, self.text(&token)) {
                (TokenKind::JsxStart, _) => {
                    return Err(self.error("JSX inside a template substitution", token.start));
                }
                (TokenKind::Punct, "{") => depth += 1,
                (TokenKind::Punct, "}") => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        self.expr_allowed = saved_allowed;
        Ok(())
    }

    fn scan_number(&mut self) {
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' {
                self.pos += 1;
                if matches!(c, b'e' | b'E') && matches!(self.peek(0), Some(b'+' | b'-')) {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn scan_regex(&mut self) -> Result<(), ScanError> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            let Some(c) = self.peek(0) else {
                return Err(self.error("unterminated regular expression", start));
            };
            match c {
                b'\\' => self.pos += 2,
                b'\n' | b'\r' => return Err(self.error("unterminated regular expression", start)),
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    break;
                }
                _ => self.pos += 1,
            }
        }
        while self.peek(0).is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        Ok(())
    }

    fn scan_ident_rest(&mut self) {
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == b'$' || c == b'_' || c >= 0x80 {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn scan_punct(&mut self) {
        let rest = &self.src[self.pos..];
        for p in PUNCTUATORS {
            if rest.starts_with(p) {
                if *p == "?." && rest.as_bytes().get(2).is_some_and(u8::is_ascii_digit) {
                    continue;
                }
                self.pos += p.len();
                return;
            }
        }
        let width = rest.chars().next().map_or(1, char::len_utf8);
        self.pos += width;
    }
}

/// Whether `name` is a valid JavaScript identifier (ASCII subset plus any
/// non-ASCII characters).
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '$' || c == '_' || c.is_ascii_alphabetic() || !c.is_ascii() => {}
        _ => return false,
    }
    chars.all(|c| c == '$' || c == '_' || c.is_ascii_alphanumeric() || !c.is_ascii())
}

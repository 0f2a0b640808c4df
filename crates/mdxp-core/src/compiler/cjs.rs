//! ES module syntax to CommonJS rewriting.
//!
//! Operates on JSX-free JavaScript. Import declarations become `require`
//! bindings in place, exports become getters on `exports` declared ahead of
//! the body, so function hoisting and `let`/`const` TDZ behave as in ESM.
//! The header is emitted on the first line to keep line numbers stable.

use super::lexer::{ScanError, Scanner, Token, TokenKind};

const INTEROP_DEFAULT: &str =
    "function _interopDefault(m) { return m && m.__esModule ? m.default : m; }";
const INTEROP_NAMESPACE: &str = "function _interopNamespace(m) { if (m && m.__esModule) return m; var n = Object.create(null); if (m != null) { Object.keys(m).forEach(function (k) { n[k] = m[k]; }); } n.default = m; return n; }";
const EXPORT_STAR: &str = "function _exportStar(m, e) { Object.keys(m).forEach(function (k) { if (k !== \"default\" && k !== \"__esModule\" && !Object.prototype.hasOwnProperty.call(e, k)) { Object.defineProperty(e, k, { enumerable: true, get: function () { return m[k]; } }); } }); return m; }";

/// Keywords that cannot end an expression.
const OPERATOR_KEYWORDS: &[&str] = &[
    "typeof", "new", "void", "delete", "in", "of", "instanceof", "await", "yield", "return",
];

/// Rewrite ES module syntax in `src` to CommonJS.
///
/// Sources without any module syntax are returned unchanged.
///
/// # Errors
/// Returns a `ScanError` on unterminated literals or module syntax this
/// rewriter does not understand.
pub fn to_commonjs(src: &str) -> Result<String, ScanError> {
    let mut scanner = Scanner::new(src);
    let mut tokens = Vec::new();
    while let Some(token) = scanner.next_token()? {
        tokens.push(token);
    }

    let mut rewriter = Rewriter {
        src,
        tokens,
        body: String::with_capacity(src.len() + 256),
        copied: 0,
        getters: Vec::new(),
        helpers: Helpers::default(),
        esm: false,
        temps: 0,
    };
    if src.starts_with("#!") {
        rewriter.copied = src.find('\n').unwrap_or(src.len());
    }
    rewriter.run()?;
    if !rewriter.esm && !rewriter.helpers.any() {
        return Ok(src.to_string());
    }
    Ok(rewriter.finish())
}

#[derive(Default)]
struct Helpers {
    default: bool,
    namespace: bool,
    star: bool,
}

impl Helpers {
    fn any(&self) -> bool {
        self.default || self.namespace || self.star
    }
}

/// One name in an import or export clause. `outer_key` is a JS string literal.
struct Specifier {
    inner: String,
    outer: String,
    outer_key: String,
}

struct Rewriter<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    body: String,
    copied: usize,
    getters: Vec<(String, String)>,
    helpers: Helpers,
    esm: bool,
    temps: usize,
}

impl<'a> Rewriter<'a> {
    fn text(&self, i: usize) -> &'a str {
        self.tokens
            .get(i)
            .map_or("", |t| &self.src[t.start..t.end])
    }

    fn kind(&self, i: usize) -> Option<TokenKind> {
        self.tokens.get(i).map(|t| t.kind)
    }

    fn error(&self, message: &str, i: usize) -> ScanError {
        ScanError {
            message: message.to_string(),
            offset: self.tokens.get(i).map_or(self.src.len(), |t| t.start),
        }
    }

    fn expect(&self, i: usize, text: &str) -> Result<(), ScanError> {
        if self.text(i) == text {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{text}` in module declaration"), i))
        }
    }

    fn module_source(&self, i: usize) -> Result<&'a str, ScanError> {
        if self.kind(i) == Some(TokenKind::Str) {
            Ok(self.text(i))
        } else {
            Err(self.error("expected module specifier string", i))
        }
    }

    fn after_dot(&self, i: usize) -> bool {
        i > 0 && matches!(self.text(i - 1), "." | "?.")
    }

    /// Replace source bytes `[start, end)` with `text`, keeping the line count.
    fn replace(&mut self, start: usize, end: usize, text: &str) {
        self.body.push_str(&self.src[self.copied..start]);
        self.body.push_str(text);
        let newlines = self.src[start..end]
            .matches('\n')
            .count()
            .saturating_sub(text.matches('\n').count());
        for _ in 0..newlines {
            self.body.push('\n');
        }
        self.copied = end;
    }

    fn next_temp(&mut self) -> String {
        self.temps += 1;
        format!("_s{}", self.temps)
    }

    fn run(&mut self) -> Result<(), ScanError> {
        let mut depth = 0usize;
        let mut i = 0;
        while i < self.tokens.len() {
            let kind = self.tokens[i].kind;
            let text = self.text(i);
            match (kind, text) {
                (TokenKind::Punct, "{" | "(" | "[") => depth += 1,
                (TokenKind::Punct, "}" | ")" | "]") => depth = depth.saturating_sub(1),
                (TokenKind::Ident, "import") if !self.after_dot(i) => {
                    if self.text(i + 1) == "(" {
                        i = self.dynamic_import(i)?;
                        continue;
                    }
                    if depth == 0 && !matches!(self.text(i + 1), "." | ":") {
                        self.esm = true;
                        i = self.import_declaration(i)?;
                        continue;
                    }
                }
                (TokenKind::Ident, "export")
                    if depth == 0 && !self.after_dot(i) && self.text(i + 1) != ":" =>
                {
                    self.esm = true;
                    i = self.export_declaration(i)?;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        self.body.push_str(&self.src[self.copied..]);
        Ok(())
    }

    fn finish(self) -> String {
        let mut header: Vec<String> = Vec::new();
        if self.esm {
            header.push(
                "Object.defineProperty(exports, \"__esModule\", { value: true });".to_string(),
            );
        }
        if self.helpers.default {
            header.push(INTEROP_DEFAULT.to_string());
        }
        if self.helpers.namespace {
            header.push(INTEROP_NAMESPACE.to_string());
        }
        if self.helpers.star {
            header.push(EXPORT_STAR.to_string());
        }
        for (key, expr) in &self.getters {
            header.push(format!(
                "Object.defineProperty(exports, {key}, {{ enumerable: true, get: function () {{ return {expr}; }} }});"
            ));
        }
        let mut out = header.join(" ");
        out.push(' ');
        out.push_str(&self.body);
        out
    }

    /// Index just past the statement whose last significant token is `last`:
    /// skips import attributes and an optional semicolon.
    fn statement_end(&self, last: usize) -> usize {
        let mut k = last + 1;
        if matches!(self.text(k), "with" | "assert") && self.text(k + 1) == "{" {
            while k < self.tokens.len() && self.text(k) != "}" {
                k += 1;
            }
            k += 1;
        }
        if self.text(k) == ";" {
            k += 1;
        }
        k
    }

    fn byte_end(&self, token_index: usize) -> usize {
        self.tokens[token_index - 1].end
    }

    fn specifiers(&self, open: usize) -> Result<(Vec<Specifier>, usize), ScanError> {
        let mut out = Vec::new();
        let mut k = open + 1;
        loop {
            if self.text(k) == "}" {
                return Ok((out, k + 1));
            }
            let first = self.text(k);
            if first.is_empty() {
                return Err(self.error("unterminated specifier list", open));
            }
            let (outer, outer_key) = if self.text(k + 1) == "as" {
                k += 2;
                (self.text(k).to_string(), key_literal(self.text(k), self.kind(k)))
            } else {
                (first.to_string(), key_literal(first, self.kind(k)))
            };
            out.push(Specifier {
                inner: first.to_string(),
                outer,
                outer_key,
            });
            k += 1;
            match self.text(k) {
                "," => k += 1,
                "}" => {}
                _ => return Err(self.error("expected `,` or `}` in specifier list", k)),
            }
        }
    }

    fn member(&mut self, object: &str, name: &str) -> String {
        if name == "default" {
            self.helpers.default = true;
            format!("_interopDefault({object})")
        } else if name.starts_with(['"', '\'']) {
            format!("{object}[{name}]")
        } else {
            format!("{object}.{name}")
        }
    }

    fn import_declaration(&mut self, i: usize) -> Result<usize, ScanError> {
        let start = self.tokens[i].start;
        let mut k = i + 1;

        if self.kind(k) == Some(TokenKind::Str) {
            let source = self.text(k);
            let end = self.statement_end(k);
            self.replace(start, self.byte_end(end), &format!("require({source});"));
            return Ok(end);
        }

        let mut default_local = None;
        let mut namespace_local = None;
        let mut named = Vec::new();

        if self.kind(k) == Some(TokenKind::Ident) && self.text(k) != "from" {
            default_local = Some(self.text(k));
            k += 1;
            if self.text(k) == "," {
                k += 1;
            }
        }
        if self.text(k) == "*" {
            self.expect(k + 1, "as")?;
            namespace_local = Some(self.text(k + 2));
            k += 3;
        } else if self.text(k) == "{" {
            let (specs, next) = self.specifiers(k)?;
            named = specs;
            k = next;
        }
        self.expect(k, "from")?;
        let source = self.module_source(k + 1)?;
        let end = self.statement_end(k + 1);

        let mut parts = Vec::new();
        match (default_local, namespace_local, named.is_empty()) {
            (Some(local), None, true) => {
                self.helpers.default = true;
                parts.push(format!("var {local} = _interopDefault(require({source}));"));
            }
            (None, Some(local), true) => {
                self.helpers.namespace = true;
                parts.push(format!("var {local} = _interopNamespace(require({source}));"));
            }
            (None, None, true) => parts.push(format!("require({source});")),
            _ => {
                let temp = self.next_temp();
                parts.push(format!("var {temp} = require({source});"));
                if let Some(local) = default_local {
                    self.helpers.default = true;
                    parts.push(format!("var {local} = _interopDefault({temp});"));
                }
                if let Some(local) = namespace_local {
                    self.helpers.namespace = true;
                    parts.push(format!("var {local} = _interopNamespace({temp});"));
                }
                for spec in &named {
                    let value = self.member(&temp, &spec.inner);
                    parts.push(format!("var {} = {value};", spec.outer));
                }
            }
        }
        self.replace(start, self.byte_end(end), &parts.join(" "));
        Ok(end)
    }

    fn export_declaration(&mut self, i: usize) -> Result<usize, ScanError> {
        let start = self.tokens[i].start;
        let j = i + 1;
        match (self.kind(j), self.text(j)) {
            (_, "default") => Ok(self.export_default(i, j + 1)),
            (_, "*") => self.export_star(i),
            (_, "{") => {
                let (specs, next) = self.specifiers(j)?;
                if self.text(next) == "from" {
                    let source = self.module_source(next + 1)?;
                    let end = self.statement_end(next + 1);
                    let temp = self.next_temp();
                    for spec in &specs {
                        let value = self.member(&temp, &spec.inner);
                        self.getters.push((spec.outer_key.clone(), value));
                    }
                    self.replace(
                        start,
                        self.byte_end(end),
                        &format!("var {temp} = require({source});"),
                    );
                    Ok(end)
                } else {
                    let end = if self.text(next) == ";" { next + 1 } else { next };
                    for spec in specs {
                        self.getters.push((spec.outer_key, spec.inner));
                    }
                    self.replace(start, self.byte_end(end), "");
                    Ok(end)
                }
            }
            (_, "const" | "let" | "var") => {
                let names = self.declared_names(j + 1)?;
                for name in names {
                    self.getters.push((format!("\"{name}\""), name));
                }
                self.replace(start, self.tokens[j].start, "");
                Ok(j)
            }
            (_, "function" | "async" | "class") => {
                let name = self
                    .declaration_name(j)
                    .ok_or_else(|| self.error("exported declaration needs a name", j))?;
                self.getters.push((format!("\"{name}\""), name.to_string()));
                self.replace(start, self.tokens[j].start, "");
                Ok(j)
            }
            (Some(TokenKind::Ident), local) if self.text(j + 1) == "from" => {
                let source = self.module_source(j + 2)?;
                let end = self.statement_end(j + 2);
                self.helpers.default = true;
                self.replace(
                    start,
                    self.byte_end(end),
                    &format!("exports.{local} = _interopDefault(require({source}));"),
                );
                Ok(end)
            }
            _ => Err(self.error("unsupported export syntax", j)),
        }
    }

    fn export_default(&mut self, i: usize, k: usize) -> usize {
        let start = self.tokens[i].start;
        let decl_start = self.tokens.get(k).map_or(self.src.len(), |t| t.start);
        if let Some(name) = self.declaration_name(k) {
            self.getters.push(("\"default\"".to_string(), name.to_string()));
            self.replace(start, decl_start, "");
        } else {
            self.replace(start, decl_start, "exports.default = ");
        }
        k
    }

    fn export_star(&mut self, i: usize) -> Result<usize, ScanError> {
        let start = self.tokens[i].start;
        let j = i + 1;
        let (statement, end) = if self.text(j + 1) == "as" {
            let name = self.text(j + 2);
            let target = if self.kind(j + 2) == Some(TokenKind::Str) {
                format!("exports[{name}]")
            } else {
                format!("exports.{name}")
            };
            self.expect(j + 3, "from")?;
            let source = self.module_source(j + 4)?;
            self.helpers.namespace = true;
            (
                format!("{target} = _interopNamespace(require({source}));"),
                self.statement_end(j + 4),
            )
        } else {
            self.expect(j + 1, "from")?;
            let source = self.module_source(j + 2)?;
            self.helpers.star = true;
            (
                format!("_exportStar(require({source}), exports);"),
                self.statement_end(j + 2),
            )
        };
        self.replace(start, self.byte_end(end), &statement);
        Ok(end)
    }

    /// Name of a `function`, `async function`, `function*` or `class`
    /// declaration starting at `j`, if it has one.
    fn declaration_name(&self, j: usize) -> Option<&'a str> {
        let mut k = j;
        if self.text(k) == "async" {
            if self.text(k + 1) != "function" {
                return None;
            }
            k += 1;
        }
        match self.text(k) {
            "function" => {
                k += 1;
                if self.text(k) == "*" {
                    k += 1;
                }
            }
            "class" => k += 1,
            _ => return None,
        }
        (self.kind(k) == Some(TokenKind::Ident) && self.text(k) != "extends")
            .then(|| self.text(k))
    }

    /// Binding names introduced by the declarators starting at `k`.
    fn declared_names(&self, k: usize) -> Result<Vec<String>, ScanError> {
        let mut names = Vec::new();
        let mut k = k;
        loop {
            k = self.binding(k, &mut names)?;
            if self.text(k) == "=" {
                k = self.skip_initializer(k + 1);
            }
            if self.text(k) != "," {
                return Ok(names);
            }
            k += 1;
        }
    }

    fn binding(&self, k: usize, names: &mut Vec<String>) -> Result<usize, ScanError> {
        match (self.kind(k), self.text(k)) {
            (Some(TokenKind::Ident), name) => {
                names.push(name.to_string());
                Ok(k + 1)
            }
            (_, "[") => {
                let mut k = k + 1;
                loop {
                    match self.text(k) {
                        "]" => return Ok(k + 1),
                        "," => {
                            k += 1;
                            continue;
                        }
                        "" => return Err(self.error("unterminated array pattern", k)),
                        "..." => k = self.binding(k + 1, names)?,
                        _ => k = self.binding(k, names)?,
                    }
                    if self.text(k) == "=" {
                        k = self.skip_pattern_default(k + 1);
                    }
                    if self.text(k) == "," {
                        k += 1;
                    }
                }
            }
            (_, "{") => {
                let mut k = k + 1;
                loop {
                    match self.text(k) {
                        "}" => return Ok(k + 1),
                        "" => return Err(self.error("unterminated object pattern", k)),
                        "..." => k = self.binding(k + 1, names)?,
                        "[" => {
                            let close = self
                                .matching_close(k)
                                .ok_or_else(|| self.error("unterminated computed key", k))?;
                            self.expect(close + 1, ":")?;
                            k = self.binding(close + 2, names)?;
                        }
                        key => {
                            if self.text(k + 1) == ":" {
                                k = self.binding(k + 2, names)?;
                            } else {
                                names.push(key.to_string());
                                k += 1;
                            }
                        }
                    }
                    if self.text(k) == "=" {
                        k = self.skip_pattern_default(k + 1);
                    }
                    if self.text(k) == "," {
                        k += 1;
                    }
                }
            }
            _ => Err(self.error("expected binding pattern", k)),
        }
    }

    fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for k in open..self.tokens.len() {
            if self.tokens[k].kind != TokenKind::Punct {
                continue;
            }
            match self.text(k) {
                "{" | "(" | "[" => depth += 1,
                "}" | ")" | "]" => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(k);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Skip a default value inside a pattern, stopping at `,`, `]` or `}`.
    fn skip_pattern_default(&self, k: usize) -> usize {
        let mut depth = 0usize;
        let mut k = k;
        while k < self.tokens.len() {
            match self.text(k) {
                "{" | "(" | "[" => depth += 1,
                "}" | ")" | "]" => {
                    if depth == 0 {
                        return k;
                    }
                    depth -= 1;
                }
                "," if depth == 0 => return k,
                _ => {}
            }
            k += 1;
        }
        k
    }

    /// Skip a declarator initializer, stopping at `,`, `;` or an inserted
    /// semicolon at a line break.
    fn skip_initializer(&self, start: usize) -> usize {
        let mut depth = 0usize;
        let mut k = start;
        while k < self.tokens.len() {
            let text = self.text(k);
            if depth == 0 {
                if matches!(text, "," | ";") {
                    return k;
                }
                if k > start
                    && self.tokens[k].newline_before
                    && self.ends_expression(k - 1)
                    && self.starts_statement(k)
                {
                    return k;
                }
            }
            match text {
                "{" | "(" | "[" => depth += 1,
                "}" | ")" | "]" => {
                    if depth == 0 {
                        return k;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            k += 1;
        }
        k
    }

    fn ends_expression(&self, k: usize) -> bool {
        match self.kind(k) {
            Some(TokenKind::Ident) => !OPERATOR_KEYWORDS.contains(&self.text(k)),
            Some(TokenKind::Number | TokenKind::Str | TokenKind::Template | TokenKind::Regex) => {
                true
            }
            Some(TokenKind::Punct) => matches!(self.text(k), ")" | "]" | "}"),
            _ => false,
        }
    }

    fn starts_statement(&self, k: usize) -> bool {
        match self.kind(k) {
            Some(TokenKind::Ident) => !matches!(self.text(k), "in" | "of" | "instanceof"),
            Some(TokenKind::Number | TokenKind::Str) => true,
            _ => false,
        }
    }

    fn dynamic_import(&mut self, i: usize) -> Result<usize, ScanError> {
        let open = i + 1;
        let close = self
            .matching_close(open)
            .ok_or_else(|| self.error("unterminated import() call", i))?;
        let arg = self.src[self.tokens[open].end..self.tokens[close].start].trim();
        self.helpers.namespace = true;
        self.replace(
            self.tokens[i].start,
            self.tokens[close].end,
            &format!(
                "Promise.resolve().then(function () {{ return _interopNamespace(require({arg})); }})"
            ),
        );
        Ok(close + 1)
    }
}

fn key_literal(text: &str, kind: Option<TokenKind>) -> String {
    if kind == Some(TokenKind::Str) {
        text.to_string()
    } else {
        format!("\"{text}\"")
    }
}

//! JSX lowering to classic `React.createElement` calls.
//!
//! Works directly on source text: everything outside JSX elements is copied
//! verbatim, each element is replaced by its call expression.

use super::lexer::{is_identifier, ScanError, Scanner, TokenKind};

/// Lower every JSX element in `src`.
///
/// # Errors
/// Returns a `ScanError` on malformed JSX or unterminated literals.
pub fn lower(src: &str) -> Result<String, ScanError> {
    let (code, _) = lower_from(src, 0, false)?;
    Ok(code)
}

/// Copy `src` from `start`, lowering JSX along the way.
///
/// With `until_close_brace` the copy stops at the first unbalanced `}` and
/// the returned offset points just past it; otherwise it runs to the end.
fn lower_from(src: &str, start: usize, until_close_brace: bool) -> Result<(String, usize), ScanError> {
    let mut scanner = Scanner::new(src).with_jsx(true).starting_at(start);
    let mut out = String::with_capacity(src.len().saturating_sub(start));
    let mut copied = start;
    let mut depth = 0usize;

    loop {
        let Some(token) = scanner.next_token()? else {
            if until_close_brace {
                return Err(error("unterminated JSX expression container", start));
            }
            out.push_str(&src[copied..]);
            return Ok((out, src.len()));
        };
        match token.kind {
            TokenKind::JsxStart => {
                out.push_str(&src[copied..token.start]);
                let mut parser = ElementParser { src, pos: token.start };
                let code = parser.element()?;
                out.push_str(&code);
                copied = parser.pos;
                scanner.resume_after_expression(parser.pos);
            }
            TokenKind::Punct if until_close_brace => match scanner.text(&token) {
                "{" => depth += 1,
                "}" if depth == 0 => {
                    out.push_str(&src[copied..token.start]);
                    return Ok((out, token.end));
                }
                "}" => depth -= 1,
                _ => {}
            },
            _ => {}
        }
    }
}

fn error(message: &str, offset: usize) -> ScanError {
    ScanError {
        message: message.to_string(),
        offset,
    }
}

enum PropSegment {
    Fields(Vec<String>),
    Spread(String),
}

struct ElementParser<'a> {
    src: &'a str,
    pos: usize,
}

impl ElementParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), ScanError> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(error(
                &format!("expected `{}` in JSX", char::from(byte)),
                self.pos,
            ))
        }
    }

    fn name(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, b'_' | b'$' | b'-' | b'.' | b':') || c >= 0x80)
        {
            self.pos += 1;
        }
        self.src[start..self.pos].to_string()
    }

    /// Parse one element starting at `<`, returning its call expression.
    fn element(&mut self) -> Result<String, ScanError> {
        let open_at = self.pos;
        self.expect(b'<')?;
        self.skip_ws();

        if self.peek() == Some(b'>') {
            self.pos += 1;
            let children = self.children("")?;
            return Ok(create_element("React.Fragment", "null", &children));
        }

        let name = self.name();
        if name.is_empty() {
            return Err(error("expected JSX element name", open_at));
        }

        let mut segments: Vec<PropSegment> = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'/') => {
                    self.pos += 1;
                    self.expect(b'>')?;
                    return Ok(create_element(&tag_expression(&name), &props_expression(segments), &[]));
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'{') => {
                    self.pos += 1;
                    self.skip_ws();
                    if !self.src[self.pos..].starts_with("...") {
                        return Err(error("expected spread in JSX attributes", self.pos));
                    }
                    self.pos += 3;
                    let expr = self.expression_body()?;
                    segments.push(PropSegment::Spread(expr.trim().to_string()));
                }
                Some(_) => {
                    let attr_at = self.pos;
                    let attr = self.name();
                    if attr.is_empty() {
                        return Err(error("unexpected character in JSX attributes", attr_at));
                    }
                    self.skip_ws();
                    let value = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_ws();
                        self.attribute_value()?
                    } else {
                        "true".to_string()
                    };
                    let field = format!("{}: {value}", property_key(&attr));
                    match segments.last_mut() {
                        Some(PropSegment::Fields(fields)) => fields.push(field),
                        _ => segments.push(PropSegment::Fields(vec![field])),
                    }
                }
                None => return Err(error("unterminated JSX opening tag", open_at)),
            }
        }

        let children = self.children(&name)?;
        Ok(create_element(&tag_expression(&name), &props_expression(segments), &children))
    }

    fn attribute_value(&mut self) -> Result<String, ScanError> {
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                let start = self.pos + 1;
                let end = self.src[start..]
                    .find(char::from(quote))
                    .map(|i| start + i)
                    .ok_or_else(|| error("unterminated JSX attribute string", self.pos))?;
                self.pos = end + 1;
                Ok(json_string(&decode_entities(&self.src[start..end])))
            }
            Some(b'{') => {
                self.pos += 1;
                let expr = self.expression_body()?;
                let expr = expr.trim();
                if expr.is_empty() {
                    return Err(error("JSX attributes must not be empty expressions", self.pos));
                }
                Ok(expr.to_string())
            }
            Some(b'<') => self.element(),
            _ => Err(error("expected JSX attribute value", self.pos)),
        }
    }

    /// Lower the inside of `{ ... }`; `pos` must be just past the `{`.
    fn expression_body(&mut self) -> Result<String, ScanError> {
        let (code, end) = lower_from(self.src, self.pos, true)?;
        self.pos = end;
        Ok(code)
    }

    /// Parse children up to the closing tag of `name` (empty for fragments).
    fn children(&mut self, name: &str) -> Result<Vec<String>, ScanError> {
        let open_at = self.pos;
        let mut children = Vec::new();
        loop {
            match self.peek() {
                None => {
                    let what = if name.is_empty() { "fragment" } else { name };
                    return Err(error(&format!("unclosed JSX element <{what}>"), open_at));
                }
                Some(b'<') => {
                    let rest = self.src[self.pos + 1..].trim_start();
                    if rest.starts_with('/') {
                        self.closing_tag(name)?;
                        return Ok(children);
                    }
                    children.push(self.element()?);
                }
                Some(b'{') => {
                    self.pos += 1;
                    let expr = self.expression_body()?;
                    if !is_blank_expression(&expr) {
                        children.push(expr.trim().to_string());
                    }
                }
                Some(_) => {
                    let start = self.pos;
                    let end = self.src[start..]
                        .find(['<', '{'])
                        .map_or(self.src.len(), |i| start + i);
                    self.pos = end;
                    if let Some(text) = clean_text(&self.src[start..end]) {
                        children.push(json_string(&decode_entities(&text)));
                    }
                }
            }
        }
    }

    fn closing_tag(&mut self, name: &str) -> Result<(), ScanError> {
        let at = self.pos;
        self.expect(b'<')?;
        self.expect(b'/')?;
        self.skip_ws();
        let closing = self.name();
        if closing != name {
            return Err(error(
                &format!("expected closing tag </{name}> but found </{closing}>"),
                at,
            ));
        }
        self.expect(b'>')
    }
}

fn create_element(tag: &str, props: &str, children: &[String]) -> String {
    let mut out = format!("React.createElement({tag}, {props}");
    for child in children {
        out.push_str(", ");
        out.push_str(child);
    }
    out.push(')');
    out
}

/// Intrinsic elements become strings, components stay references.
fn tag_expression(name: &str) -> String {
    if name.contains(':') {
        return json_string(name);
    }
    if name.contains('.') {
        return name.to_string();
    }
    let intrinsic = name.starts_with(|c: char| c.is_ascii_lowercase()) || name.contains('-');
    if intrinsic {
        json_string(name)
    } else {
        name.to_string()
    }
}

fn props_expression(segments: Vec<PropSegment>) -> String {
    let has_spread = segments.iter().any(|s| matches!(s, PropSegment::Spread(_)));
    let rendered: Vec<String> = segments
        .into_iter()
        .map(|segment| match segment {
            PropSegment::Fields(fields) => format!("{{ {} }}", fields.join(", ")),
            PropSegment::Spread(expr) => expr,
        })
        .collect();
    match (rendered.len(), has_spread) {
        (0, _) => "null".to_string(),
        (1, false) => rendered.into_iter().next().unwrap_or_default(),
        _ => format!("Object.assign({{}}, {})", rendered.join(", ")),
    }
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        json_string(name)
    }
}

fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Whether an expression container holds nothing but whitespace and comments.
fn is_blank_expression(expr: &str) -> bool {
    matches!(Scanner::new(expr).next_token(), Ok(None))
}

/// JSX text whitespace rules: lines are trimmed, whitespace-only lines
/// vanish and the remaining lines are joined by single spaces.
fn clean_text(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let last_non_empty = lines.iter().rposition(|l| !l.trim().is_empty())?;
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut trimmed = line.replace('\t', " ");
        if i != 0 {
            trimmed = trimmed.trim_start_matches(' ').to_string();
        }
        if i != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(' ').to_string();
        }
        if !trimmed.is_empty() {
            out.push_str(&trimmed);
            if i != last_non_empty {
                out.push(' ');
            }
        }
    }
    (!out.is_empty()).then_some(out)
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                "copy" => Some('\u{a9}'),
                "hellip" => Some('\u{2026}'),
                "mdash" => Some('\u{2014}'),
                "ndash" => Some('\u{2013}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

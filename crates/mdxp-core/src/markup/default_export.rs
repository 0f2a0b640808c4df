//! Default-export detection for markup documents.

/// Whether the markup already declares a default export (its own layout).
///
/// Front matter is ignored. The body is split into blocks at blank lines;
/// a block that starts with an `export` statement and contains a line
/// starting with `export default` counts.
#[must_use]
pub fn has_default_export(text: &str) -> bool {
    let text = text.replace("\r\n", "\n");
    let body = strip_front_matter(&text);
    body.split("\n\n").any(|block| {
        let block = block.trim_start();
        starts_with_keyword(block, "export")
            && block
                .lines()
                .any(|line| starts_with_keyword(line.trim_start(), "export default"))
    })
}

/// Drop a leading `---` YAML block.
pub(crate) fn strip_front_matter(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("---\n") else {
        return text;
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end() == "---" {
            return &rest[offset..];
        }
    }
    text
}

fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    text.strip_prefix(keyword).is_some_and(|rest| {
        rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '{' || c == '*')
    })
}

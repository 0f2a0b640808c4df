//! Markup (Markdown + ESM + JSX) to a JSX module.
//!
//! The module exports an `MDXContent` class component that renders every
//! markdown element through `MDXTag`, so `components` overrides apply. An
//! `export default` in the ESM becomes the layout the content is wrapped in.

use std::collections::HashMap;
use std::fmt::Write;

use markdown::mdast::{AlignKind, AttributeContent, AttributeValue, Node};
use markdown::{Constructs, MdxSignal, ParseOptions};
use regex_lite::Regex;
use serde_json::{Map, Value};

use super::MarkupError;

/// Parse options: MDX plus the GFM extensions and front matter.
fn parse_options() -> ParseOptions {
    ParseOptions {
        constructs: Constructs {
            frontmatter: true,
            gfm_autolink_literal: true,
            gfm_footnote_definition: true,
            gfm_label_start_footnote: true,
            gfm_strikethrough: true,
            gfm_table: true,
            gfm_task_list_item: true,
            ..Constructs::mdx()
        },
        mdx_esm_parse: Some(Box::new(|_: &str| MdxSignal::Ok)),
        ..ParseOptions::mdx()
    }
}

/// Plain Markdown: raw HTML instead of JSX, no expressions. ESM stays on
/// so an injected layout still parses.
fn markdown_parse_options() -> ParseOptions {
    let mut options = parse_options();
    options.constructs.html_flow = true;
    options.constructs.html_text = true;
    options.constructs.mdx_jsx_flow = false;
    options.constructs.mdx_jsx_text = false;
    options.constructs.mdx_expression_flow = false;
    options.constructs.mdx_expression_text = false;
    options
}

/// Compile MDX markup into a JSX module.
pub fn compile(text: &str) -> Result<String, MarkupError> {
    compile_with(text, &parse_options())
}

/// Compile a plain Markdown document into a JSX module.
pub fn compile_markdown(text: &str) -> Result<String, MarkupError> {
    compile_with(text, &markdown_parse_options())
}

fn compile_with(text: &str, options: &ParseOptions) -> Result<String, MarkupError> {
    let tree = markdown::to_mdast(text, options)
        .map_err(|message| MarkupError::Parse(message.to_string()))?;

    let mut emitter = Emitter::default();
    emitter.collect_definitions(&tree);

    let mut content = String::new();
    if let Some(children) = tree.children() {
        emitter.nodes(children, None, &mut content);
    }
    emitter.footnote_section(&mut content);

    let (esm, has_layout) = extract_layout(&emitter.esm.join("\n"))?;

    let mut out = String::with_capacity(esm.len() + content.len() + 512);
    if !esm.is_empty() {
        out.push_str(&esm);
        out.push_str("\n\n");
    }
    let layout = if has_layout { "MDXLayout" } else { "null" };
    let _ = write!(
        out,
        "export default class MDXContent extends React.Component {{\n  constructor(props) {{\n    super(props);\n    this.layout = {layout};\n  }}\n  render() {{\n    const {{ components, ...props }} = this.props;\n    return <MDXTag name=\"wrapper\" Layout={{this.layout}} layoutProps={{props}} components={{components}}>\n{content}</MDXTag>;\n  }}\n}}\n"
    );
    Ok(out)
}

/// Turn `export default <expr>` into `const MDXLayout = <expr>`.
fn extract_layout(esm: &str) -> Result<(String, bool), MarkupError> {
    let re = Regex::new(r"(?m)^export\s+default\s").map_err(|e| MarkupError::Parse(e.to_string()))?;
    match re.find_iter(esm).count() {
        0 => Ok((esm.to_string(), false)),
        1 => Ok((re.replace(esm, "const MDXLayout = ").into_owned(), true)),
        _ => Err(MarkupError::MultipleDefaultExports),
    }
}

#[derive(Default)]
struct Emitter {
    esm: Vec<String>,
    definitions: HashMap<String, (String, Option<String>)>,
    footnotes: Vec<(String, Vec<Node>)>,
}

impl Emitter {
    fn collect_definitions(&mut self, node: &Node) {
        match node {
            Node::Definition(def) => {
                self.definitions
                    .entry(def.identifier.clone())
                    .or_insert_with(|| (def.url.clone(), def.title.clone()));
            }
            Node::FootnoteDefinition(def) => {
                self.footnotes
                    .push((def.identifier.clone(), def.children.clone()));
            }
            _ => {}
        }
        if let Some(children) = node.children() {
            for child in children {
                self.collect_definitions(child);
            }
        }
    }

    fn nodes(&mut self, nodes: &[Node], parent: Option<&str>, out: &mut String) {
        for node in nodes {
            self.node(node, parent, false, out);
        }
    }

    #[allow(clippy::too_many_lines)]
    fn node(&mut self, node: &Node, parent: Option<&str>, tight: bool, out: &mut String) {
        match node {
            Node::MdxjsEsm(esm) => self.esm.push(esm.value.clone()),
            Node::Yaml(_) | Node::Toml(_) | Node::Definition(_) | Node::FootnoteDefinition(_) => {}
            Node::Text(text) => out.push_str(&template_text(&text.value)),
            Node::Paragraph(p) if tight => self.nodes(&p.children, parent, out),
            Node::Paragraph(p) => self.tag("p", parent, None, &p.children, out),
            Node::Heading(h) => {
                let name = format!("h{}", h.depth);
                self.tag(&name, parent, None, &h.children, out);
            }
            Node::Emphasis(e) => self.tag("em", parent, None, &e.children, out),
            Node::Strong(s) => self.tag("strong", parent, None, &s.children, out),
            Node::Delete(d) => self.tag("del", parent, None, &d.children, out),
            Node::Blockquote(b) => self.tag("blockquote", parent, None, &b.children, out),
            Node::InlineCode(code) => {
                self.raw_tag("inlineCode", parent, None, &template_text(&code.value), out);
            }
            Node::InlineMath(math) => {
                let props = props([("className", Some("math-inline".to_string()))]);
                self.raw_tag("code", parent, props, &template_text(&math.value), out);
            }
            Node::Code(code) => {
                let props = props([
                    ("className", code.lang.as_ref().map(|l| format!("language-{l}"))),
                    ("metaString", code.meta.clone()),
                ]);
                let mut inner = String::new();
                self.raw_tag("code", Some("pre"), props, &template_text(&code.value), &mut inner);
                self.raw_tag("pre", parent, None, &inner, out);
            }
            Node::Math(math) => {
                let props = props([("className", Some("math-display".to_string()))]);
                let mut inner = String::new();
                self.raw_tag("code", Some("pre"), props, &template_text(&math.value), &mut inner);
                self.raw_tag("pre", parent, None, &inner, out);
            }
            Node::Link(link) => {
                let props = props([("href", Some(link.url.clone())), ("title", link.title.clone())]);
                self.tag("a", parent, props, &link.children, out);
            }
            Node::LinkReference(reference) => {
                match self.definitions.get(&reference.identifier).cloned() {
                    Some((url, title)) => {
                        let props = props([("href", Some(url)), ("title", title)]);
                        self.tag("a", parent, props, &reference.children, out);
                    }
                    None => self.nodes(&reference.children, parent, out),
                }
            }
            Node::Image(image) => {
                let props = props([
                    ("src", Some(image.url.clone())),
                    ("alt", Some(image.alt.clone())),
                    ("title", image.title.clone()),
                ]);
                self.void_tag("img", parent, props, out);
            }
            Node::ImageReference(reference) => {
                match self.definitions.get(&reference.identifier).cloned() {
                    Some((url, title)) => {
                        let props = props([
                            ("src", Some(url)),
                            ("alt", Some(reference.alt.clone())),
                            ("title", title),
                        ]);
                        self.void_tag("img", parent, props, out);
                    }
                    None => out.push_str(&template_text(&reference.alt)),
                }
            }
            Node::Break(_) => self.void_tag("br", parent, None, out),
            Node::ThematicBreak(_) => self.void_tag("hr", parent, None, out),
            Node::List(list) => {
                let name = if list.ordered { "ol" } else { "ul" };
                let props = props([(
                    "start",
                    list.start.filter(|s| list.ordered && *s != 1).map(|s| s.to_string()),
                )]);
                let mut inner = String::new();
                for item in &list.children {
                    if let Node::ListItem(li) = item {
                        self.list_item(li, name, !list.spread, &mut inner);
                    } else {
                        self.node(item, Some(name), false, &mut inner);
                    }
                }
                self.raw_tag(name, parent, props, &inner, out);
            }
            Node::ListItem(li) => self.list_item(li, parent.unwrap_or("ul"), false, out),
            Node::Table(table) => self.table(&table.align, &table.children, parent, out),
            Node::TableRow(_) | Node::TableCell(_) => {
                if let Some(children) = node.children() {
                    self.nodes(children, parent, out);
                }
            }
            Node::FootnoteReference(reference) => {
                let id = &reference.identifier;
                let index = self
                    .footnotes
                    .iter()
                    .position(|(def, _)| def == id)
                    .map_or_else(|| id.clone(), |i| (i + 1).to_string());
                let link_props = props([
                    ("href", Some(format!("#fn-{id}"))),
                    ("className", Some("footnote-ref".to_string())),
                ]);
                let mut link = String::new();
                self.raw_tag("a", Some("sup"), link_props, &template_text(&index), &mut link);
                let sup_props = props([("id", Some(format!("fnref-{id}")))]);
                self.raw_tag("sup", parent, sup_props, &link, out);
            }
            Node::Html(html) if is_comment(&html.value) => {}
            Node::Html(html) => {
                let _ = write!(
                    out,
                    "<div dangerouslySetInnerHTML={{{{ __html: {} }}}} />",
                    Value::String(html.value.clone())
                );
            }
            Node::MdxFlowExpression(expr) => {
                let _ = write!(out, "{{{}}}", expr.value);
            }
            Node::MdxTextExpression(expr) => {
                let _ = write!(out, "{{{}}}", expr.value);
            }
            Node::MdxJsxFlowElement(el) => {
                self.jsx_element(el.name.as_deref(), &el.attributes, &el.children, out);
            }
            Node::MdxJsxTextElement(el) => {
                self.jsx_element(el.name.as_deref(), &el.attributes, &el.children, out);
            }
            Node::Root(root) => self.nodes(&root.children, parent, out),
            #[allow(unreachable_patterns)]
            _ => {}
        }
        if is_block(node) {
            out.push('\n');
        }
    }

    fn list_item(
        &mut self,
        item: &markdown::mdast::ListItem,
        list_name: &str,
        tight: bool,
        out: &mut String,
    ) {
        let tight = tight && !item.spread;
        let mut inner = String::new();
        if let Some(checked) = item.checked {
            let mut checkbox = Map::new();
            checkbox.insert("type".to_string(), Value::String("checkbox".to_string()));
            checkbox.insert("checked".to_string(), Value::Bool(checked));
            checkbox.insert("disabled".to_string(), Value::Bool(true));
            self.void_tag("input", Some("li"), Some(checkbox), &mut inner);
        }
        for child in &item.children {
            self.node(child, Some("li"), tight, &mut inner);
        }
        let props = item
            .checked
            .map(|_| props([("className", Some("task-list-item".to_string()))]))
            .unwrap_or_default();
        self.raw_tag("li", Some(list_name), props, &inner, out);
        out.push('\n');
    }

    fn table(&mut self, align: &[AlignKind], rows: &[Node], parent: Option<&str>, out: &mut String) {
        let mut head = String::new();
        let mut body = String::new();
        for (index, row) in rows.iter().enumerate() {
            let (cell_name, section) = if index == 0 {
                ("th", &mut head)
            } else {
                ("td", &mut body)
            };
            let mut cells = String::new();
            if let Node::TableRow(row) = row {
                for (column, cell) in row.children.iter().enumerate() {
                    let align = match align.get(column) {
                        Some(AlignKind::Left) => Some("left".to_string()),
                        Some(AlignKind::Right) => Some("right".to_string()),
                        Some(AlignKind::Center) => Some("center".to_string()),
                        _ => None,
                    };
                    let children = cell.children().map_or(&[][..], Vec::as_slice);
                    self.tag(cell_name, Some("tr"), props([("align", align)]), children, &mut cells);
                }
            }
            let row_parent = if index == 0 { "thead" } else { "tbody" };
            self.raw_tag("tr", Some(row_parent), None, &cells, section);
            section.push('\n');
        }
        let mut inner = String::new();
        self.raw_tag("thead", Some("table"), None, &head, &mut inner);
        if !body.is_empty() {
            self.raw_tag("tbody", Some("table"), None, &body, &mut inner);
        }
        self.raw_tag("table", parent, None, &inner, out);
    }

    fn footnote_section(&mut self, out: &mut String) {
        if self.footnotes.is_empty() {
            return;
        }
        let footnotes = self.footnotes.clone();
        let mut items = String::new();
        for (id, children) in &footnotes {
            let mut inner = String::new();
            for child in children {
                self.node(child, Some("li"), false, &mut inner);
            }
            let back_props = props([
                ("href", Some(format!("#fnref-{id}"))),
                ("className", Some("footnote-backref".to_string())),
            ]);
            self.raw_tag("a", Some("li"), back_props, &template_text("\u{21a9}"), &mut inner);
            self.raw_tag("li", Some("ol"), props([("id", Some(format!("fn-{id}")))]), &inner, &mut items);
            items.push('\n');
        }
        let mut section = String::new();
        self.void_tag("hr", Some("div"), None, &mut section);
        self.raw_tag("ol", Some("div"), None, &items, &mut section);
        self.raw_tag(
            "div",
            None,
            props([("className", Some("footnotes".to_string()))]),
            &section,
            out,
        );
        out.push('\n');
    }

    fn jsx_element(
        &mut self,
        name: Option<&str>,
        attributes: &[AttributeContent],
        children: &[Node],
        out: &mut String,
    ) {
        let mut inner = String::new();
        for child in children {
            self.node(child, None, false, &mut inner);
        }
        let Some(name) = name else {
            let _ = write!(out, "<>{inner}</>");
            return;
        };
        let _ = write!(out, "<{name}");
        for attribute in attributes {
            match attribute {
                AttributeContent::Expression(expr) => {
                    let _ = write!(out, " {{{}}}", expr.value);
                }
                AttributeContent::Property(prop) => match &prop.value {
                    None => {
                        let _ = write!(out, " {}", prop.name);
                    }
                    Some(AttributeValue::Literal(text)) => {
                        let _ = write!(out, " {}={{{}}}", prop.name, Value::String(text.clone()));
                    }
                    Some(AttributeValue::Expression(expr)) => {
                        let _ = write!(out, " {}={{{}}}", prop.name, expr.value);
                    }
                },
            }
        }
        if inner.is_empty() {
            out.push_str(" />");
        } else {
            let _ = write!(out, ">{inner}</{name}>");
        }
    }

    fn tag(
        &mut self,
        name: &str,
        parent: Option<&str>,
        props: Option<Map<String, Value>>,
        children: &[Node],
        out: &mut String,
    ) {
        let mut inner = String::new();
        for child in children {
            self.node(child, Some(name), false, &mut inner);
        }
        self.raw_tag(name, parent, props, &inner, out);
    }

    fn raw_tag(
        &mut self,
        name: &str,
        parent: Option<&str>,
        props: Option<Map<String, Value>>,
        inner: &str,
        out: &mut String,
    ) {
        open_tag(name, parent, props, out);
        out.push('>');
        out.push_str(inner);
        out.push_str("</MDXTag>");
    }

    fn void_tag(
        &mut self,
        name: &str,
        parent: Option<&str>,
        props: Option<Map<String, Value>>,
        out: &mut String,
    ) {
        open_tag(name, parent, props, out);
        out.push_str(" />");
    }
}

fn open_tag(name: &str, parent: Option<&str>, props: Option<Map<String, Value>>, out: &mut String) {
    let _ = write!(out, "<MDXTag name=\"{name}\" components={{components}}");
    if let Some(parent) = parent {
        let _ = write!(out, " parentName=\"{parent}\"");
    }
    if let Some(props) = props {
        let _ = write!(out, " props={{{}}}", Value::Object(props));
    }
}

/// Build a props object from optional fields; `None` when nothing is set.
fn props<const N: usize>(fields: [(&str, Option<String>); N]) -> Option<Map<String, Value>> {
    let map: Map<String, Value> = fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), Value::String(v))))
        .collect();
    (!map.is_empty()).then_some(map)
}

/// Text as a JSX template-literal expression container.
fn template_text(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${");
    format!("{{`{escaped}`}}")
}

fn is_comment(html: &str) -> bool {
    let html = html.trim();
    html.starts_with("<!--") && html.ends_with("-->")
}

fn is_block(node: &Node) -> bool {
    matches!(
        node,
        Node::Paragraph(_)
            | Node::Heading(_)
            | Node::Blockquote(_)
            | Node::Code(_)
            | Node::Math(_)
            | Node::List(_)
            | Node::Table(_)
            | Node::ThematicBreak(_)
            | Node::Html(_)
            | Node::MdxFlowExpression(_)
            | Node::MdxJsxFlowElement(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_and_paragraph() {
        let out = compile("# Hello\n\nSome *text*.").unwrap();
        assert!(out.contains("<MDXTag name=\"h1\" components={components}>{`Hello`}</MDXTag>"));
        assert!(out.contains(
            "<MDXTag name=\"p\" components={components}>{`Some `}<MDXTag name=\"em\" components={components} parentName=\"p\">{`text`}</MDXTag>{`.`}</MDXTag>"
        ));
        assert!(out.contains("this.layout = null;"));
        assert!(out.contains("export default class MDXContent extends React.Component"));
    }

    #[test]
    fn test_esm_and_layout() {
        let src = "import Chart from './Chart'\n\nexport default Layout\n\n# Title\n\n<Chart data={[1, 2]} label=\"a\" />\n";
        let out = compile(src).unwrap();
        assert!(out.starts_with("import Chart from './Chart'\nconst MDXLayout = Layout"));
        assert!(out.contains("this.layout = MDXLayout;"));
        assert!(out.contains("<Chart data={[1, 2]} label={\"a\"} />"));
    }

    #[test]
    fn test_multiple_default_exports_rejected() {
        let err = compile("export default A\n\nexport default B\n").unwrap_err();
        assert!(matches!(err, MarkupError::MultipleDefaultExports));
    }

    #[test]
    fn test_code_link_and_list() {
        let src = "```js title\nlet a = `x`;\n```\n\n- [link](https://x.dev \"T\")\n- `code`\n";
        let out = compile(src).unwrap();
        assert!(out.contains(
            "<MDXTag name=\"code\" components={components} parentName=\"pre\" props={{\"className\":\"language-js\",\"metaString\":\"title\"}}>{`let a = \\`x\\`;`}</MDXTag>"
        ));
        assert!(out.contains("props={{\"href\":\"https://x.dev\",\"title\":\"T\"}}"));
        assert!(out.contains("<MDXTag name=\"li\" components={components} parentName=\"ul\"><MDXTag name=\"a\""));
        assert!(out.contains("<MDXTag name=\"inlineCode\" components={components} parentName=\"li\">{`code`}</MDXTag>"));
    }

    #[test]
    fn test_expressions_and_front_matter() {
        let out = compile("---\ntitle: x\n---\n\nValue: {props.count}\n").unwrap();
        assert!(!out.contains("title: x"));
        assert!(out.contains("{`Value: `}{props.count}"));
    }

    #[test]
    fn test_task_list_and_table() {
        let out = compile("- [x] done\n\n| a | b |\n|:--|--:|\n| 1 | 2 |\n").unwrap();
        assert!(out.contains("props={{\"checked\":true,\"disabled\":true,\"type\":\"checkbox\"}}"));
        assert!(out.contains("<MDXTag name=\"th\" components={components} parentName=\"tr\" props={{\"align\":\"left\"}}>{`a`}</MDXTag>"));
        assert!(out.contains("<MDXTag name=\"td\" components={components} parentName=\"tr\" props={{\"align\":\"right\"}}>{`2`}</MDXTag>"));
    }

    #[test]
    fn test_markdown_allows_html_comments() {
        let out = compile_markdown("<!-- html comment -->\n\nHello <b>there</b> {braces}").unwrap();
        assert!(!out.contains("html comment"));
        assert!(out.contains("{`Hello `}"));
        assert!(out.contains("{braces}`}"));
        assert!(compile("<!-- html comment -->\n\nHello").is_err());
    }

    #[test]
    fn test_template_text_escaping() {
        assert_eq!(template_text("a`b${c}\\"), "{`a\\`b\\${c}\\\\`}");
    }
}

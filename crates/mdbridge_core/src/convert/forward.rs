//! Markdown → storage markup.
//!
//! The markdown is parsed by comrak into its arena AST and walked with one
//! handler per node kind. Docusaurus-style admonitions (`:::note`) are not
//! CommonMark, so they are split out line-wise first and their bodies are
//! converted recursively.

use comrak::nodes::{AstNode, ListType, NodeValue};
use comrak::{Arena, Options, parse_document};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::postprocess::{FenceLine, FenceTracker};
use crate::dialect::Dialect;
use crate::error::{MdBridgeError, Result};
use crate::markup::{escape_attr, escape_text};

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"title=(?:"([^"]*)"|'([^']*)'|(\S+))"#).expect("valid title regex")
});

static ADMONITION_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s{0,3}:::([A-Za-z]+)(?:[ \t]+(.*?))?\s*$").expect("valid admonition regex")
});

/// A local image referenced by the converted markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// The destination exactly as written in markdown (`./img/x.png`)
    pub source: String,
    /// Attachment file name the markup references (`x.png`)
    pub filename: String,
}

/// Result of a forward conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardOutput {
    /// Storage markup
    pub markup: String,
    /// Local images, in document order, without duplicates
    pub images: Vec<ImageRef>,
}

/// Parsed fence info string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FenceInfo {
    /// First word of the info string, empty when absent
    pub language: String,
    /// Value of a `title="..."` token
    pub title: Option<String>,
}

/// Split an info string like `jsx title="src/Button.jsx"`.
pub fn parse_fence_info(info: &str) -> FenceInfo {
    let info = info.trim();
    let language = info
        .split_whitespace()
        .next()
        .filter(|w| !w.contains('='))
        .unwrap_or("")
        .to_string();
    let title = TITLE_RE.captures(info).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
    });
    FenceInfo { language, title }
}

/// Converts markdown bodies to storage markup.
pub struct ForwardConverter<'d> {
    dialect: &'d Dialect,
    smart_punctuation: bool,
}

enum Segment<'a> {
    Markdown(String),
    Admonition {
        keyword: &'a str,
        title: Option<&'a str>,
        body: String,
    },
}

impl<'d> ForwardConverter<'d> {
    /// Create a converter for a dialect.
    pub fn new(dialect: &'d Dialect, smart_punctuation: bool) -> Self {
        Self {
            dialect,
            smart_punctuation,
        }
    }

    /// Convert a markdown body (frontmatter already stripped).
    pub fn convert(&self, source_path: &Path, markdown: &str) -> Result<ForwardOutput> {
        let mut out = ForwardOutput::default();
        self.convert_into(source_path, markdown, &mut out)?;
        Ok(out)
    }

    fn convert_into(&self, source_path: &Path, markdown: &str, out: &mut ForwardOutput) -> Result<()> {
        for segment in split_admonitions(markdown, source_path)? {
            match segment {
                Segment::Markdown(text) => self.render_markdown(&text, out),
                Segment::Admonition {
                    keyword,
                    title,
                    body,
                } => {
                    let Some(macro_name) = self.dialect.admonition_macro(keyword) else {
                        // Unknown keyword: keep the content, lose the box
                        log::debug!("Unknown admonition '{}' in {}", keyword, source_path.display());
                        self.convert_into(source_path, &body, out)?;
                        continue;
                    };
                    let ns = self.dialect.macro_ns;
                    out.markup.push_str(&format!(
                        "<{ns}:structured-macro {ns}:name=\"{}\">",
                        macro_name
                    ));
                    if let Some(title) = title {
                        out.markup.push_str(&self.parameter("title", title));
                    }
                    out.markup.push_str(&format!("<{ns}:rich-text-body>"));
                    self.convert_into(source_path, &body, out)?;
                    out.markup
                        .push_str(&format!("</{ns}:rich-text-body></{ns}:structured-macro>"));
                }
            }
        }
        Ok(())
    }

    fn render_markdown(&self, markdown: &str, out: &mut ForwardOutput) {
        let arena = Arena::new();
        let mut options = Options::default();
        options.extension.strikethrough = true;
        options.extension.table = true;
        options.extension.autolink = true;
        options.parse.smart = self.smart_punctuation;

        let root = parse_document(&arena, markdown, &options);
        self.visit(root, out, false);
    }

    fn parameter(&self, name: &str, value: &str) -> String {
        let ns = self.dialect.macro_ns;
        format!(
            "<{ns}:parameter {ns}:name=\"{}\">{}</{ns}:parameter>",
            name,
            escape_text(value)
        )
    }

    fn visit_children<'a>(&self, node: &'a AstNode<'a>, out: &mut ForwardOutput, tight: bool) {
        for child in node.children() {
            self.visit(child, out, tight);
        }
    }

    fn wrap<'a>(&self, tag: &str, node: &'a AstNode<'a>, out: &mut ForwardOutput, tight: bool) {
        out.markup.push_str(&format!("<{}>", tag));
        self.visit_children(node, out, tight);
        out.markup.push_str(&format!("</{}>", tag));
    }

    /// `tight` is true while inside the items of a tight list, where
    /// paragraphs are rendered without `<p>`.
    fn visit<'a>(&self, node: &'a AstNode<'a>, out: &mut ForwardOutput, tight: bool) {
        let value = node.data.borrow().value.clone();
        match value {
            NodeValue::Document => self.visit_children(node, out, false),
            NodeValue::FrontMatter(_) => {}
            NodeValue::BlockQuote => self.wrap("blockquote", node, out, false),
            NodeValue::List(list) => {
                let tag = match list.list_type {
                    ListType::Bullet => "ul".to_string(),
                    ListType::Ordered if list.start != 1 => format!("ol start=\"{}\"", list.start),
                    ListType::Ordered => "ol".to_string(),
                };
                out.markup.push_str(&format!("<{}>", tag));
                self.visit_children(node, out, list.tight);
                out.markup.push_str(if list.list_type == ListType::Bullet {
                    "</ul>"
                } else {
                    "</ol>"
                });
            }
            NodeValue::Item(_) => self.wrap("li", node, out, tight),
            NodeValue::CodeBlock(block) => {
                let info = if block.fenced {
                    parse_fence_info(&block.info)
                } else {
                    FenceInfo::default()
                };
                let literal = block.literal.strip_suffix('\n').unwrap_or(&block.literal);
                self.code_macro(&info, literal, out);
            }
            NodeValue::HtmlBlock(html) => {
                out.markup.push_str(html.literal.trim_end_matches('\n'));
            }
            NodeValue::Paragraph => {
                if tight {
                    self.visit_children(node, out, false);
                } else {
                    self.wrap("p", node, out, false);
                }
            }
            NodeValue::Heading(heading) => {
                let tag = format!("h{}", heading.level.clamp(1, 6));
                self.wrap(&tag, node, out, false);
            }
            NodeValue::ThematicBreak => out.markup.push_str("<hr />"),
            NodeValue::Table(_) => {
                out.markup.push_str("<table><tbody>");
                self.visit_children(node, out, false);
                out.markup.push_str("</tbody></table>");
            }
            NodeValue::TableRow(header) => {
                out.markup.push_str("<tr>");
                let cell = if header { "th" } else { "td" };
                for child in node.children() {
                    self.wrap(cell, child, out, false);
                }
                out.markup.push_str("</tr>");
            }
            NodeValue::TableCell => self.visit_children(node, out, false),
            NodeValue::Text(text) => out.markup.push_str(&escape_text(&text)),
            NodeValue::SoftBreak => out.markup.push('\n'),
            NodeValue::LineBreak => out.markup.push_str("<br />"),
            NodeValue::Code(code) => {
                out.markup.push_str("<code>");
                out.markup.push_str(&escape_text(&code.literal));
                out.markup.push_str("</code>");
            }
            NodeValue::HtmlInline(html) => out.markup.push_str(&html),
            NodeValue::Emph => self.wrap("em", node, out, false),
            NodeValue::Strong => self.wrap("strong", node, out, false),
            NodeValue::Strikethrough => self.wrap("del", node, out, false),
            NodeValue::Link(link) => {
                out.markup
                    .push_str(&format!("<a href=\"{}\"", escape_attr(&link.url)));
                if !link.title.is_empty() {
                    out.markup
                        .push_str(&format!(" title=\"{}\"", escape_attr(&link.title)));
                }
                out.markup.push('>');
                self.visit_children(node, out, false);
                out.markup.push_str("</a>");
            }
            NodeValue::Image(link) => {
                let alt = collect_text(node);
                self.image_macro(&link.url, &alt, out);
            }
            _ => self.visit_children(node, out, tight),
        }
    }

    fn code_macro(&self, info: &FenceInfo, literal: &str, out: &mut ForwardOutput) {
        let ns = self.dialect.macro_ns;
        out.markup.push_str(&format!(
            "<{ns}:structured-macro {ns}:name=\"{}\">",
            self.dialect.code_macro
        ));
        out.markup
            .push_str(&self.parameter(self.dialect.language_param, &info.language));
        if let Some(title) = &info.title {
            out.markup
                .push_str(&self.parameter(self.dialect.title_param, title));
        }
        out.markup.push_str(&format!("<{ns}:plain-text-body>"));
        out.markup.push_str(&cdata(literal));
        out.markup.push_str(&format!("</{ns}:plain-text-body></{ns}:structured-macro>"));
    }

    fn image_macro(&self, url: &str, alt: &str, out: &mut ForwardOutput) {
        let ns = self.dialect.macro_ns;
        let ri = self.dialect.resource_ns;
        out.markup.push_str(&format!("<{ns}:image"));
        if !alt.is_empty() {
            out.markup
                .push_str(&format!(" {ns}:alt=\"{}\"", escape_attr(alt)));
        }
        out.markup.push('>');

        if is_remote_url(url) {
            out.markup
                .push_str(&format!("<{ri}:url {ri}:value=\"{}\" />", escape_attr(url)));
        } else {
            let filename = attachment_filename(url);
            out.markup.push_str(&format!(
                "<{ri}:attachment {ri}:filename=\"{}\" />",
                escape_attr(&filename)
            ));
            if !out.images.iter().any(|i| i.source == url) {
                out.images.push(ImageRef {
                    source: url.to_string(),
                    filename,
                });
            }
        }
        out.markup.push_str(&format!("</{ns}:image>"));
    }
}

/// Wrap text in CDATA, splitting any `]]>` it contains.
fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

fn collect_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Text(t) => out.push_str(t),
            NodeValue::Code(c) => out.push_str(&c.literal),
            _ => {}
        }
    }
    out
}

/// Whether an image/link destination points off-site.
pub fn is_remote_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("//")
        || lower.starts_with("data:")
}

/// The attachment name for a local image destination: its last path segment,
/// percent-decoded, without query or fragment.
pub fn attachment_filename(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string())
}

/// Split top-level `:::kind [title]` ... `:::` blocks out of markdown, leaving
/// fenced code alone.
fn split_admonitions<'a>(markdown: &'a str, source_path: &Path) -> Result<Vec<Segment<'a>>> {
    let mut segments = Vec::new();
    let mut plain = String::new();
    let mut fences = FenceTracker::default();
    let mut open: Option<(&'a str, Option<&'a str>, String, usize)> = None;

    for line in markdown.split_inclusive('\n') {
        // ':::' inside fenced code is content
        if fences.classify(line) == FenceLine::Outside {
            if let Some((_, _, _, depth)) = open.as_mut() {
                if line.trim() == ":::" {
                    if *depth == 0 {
                        if let Some((keyword, title, body, _)) = open.take() {
                            segments.push(Segment::Admonition {
                                keyword,
                                title,
                                body,
                            });
                        }
                        continue;
                    }
                    *depth -= 1;
                } else if ADMONITION_OPEN_RE.is_match(line) {
                    *depth += 1;
                }
            } else if let Some(caps) = ADMONITION_OPEN_RE.captures(line) {
                if !plain.is_empty() {
                    segments.push(Segment::Markdown(std::mem::take(&mut plain)));
                }
                let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let title = caps.get(2).map(|m| m.as_str()).filter(|t| !t.is_empty());
                open = Some((keyword, title, String::new(), 0));
                continue;
            }
        }

        match open.as_mut() {
            Some((_, _, body, _)) => body.push_str(line),
            None => plain.push_str(line),
        }
    }

    if let Some((keyword, _, _, _)) = open {
        return Err(MdBridgeError::conversion(
            source_path,
            format!("unterminated ':::{}' block", keyword),
        ));
    }
    if !plain.is_empty() {
        segments.push(Segment::Markdown(plain));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(md: &str) -> ForwardOutput {
        let dialect = Dialect::confluence();
        ForwardConverter::new(&dialect, false)
            .convert(Path::new("doc.md"), md)
            .unwrap()
    }

    #[test]
    fn test_fence_info_parsing() {
        assert_eq!(
            parse_fence_info(r#"jsx title="src/Button.jsx""#),
            FenceInfo {
                language: "jsx".into(),
                title: Some("src/Button.jsx".into())
            }
        );
        assert_eq!(parse_fence_info("").language, "");
        assert_eq!(parse_fence_info("title=a.rs").title.as_deref(), Some("a.rs"));
        assert_eq!(parse_fence_info("title=a.rs").language, "");
    }

    #[test]
    fn test_headings_keep_level() {
        let out = convert("# One\n\n### Three\n");
        assert_eq!(out.markup, "<h1>One</h1><h3>Three</h3>");
    }

    #[test]
    fn test_code_block_with_title() {
        let out = convert("```jsx title=\"src/Button.jsx\"\nconst a = <b/>;\n```\n");
        assert!(out.markup.contains(r#"<ac:parameter ac:name="language">jsx</ac:parameter>"#));
        assert!(out.markup.contains(r#"<ac:parameter ac:name="title">src/Button.jsx</ac:parameter>"#));
        assert!(out.markup.contains("<![CDATA[const a = <b/>;]]>"));
    }

    #[test]
    fn test_code_block_without_language_still_macro() {
        let out = convert("```\nplain\n```\n");
        assert!(out.markup.starts_with(r#"<ac:structured-macro ac:name="code">"#));
        assert!(out.markup.contains(r#"<ac:parameter ac:name="language"></ac:parameter>"#));
        assert!(!out.markup.contains("<pre>"));
    }

    #[test]
    fn test_cdata_terminator_split() {
        let out = convert("```\na]]>b\n```\n");
        assert!(out.markup.contains("<![CDATA[a]]]]><![CDATA[>b]]>"));
    }

    #[test]
    fn test_local_image_becomes_attachment() {
        let out = convert("![x](./img/x%20y.png)\n");
        assert!(out.markup.contains(r#"<ri:attachment ri:filename="x y.png" />"#));
        assert!(out.markup.contains(r#"ac:alt="x""#));
        assert_eq!(
            out.images,
            vec![ImageRef {
                source: "./img/x%20y.png".into(),
                filename: "x y.png".into()
            }]
        );
    }

    #[test]
    fn test_remote_image_uses_url() {
        let out = convert("![logo](https://example.com/logo.png)\n");
        assert!(out.markup.contains(r#"<ri:url ri:value="https://example.com/logo.png" />"#));
        assert!(out.images.is_empty());
    }

    #[test]
    fn test_table_structure() {
        let out = convert("| A | B |\n|---|---|\n| 1 | 2 |\n");
        assert_eq!(
            out.markup,
            "<table><tbody><tr><th>A</th><th>B</th></tr><tr><td>1</td><td>2</td></tr></tbody></table>"
        );
    }

    #[test]
    fn test_tight_list_has_no_paragraphs() {
        let out = convert("- a\n- b\n");
        assert_eq!(out.markup, "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn test_inline_markup_and_escaping() {
        let out = convert("**b** *i* ~~s~~ `x<y` [l](http://a.b) 1 < 2\n");
        assert_eq!(
            out.markup,
            "<p><strong>b</strong> <em>i</em> <del>s</del> <code>x&lt;y</code> <a href=\"http://a.b\">l</a> 1 &lt; 2</p>"
        );
    }

    #[test]
    fn test_admonition_becomes_macro() {
        let out = convert(":::warning Careful\nDo **not** do this.\n:::\n");
        assert_eq!(
            out.markup,
            "<ac:structured-macro ac:name=\"warning\"><ac:parameter ac:name=\"title\">Careful</ac:parameter><ac:rich-text-body><p>Do <strong>not</strong> do this.</p></ac:rich-text-body></ac:structured-macro>"
        );
    }

    #[test]
    fn test_admonition_marker_inside_code_is_content() {
        let out = convert("```\n:::note\n```\n");
        assert!(out.markup.contains("<![CDATA[:::note]]>"));
    }

    #[test]
    fn test_unterminated_admonition_is_error() {
        let dialect = Dialect::confluence();
        let result = ForwardConverter::new(&dialect, false).convert(Path::new("a.md"), ":::note\ntext\n");
        assert!(matches!(result, Err(MdBridgeError::Conversion { .. })));
    }

    #[test]
    fn test_html_comments_pass_through() {
        let out = convert("<!-- DIAGRAM_START:mermaid -->\n<!-- DIAGRAM_END:mermaid -->\n");
        assert_eq!(
            out.markup,
            "<!-- DIAGRAM_START:mermaid --><!-- DIAGRAM_END:mermaid -->"
        );
    }

    #[test]
    fn test_deterministic() {
        let md = "# T\n\n```rust\nfn main() {}\n```\n\n![a](a.png)\n";
        assert_eq!(convert(md), convert(md));
    }
}

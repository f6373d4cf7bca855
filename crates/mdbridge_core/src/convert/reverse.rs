//! Storage markup → markdown.
//!
//! The markup is parsed into a [`Node`] tree and rendered with a block pass
//! (paragraphs, headings, lists, tables, macros) and an inline pass (emphasis,
//! links, images). Prose text is entity-decoded and backslash-escaped so it
//! reads back as the same text; code macro bodies are copied as authored.

use crate::dialect::Dialect;
use crate::frontmatter::{self, Frontmatter};
use crate::markup::{self, Element, Node, entities, write_nodes};
use crate::remote::Attachment;

use super::postprocess::{fence, longest_run, tidy_markdown};

const INLINE_TAGS: &[&str] = &[
    "a", "b", "br", "code", "del", "em", "i", "img", "mark", "s", "small", "span", "strike",
    "strong", "sub", "sup", "time", "u",
];

const INLINE_PREFIXED: &[&str] = &[
    "image",
    "link",
    "emoticon",
    "inline-comment-marker",
    "placeholder",
    "attachment",
    "page",
    "url",
    "user",
];

/// Page-level inputs to a reverse conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseContext<'a> {
    /// Attachments listed on the remote page
    pub attachments: &'a [Attachment],
    /// Frontmatter of the local file being overwritten, if any
    pub existing_frontmatter: Option<&'a Frontmatter>,
    /// Remote page title
    pub title: &'a str,
    /// Remote page labels
    pub labels: &'a [String],
}

/// An attachment the converted markdown refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLink {
    /// The remote attachment
    pub attachment: Attachment,
    /// Path written into the markdown, relative to the document
    pub local_path: String,
}

/// Result of a reverse conversion.
#[derive(Debug, Clone, Default)]
pub struct ReverseOutput {
    /// Markdown body
    pub markdown: String,
    /// Merged frontmatter
    pub frontmatter: Frontmatter,
    /// Attachments referenced by the body, without duplicates
    pub attachments: Vec<AttachmentLink>,
}

/// Converts storage markup to markdown.
pub struct ReverseConverter<'d> {
    dialect: &'d Dialect,
    image_dir: &'d str,
}

struct Block {
    text: String,
    comment: bool,
}

struct Render<'c> {
    dialect: &'c Dialect,
    image_dir: &'c str,
    attachments: &'c [Attachment],
    used: Vec<AttachmentLink>,
}

impl<'d> ReverseConverter<'d> {
    /// Create a converter writing image references under `image_dir`.
    pub fn new(dialect: &'d Dialect, image_dir: &'d str) -> Self {
        Self { dialect, image_dir }
    }

    /// Convert a page body.
    pub fn convert(&self, markup: &str, ctx: &ReverseContext<'_>) -> ReverseOutput {
        let nodes = markup::parse(markup);
        let mut render = Render {
            dialect: self.dialect,
            image_dir: self.image_dir,
            attachments: ctx.attachments,
            used: Vec::new(),
        };
        let blocks = render.blocks(&nodes);
        let markdown = tidy_markdown(&join_blocks(blocks, "\n\n"));

        ReverseOutput {
            markdown,
            frontmatter: merge_frontmatter(ctx.existing_frontmatter, ctx.title, ctx.labels),
            attachments: render.used,
        }
    }
}

/// Keep existing keys in place; set `title`, and `tags` when labels exist.
pub fn merge_frontmatter(existing: Option<&Frontmatter>, title: &str, labels: &[String]) -> Frontmatter {
    let mut fm = existing.cloned().unwrap_or_default();
    if !title.is_empty() {
        frontmatter::set_string(&mut fm, "title", title);
    }
    if !labels.is_empty() {
        frontmatter::set_string_array(&mut fm, "tags", labels);
    }
    fm
}

fn join_blocks(blocks: Vec<Block>, separator: &str) -> String {
    let mut out = String::new();
    let mut prev_comment = None;
    for block in blocks {
        if let Some(was_comment) = prev_comment {
            // Marker comments stay on consecutive lines
            out.push_str(if was_comment && block.comment { "\n" } else { separator });
        }
        out.push_str(&block.text);
        prev_comment = Some(block.comment);
    }
    out
}

fn is_inline(e: &Element) -> bool {
    match e.name.prefix {
        None => INLINE_TAGS.contains(&e.name.local.as_str()),
        Some(_) => INLINE_PREFIXED.contains(&e.name.local.as_str()),
    }
}

/// Text of a code macro body: CDATA verbatim, plain text decoded.
fn plain_body(e: &Element) -> String {
    let mut out = String::new();
    for node in &e.children {
        match node {
            Node::CData(c) => out.push_str(c),
            Node::Text(t) => out.push_str(&entities::decode(t)),
            Node::Element(child) => out.push_str(&plain_body(child)),
            Node::Comment(_) => {}
        }
    }
    out
}

fn prefix_lines(text: &str, first: &str, rest: &str) -> String {
    let mut out = String::new();
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let prefix = if i == 0 { first } else { rest };
        if line.is_empty() {
            out.push_str(prefix.trim_end());
        } else {
            out.push_str(prefix);
            out.push_str(line);
        }
    }
    if out.is_empty() {
        out.push_str(first.trim_end());
    }
    out
}

impl Render<'_> {
    fn blocks(&mut self, nodes: &[Node]) -> Vec<Block> {
        let mut out = Vec::new();
        let mut pending: Vec<&Node> = Vec::new();

        for node in nodes {
            match node {
                Node::Element(e) if !is_inline(e) => {
                    self.flush(&mut pending, &mut out);
                    self.block(e, &mut out);
                }
                Node::Comment(c) => {
                    self.flush(&mut pending, &mut out);
                    out.push(Block {
                        text: format!("<!--{}-->", c),
                        comment: true,
                    });
                }
                _ => pending.push(node),
            }
        }
        self.flush(&mut pending, &mut out);
        out
    }

    fn flush(&mut self, pending: &mut Vec<&Node>, out: &mut Vec<Block>) {
        if pending.is_empty() {
            return;
        }
        let text = self.inline(pending.drain(..));
        self.push_paragraph(&text, out);
    }

    fn push_paragraph(&mut self, text: &str, out: &mut Vec<Block>) {
        let text = text
            .lines()
            .map(str::trim_start)
            .collect::<Vec<_>>()
            .join("\n");
        let text = text.trim();
        if !text.is_empty() {
            out.push(Block {
                text: text.to_string(),
                comment: false,
            });
        }
    }

    fn block(&mut self, e: &Element, out: &mut Vec<Block>) {
        let text = |text: String| Block {
            text,
            comment: false,
        };

        if e.name.prefix.is_some() {
            if e.name.local == "structured-macro" || e.name.local == "macro" {
                if let Some(block) = self.structured_macro(e) {
                    out.push(text(block));
                }
            } else {
                // Layout containers, rich-text bodies and unknown wrappers
                out.extend(self.blocks(&e.children));
            }
            return;
        }

        match e.name.local.as_str() {
            "p" => {
                if !e.is_blank() {
                    let inline = self.inline(&e.children);
                    self.push_paragraph(&inline, out);
                }
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = e.name.local[1..].parse::<usize>().unwrap_or(1);
                let inline = self.inline(&e.children);
                let title = inline.split_whitespace().collect::<Vec<_>>().join(" ");
                if !title.is_empty() {
                    out.push(text(format!("{} {}", "#".repeat(level), title)));
                }
            }
            "hr" => out.push(text("---".to_string())),
            "pre" => out.push(text(fence("", &entities::decode(&e.raw_text_content())))),
            "blockquote" => {
                let inner = join_blocks(self.blocks(&e.children), "\n\n");
                out.push(text(prefix_lines(&inner, "> ", "> ")));
            }
            "ul" => out.push(text(self.list(e, false))),
            "ol" => out.push(text(self.list(e, true))),
            "table" => out.push(text(self.table(e))),
            _ => out.extend(self.blocks(&e.children)),
        }
    }

    fn structured_macro(&mut self, e: &Element) -> Option<String> {
        let name = e.attr("name").unwrap_or("").to_ascii_lowercase();

        if self.dialect.is_code_macro(&name) {
            let language = self.parameter(e, self.dialect.language_param).unwrap_or_default();
            let title = self.parameter(e, self.dialect.title_param);
            let mut info = language.trim().to_string();
            if let Some(title) = title.filter(|t| !t.is_empty()) {
                if !info.is_empty() {
                    info.push(' ');
                }
                info.push_str(&title_token(&title));
            }
            let body = e
                .find_child(Some(self.dialect.macro_ns), "plain-text-body")
                .map(plain_body)
                .unwrap_or_default();
            return Some(fence(&info, &body));
        }

        let body = e.find_child(Some(self.dialect.macro_ns), "rich-text-body");

        if let Some(keyword) = self.dialect.admonition_keyword(&name) {
            let inner = body
                .map(|b| join_blocks(self.blocks(&b.children), "\n\n"))
                .unwrap_or_default();
            let opener = match self.parameter(e, "title").filter(|t| !t.is_empty()) {
                Some(title) => format!(":::{} {}", keyword, title),
                None => format!(":::{}", keyword),
            };
            return Some(format!("{}\n{}\n:::", opener, inner));
        }

        match body {
            Some(body) => {
                let inner = join_blocks(self.blocks(&body.children), "\n\n");
                (!inner.is_empty()).then_some(inner)
            }
            None => {
                log::debug!("Dropping '{}' macro without a body", name);
                None
            }
        }
    }

    fn parameter(&self, e: &Element, key: &str) -> Option<String> {
        e.child_elements()
            .find(|p| {
                p.name.is(Some(self.dialect.macro_ns), "parameter") && p.attr("name") == Some(key)
            })
            .map(|p| p.text_content())
    }

    fn list(&mut self, e: &Element, ordered: bool) -> String {
        let start = e
            .attr("start")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1);
        let mut items = Vec::new();
        for (i, li) in e.child_elements().filter(|c| c.name.is(None, "li")).enumerate() {
            let marker = if ordered {
                format!("{}. ", start + i)
            } else {
                "- ".to_string()
            };
            let body = join_blocks(self.blocks(&li.children), "\n");
            let indent = " ".repeat(marker.len());
            items.push(prefix_lines(&body, &marker, &indent));
        }
        items.join("\n")
    }

    fn table(&mut self, e: &Element) -> String {
        let mut rows: Vec<&Element> = Vec::new();
        for child in e.child_elements() {
            match child.name.local.as_str() {
                "tr" => rows.push(child),
                "thead" | "tbody" | "tfoot" => {
                    rows.extend(child.child_elements().filter(|r| r.name.is(None, "tr")))
                }
                _ => {}
            }
        }

        let simple = !rows.is_empty()
            && rows
                .iter()
                .all(|row| row_cells(row).into_iter().all(is_inline_cell));
        if !simple {
            return write_nodes(&[Node::Element(e.clone())]);
        }

        let mut grid: Vec<Vec<String>> = Vec::new();
        for row in &rows {
            let texts = row_cells(row)
                .into_iter()
                .map(|cell| self.cell_text(cell))
                .collect();
            grid.push(texts);
        }
        let width = grid.iter().map(Vec::len).max().unwrap_or(0).max(1);
        for row in &mut grid {
            row.resize(width, String::new());
        }

        let mut out = vec![pipe_row(&grid[0])];
        out.push(pipe_row(&vec!["---".to_string(); width]));
        out.extend(grid[1..].iter().map(|row| pipe_row(row)));
        out.join("\n")
    }

    fn cell_text(&mut self, cell: &Element) -> String {
        let mut text = String::new();
        for node in &cell.children {
            match node {
                Node::Element(p) if p.name.is(None, "p") => text.push_str(&self.inline(&p.children)),
                other => text.push_str(&self.inline(std::iter::once(other))),
            }
        }
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .replace('|', "\\|")
    }

    fn inline<'n>(&mut self, nodes: impl IntoIterator<Item = &'n Node>) -> String {
        let mut out = String::new();
        for node in nodes {
            match node {
                Node::Text(t) => {
                    let line_start = out.is_empty() || out.ends_with('\n');
                    out.push_str(&escape_prose(&entities::decode(t), line_start));
                }
                Node::CData(c) => out.push_str(c),
                Node::Comment(c) => out.push_str(&format!("<!--{}-->", c)),
                Node::Element(e) => self.inline_element(e, &mut out),
            }
        }
        out
    }

    fn inline_element(&mut self, e: &Element, out: &mut String) {
        let wrap = |this: &mut Self, marker: &str, out: &mut String| {
            let inner = this.inline(&e.children);
            let trimmed = inner.trim();
            if !trimmed.is_empty() {
                out.push_str(marker);
                out.push_str(trimmed);
                out.push_str(marker);
            }
        };

        if e.name.prefix.is_some() {
            match e.name.local.as_str() {
                "image" => self.image(e, out),
                "link" => self.link_macro(e, out),
                "emoticon" | "placeholder" => {}
                _ => out.push_str(&self.inline(&e.children)),
            }
            return;
        }

        match e.name.local.as_str() {
            "strong" | "b" => wrap(self, "**", out),
            "em" | "i" => wrap(self, "*", out),
            "del" | "s" | "strike" => wrap(self, "~~", out),
            "code" => {
                let code = e.text_content();
                let ticks = "`".repeat(longest_run(&code, '`') + 1);
                let pad = if code.starts_with('`') || code.ends_with('`') { " " } else { "" };
                out.push_str(&format!("{ticks}{pad}{code}{pad}{ticks}"));
            }
            "br" => out.push_str("\\\n"),
            "a" => {
                let label = self.inline(&e.children);
                match e.attr("href") {
                    Some(href) if !href.is_empty() => {
                        out.push_str(&format!("[{}]({})", label.trim(), href))
                    }
                    _ => out.push_str(&label),
                }
            }
            "img" => {
                let alt = e.attr("alt").unwrap_or("");
                if let Some(src) = e.attr("src") {
                    out.push_str(&format!("![{}]({})", alt, src));
                }
            }
            _ => out.push_str(&self.inline(&e.children)),
        }
    }

    fn image(&mut self, e: &Element, out: &mut String) {
        let alt = e.attr("alt").unwrap_or("").to_string();
        let ri = self.dialect.resource_ns;

        if let Some(attachment) = e.find_child(Some(ri), "attachment")
            && let Some(filename) = attachment.attr("filename")
        {
            let path = self.attachment_path(filename);
            out.push_str(&format!("![{}]({})", alt, path));
        } else if let Some(url) = e.find_child(Some(ri), "url")
            && let Some(value) = url.attr("value")
        {
            out.push_str(&format!("![{}]({})", alt, value));
        }
    }

    fn link_macro(&mut self, e: &Element, out: &mut String) {
        let ri = self.dialect.resource_ns;
        let ns = self.dialect.macro_ns;
        let body = e
            .find_child(Some(ns), "plain-text-link-body")
            .map(|b| escape_prose(&b.text_content(), false))
            .or_else(|| {
                e.find_child(Some(ns), "link-body")
                    .map(|b| self.inline(&b.children))
            });

        if let Some(attachment) = e.find_child(Some(ri), "attachment")
            && let Some(filename) = attachment.attr("filename")
        {
            let path = self.attachment_path(filename);
            let label = body.unwrap_or_else(|| filename.to_string());
            out.push_str(&format!("[{}]({})", label.trim(), path));
        } else if let Some(page) = e.find_child(Some(ri), "page") {
            let title = page.attr("content-title").unwrap_or("");
            out.push_str(body.as_deref().unwrap_or(title).trim());
        } else if let Some(body) = body {
            out.push_str(body.trim());
        }
    }

    /// Rewrite an attachment reference to its local path and note its use.
    ///
    /// Remote names are flattened to their last path segment. A name with no
    /// usable segment keeps its encoded form and is never downloaded.
    fn attachment_path(&mut self, filename: &str) -> String {
        let Some(name) = local_name(filename) else {
            log::warn!("Not downloading attachment with unsafe name '{}'", filename);
            return format!("{}/{}", self.image_dir, urlencoding::encode(filename));
        };
        let local_path = format!("{}/{}", self.image_dir, urlencoding::encode(name));
        match self.attachments.iter().find(|a| a.filename == filename) {
            Some(attachment) => {
                if !self.used.iter().any(|u| u.attachment.filename == filename) {
                    self.used.push(AttachmentLink {
                        attachment: attachment.clone(),
                        local_path: local_path.clone(),
                    });
                }
            }
            None => log::debug!("Page references missing attachment '{}'", filename),
        }
        local_path
    }
}

/// `title="..."` fence token, single-quoted when the title holds `"`.
fn title_token(title: &str) -> String {
    if !title.contains('"') {
        format!("title=\"{}\"", title)
    } else if !title.contains('\'') {
        format!("title='{}'", title)
    } else {
        log::warn!("Code title {:?} has both quote kinds; its double quotes become single quotes", title);
        format!("title=\"{}\"", title.replace('"', "'"))
    }
}

/// Last path segment of a remote attachment name, if it is a plain file name.
fn local_name(filename: &str) -> Option<&str> {
    let last = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match last {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Byte offset of a character that would start a block construct when
/// `line` begins a markdown line.
fn block_marker(line: &str) -> Option<usize> {
    let first = line.chars().next()?;
    if matches!(first, '#' | '>' | '-' | '+' | '=') || line.starts_with(":::") {
        return Some(0);
    }
    // Ordered list markers: `1.` or `1)`
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let ordered = (1..=9).contains(&digits) && matches!(line.as_bytes().get(digits), Some(b'.' | b')'));
    ordered.then_some(digits)
}

/// Backslash-escape prose so markdown reads it back as the same text.
/// `line_start` tells whether `text` begins a line. `<` and `&` stay literal.
fn escape_prose(text: &str, line_start: bool) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for (i, line) in text.split_inclusive('\n').enumerate() {
        let mut rest = line;
        if i > 0 || line_start {
            let body = line.trim_start_matches([' ', '\t']);
            out.push_str(&line[..line.len() - body.len()]);
            rest = body;
            if let Some(at) = block_marker(body) {
                out.push_str(&body[..at]);
                out.push('\\');
                out.push_str(&body[at..at + 1]);
                rest = &body[at + 1..];
            }
        }
        for c in rest.chars() {
            if matches!(c, '\\' | '*' | '_' | '[' | ']' | '`' | '~') {
                out.push('\\');
            }
            out.push(c);
        }
    }
    out
}

fn row_cells(row: &Element) -> Vec<&Element> {
    row.child_elements()
        .filter(|c| c.name.is(None, "td") || c.name.is(None, "th"))
        .collect()
}

fn pipe_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

/// A table cell that fits in a pipe table: inline content, optionally
/// wrapped in a single paragraph.
fn is_inline_cell(cell: &Element) -> bool {
    let mut paragraphs = 0;
    cell.children.iter().all(|node| match node {
        Node::Element(p) if p.name.is(None, "p") => {
            paragraphs += 1;
            paragraphs == 1 && p.children.iter().all(is_inline_node)
        }
        other => is_inline_node(other),
    })
}

fn is_inline_node(node: &Node) -> bool {
    match node {
        Node::Element(e) => {
            is_inline(e) && !e.name.is(None, "br") && e.children.iter().all(is_inline_node)
        }
        Node::Text(_) => true,
        Node::CData(_) | Node::Comment(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(markup: &str) -> String {
        let dialect = Dialect::confluence();
        ReverseConverter::new(&dialect, "img")
            .convert(markup, &ReverseContext::default())
            .markdown
    }

    fn attachment(name: &str) -> Attachment {
        Attachment {
            filename: name.to_string(),
            media_type: "image/png".to_string(),
            remote_ref: format!("att-{}", name),
        }
    }

    #[test]
    fn test_headings_and_paragraphs() {
        assert_eq!(convert("<h2>Title</h2><p>Body <strong>bold</strong></p>"), "## Title\n\nBody **bold**\n");
    }

    #[test]
    fn test_code_macro_round_trips_title() {
        let markup = r#"<ac:structured-macro ac:name="code"><ac:parameter ac:name="language">jsx</ac:parameter><ac:parameter ac:name="title">src/Button.jsx</ac:parameter><ac:plain-text-body><![CDATA[const b = <Button/>;]]></ac:plain-text-body></ac:structured-macro>"#;
        assert_eq!(
            convert(markup),
            "```jsx title=\"src/Button.jsx\"\nconst b = <Button/>;\n```\n"
        );
    }

    #[test]
    fn test_entities_decoded_in_prose_only() {
        let markup = r#"<p>Tags: &lt;div&gt;</p><ac:structured-macro ac:name="code"><ac:plain-text-body><![CDATA[Tags: &lt;div&gt;]]></ac:plain-text-body></ac:structured-macro>"#;
        let md = convert(markup);
        assert!(md.starts_with("Tags: <div>\n"));
        assert!(md.contains("```\nTags: &lt;div&gt;\n```"));
    }

    #[test]
    fn test_empty_paragraphs_suppressed() {
        assert_eq!(convert("<p>a</p><p>&nbsp;</p><p></p><p>b</p>"), "a\n\nb\n");
    }

    #[test]
    fn test_admonition_macro() {
        let markup = r#"<ac:structured-macro ac:name="warning"><ac:parameter ac:name="title">Careful</ac:parameter><ac:rich-text-body><p>Read this.</p></ac:rich-text-body></ac:structured-macro>"#;
        assert_eq!(convert(markup), ":::warning Careful\nRead this.\n:::\n");
    }

    #[test]
    fn test_noformat_is_code_for_legacy_dialect() {
        let dialect = Dialect::confluence_wiki();
        let out = ReverseConverter::new(&dialect, "img").convert(
            r#"<ac:structured-macro ac:name="code-block"><ac:plain-text-body><![CDATA[raw]]></ac:plain-text-body></ac:structured-macro>"#,
            &ReverseContext::default(),
        );
        assert_eq!(out.markdown, "```\nraw\n```\n");
    }

    #[test]
    fn test_simple_table_becomes_pipe_table() {
        let markup = "<table><tbody><tr><th>A</th><th>B</th></tr><tr><td><p>1 | 2</p></td><td>3</td></tr></tbody></table>";
        assert_eq!(convert(markup), "| A | B |\n| --- | --- |\n| 1 \\| 2 | 3 |\n");
    }

    #[test]
    fn test_complex_table_passes_through_as_html() {
        let markup = "<table><tbody><tr><td><ul><li>x</li></ul></td></tr></tbody></table>";
        assert_eq!(convert(markup), format!("{}\n", markup));
    }

    #[test]
    fn test_lists_nest() {
        let markup = "<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul><ol start=\"3\"><li>x</li></ol>";
        assert_eq!(convert(markup), "- a\n  - b\n- c\n\n3. x\n");
    }

    #[test]
    fn test_line_break() {
        assert_eq!(convert("<p>a<br/>b</p>"), "a\\\nb\n");
    }

    #[test]
    fn test_images_resolve_against_attachments() {
        let dialect = Dialect::confluence();
        let attachments = vec![attachment("x y.png"), attachment("unused.png")];
        let ctx = ReverseContext {
            attachments: &attachments,
            ..Default::default()
        };
        let out = ReverseConverter::new(&dialect, "img").convert(
            r#"<p><ac:image ac:alt="x"><ri:attachment ri:filename="x y.png" /></ac:image></p>"#,
            &ctx,
        );
        assert_eq!(out.markdown, "![x](img/x%20y.png)\n");
        assert_eq!(out.attachments.len(), 1);
        assert_eq!(out.attachments[0].local_path, "img/x%20y.png");
        assert_eq!(out.attachments[0].attachment.filename, "x y.png");
    }

    #[test]
    fn test_marker_comments_stay_adjacent() {
        let markup = "<p>x</p><!-- DIAGRAM_START:mermaid --><!-- DIAGRAM_METADATA:mermaid:YQ== --><!-- DIAGRAM_END:mermaid -->";
        assert_eq!(
            convert(markup),
            "x\n\n<!-- DIAGRAM_START:mermaid -->\n<!-- DIAGRAM_METADATA:mermaid:YQ== -->\n<!-- DIAGRAM_END:mermaid -->\n"
        );
    }

    #[test]
    fn test_frontmatter_merge_preserves_keys() {
        let mut existing = Frontmatter::new();
        existing.insert("author".into(), serde_yaml::Value::String("me".into()));
        existing.insert("title".into(), serde_yaml::Value::String("Old".into()));
        let merged = merge_frontmatter(Some(&existing), "New", &[]);
        let keys: Vec<_> = merged.keys().cloned().collect();
        assert_eq!(keys, vec!["author", "title"]);
        assert_eq!(frontmatter::get_string(&merged, "title"), Some("New"));
        assert!(!merged.contains_key("tags"));

        let tagged = merge_frontmatter(None, "T", &["a".to_string()]);
        assert_eq!(frontmatter::get_string_array(&tagged, "tags"), vec!["a"]);
    }

    #[test]
    fn test_prose_punctuation_is_escaped() {
        assert_eq!(convert("<p># not a heading</p>"), "\\# not a heading\n");
        assert_eq!(convert("<p>f(*args*) and [b](c)</p>"), "f(\\*args\\*) and \\[b\\](c)\n");
        assert_eq!(convert("<p>1. not a list</p>"), "1\\. not a list\n");
        assert_eq!(convert("<p>a<br/>- b</p>"), "a\\\n\\- b\n");
        assert_eq!(convert("<p>x - y &lt;z&gt;</p>"), "x - y <z>\n");
    }

    #[test]
    fn test_code_title_with_double_quote_uses_single_quotes() {
        let markup = r#"<ac:structured-macro ac:name="code"><ac:parameter ac:name="language">sh</ac:parameter><ac:parameter ac:name="title">say "hi".sh</ac:parameter><ac:plain-text-body><![CDATA[echo]]></ac:plain-text-body></ac:structured-macro>"#;
        assert_eq!(convert(markup), "```sh title='say \"hi\".sh'\necho\n```\n");
    }

    #[test]
    fn test_attachment_names_cannot_leave_image_dir() {
        let dialect = Dialect::confluence();
        let attachments = vec![attachment("../../../outside.png"), attachment("..")];
        let ctx = ReverseContext {
            attachments: &attachments,
            ..Default::default()
        };
        let out = ReverseConverter::new(&dialect, "img").convert(
            r#"<p><ac:image><ri:attachment ri:filename="../../../outside.png" /></ac:image><ac:image><ri:attachment ri:filename=".." /></ac:image></p>"#,
            &ctx,
        );
        assert_eq!(out.attachments.len(), 1);
        assert_eq!(out.attachments[0].local_path, "img/outside.png");
        assert_eq!(out.attachments[0].attachment.filename, "../../../outside.png");
        assert!(out.markdown.starts_with("![](img/outside.png)"));
    }
}

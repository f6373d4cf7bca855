//! Marker comments that let a rendered diagram be turned back into source.
//!
//! ```text
//! <!-- DIAGRAM_START:<kind> -->
//! <!-- DIAGRAM_METADATA:<kind>:<base64(source)> -->
//! <!-- DIAGRAM_END:<kind> -->
//! ```

use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;
use std::sync::LazyLock;

use super::{DiagramBlock, DiagramKind};
use crate::convert::{fence, indent_lines};

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"<!--\s*DIAGRAM_START:([a-z]+)\s*-->\s*<!--\s*DIAGRAM_METADATA:([a-z]+):([A-Za-z0-9+/=]*)\s*-->\s*<!--\s*DIAGRAM_END:([a-z]+)\s*-->",
    )
    .expect("valid marker regex")
});

static UNPROCESSED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*<!--\s*DIAGRAM_UNPROCESSED:[a-z]+:.*?-->[ \t]*(?:\r?\n)?")
        .expect("valid annotation regex")
});

/// Attachment file name for a diagram id (`mermaid:1a2b3c4d` → `mermaid-1a2b3c4d.svg`).
pub fn asset_filename(id: &str) -> String {
    format!("{}.svg", id.replace(':', "-"))
}

/// Image, caption and marker triple that replace a rendered fence, at the
/// fence's indentation.
pub fn embed(block: &DiagramBlock, filename: &str) -> String {
    let kind = block.kind.as_str();
    let text = format!(
        "![{kind} diagram]({filename})\n\n*{kind} diagram*\n\n\
         <!-- DIAGRAM_START:{kind} -->\n\
         <!-- DIAGRAM_METADATA:{kind}:{} -->\n\
         <!-- DIAGRAM_END:{kind} -->\n",
        STANDARD.encode(block.source.as_bytes())
    );
    indent_lines(&text, block.indent)
}

/// Annotation placed before a fence that could not be rendered. The fence
/// itself is kept unchanged.
pub fn annotate_unprocessed(kind: DiagramKind, reason: &str, original_fence: &str) -> String {
    let reason = reason
        .replace("-->", "->")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let indent = original_fence.len() - original_fence.trim_start_matches([' ', '\t']).len();
    let mut out = format!(
        "{}<!-- DIAGRAM_UNPROCESSED:{}: {} -->\n",
        &original_fence[..indent],
        kind,
        reason
    );
    out.push_str(original_fence);
    if !original_fence.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Remove "not processed" annotations left by earlier runs.
pub fn strip_unprocessed(markdown: &str) -> String {
    UNPROCESSED_RE.replace_all(markdown, "").into_owned()
}

/// Result of decoding markers in a markdown body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Markdown with every decodable marker replaced by its fence
    pub markdown: String,
    /// Number of diagrams restored
    pub restored: usize,
}

/// Replace every marker triple (and the image and caption in front of it)
/// with a fence holding the recorded source, indented like the start marker.
/// Markers that do not decode are left in place.
pub fn decode(markdown: &str) -> Decoded {
    let markdown = strip_unprocessed(markdown);
    let mut out = String::with_capacity(markdown.len());
    let mut cursor = 0;
    let mut restored = 0;

    for caps in MARKER_RE.captures_iter(&markdown) {
        let Some(whole) = caps.get(0) else { continue };
        let start_kind = &caps[1];
        let kinds_agree = start_kind == &caps[2] && start_kind == &caps[4];

        let source = STANDARD
            .decode(caps[3].as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok());

        let (Some(kind), Some(source), true) = (DiagramKind::from_name(start_kind), source, kinds_agree)
        else {
            log::warn!("Leaving undecodable diagram marker for '{}' in place", start_kind);
            continue;
        };

        let line_start = markdown[..whole.start()].rfind('\n').map_or(0, |i| i + 1);
        let lead = &markdown[line_start..whole.start()];
        let indent = if lead.bytes().all(|b| b == b' ') { lead.len() } else { 0 };

        out.push_str(&markdown[cursor..whole.start()]);
        pop_line_if(&mut out, |line| is_caption(line));
        pop_line_if(&mut out, |line| is_diagram_image(line, kind));

        let kept = out.trim_end().len();
        out.truncate(kept);
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&indent_lines(&fence(kind.as_str(), &source), indent));
        cursor = whole.end();
        restored += 1;
    }

    out.push_str(&markdown[cursor..]);
    Decoded {
        markdown: out,
        restored,
    }
}

/// Drop the last non-blank line of `out` when it satisfies `pred`.
fn pop_line_if(out: &mut String, pred: impl Fn(&str) -> bool) {
    let end = out.trim_end().len();
    let start = out[..end].rfind('\n').map(|i| i + 1).unwrap_or(0);
    if end > start && pred(out[start..end].trim()) {
        out.truncate(start);
    }
}

fn is_caption(line: &str) -> bool {
    let emphasised = (line.starts_with('*') && line.ends_with('*'))
        || (line.starts_with('_') && line.ends_with('_'));
    emphasised && line.len() > 2 && line.to_ascii_lowercase().contains("diagram")
}

fn is_diagram_image(line: &str, kind: DiagramKind) -> bool {
    line.starts_with("![") && line.ends_with(')') && line.contains("](") && line.contains(kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash;

    fn block(kind: DiagramKind, source: &str) -> DiagramBlock {
        DiagramBlock {
            kind,
            source: source.to_string(),
            id: hash::diagram_id(kind.as_str(), source),
            span: 0..0,
            indent: 0,
        }
    }

    #[test]
    fn test_asset_filename_is_portable() {
        assert_eq!(asset_filename("mermaid:1a2b3c4d"), "mermaid-1a2b3c4d.svg");
    }

    #[test]
    fn test_embed_is_bit_exact() {
        let b = block(DiagramKind::Mermaid, "graph TD\nA-->B");
        let text = embed(&b, "mermaid-x.svg");
        assert!(text.contains("<!-- DIAGRAM_START:mermaid -->\n<!-- DIAGRAM_METADATA:mermaid:Z3JhcGggVEQKQS0tPkI= -->\n<!-- DIAGRAM_END:mermaid -->"));
        assert!(text.starts_with("![mermaid diagram](mermaid-x.svg)\n\n*mermaid diagram*\n\n"));
    }

    #[test]
    fn test_decode_restores_fence_in_place() {
        let b = block(DiagramKind::Mermaid, "graph TD\n  A-->B");
        let md = format!("Before\n\n{}\nAfter\n", embed(&b, "img/mermaid-x.svg"));
        let decoded = decode(&md);
        assert_eq!(decoded.restored, 1);
        assert_eq!(decoded.markdown, "Before\n\n```mermaid\ngraph TD\n  A-->B\n```\n\nAfter\n");
    }

    #[test]
    fn test_decode_tolerates_blank_lines_between_markers() {
        let md = "![graphviz diagram](img/graphviz-1.svg)\n\n_graphviz diagram_\n\n<!-- DIAGRAM_START:graphviz -->\n\n<!-- DIAGRAM_METADATA:graphviz:YS0+Yg== -->\n\n<!-- DIAGRAM_END:graphviz -->\n";
        assert_eq!(decode(md).markdown, "```graphviz\na->b\n```\n");
    }

    #[test]
    fn test_decode_keeps_unrelated_preceding_lines() {
        let b = block(DiagramKind::Plantuml, "A -> B");
        let md = format!("*emphasis*\n\n{}", embed(&b, "x.svg").replace("![plantuml diagram](x.svg)\n\n*plantuml diagram*\n\n", ""));
        assert_eq!(decode(&md).markdown, "*emphasis*\n\n```plantuml\nA -> B\n```\n");
    }

    #[test]
    fn test_bad_payload_left_untouched() {
        let md = "<!-- DIAGRAM_START:mermaid -->\n<!-- DIAGRAM_METADATA:mermaid:!!! -->\n<!-- DIAGRAM_END:mermaid -->\n";
        let decoded = decode(md);
        assert_eq!(decoded.restored, 0);
        assert_eq!(decoded.markdown, md);
    }

    #[test]
    fn test_unprocessed_annotation_is_stripped() {
        let fence = "```mermaid\ngraph TD\n```\n";
        let annotated = annotate_unprocessed(DiagramKind::Mermaid, "mmdc exited\nwith 1 -->", fence);
        assert_eq!(
            annotated,
            "<!-- DIAGRAM_UNPROCESSED:mermaid: mmdc exited with 1 -> -->\n```mermaid\ngraph TD\n```\n"
        );
        assert_eq!(strip_unprocessed(&annotated), fence);
    }

    #[test]
    fn test_indented_embed_decodes_inside_list_item() {
        let mut b = block(DiagramKind::Mermaid, "graph TD\nA-->B");
        b.indent = 2;
        let embedded = embed(&b, "img/mermaid-x.svg");
        assert!(embedded.starts_with("  ![mermaid diagram](img/mermaid-x.svg)\n\n  *mermaid diagram*\n\n  <!-- DIAGRAM_START:mermaid -->\n"));

        // Pulled list items keep their blocks on consecutive lines
        let md = "- item\n  ![mermaid diagram](img/mermaid-x.svg)\n  *mermaid diagram*\n  <!-- DIAGRAM_START:mermaid -->\n  <!-- DIAGRAM_METADATA:mermaid:Z3JhcGggVEQKQS0tPkI= -->\n  <!-- DIAGRAM_END:mermaid -->\n- next\n";
        assert_eq!(
            decode(md).markdown,
            "- item\n\n  ```mermaid\n  graph TD\n  A-->B\n  ```\n- next\n"
        );
    }

    #[test]
    fn test_unprocessed_annotation_keeps_fence_indent() {
        let annotated = annotate_unprocessed(DiagramKind::Mermaid, "missing", "  ```mermaid\n  x\n  ```\n");
        assert!(annotated.starts_with("  <!-- DIAGRAM_UNPROCESSED:mermaid: missing -->\n  ```mermaid"));
        assert_eq!(strip_unprocessed(&annotated), "  ```mermaid\n  x\n  ```\n");
    }
}

use regex::Regex;
use std::ops::Range;

use super::DiagramKind;
use crate::convert::{FenceLine, FenceTracker};
use crate::hash;

/// A fenced diagram found in a markdown body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// Diagram language
    pub kind: DiagramKind,
    /// Fence content without surrounding blank lines or trailing whitespace
    pub source: String,
    /// Content-addressed id, `kind:8hex`
    pub id: String,
    /// Byte range of the whole fence, closing line included
    pub span: Range<usize>,
    /// Indentation of the fence, in bytes. Set when the fence sits in a
    /// list item; whatever replaces the fence is indented to match.
    pub indent: usize,
}

/// Fence recognition for one diagram kind.
#[derive(Debug, Clone)]
pub struct DiagramKindConfig {
    /// The kind this config recognises
    pub kind: DiagramKind,
    /// Matches the info string of a fence of this kind
    pub fence_pattern: Regex,
}

impl DiagramKindConfig {
    /// Build the fence pattern from the kind's aliases.
    pub fn new(kind: DiagramKind) -> Self {
        let alternatives = kind
            .fence_aliases()
            .iter()
            .map(|a| regex::escape(a))
            .collect::<Vec<_>>()
            .join("|");
        let fence_pattern = Regex::new(&format!(r"(?i)^(?:{})(?:\s|\{{|$)", alternatives))
            .expect("alias pattern is built from escaped literals");
        Self {
            kind,
            fence_pattern,
        }
    }

    /// Whether a fence info string introduces this kind.
    pub fn matches(&self, info: &str) -> bool {
        self.fence_pattern.is_match(info.trim())
    }
}

/// A fenced code block: info string, body and byte span.
struct Fence<'a> {
    info: &'a str,
    body: &'a str,
    span: Range<usize>,
    indent: usize,
}

/// Fenced code blocks of a markdown body, in order.
fn fences(markdown: &str) -> Vec<Fence<'_>> {
    let mut found = Vec::new();
    let mut tracker = FenceTracker::default();
    let mut open = None;
    let mut offset = 0;

    for line in markdown.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        match tracker.classify(line) {
            FenceLine::Open(opener) => open = Some((opener, start, offset)),
            FenceLine::Close => {
                if let Some((opener, fence_start, body_start)) = open.take() {
                    found.push(Fence {
                        info: opener.info,
                        body: &markdown[body_start..start],
                        span: fence_start..offset,
                        indent: opener.indent,
                    });
                }
            }
            FenceLine::Inside | FenceLine::Outside => {}
        }
    }

    if let Some((opener, fence_start, body_start)) = open {
        found.push(Fence {
            info: opener.info,
            body: &markdown[body_start..],
            span: fence_start..markdown.len(),
            indent: opener.indent,
        });
    }
    found
}

/// Drop up to `indent` leading spaces from each line, then surrounding blank
/// lines and trailing whitespace.
fn clean_source(body: &str, indent: usize) -> String {
    let dedented: String = body
        .split_inclusive('\n')
        .map(|line| {
            let spaces = line.len() - line.trim_start_matches(' ').len();
            &line[spaces.min(indent)..]
        })
        .collect();
    dedented.trim_start_matches(['\n', '\r']).trim_end().to_string()
}

/// Find every diagram fence for the enabled kinds, ordered by position.
pub fn extract(markdown: &str, kinds: &[DiagramKindConfig]) -> Vec<DiagramBlock> {
    let fences = fences(markdown);
    let mut blocks: Vec<DiagramBlock> = Vec::new();

    for config in kinds {
        for fence in fences.iter().filter(|f| config.matches(f.info)) {
            let source = clean_source(fence.body, fence.indent);
            blocks.push(DiagramBlock {
                kind: config.kind,
                id: hash::diagram_id(config.kind.as_str(), &source),
                source,
                span: fence.span.clone(),
                indent: fence.indent,
            });
        }
    }

    blocks.sort_by_key(|b| b.span.start);
    blocks
}

//! Whitespace normalization for generated markdown.

pub(crate) fn longest_run(text: &str, ch: char) -> usize {
    let mut best = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

/// Fence `body` with a fence longer than any backtick run inside it. The
/// body is written as-is so trailing blank lines survive a round trip.
pub fn fence(info: &str, body: &str) -> String {
    let ticks = "`".repeat((longest_run(body, '`') + 1).max(3));
    if body.is_empty() {
        format!("{ticks}{info}\n{ticks}")
    } else {
        format!("{ticks}{info}\n{body}\n{ticks}")
    }
}

/// The opening line of a fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FenceOpen<'a> {
    /// Fence character, `` ` `` or `~`
    pub ch: char,
    /// Length of the fence run
    pub len: usize,
    /// Leading whitespace before the fence, in bytes
    pub indent: usize,
    /// Info string, trimmed
    pub info: &'a str,
}

impl<'a> FenceOpen<'a> {
    /// Parse an opening fence. Indentation is not limited so fences nested
    /// in list items are found too.
    pub fn parse(line: &'a str) -> Option<Self> {
        let trimmed = line.trim_start_matches([' ', '\t']);
        let indent = line.len() - trimmed.len();
        let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = trimmed.chars().take_while(|c| *c == ch).count();
        let info = trimmed[len..].trim();
        // Backtick fences cannot carry backticks in their info string
        if len < 3 || (ch == '`' && info.contains('`')) {
            return None;
        }
        Some(Self {
            ch,
            len,
            indent,
            info,
        })
    }
}

fn closes_fence(ch: char, len: usize, line: &str) -> bool {
    let trimmed = line.trim();
    let run = trimmed.chars().take_while(|c| *c == ch).count();
    run >= len && run == trimmed.len()
}

/// Where a line sits relative to fenced code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FenceLine<'a> {
    /// Opens a fence
    Open(FenceOpen<'a>),
    /// Inside an open fence
    Inside,
    /// Closes the open fence
    Close,
    /// Not code
    Outside,
}

/// Classifies lines as they are fed in order. A fence that is never closed
/// runs to the end of the input.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    pub fn classify<'a>(&mut self, line: &'a str) -> FenceLine<'a> {
        match self.open {
            Some((ch, len)) if closes_fence(ch, len, line) => {
                self.open = None;
                FenceLine::Close
            }
            Some(_) => FenceLine::Inside,
            None => match FenceOpen::parse(line) {
                Some(open) => {
                    self.open = Some((open.ch, open.len));
                    FenceLine::Open(open)
                }
                None => FenceLine::Outside,
            },
        }
    }

    /// Whether the last classified line left a fence open.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

/// Prefix every non-blank line of `text` with `indent` spaces.
pub(crate) fn indent_lines(text: &str, indent: usize) -> String {
    if indent == 0 {
        return text.to_string();
    }
    let pad = " ".repeat(indent);
    let mut out = String::with_capacity(text.len() + indent * 8);
    for line in text.split_inclusive('\n') {
        if !line.trim().is_empty() {
            out.push_str(&pad);
        }
        out.push_str(line);
    }
    out
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].chars().next().is_none_or(|c| c == ' ')
}

/// Collapse blank-line runs and put blank lines around top-level fences and
/// headings. Fence contents are left untouched.
pub fn tidy_markdown(markdown: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut fences = FenceTracker::default();
    let mut blank_after = false;

    fn ensure_blank(out: &mut Vec<&str>) {
        if out.last().is_some_and(|l| !l.trim().is_empty()) {
            out.push("");
        }
    }

    for line in markdown.lines() {
        let trimmed = line.trim_start();
        let top_level = line.len() == trimmed.len();

        match fences.classify(line) {
            FenceLine::Inside => {
                out.push(line);
                continue;
            }
            FenceLine::Close => {
                out.push(line);
                blank_after = top_level;
                continue;
            }
            FenceLine::Open(_) | FenceLine::Outside => {}
        }

        if trimmed.is_empty() {
            ensure_blank(&mut out);
            continue;
        }

        if blank_after {
            ensure_blank(&mut out);
            blank_after = false;
        }

        if fences.is_open() {
            if top_level {
                ensure_blank(&mut out);
            }
        } else if top_level && is_heading(trimmed) {
            ensure_blank(&mut out);
            blank_after = true;
        }
        out.push(line);
    }

    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    if out.is_empty() {
        return String::new();
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_blank_runs() {
        assert_eq!(tidy_markdown("a\n\n\n\nb\n\n"), "a\n\nb\n");
    }

    #[test]
    fn test_blank_lines_around_fences_and_headings() {
        assert_eq!(
            tidy_markdown("text\n```\ncode\n```\nmore\n# H\nbody"),
            "text\n\n```\ncode\n```\n\nmore\n\n# H\n\nbody\n"
        );
    }

    #[test]
    fn test_fence_contents_untouched() {
        let md = "```\na\n\n\n\nb\n# not a heading\n```\n";
        assert_eq!(tidy_markdown(md), md);
    }

    #[test]
    fn test_longer_fence_needs_matching_close() {
        let md = "````\n```\nx\n```\n````\n";
        assert_eq!(tidy_markdown(md), md);
    }

    #[test]
    fn test_fence_grows_past_backticks_in_body() {
        assert_eq!(fence("md", "```\nx\n```"), "````md\n```\nx\n```\n````");
        assert_eq!(fence("", ""), "```\n```");
    }

    #[test]
    fn test_hashtag_is_not_heading() {
        assert_eq!(tidy_markdown("a\n#tag\nb"), "a\n#tag\nb\n");
    }

    #[test]
    fn test_fence_tracker_closing_rules() {
        let mut fences = FenceTracker::default();
        let lines = ["  ~~~~ sh\n", "~~~\n", "```\n", "  ~~~~~  \n", "after\n"];
        let kinds: Vec<_> = lines.iter().map(|l| fences.classify(l)).collect();
        assert!(matches!(kinds[0], FenceLine::Open(FenceOpen { ch: '~', len: 4, indent: 2, info: "sh" })));
        assert_eq!(kinds[1], FenceLine::Inside);
        assert_eq!(kinds[2], FenceLine::Inside);
        assert_eq!(kinds[3], FenceLine::Close);
        assert_eq!(kinds[4], FenceLine::Outside);
    }

    #[test]
    fn test_backticks_in_info_string_are_not_a_fence() {
        assert!(FenceOpen::parse("``` a ` b").is_none());
        assert!(FenceOpen::parse("~~~ a ` b").is_some());
        assert!(FenceOpen::parse("``").is_none());
    }

    #[test]
    fn test_indent_lines_skips_blank_lines() {
        assert_eq!(indent_lines("a\n\nb\n", 2), "  a\n\n  b\n");
        assert_eq!(indent_lines("a", 0), "a");
    }
}

//! Platform macro vocabulary.
//!
//! Both converters read macro names and parameter keys from a [`Dialect`]
//! instead of hard-coding one platform's spelling.

use serde::{Deserialize, Serialize};

/// Named dialect presets selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectName {
    /// Confluence storage format (`ac:structured-macro`)
    #[default]
    Confluence,
    /// Older wiki installs where preformatted blocks use `noformat`
    ConfluenceWiki,
}

/// One admonition mapping: markdown keyword <-> remote macro name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admonition {
    /// Keyword used after `:::` in markdown
    pub markdown: &'static str,
    /// Remote macro name
    pub macro_name: &'static str,
}

/// Macro vocabulary for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    /// Which preset this table was built from
    pub name: DialectName,
    /// Element prefix for macros (`ac`)
    pub macro_ns: &'static str,
    /// Element prefix for resource identifiers (`ri`)
    pub resource_ns: &'static str,
    /// Macro emitted for code blocks
    pub code_macro: &'static str,
    /// Additional macro names read back as code blocks
    pub code_macro_aliases: &'static [&'static str],
    /// Parameter key carrying the code language
    pub language_param: &'static str,
    /// Parameter key carrying the code title
    pub title_param: &'static str,
    /// Admonition table; the first entry for a macro name is used in reverse
    pub admonitions: &'static [Admonition],
}

const CONFLUENCE_ADMONITIONS: &[Admonition] = &[
    Admonition { markdown: "info", macro_name: "info" },
    Admonition { markdown: "note", macro_name: "note" },
    Admonition { markdown: "warning", macro_name: "warning" },
    Admonition { markdown: "tip", macro_name: "tip" },
    Admonition { markdown: "caution", macro_name: "warning" },
    Admonition { markdown: "danger", macro_name: "warning" },
];

impl Dialect {
    /// Confluence storage format.
    pub fn confluence() -> Self {
        Self {
            name: DialectName::Confluence,
            macro_ns: "ac",
            resource_ns: "ri",
            code_macro: "code",
            code_macro_aliases: &["noformat"],
            language_param: "language",
            title_param: "title",
            admonitions: CONFLUENCE_ADMONITIONS,
        }
    }

    /// Legacy wiki naming: `code-block` macros are also read back as code.
    pub fn confluence_wiki() -> Self {
        Self {
            name: DialectName::ConfluenceWiki,
            code_macro_aliases: &["noformat", "code-block"],
            ..Self::confluence()
        }
    }

    /// Build the table for a preset.
    pub fn from_name(name: DialectName) -> Self {
        match name {
            DialectName::Confluence => Self::confluence(),
            DialectName::ConfluenceWiki => Self::confluence_wiki(),
        }
    }

    /// Whether a remote macro name denotes a code block.
    pub fn is_code_macro(&self, name: &str) -> bool {
        name == self.code_macro || self.code_macro_aliases.contains(&name)
    }

    /// Remote macro for a markdown admonition keyword.
    pub fn admonition_macro(&self, keyword: &str) -> Option<&'static str> {
        let keyword = keyword.to_ascii_lowercase();
        self.admonitions
            .iter()
            .find(|a| a.markdown == keyword)
            .map(|a| a.macro_name)
    }

    /// Markdown keyword for a remote admonition macro.
    pub fn admonition_keyword(&self, macro_name: &str) -> Option<&'static str> {
        self.admonitions
            .iter()
            .find(|a| a.macro_name == macro_name)
            .map(|a| a.markdown)
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::confluence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admonition_mapping_is_symmetric_for_primary_names() {
        let d = Dialect::confluence();
        for kw in ["info", "note", "warning", "tip"] {
            let m = d.admonition_macro(kw).unwrap();
            assert_eq!(d.admonition_keyword(m), Some(kw));
        }
    }

    #[test]
    fn test_aliases_map_to_warning() {
        let d = Dialect::confluence();
        assert_eq!(d.admonition_macro("Danger"), Some("warning"));
        assert_eq!(d.admonition_macro("unknown"), None);
    }

    #[test]
    fn test_code_aliases() {
        let d = Dialect::from_name(DialectName::ConfluenceWiki);
        assert!(d.is_code_macro("code"));
        assert!(d.is_code_macro("code-block"));
        assert!(!Dialect::confluence().is_code_macro("code-block"));
    }
}

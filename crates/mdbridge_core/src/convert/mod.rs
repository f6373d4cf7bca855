//! Markdown ↔ storage markup conversion.
//!
//! [`Converter`] is the one capability both sync directions use;
//! [`StorageConverter`] implements it for any [`Dialect`].

mod forward;
mod postprocess;
mod reverse;

pub use forward::{
    FenceInfo, ForwardConverter, ForwardOutput, ImageRef, attachment_filename, is_remote_url,
    parse_fence_info,
};
pub use postprocess::{fence, tidy_markdown};
pub(crate) use postprocess::{FenceLine, FenceTracker, indent_lines};
pub use reverse::{
    AttachmentLink, ReverseContext, ReverseConverter, ReverseOutput, merge_frontmatter,
};

use std::path::Path;

use crate::config::ConverterConfig;
use crate::dialect::Dialect;
use crate::error::Result;

/// Both conversion directions.
pub trait Converter {
    /// Markdown body → storage markup plus the local images it references.
    fn convert_forward(&self, source_path: &Path, markdown: &str) -> Result<ForwardOutput>;

    /// Storage markup → markdown, merged frontmatter and used attachments.
    fn convert_reverse(&self, markup: &str, ctx: &ReverseContext<'_>) -> Result<ReverseOutput>;
}

/// Converter for storage-format platforms, parameterized by a [`Dialect`].
#[derive(Debug, Clone)]
pub struct StorageConverter {
    dialect: Dialect,
    config: ConverterConfig,
}

impl StorageConverter {
    /// Build a converter from its config record.
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            dialect: Dialect::from_name(config.dialect),
            config: config.clone(),
        }
    }

    /// The macro vocabulary in use.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Directory pulled images are written to, relative to each document.
    pub fn image_dir(&self) -> &str {
        &self.config.image_dir
    }
}

impl Default for StorageConverter {
    fn default() -> Self {
        Self::new(&ConverterConfig::default())
    }
}

impl Converter for StorageConverter {
    fn convert_forward(&self, source_path: &Path, markdown: &str) -> Result<ForwardOutput> {
        ForwardConverter::new(&self.dialect, self.config.smart_punctuation).convert(source_path, markdown)
    }

    fn convert_reverse(&self, markup: &str, ctx: &ReverseContext<'_>) -> Result<ReverseOutput> {
        Ok(ReverseConverter::new(&self.dialect, &self.config.image_dir).convert(markup, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_title_round_trip() {
        let converter = StorageConverter::default();
        let md = "```jsx title=\"src/Button.jsx\"\nexport const Button = () => <button/>;\n```\n";
        let forward = converter.convert_forward(Path::new("a.md"), md).unwrap();
        let back = converter
            .convert_reverse(&forward.markup, &ReverseContext::default())
            .unwrap();
        assert_eq!(back.markdown, md);
    }

    #[test]
    fn test_entities_in_code_survive_round_trip() {
        let converter = StorageConverter::default();
        let md = "```html\nTags: &lt;div&gt; <b>&amp;</b>\n```\n";
        let forward = converter.convert_forward(Path::new("a.md"), md).unwrap();
        let back = converter
            .convert_reverse(&forward.markup, &ReverseContext::default())
            .unwrap();
        assert_eq!(back.markdown, md);
    }

    #[test]
    fn test_structure_round_trip() {
        let converter = StorageConverter::new(&ConverterConfig {
            smart_punctuation: false,
            ..Default::default()
        });
        let md = "# Title\n\nSome **bold** and *em* text with `code`.\n\n- one\n- two\n\n| A | B |\n| --- | --- |\n| 1 | 2 |\n\n:::note Heads up\nInside the box.\n:::\n";
        let forward = converter.convert_forward(Path::new("a.md"), md).unwrap();
        let back = converter
            .convert_reverse(&forward.markup, &ReverseContext::default())
            .unwrap();
        assert_eq!(back.markdown, md);
    }

    #[test]
    fn test_escaped_punctuation_stays_literal() {
        let converter = StorageConverter::new(&ConverterConfig {
            smart_punctuation: false,
            ..Default::default()
        });
        let cases = [
            ("\\# not a heading\n", "<p># not a heading</p>"),
            ("call f(\\*args\\*)\n", "<p>call f(*args*)</p>"),
            ("1\\. not a list\n", "<p>1. not a list</p>"),
            ("\\[b\\](c)\n", "<p>[b](c)</p>"),
            ("snake\\_case\n", "<p>snake_case</p>"),
        ];
        for (md, markup) in cases {
            let forward = converter.convert_forward(Path::new("a.md"), md).unwrap();
            assert_eq!(forward.markup, markup);
            let back = converter
                .convert_reverse(&forward.markup, &ReverseContext::default())
                .unwrap();
            assert_eq!(back.markdown, md);
            let again = converter.convert_forward(Path::new("a.md"), &back.markdown).unwrap();
            assert_eq!(again.markup, forward.markup);
        }
    }
}

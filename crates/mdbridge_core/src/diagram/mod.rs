#![doc = include_str!(concat!(env!("OUT_DIR"), "/diagram_README.md"))]

mod extract;
pub mod marker;
mod pipeline;
pub mod renderer;

pub use extract::{DiagramBlock, DiagramKindConfig, extract};
pub use pipeline::{AssetStore, DiagramPipeline, DiagramStats, KindStats, PipelineOutput, RenderedAsset};
pub use renderer::{CommandRenderer, DiagramRenderer};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported diagram languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramKind {
    /// Mermaid (`mmdc`)
    Mermaid,
    /// PlantUML
    Plantuml,
    /// Graphviz `dot`
    Graphviz,
}

impl DiagramKind {
    /// Every supported kind.
    pub const ALL: [DiagramKind; 3] = [
        DiagramKind::Mermaid,
        DiagramKind::Plantuml,
        DiagramKind::Graphviz,
    ];

    /// Name used in markers and asset file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramKind::Mermaid => "mermaid",
            DiagramKind::Plantuml => "plantuml",
            DiagramKind::Graphviz => "graphviz",
        }
    }

    /// Fence languages recognised for this kind.
    pub fn fence_aliases(&self) -> &'static [&'static str] {
        match self {
            DiagramKind::Mermaid => &["mermaid"],
            DiagramKind::Plantuml => &["plantuml", "puml"],
            DiagramKind::Graphviz => &["graphviz", "dot"],
        }
    }

    /// Parse a marker name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in DiagramKind::ALL {
            assert_eq!(DiagramKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(DiagramKind::from_name("dot"), None);
    }

    #[test]
    fn test_kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&DiagramKind::Plantuml).unwrap();
        assert_eq!(json, "\"plantuml\"");
    }
}

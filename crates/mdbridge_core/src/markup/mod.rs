//! Tagged-node tree for remote storage markup.
//!
//! The remote platform returns XHTML sprinkled with namespaced macro elements
//! (`ac:structured-macro`, `ri:attachment`, ...). The tokenizer splits every
//! qualified name into prefix and local part, which is all the "namespace
//! handling" the converters need; no namespace declarations are required.
//!
//! Text nodes keep their raw, still-escaped form. Prose decodes entities when
//! it is emitted as markdown; code bodies never do.

pub mod entities;
mod parser;
mod writer;

pub use parser::parse;
pub use writer::{escape_attr, escape_text, write_nodes};

/// A possibly-prefixed element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    /// Namespace prefix (`ac` in `ac:structured-macro`)
    pub prefix: Option<String>,
    /// Local part (`structured-macro`)
    pub local: String,
}

impl QName {
    /// Split a raw name at its first colon.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => Self {
                prefix: Some(prefix.to_ascii_lowercase()),
                local: local.to_ascii_lowercase(),
            },
            _ => Self {
                prefix: None,
                local: raw.to_ascii_lowercase(),
            },
        }
    }

    /// Whether this name has the given prefix and local part.
    pub fn is(&self, prefix: Option<&str>, local: &str) -> bool {
        self.prefix.as_deref() == prefix && self.local == local
    }

    /// Re-assemble the qualified name.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }
}

/// An attribute with its value already entity-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: QName,
    /// Decoded value
    pub value: String,
}

/// An element with its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Element name
    pub name: QName,
    /// Attributes in document order
    pub attrs: Vec<Attribute>,
    /// Child nodes
    pub children: Vec<Node>,
}

/// A node of the markup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element
    Element(Element),
    /// Raw text, entities still escaped
    Text(String),
    /// CDATA section contents, verbatim
    CData(String),
    /// Comment contents (between `<!--` and `-->`)
    Comment(String),
}

impl Element {
    /// Create an element without attributes or children.
    pub fn new(name: &str) -> Self {
        Self {
            name: QName::parse(name),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Look up an attribute by local name, ignoring its prefix.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// Iterate over child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First child element with the given name.
    pub fn find_child(&self, prefix: Option<&str>, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name.is(prefix, local))
    }

    /// Concatenated text of all descendants, entities decoded.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out, true);
        out
    }

    /// Concatenated text of all descendants exactly as authored.
    pub fn raw_text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out, false);
        out
    }

    /// Whether the element holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.children.iter().all(|n| match n {
            Node::Text(t) => entities::decode(t).trim().is_empty(),
            Node::CData(c) => c.trim().is_empty(),
            Node::Comment(_) => false,
            Node::Element(e) => e.is_void_like() || (e.is_blank() && !e.is_media()),
        })
    }

    fn is_void_like(&self) -> bool {
        self.name.prefix.is_none() && self.name.local == "br"
    }

    fn is_media(&self) -> bool {
        matches!(self.name.local.as_str(), "image" | "img" | "structured-macro" | "hr")
    }
}

fn collect_text(nodes: &[Node], out: &mut String, decode: bool) {
    for node in nodes {
        match node {
            Node::Text(t) if decode => out.push_str(&entities::decode(t)),
            Node::Text(t) => out.push_str(t),
            Node::CData(c) => out.push_str(c),
            Node::Element(e) => collect_text(&e.children, out, decode),
            Node::Comment(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_split() {
        let q = QName::parse("ac:structured-macro");
        assert!(q.is(Some("ac"), "structured-macro"));
        assert_eq!(q.qualified(), "ac:structured-macro");
        assert!(QName::parse("P").is(None, "p"));
    }

    #[test]
    fn test_blank_paragraph_detection() {
        let nodes = parse("<p> &nbsp; <br/></p><p><ac:image><ri:attachment ri:filename=\"a.png\"/></ac:image></p>");
        let Node::Element(first) = &nodes[0] else { panic!() };
        let Node::Element(second) = &nodes[1] else { panic!() };
        assert!(first.is_blank());
        assert!(!second.is_blank());
    }
}

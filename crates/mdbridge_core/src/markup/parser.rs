//! Tokenizer and tree builder.
//!
//! The tokenizer only recognises lexical shapes (tags, comments, CDATA,
//! text). Nesting is decided by the tree builder's element stack, so macro
//! bodies containing other macros nest correctly.

use super::entities;
use super::{Attribute, Element, Node, QName};

/// Elements that never have children.
const VOID_ELEMENTS: &[&str] = &[
    "br", "hr", "img", "col", "input", "meta", "link", "area", "base", "wbr", "source",
];

#[derive(Debug, PartialEq)]
enum Token {
    Open {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    Close(String),
    Text(String),
    CData(String),
    Comment(String),
}

/// Parse markup into a forest of nodes. Never fails: malformed input is
/// recovered from the way browsers do (unclosed elements close at the end,
/// stray closing tags are dropped).
pub fn parse(input: &str) -> Vec<Node> {
    build(tokenize(input))
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    let bytes = input.as_bytes();

    while pos < input.len() {
        let rest = &input[pos..];

        if let Some(body) = rest.strip_prefix("<!--") {
            let end = body.find("-->").unwrap_or(body.len());
            tokens.push(Token::Comment(body[..end].to_string()));
            pos += 4 + (end + 3).min(body.len());
            continue;
        }

        if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let end = body.find("]]>").unwrap_or(body.len());
            tokens.push(Token::CData(body[..end].to_string()));
            pos += 9 + (end + 3).min(body.len());
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            // Doctype or processing instruction
            pos += rest.find('>').map(|i| i + 1).unwrap_or(rest.len());
            continue;
        }

        if let Some(body) = rest.strip_prefix("</") {
            if let Some(end) = body.find('>') {
                let name = body[..end].trim().to_string();
                tokens.push(Token::Close(name));
                pos += 2 + end + 1;
                continue;
            }
        }

        if bytes[pos] == b'<'
            && let Some(next) = rest[1..].chars().next()
            && next.is_ascii_alphabetic()
            && let Some((token, consumed)) = read_open_tag(rest)
        {
            tokens.push(token);
            pos += consumed;
            continue;
        }

        // Plain text up to the next tag start (or a lone '<')
        let first = rest.chars().next().map(char::len_utf8).unwrap_or(1);
        let end = rest[first..]
            .find('<')
            .map(|i| i + first)
            .unwrap_or(rest.len());
        match tokens.last_mut() {
            Some(Token::Text(prev)) => prev.push_str(&rest[..end]),
            _ => tokens.push(Token::Text(rest[..end].to_string())),
        }
        pos += end;
    }

    tokens
}

/// Read `<name attr="v" ...>` or `<name .../>` from the start of `input`.
fn read_open_tag(input: &str) -> Option<(Token, usize)> {
    let mut name_end = input.len();
    for (i, c) in input.char_indices().skip(1) {
        if c.is_whitespace() || c == '>' || c == '/' {
            name_end = i;
            break;
        }
    }
    let name = input[1..name_end].to_string();

    let mut attrs = Vec::new();
    let mut i = name_end;
    let bytes = input.as_bytes();

    loop {
        while i < input.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= input.len() {
            return None;
        }
        if input[i..].starts_with("/>") {
            return Some((
                Token::Open {
                    name,
                    attrs,
                    self_closing: true,
                },
                i + 2,
            ));
        }
        if bytes[i] == b'>' {
            return Some((
                Token::Open {
                    name,
                    attrs,
                    self_closing: false,
                },
                i + 1,
            ));
        }
        if bytes[i] == b'/' {
            i += 1;
            continue;
        }

        // Attribute name
        let start = i;
        while i < input.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'>'
            && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
        {
            i += 1;
        }
        let attr_name = &input[start..i];

        while i < input.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = if i < input.len() && bytes[i] == b'=' {
            i += 1;
            while i < input.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= input.len() {
                return None;
            }
            let quote = bytes[i];
            if quote == b'"' || quote == b'\'' {
                let close = input[i + 1..].find(quote as char)? + i + 1;
                let raw = &input[i + 1..close];
                i = close + 1;
                entities::decode(raw)
            } else {
                let start = i;
                while i < input.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                entities::decode(&input[start..i])
            }
        } else {
            String::new()
        };

        if !attr_name.is_empty() {
            attrs.push(Attribute {
                name: QName::parse(attr_name),
                value,
            });
        }
    }
}

fn build(tokens: Vec<Token>) -> Vec<Node> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    fn attach(node: Node, stack: &mut [Element], root: &mut Vec<Node>) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => root.push(node),
        }
    }

    for token in tokens {
        match token {
            Token::Open {
                name,
                attrs,
                self_closing,
            } => {
                let qname = QName::parse(&name);
                let is_void = qname.prefix.is_none() && VOID_ELEMENTS.contains(&qname.local.as_str());
                let element = Element {
                    name: qname,
                    attrs,
                    children: Vec::new(),
                };
                if self_closing || is_void {
                    attach(Node::Element(element), &mut stack, &mut root);
                } else {
                    stack.push(element);
                }
            }
            Token::Close(name) => {
                let qname = QName::parse(&name);
                if let Some(depth) = stack.iter().rposition(|e| e.name == qname) {
                    while stack.len() > depth {
                        // Loop condition guarantees the stack is non-empty
                        if let Some(done) = stack.pop() {
                            attach(Node::Element(done), &mut stack, &mut root);
                        }
                    }
                }
            }
            Token::Text(text) => attach(Node::Text(text), &mut stack, &mut root),
            Token::CData(text) => attach(Node::CData(text), &mut stack, &mut root),
            Token::Comment(text) => attach(Node::Comment(text), &mut stack, &mut root),
        }
    }

    while let Some(done) = stack.pop() {
        attach(Node::Element(done), &mut stack, &mut root);
    }

    root
}

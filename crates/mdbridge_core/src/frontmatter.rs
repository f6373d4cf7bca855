//! YAML frontmatter parsing and serialization.
//!
//! Frontmatter is kept as an ordered map so that a pull never reorders the
//! keys a user wrote by hand.

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::error::Result;

/// Ordered frontmatter map.
pub type Frontmatter = IndexMap<String, Value>;

/// Result of parsing a markdown file with frontmatter.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    /// The parsed frontmatter as an ordered map.
    pub frontmatter: Frontmatter,
    /// The body content after the frontmatter.
    pub body: String,
}

/// Locate the frontmatter block, returning `(yaml, body)` slices.
fn split(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    // Empty frontmatter block
    if let Some(body) = rest.strip_prefix("---\n") {
        return Some(("", body));
    }

    let (end_idx, delim_len) = match rest.find("\n---\n") {
        Some(idx) => (idx, 5),
        None => match rest.find("\n---\r\n") {
            Some(idx) => (idx, 6),
            None if rest.ends_with("\n---") => (rest.len() - 4, 4),
            None => return None,
        },
    };

    Some((&rest[..end_idx], &rest[end_idx + delim_len..]))
}

/// Parse frontmatter and body, returning empty frontmatter if none exists.
///
/// A file without a closing delimiter is treated as having no frontmatter.
pub fn parse_or_empty(content: &str) -> Result<ParsedFile> {
    match split(content) {
        Some((yaml, body)) => {
            let frontmatter: Frontmatter = if yaml.trim().is_empty() {
                IndexMap::new()
            } else {
                serde_yaml::from_str(yaml)?
            };
            Ok(ParsedFile {
                frontmatter,
                body: body.to_string(),
            })
        }
        None => Ok(ParsedFile {
            frontmatter: IndexMap::new(),
            body: content.to_string(),
        }),
    }
}

/// Serialize frontmatter and body back to markdown content.
///
/// Empty frontmatter produces just the body.
pub fn serialize(frontmatter: &Frontmatter, body: &str) -> Result<String> {
    if frontmatter.is_empty() {
        return Ok(body.to_string());
    }
    let yaml_str = serde_yaml::to_string(frontmatter)?;
    Ok(format!("---\n{}---\n\n{}", yaml_str, body.trim_start_matches('\n')))
}

/// Get a string property value.
pub fn get_string<'a>(frontmatter: &'a Frontmatter, key: &str) -> Option<&'a str> {
    frontmatter.get(key).and_then(|v| v.as_str())
}

/// Get an array property as a Vec of strings.
///
/// A scalar string is treated as a one-element list.
pub fn get_string_array(frontmatter: &Frontmatter, key: &str) -> Vec<String> {
    match frontmatter.get(key) {
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Set a string property in place, keeping the key's position if it exists.
pub fn set_string(frontmatter: &mut Frontmatter, key: &str, value: &str) {
    frontmatter.insert(key.to_string(), Value::String(value.to_string()));
}

/// Set a list-of-strings property in place.
pub fn set_string_array(frontmatter: &mut Frontmatter, key: &str, values: &[String]) {
    let seq = values.iter().cloned().map(Value::String).collect();
    frontmatter.insert(key.to_string(), Value::Sequence(seq));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_frontmatter() {
        let content = "---\ntitle: Test\n---\n\nBody content";
        let parsed = parse_or_empty(content).unwrap();
        assert_eq!(get_string(&parsed.frontmatter, "title"), Some("Test"));
        assert_eq!(parsed.body.trim(), "Body content");
    }

    #[test]
    fn test_parse_or_empty_no_frontmatter() {
        let content = "Just body content";
        let parsed = parse_or_empty(content).unwrap();
        assert!(parsed.frontmatter.is_empty());
        assert_eq!(parsed.body, content);
    }

    #[test]
    fn test_unclosed_frontmatter_is_body() {
        let content = "---\ntitle: Test\nno closing";
        let parsed = parse_or_empty(content).unwrap();
        assert!(parsed.frontmatter.is_empty());
        assert_eq!(parsed.body, content);
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let content = "---\ntitle: [unclosed\n---\nbody";
        assert!(parse_or_empty(content).is_err());
    }

    #[test]
    fn test_serialize_preserves_order() {
        let mut fm = IndexMap::new();
        set_string(&mut fm, "zeta", "1");
        set_string(&mut fm, "alpha", "2");
        let out = serialize(&fm, "Body\n").unwrap();
        let zeta = out.find("zeta").unwrap();
        let alpha = out.find("alpha").unwrap();
        assert!(zeta < alpha);
        assert!(out.ends_with("---\n\nBody\n"));
    }

    #[test]
    fn test_string_array_accepts_scalar() {
        let parsed = parse_or_empty("---\ntags: solo\n---\n").unwrap();
        assert_eq!(get_string_array(&parsed.frontmatter, "tags"), vec!["solo"]);
    }
}

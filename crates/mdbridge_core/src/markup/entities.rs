//! Character entity decoding.

/// Named entities the remote editor is known to emit.
const NAMED: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", " "),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("hellip", "\u{2026}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("ldquo", "\u{201C}"),
    ("rdquo", "\u{201D}"),
    ("laquo", "\u{00AB}"),
    ("raquo", "\u{00BB}"),
    ("copy", "\u{00A9}"),
    ("reg", "\u{00AE}"),
    ("trade", "\u{2122}"),
    ("times", "\u{00D7}"),
    ("middot", "\u{00B7}"),
    ("bull", "\u{2022}"),
    ("rarr", "\u{2192}"),
    ("larr", "\u{2190}"),
    ("harr", "\u{2194}"),
    ("rArr", "\u{21D2}"),
    ("deg", "\u{00B0}"),
];

/// Longest entity name (plus `#x` and digits) we bother to look at.
const MAX_ENTITY_LEN: usize = 10;

/// Decode character references. Unknown entities are left untouched.
pub fn decode(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];

        let decoded = after
            .find(';')
            .filter(|&semi| semi > 0 && semi <= MAX_ENTITY_LEN)
            .and_then(|semi| lookup(&after[..semi]).map(|s| (s, semi)));

        match decoded {
            Some((text, semi)) => {
                out.push_str(&text);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn lookup(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    NAMED
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic_entities() {
        assert_eq!(decode("Tags: &lt;div&gt;"), "Tags: <div>");
        assert_eq!(decode("a &amp;&amp; b"), "a && b");
    }

    #[test]
    fn test_decode_numeric() {
        assert_eq!(decode("&#65;&#x42;&#X43;"), "ABC");
    }

    #[test]
    fn test_unknown_and_bare_ampersands_survive() {
        assert_eq!(decode("R&D &bogus; a & b"), "R&D &bogus; a & b");
        assert_eq!(decode("&;"), "&;");
    }

    #[test]
    fn test_double_escape_decodes_once() {
        assert_eq!(decode("&amp;lt;"), "&lt;");
    }
}

//! Best-effort JSONPath subset.
//!
//! Supported: `$`, `.name`, `['name']`, `[n]`, `[*]`, `.*`, and an optional
//! trailing `== value` (or `= value`) comparison. Recursive descent, filters
//! and slices are rejected so the caller can report a failed match.

use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// A parsed expression: the selector plus an optional expected value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
    expected: Option<String>,
}

impl JsonPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let (selector, expected) = split_comparison(raw.trim());
        let selector = selector.trim();
        let Some(mut rest) = selector.strip_prefix('$') else {
            return Err(unsupported(raw, "expression must start with `$`"));
        };
        if rest.contains("..") || rest.contains("?(") || rest.contains('@') {
            return Err(unsupported(raw, "recursive descent and filters are not supported"));
        }

        let mut segments = Vec::new();
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                let name = &after[..end];
                if name.is_empty() {
                    return Err(unsupported(raw, "empty member name"));
                }
                segments.push(if name == "*" {
                    Segment::Wildcard
                } else {
                    Segment::Key(name.to_string())
                });
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let end = after
                    .find(']')
                    .ok_or_else(|| unsupported(raw, "unclosed `[`"))?;
                segments.push(parse_bracket(raw, after[..end].trim())?);
                rest = &after[end + 1..];
            } else {
                return Err(unsupported(raw, "unexpected character"));
            }
        }

        Ok(Self {
            segments,
            expected: expected.map(|value| unquote(value.trim()).to_string()),
        })
    }

    /// All values the selector reaches in `root`.
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match (segment, value) {
                    (Segment::Key(key), Value::Object(map)) => next.extend(map.get(key)),
                    (Segment::Index(index), Value::Array(items)) => next.extend(items.get(*index)),
                    (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    _ => {}
                }
            }
            current = next;
        }
        current
    }

    pub fn expected(&self) -> Option<&str> {
        self.expected.as_deref()
    }
}

fn parse_bracket(raw: &str, inner: &str) -> Result<Segment> {
    if inner == "*" {
        return Ok(Segment::Wildcard);
    }
    if let Ok(index) = inner.parse::<usize>() {
        return Ok(Segment::Index(index));
    }
    let quoted = (inner.starts_with('\'') && inner.ends_with('\''))
        || (inner.starts_with('"') && inner.ends_with('"'));
    if quoted && inner.len() >= 2 {
        return Ok(Segment::Key(inner[1..inner.len() - 1].to_string()));
    }
    Err(unsupported(raw, "unsupported bracket selector"))
}

/// Split `selector == value` at the first `==`/`=` outside brackets.
fn split_comparison(raw: &str) -> (&str, Option<&str>) {
    let mut depth = 0usize;
    let bytes = raw.as_bytes();
    for (i, byte) in bytes.iter().enumerate() {
        match byte {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => {
                let value_start = if bytes.get(i + 1) == Some(&b'=') { i + 2 } else { i + 1 };
                return (&raw[..i], Some(&raw[value_start..]));
            }
            _ => {}
        }
    }
    (raw, None)
}

pub(crate) fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn unsupported(raw: &str, why: &str) -> Error {
    Error::MalformedPattern(format!("unsupported JSONPath `{raw}`: {why}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selects_nested_members() {
        let body = json!({"nfProfile": {"nfType": "UDM", "ipv4": ["10.0.0.1", "10.0.0.2"]}});
        let path = JsonPath::parse("$.nfProfile.ipv4[1]").unwrap();
        assert_eq!(path.select(&body), vec![&json!("10.0.0.2")]);
        assert!(path.expected().is_none());
    }

    #[test]
    fn wildcard_over_array() {
        let body = json!({"services": [{"name": "a"}, {"name": "b"}]});
        let path = JsonPath::parse("$.services[*].name").unwrap();
        assert_eq!(path.select(&body).len(), 2);
    }

    #[test]
    fn bracket_keys_and_comparison() {
        let path = JsonPath::parse("$['status']['code'] == 200").unwrap();
        assert_eq!(path.expected(), Some("200"));
        assert_eq!(path.select(&json!({"status": {"code": 200}})), vec![&json!(200)]);

        let path = JsonPath::parse("$.nfType='UDM'").unwrap();
        assert_eq!(path.expected(), Some("UDM"));
    }

    #[test]
    fn rejects_filters_and_descent() {
        assert!(JsonPath::parse("$..name").is_err());
        assert!(JsonPath::parse("$.items[?(@.id==1)]").is_err());
        assert!(JsonPath::parse("$.items[0:2]").is_err());
    }
}

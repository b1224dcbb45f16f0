//! # Pattern Classification & Matching
//!
//! Expectation strings authored by test writers come in five shapes, tried
//! in this order:
//!
//! | Shape            | Example                         |
//! |------------------|---------------------------------|
//! | JSON object/array| `{"nfType":"UDM"}`              |
//! | regex            | `regex:nf(Type|Status)`         |
//! | JSONPath subset  | `$.nfProfile.nfType == UDM`     |
//! | key-value        | `status.code:200`, `name=svc1`  |
//! | substring        | anything else                   |
//!
//! The grammar is backward-compatible input; do not tighten it.

use std::collections::BTreeMap;

use regex::RegexBuilder;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::diff::{Differ, child_path, index_path};
use super::jsonpath::{JsonPath, unquote};
use super::percent::match_report;
use super::types::{Difference, PatternClassification, PatternKind, stringify};
use crate::error::{Error, Result};

const REGEX_PREFIX: &str = "regex:";
const JSONPATH_PREFIX: &str = "$.";

/// Outcome of evaluating one classified pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub matched: bool,
    pub detail: String,
    /// Populated for failed JSON-shaped and key-value patterns.
    pub diffs: Vec<Difference>,
    pub match_percent: f64,
    pub matches: BTreeMap<String, Value>,
}

impl PatternMatch {
    fn hit(detail: impl Into<String>) -> Self {
        Self {
            matched: true,
            detail: detail.into(),
            diffs: Vec::new(),
            match_percent: 100.0,
            matches: BTreeMap::new(),
        }
    }

    fn miss(detail: impl Into<String>) -> Self {
        Self {
            matched: false,
            detail: detail.into(),
            diffs: Vec::new(),
            match_percent: 0.0,
            matches: BTreeMap::new(),
        }
    }
}

/// Classify a raw pattern string. Pure; never fails.
pub fn classify(raw: &str) -> PatternClassification {
    let trimmed = raw.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value @ Value::Object(_)) => return json_class(PatternKind::JsonObject, &value),
            Ok(value @ Value::Array(_)) => return json_class(PatternKind::JsonArray, &value),
            Ok(_) => {}
            Err(err) => {
                warn!(pattern = %trimmed, error = %err, "Pattern looks like JSON but does not parse, falling back");
                return match lenient_pairs(trimmed) {
                    Some(pairs) => key_value_class(&pairs),
                    None => substring_class(trimmed),
                };
            }
        }
    }

    if let Some(expr) = trimmed.strip_prefix(REGEX_PREFIX) {
        return PatternClassification {
            kind: PatternKind::Regex,
            normalized_value: expr.to_string(),
        };
    }

    if trimmed.starts_with(JSONPATH_PREFIX) {
        return PatternClassification {
            kind: PatternKind::Jsonpath,
            normalized_value: trimmed.to_string(),
        };
    }

    // A JSON scalar such as `"a:b"` is never a key-value pattern.
    if serde_json::from_str::<Value>(trimmed).is_err() {
        if let Some(pair) = split_pair(trimmed) {
            return key_value_class(&[pair]);
        }
    }

    substring_class(trimmed)
}

/// Evaluate with the default unordered-array rule.
pub fn evaluate(
    classification: &PatternClassification,
    body: &Value,
    headers: &BTreeMap<String, String>,
) -> Result<PatternMatch> {
    PatternMatcher::default().evaluate(classification, body, headers)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternMatcher {
    differ: Differ,
}

impl PatternMatcher {
    pub fn new(ignore_array_order: bool) -> Self {
        Self {
            differ: Differ::new(ignore_array_order),
        }
    }

    pub fn evaluate(
        &self,
        classification: &PatternClassification,
        body: &Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<PatternMatch> {
        let value = classification.normalized_value.as_str();
        let outcome = match classification.kind {
            PatternKind::JsonObject | PatternKind::JsonArray => {
                let pattern: Value = serde_json::from_str(value)
                    .map_err(|e| Error::MalformedPattern(format!("{value}: {e}")))?;
                self.evaluate_json(&pattern, body, headers)
            }
            PatternKind::KeyValue => evaluate_key_value(value, body, headers),
            PatternKind::Regex => evaluate_regex(value, body, headers),
            PatternKind::Jsonpath => evaluate_jsonpath(value, body),
            PatternKind::Substring => evaluate_substring(value, body, headers),
        };
        debug!(kind = ?classification.kind, matched = outcome.matched, "Evaluated pattern");
        Ok(outcome)
    }

    fn evaluate_json(
        &self,
        pattern: &Value,
        body: &Value,
        headers: &BTreeMap<String, String>,
    ) -> PatternMatch {
        if contains(pattern, body) {
            return PatternMatch::hit("pattern found in body");
        }
        if let Some(path) = find_nested(pattern, body, "") {
            return PatternMatch::hit(format!("pattern found in body at `{path}`"));
        }
        let header_tree = headers_tree(headers);
        if contains(pattern, &header_tree) {
            return PatternMatch::hit("pattern found in headers");
        }

        let diffs = self.differ.diff(pattern, body, "");
        let (match_percent, matches) = match_report(pattern, body);
        PatternMatch {
            matched: false,
            detail: format!("pattern not found: {} difference(s)", diffs.len()),
            diffs,
            match_percent,
            matches,
        }
    }
}

// ─── Classification helpers ───────────────────────────────────────────────────

fn json_class(kind: PatternKind, value: &Value) -> PatternClassification {
    PatternClassification {
        kind,
        normalized_value: value.to_string(),
    }
}

fn substring_class(raw: &str) -> PatternClassification {
    PatternClassification {
        kind: PatternKind::Substring,
        normalized_value: raw.to_string(),
    }
}

/// Key-value patterns normalize to one `key:value` per line; line breaks
/// and backslashes inside a pair are escaped.
fn key_value_class(pairs: &[(String, String)]) -> PatternClassification {
    PatternClassification {
        kind: PatternKind::KeyValue,
        normalized_value: pairs
            .iter()
            .map(|(key, value)| format!("{}:{}", escape_line(key), escape_line(value)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn escape_line(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn unescape_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split at the first `:` or `=`.
fn split_pair(raw: &str) -> Option<(String, String)> {
    let at = raw.find([':', '='])?;
    let key = unquote(raw[..at].trim()).trim();
    let value = unquote(raw[at + 1..].trim());
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Salvage `{"a": 1, "b": "x"` style input into flat pairs.
fn lenient_pairs(raw: &str) -> Option<Vec<(String, String)>> {
    let inner = raw
        .trim_start_matches(['{', '['])
        .trim_end_matches(['}', ']'])
        .trim();
    if inner.is_empty() {
        return None;
    }
    let pairs: Option<Vec<_>> = inner.split(',').map(|piece| split_pair(piece.trim())).collect();
    pairs.filter(|pairs| !pairs.is_empty())
}

// ─── Containment ──────────────────────────────────────────────────────────────

/// Every key/value (or element) of `pattern` is present in `target`.
pub fn contains(pattern: &Value, target: &Value) -> bool {
    match (pattern, target) {
        (Value::Object(p), Value::Object(t)) => p
            .iter()
            .all(|(key, pv)| t.get(key).is_some_and(|tv| contains(pv, tv))),
        (Value::Array(p), Value::Array(t)) => {
            p.iter().all(|pe| t.iter().any(|te| contains(pe, te)))
        }
        _ => pattern == target,
    }
}

/// Path of the first descendant of `target` that contains `pattern`.
fn find_nested(pattern: &Value, target: &Value, path: &str) -> Option<String> {
    let children: Vec<(String, &Value)> = match target {
        Value::Object(map) => map.iter().map(|(k, v)| (child_path(path, k), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (index_path(path, i), v))
            .collect(),
        _ => return None,
    };
    for (child, value) in &children {
        if contains(pattern, value) {
            return Some(child.clone());
        }
    }
    children
        .into_iter()
        .find_map(|(child, value)| find_nested(pattern, value, &child))
}

fn headers_tree(headers: &BTreeMap<String, String>) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect(),
    )
}

fn headers_text(headers: &BTreeMap<String, String>) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Key-value ────────────────────────────────────────────────────────────────

/// Compare a resolved JSON value against the text a test writer typed.
pub(crate) fn value_matches(found: &Value, expected: &str) -> bool {
    match found {
        Value::String(text) => text == expected,
        Value::Null => expected == "null",
        Value::Number(number) => {
            number.to_string() == expected
                || matches!(
                    (number.as_f64(), expected.parse::<f64>()),
                    (Some(a), Ok(b)) if a == b
                )
        }
        other => {
            other.to_string() == expected
                || serde_json::from_str::<Value>(expected).is_ok_and(|parsed| &parsed == other)
        }
    }
}

fn lookup_path<'a>(body: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(body, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Any object inside any array in `body` holding `key` with the expected value.
fn scan_arrays(body: &Value, key: &str, expected: &str) -> bool {
    match body {
        Value::Array(items) => items.iter().any(|item| {
            matches!(item, Value::Object(map) if map.get(key).is_some_and(|v| value_matches(v, expected)))
                || scan_arrays(item, key, expected)
        }),
        Value::Object(map) => map.values().any(|v| scan_arrays(v, key, expected)),
        _ => false,
    }
}

fn evaluate_key_value(
    normalized: &str,
    body: &Value,
    headers: &BTreeMap<String, String>,
) -> PatternMatch {
    let pairs: Vec<(String, String)> = normalized
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (unescape_line(key), unescape_line(value)))
        .collect();
    if pairs.is_empty() {
        return PatternMatch::miss("empty key-value pattern");
    }

    let mut diffs = Vec::new();
    let mut matches = BTreeMap::new();
    for (key, expected) in &pairs {
        let direct = lookup_path(body, key);
        if direct.is_some_and(|found| value_matches(found, expected)) {
            matches.insert(key.to_string(), Value::String(expected.to_string()));
            continue;
        }
        let last = key.rsplit('.').next().unwrap_or(key.as_str());
        if scan_arrays(body, last, expected) {
            matches.insert(key.to_string(), Value::String(expected.to_string()));
            continue;
        }
        let header = headers.get(&key.to_ascii_lowercase());
        if header.is_some_and(|value| value.trim() == expected.as_str()) {
            matches.insert(key.to_string(), Value::String(expected.to_string()));
            continue;
        }

        let expected_value = Value::String(expected.to_string());
        diffs.push(match direct {
            Some(found) => Difference::mismatch(key.as_str(), expected_value, found.clone()),
            None => Difference::missing(key.as_str(), expected_value),
        });
    }

    let match_percent = 100.0 * matches.len() as f64 / pairs.len() as f64;
    let detail = if diffs.is_empty() {
        "all key-value pairs found".to_string()
    } else {
        let missing: Vec<String> = diffs.iter().map(ToString::to_string).collect();
        format!("pattern not found: {}", missing.join("; "))
    };
    PatternMatch {
        matched: diffs.is_empty(),
        detail,
        diffs,
        match_percent,
        matches,
    }
}

// ─── Regex / JSONPath / substring ─────────────────────────────────────────────

fn evaluate_regex(expr: &str, body: &Value, headers: &BTreeMap<String, String>) -> PatternMatch {
    let regex = match RegexBuilder::new(expr).dot_matches_new_line(true).build() {
        Ok(regex) => regex,
        Err(err) => {
            // Legacy fail-open path: an unparsable regex degrades to a plain
            // substring search, which can report matches the author never meant.
            warn!(pattern = %expr, error = %err, "Invalid regex, falling back to substring");
            return evaluate_substring(expr, body, headers);
        }
    };
    if regex.is_match(&stringify(body)) {
        PatternMatch::hit("regex matched body")
    } else if regex.is_match(&headers_text(headers)) {
        PatternMatch::hit("regex matched headers")
    } else {
        PatternMatch::miss(format!("pattern not found: regex `{expr}` did not match"))
    }
}

fn evaluate_jsonpath(expr: &str, body: &Value) -> PatternMatch {
    let path = match JsonPath::parse(expr) {
        Ok(path) => path,
        Err(err) => {
            debug!(error = %err, "JSONPath not supported, treating as no match");
            return PatternMatch::miss(err.to_string());
        }
    };
    if matches!(body, Value::String(_) | Value::Null) {
        return PatternMatch::miss(format!("pattern not found: body is not JSON for `{expr}`"));
    }

    let selected = path.select(body);
    let matched = match path.expected() {
        Some(expected) => selected.iter().any(|value| value_matches(value, expected)),
        None => !selected.is_empty(),
    };
    if matched {
        PatternMatch::hit(format!("JSONPath `{expr}` matched"))
    } else {
        PatternMatch::miss(format!(
            "pattern not found: JSONPath `{expr}` selected {} value(s)",
            selected.len()
        ))
    }
}

fn evaluate_substring(
    needle: &str,
    body: &Value,
    headers: &BTreeMap<String, String>,
) -> PatternMatch {
    if stringify(body).contains(needle) {
        PatternMatch::hit("substring found in body")
    } else if headers_text(headers).contains(needle) {
        PatternMatch::hit("substring found in headers")
    } else {
        PatternMatch::miss(format!("pattern not found: `{needle}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::types::DiffKind;
    use serde_json::json;

    fn no_headers() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn eval(raw: &str, body: Value) -> PatternMatch {
        evaluate(&classify(raw), &body, &no_headers()).unwrap()
    }

    #[test]
    fn classification_order() {
        assert_eq!(classify(r#"{"a":1}"#).kind, PatternKind::JsonObject);
        assert_eq!(classify("[1, 2]").kind, PatternKind::JsonArray);
        assert_eq!(classify("regex:^a.*b$").kind, PatternKind::Regex);
        assert_eq!(classify("regex:^a.*b$").normalized_value, "^a.*b$");
        assert_eq!(classify("$.a.b").kind, PatternKind::Jsonpath);
        assert_eq!(classify("status.code:200").kind, PatternKind::KeyValue);
        assert_eq!(classify("name = svc").normalized_value, "name:svc");
        assert_eq!(classify("REGISTERED").kind, PatternKind::Substring);
    }

    #[test]
    fn json_scalars_are_not_key_value() {
        let class = classify(r#""a:b""#);
        assert_eq!(class.kind, PatternKind::Substring);
        assert!(eval(r#""a:b""#, json!({"note": "a:b"})).matched);
    }

    #[test]
    fn multi_line_values_survive_normalization() {
        let class = classify("msg: first\nsecond");
        assert_eq!(class.kind, PatternKind::KeyValue);
        assert_eq!(class.normalized_value.lines().count(), 1);

        assert!(eval("msg: first\nsecond", json!({"msg": "first\nsecond"})).matched);
        let miss = eval("msg: first\nsecond", json!({"msg": "first"}));
        assert!(!miss.matched);
        assert_eq!(
            miss.diffs,
            vec![Difference::mismatch("msg", json!("first\nsecond"), json!("first"))]
        );
    }

    #[test]
    fn backslashes_round_trip_through_normalization() {
        assert!(eval(r"path: C:\temp\new", json!({"path": r"C:\temp\new"})).matched);
    }

    #[test]
    fn malformed_json_falls_back() {
        let class = classify(r#"{"nfType": "UDM""#);
        assert_eq!(class.kind, PatternKind::KeyValue);
        assert_eq!(class.normalized_value, "nfType:UDM");

        assert_eq!(classify("[oops").kind, PatternKind::Substring);
    }

    #[test]
    fn json_subset_ignores_extra_keys() {
        let outcome = eval(r#"{"nfType":"UDM"}"#, json!({"nfType": "UDM", "nfStatus": "REGISTERED"}));
        assert!(outcome.matched);
    }

    #[test]
    fn json_subset_found_nested() {
        let outcome = eval(
            r#"{"name":"svc2"}"#,
            json!({"services": [{"name": "svc1"}, {"name": "svc2", "port": 80}]}),
        );
        assert!(outcome.matched);
        assert!(outcome.detail.contains("services[1]"));
    }

    #[test]
    fn json_array_pattern_elements_anywhere() {
        assert!(eval("[3, 1]", json!([1, 2, 3])).matched);
        assert!(!eval("[4]", json!([1, 2, 3])).matched);
    }

    #[test]
    fn json_miss_reports_diffs() {
        let outcome = eval(r#"{"nfType":"UDM"}"#, json!({"nfType": "AMF"}));
        assert!(!outcome.matched);
        assert_eq!(outcome.diffs.len(), 1);
        assert_eq!(outcome.diffs[0].kind, DiffKind::Mismatch);
        assert_eq!(outcome.diffs[0].path, "nfType");
        assert_eq!(outcome.match_percent, 0.0);
    }

    #[test]
    fn json_found_in_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("location".to_string(), "/nf/1".to_string());
        let outcome = evaluate(&classify(r#"{"location":"/nf/1"}"#), &json!({}), &headers).unwrap();
        assert!(outcome.matched);
    }

    #[test]
    fn dotted_key_value() {
        assert!(eval("status.code:200", json!({"status": {"code": 200}})).matched);
        let miss = eval("status.code:200", json!({"status": {"code": 404}}));
        assert!(!miss.matched);
        assert_eq!(miss.diffs, vec![Difference::mismatch("status.code", json!("200"), json!(404))]);
    }

    #[test]
    fn key_value_scans_arrays() {
        let body = json!({"services": [{"name": "service1"}, {"name": "service2"}]});
        assert!(eval("name:service1", body.clone()).matched);
        assert!(!eval("name:service3", body).matched);
    }

    #[test]
    fn key_value_checks_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let outcome =
            evaluate(&classify("Content-Type: application/json"), &json!({}), &headers).unwrap();
        assert!(outcome.matched);
    }

    #[test]
    fn regex_is_dotall() {
        assert!(eval("regex:start.*end", json!("start\nmiddle\nend")).matched);
        assert!(!eval("regex:^nope$", json!({"a": 1})).matched);
    }

    #[test]
    fn invalid_regex_degrades_to_substring() {
        assert!(eval("regex:a(b", json!("xxa(byy")).matched);
    }

    #[test]
    fn jsonpath_subset() {
        let body = json!({"nfProfile": {"nfType": "UDM"}});
        assert!(eval("$.nfProfile.nfType", body.clone()).matched);
        assert!(eval("$.nfProfile.nfType == UDM", body.clone()).matched);
        assert!(!eval("$.nfProfile.nfType == AMF", body.clone()).matched);
        assert!(!eval("$..nfType", body).matched);
    }

    #[test]
    fn substring_checks_body_then_headers() {
        assert!(eval("REGISTERED", json!({"nfStatus": "REGISTERED"})).matched);
        let mut headers = BTreeMap::new();
        headers.insert("x-nf".to_string(), "udm-7".to_string());
        let outcome = evaluate(&classify("udm-7"), &json!({}), &headers).unwrap();
        assert!(outcome.matched);
        assert!(!eval("SUSPENDED", json!({"nfStatus": "REGISTERED"})).matched);
    }

    #[test]
    fn value_matching_is_textual() {
        assert!(value_matches(&json!(200), "200"));
        assert!(value_matches(&json!(2.5), "2.50"));
        assert!(value_matches(&json!(true), "true"));
        assert!(value_matches(&json!(null), "null"));
        assert!(value_matches(&json!([1, 2]), "[1,2]"));
        assert!(!value_matches(&json!("200 "), "200"));
    }
}

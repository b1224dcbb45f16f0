use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::http::method::HttpMethod;

// ─── Expected status ──────────────────────────────────────────────────────────

/// Expected status as authored on a step: an exact code or a `"2XX"` class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawStatus", into = "RawStatus")]
pub enum ExpectedStatus {
    Exact(u16),
    Class(u8),
    /// Kept so the verdict can name what the author wrote; never matches.
    Invalid(String),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Code(u64),
    Text(String),
}

impl ExpectedStatus {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let bytes = trimmed.as_bytes();
        if bytes.len() == 3 && bytes[0].is_ascii_digit() && trimmed[1..].eq_ignore_ascii_case("xx")
        {
            return ExpectedStatus::Class(bytes[0] - b'0');
        }
        match trimmed.parse::<u16>() {
            Ok(code) => ExpectedStatus::Exact(code),
            Err(_) => ExpectedStatus::Invalid(raw.to_string()),
        }
    }
}

impl From<RawStatus> for ExpectedStatus {
    fn from(raw: RawStatus) -> Self {
        match raw {
            RawStatus::Code(code) => u16::try_from(code)
                .map(ExpectedStatus::Exact)
                .unwrap_or_else(|_| ExpectedStatus::Invalid(code.to_string())),
            RawStatus::Text(text) => ExpectedStatus::parse(&text),
        }
    }
}

impl From<ExpectedStatus> for RawStatus {
    fn from(status: ExpectedStatus) -> Self {
        match status {
            ExpectedStatus::Exact(code) => RawStatus::Code(u64::from(code)),
            other => RawStatus::Text(other.to_string()),
        }
    }
}

impl From<u16> for ExpectedStatus {
    fn from(code: u16) -> Self {
        ExpectedStatus::Exact(code)
    }
}

impl From<&str> for ExpectedStatus {
    fn from(raw: &str) -> Self {
        ExpectedStatus::parse(raw)
    }
}

impl Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedStatus::Exact(code) => write!(f, "{code}"),
            ExpectedStatus::Class(digit) => write!(f, "{digit}XX"),
            ExpectedStatus::Invalid(raw) => write!(f, "{raw}"),
        }
    }
}

// ─── Validation context ───────────────────────────────────────────────────────

/// Everything known about one step: what was expected and what came back.
///
/// Built once per step by the executor; the dispatcher only ever borrows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationContext {
    pub method: HttpMethod,
    #[serde(default)]
    pub expected_status: Option<ExpectedStatus>,
    #[serde(default)]
    pub expected_payload: Option<Value>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub actual_status: Option<u16>,
    #[serde(default)]
    pub response_body: Value,
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub response_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub is_log_source: bool,
    #[serde(default)]
    pub prior_saved_payload: Option<Value>,
}

impl ValidationContext {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            expected_status: None,
            expected_payload: None,
            pattern: None,
            actual_status: None,
            response_body: Value::Null,
            response_headers: BTreeMap::new(),
            is_log_source: false,
            prior_saved_payload: None,
        }
    }

    pub fn with_expected_status(mut self, status: impl Into<ExpectedStatus>) -> Self {
        self.expected_status = Some(status.into());
        self
    }

    pub fn with_expected_payload(mut self, payload: Value) -> Self {
        self.expected_payload = Some(payload);
        self
    }

    /// Blank patterns are treated as absent.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.pattern = (!pattern.trim().is_empty()).then_some(pattern);
        self
    }

    pub fn with_actual_status(mut self, status: u16) -> Self {
        self.actual_status = Some(status);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.response_body = body;
        self
    }

    /// Use raw response text as the body, parsed as JSON when possible.
    pub fn with_body_text(mut self, raw: &str) -> Self {
        self.response_body = body_from_text(raw);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.response_headers
            .insert(name.trim().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self = self.with_header(name.as_ref(), value);
        }
        self
    }

    pub fn with_log_source(mut self) -> Self {
        self.is_log_source = true;
        self
    }

    pub fn with_prior_saved_payload(mut self, payload: Value) -> Self {
        self.prior_saved_payload = Some(payload);
        self
    }

    /// The body as text: raw strings verbatim, trees as compact JSON.
    pub fn body_text(&self) -> String {
        stringify(&self.response_body)
    }

    /// Headers rendered one `name: value` per line.
    pub fn headers_text(&self) -> String {
        self.response_headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn headers_value(&self) -> Value {
        Value::Object(
            self.response_headers
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect(),
        )
    }
}

/// Parse response text as JSON, keeping it as a raw string otherwise.
pub fn body_from_text(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn deserialize_headers<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value))
        .collect())
}

// ─── Differences & results ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Missing,
    Mismatch,
    Unexpected,
}

impl Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiffKind::Missing => "missing",
            DiffKind::Mismatch => "mismatch",
            DiffKind::Unexpected => "unexpected",
        };
        write!(f, "{label}")
    }
}

/// One structural disagreement between an expected and an actual tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Difference {
    pub kind: DiffKind,
    pub path: String,
    pub expected: Value,
    pub actual: Value,
}

impl Difference {
    pub fn missing(path: impl Into<String>, expected: Value) -> Self {
        Self {
            kind: DiffKind::Missing,
            path: path.into(),
            expected,
            actual: Value::Null,
        }
    }

    pub fn mismatch(path: impl Into<String>, expected: Value, actual: Value) -> Self {
        Self {
            kind: DiffKind::Mismatch,
            path: path.into(),
            expected,
            actual,
        }
    }

    pub fn unexpected(path: impl Into<String>, actual: Value) -> Self {
        Self {
            kind: DiffKind::Unexpected,
            path: path.into(),
            expected: Value::Null,
            actual,
        }
    }
}

impl Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiffKind::Missing => write!(f, "missing {} (expected {})", self.path, self.expected),
            DiffKind::Unexpected => write!(f, "unexpected {} = {}", self.path, self.actual),
            DiffKind::Mismatch => write!(
                f,
                "mismatch at {}: expected {}, got {}",
                self.path, self.expected, self.actual
            ),
        }
    }
}

/// The verdict for one step.
///
/// Fields are read-only once built; the `with_*` helpers consume the value
/// so a result is finished before anyone else sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    passed: bool,
    reason: Option<String>,
    diffs: Vec<Difference>,
    match_percent: f64,
    matches: BTreeMap<String, Value>,
}

impl MatchResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
            diffs: Vec::new(),
            match_percent: 100.0,
            matches: BTreeMap::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            diffs: Vec::new(),
            match_percent: 0.0,
            matches: BTreeMap::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_diffs(mut self, diffs: Vec<Difference>) -> Self {
        self.diffs = diffs;
        self
    }

    pub fn with_match_percent(mut self, percent: f64) -> Self {
        self.match_percent = percent.clamp(0.0, 100.0);
        self
    }

    pub fn with_matches(mut self, matches: BTreeMap<String, Value>) -> Self {
        self.matches = matches;
        self
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn diffs(&self) -> &[Difference] {
        &self.diffs
    }

    pub fn match_percent(&self) -> f64 {
        self.match_percent
    }

    pub fn matches(&self) -> &BTreeMap<String, Value> {
        &self.matches
    }
}

// ─── Pattern classification ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternKind {
    JsonObject,
    JsonArray,
    KeyValue,
    Regex,
    Jsonpath,
    Substring,
}

/// Result of classifying a raw pattern string; a pure function of its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternClassification {
    pub kind: PatternKind,
    pub normalized_value: String,
}

//! # Structured Log Matching
//!
//! Validates newline-delimited JSON log output (as produced by
//! `kubectl logs`) against a pattern such as
//! `{"level":"ERROR","loggerName":"nrf.discovery","message":"NF {id} not found, retrying"}`.
//!
//! A line matches when its `level` and `loggerName` equal the pattern's and,
//! if the pattern's message yielded key phrases, its own `message` contains
//! at least one of them (case-insensitive).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

const MIN_PHRASE_LEN: usize = 3;

static LEVEL_FIELD: LazyLock<Regex> = LazyLock::new(|| field_regex("level"));
static LOGGER_FIELD: LazyLock<Regex> = LazyLock::new(|| field_regex("loggerName"));
static MESSAGE_FIELD: LazyLock<Regex> = LazyLock::new(|| field_regex("message"));

/// Placeholders and punctuation that separate the stable parts of a message.
static PHRASE_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[^}]*\}|<[^>]*>|%[sdif]|[.,;|]").expect("phrase separator regex is valid")
});

fn field_regex(name: &str) -> Regex {
    Regex::new(&format!(r#""{name}"\s*:\s*"((?:[^"\\]|\\.)*)""#)).expect("field regex is valid")
}

/// Criteria extracted from a log pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCriteria {
    pub level: String,
    pub logger_name: String,
    pub key_phrases: Vec<String>,
}

/// How a log search concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSearch {
    /// 1-based line number of the first matching record.
    Found { line: usize },
    /// Criteria could not be extracted; the whole pattern was found verbatim.
    FoundBySubstring,
    /// `candidates` lines had the right level and logger but no key phrase.
    NotFound { candidates: usize },
    /// Criteria could not be extracted and the pattern text is absent.
    SubstringNotFound,
}

impl LogSearch {
    pub fn is_match(&self) -> bool {
        matches!(self, LogSearch::Found { .. } | LogSearch::FoundBySubstring)
    }
}

pub fn validate_log_pattern(raw_log_text: &str, pattern: &str) -> bool {
    search_logs(raw_log_text, pattern).is_match()
}

pub fn search_logs(raw_log_text: &str, pattern: &str) -> LogSearch {
    let Some(criteria) = extract_criteria(pattern) else {
        debug!("Log pattern has no level/loggerName, using substring search");
        return if raw_log_text.contains(pattern.trim()) {
            LogSearch::FoundBySubstring
        } else {
            LogSearch::SubstringNotFound
        };
    };

    let phrases: Vec<String> = criteria
        .key_phrases
        .iter()
        .map(|phrase| phrase.to_lowercase())
        .collect();
    let mut candidates = 0;

    for (index, line) in raw_log_text.lines().enumerate() {
        let Ok(Value::Object(record)) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        let field = |name: &str| record.get(name).and_then(Value::as_str);
        if field("level") != Some(criteria.level.as_str())
            || field("loggerName") != Some(criteria.logger_name.as_str())
        {
            continue;
        }
        if phrases.is_empty() {
            return LogSearch::Found { line: index + 1 };
        }
        candidates += 1;
        let message = field("message").unwrap_or_default().to_lowercase();
        if phrases.iter().any(|phrase| message.contains(phrase.as_str())) {
            return LogSearch::Found { line: index + 1 };
        }
    }

    LogSearch::NotFound { candidates }
}

/// Pull `level`, `loggerName` and message phrases out of a possibly
/// malformed JSON pattern.
pub fn extract_criteria(pattern: &str) -> Option<LogCriteria> {
    let trimmed = pattern.trim();
    let (level, logger_name, message) = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => {
            let text = |name: &str| map.get(name).and_then(Value::as_str).map(str::to_string);
            (text("level"), text("loggerName"), text("message"))
        }
        _ => {
            let capture = |re: &Regex| {
                re.captures(trimmed)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().replace("\\\"", "\""))
            };
            (
                capture(&*LEVEL_FIELD),
                capture(&*LOGGER_FIELD),
                capture(&*MESSAGE_FIELD),
            )
        }
    };

    Some(LogCriteria {
        level: level.filter(|s| !s.is_empty())?,
        logger_name: logger_name.filter(|s| !s.is_empty())?,
        key_phrases: message.map(|m| key_phrases(&m)).unwrap_or_default(),
    })
}

/// Stable fragments of a log message template.
pub fn key_phrases(message: &str) -> Vec<String> {
    let mut phrases: Vec<String> = Vec::new();
    for piece in PHRASE_SPLIT.split(message) {
        let piece = piece.trim();
        if piece.chars().count() >= MIN_PHRASE_LEN && !phrases.iter().any(|p| p == piece) {
            phrases.push(piece.to_string());
        }
    }
    phrases
}

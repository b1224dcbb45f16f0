//! # Validation Strategy Dispatch
//!
//! Picks exactly one strategy per step from an ordered rule table keyed by
//! the declared method and which expectation fields are populated, runs it,
//! and folds every error or panic into a failed [`MatchResult`].

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::diff::Differ;
use super::logs::{LogSearch, search_logs};
use super::pattern::{PatternMatcher, classify};
use super::percent::match_report;
use super::status;
use super::types::{DiffKind, Difference, MatchResult, PatternKind, ValidationContext};
use crate::config::ValidationConfig;
use crate::error::{Error, Result};
use crate::http::method::HttpMethod;

// ─── Strategies & capabilities ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    StatusEqual,
    StatusAndDiff,
    StatusAndPattern,
    StatusDiffAndPattern,
    SavedPayloadEqual,
    LogPattern,
    NoMatchingRule,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Strategy::StatusEqual => "status-equal",
            Strategy::StatusAndDiff => "status-and-diff",
            Strategy::StatusAndPattern => "status-and-pattern",
            Strategy::StatusDiffAndPattern => "status-diff-and-pattern",
            Strategy::SavedPayloadEqual => "saved-payload-equal",
            Strategy::LogPattern => "log-pattern",
            Strategy::NoMatchingRule => "no-matching-rule",
        };
        write!(f, "{label}")
    }
}

/// Which expectation fields a context carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub status: bool,
    pub payload: bool,
    pub pattern: bool,
    pub saved_payload: bool,
    pub log_source: bool,
}

impl Capabilities {
    pub fn of(ctx: &ValidationContext) -> Self {
        Self {
            status: ctx.expected_status.is_some(),
            payload: ctx.expected_payload.is_some(),
            pattern: ctx.pattern.as_deref().is_some_and(|p| !p.trim().is_empty()),
            saved_payload: ctx.prior_saved_payload.is_some(),
            log_source: ctx.is_log_source,
        }
    }

    fn status_only(self) -> bool {
        self.status && !self.payload && !self.pattern
    }

    fn status_payload(self) -> bool {
        self.status && self.payload && !self.pattern
    }

    fn status_pattern(self) -> bool {
        self.status && !self.payload && self.pattern
    }

    fn status_payload_pattern(self) -> bool {
        self.status && self.payload && self.pattern
    }
}

// ─── Rule table ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub applies: fn(HttpMethod, Capabilities) -> bool,
    pub strategy: Strategy,
}

/// Ordered `(predicate, strategy)` pairs; first match wins.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleTable {
    pub fn standard() -> Self {
        use HttpMethod::{Delete, Get, Put};
        use Strategy::*;

        let rules = vec![
            Rule {
                name: "put-status",
                applies: |m, c| m == Put && c.status_only(),
                strategy: StatusEqual,
            },
            Rule {
                name: "put-status-payload",
                applies: |m, c| m == Put && c.status_payload(),
                strategy: StatusAndDiff,
            },
            Rule {
                name: "put-status-pattern",
                applies: |m, c| m == Put && c.status_pattern(),
                strategy: StatusAndPattern,
            },
            Rule {
                name: "put-status-payload-pattern",
                applies: |m, c| m == Put && c.status_payload_pattern(),
                strategy: StatusDiffAndPattern,
            },
            Rule {
                name: "get-saved-payload",
                applies: |m, c| m == Get && c.saved_payload,
                strategy: SavedPayloadEqual,
            },
            Rule {
                name: "get-status-payload-pattern",
                applies: |m, c| m == Get && c.status_payload_pattern(),
                strategy: StatusDiffAndPattern,
            },
            Rule {
                name: "get-status",
                applies: |m, c| m == Get && c.status_only(),
                strategy: StatusEqual,
            },
            Rule {
                name: "get-status-payload",
                applies: |m, c| m == Get && c.status_payload(),
                strategy: StatusAndDiff,
            },
            Rule {
                name: "get-status-pattern",
                applies: |m, c| m == Get && c.status_pattern(),
                strategy: StatusAndPattern,
            },
            Rule {
                name: "delete-status",
                applies: |m, c| m == Delete && c.status_only(),
                strategy: StatusEqual,
            },
            Rule {
                name: "log-pattern",
                applies: |_, c| c.log_source && c.pattern,
                strategy: LogPattern,
            },
        ];
        Self { rules }
    }

    /// Append a rule after the existing ones.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn select(&self, method: HttpMethod, caps: Capabilities) -> Strategy {
        self.rules
            .iter()
            .find(|rule| (rule.applies)(method, caps))
            .map_or(Strategy::NoMatchingRule, |rule| rule.strategy)
    }
}

// ─── Judging ──────────────────────────────────────────────────────────────────

/// Strict/partial verdict over a diff list and match percentage.
#[derive(Debug, Clone, PartialEq)]
pub enum Judgement {
    Pass { note: Option<String> },
    Fail { reason: String },
}

impl Judgement {
    pub fn passed(&self) -> bool {
        matches!(self, Judgement::Pass { .. })
    }
}

pub fn judge(diffs: &[Difference], percent: f64, config: &ValidationConfig) -> Judgement {
    if diffs.is_empty() {
        return Judgement::Pass { note: None };
    }

    if config.partial_dict_match {
        let threshold = config.partial_threshold();
        let has_mismatch = diffs.iter().any(|d| d.kind == DiffKind::Mismatch);
        if percent > 0.0 && !has_mismatch {
            return Judgement::Pass {
                note: Some(format!("partial match: {} missing item(s) tolerated", diffs.len())),
            };
        }
        if percent >= threshold {
            return Judgement::Pass {
                note: Some(format!("partial match at {percent:.1}% (threshold {threshold:.1}%)")),
            };
        }
        return Judgement::Fail {
            reason: format!(
                "partial match {percent:.1}% below threshold {threshold:.1}% ({} difference(s))",
                diffs.len()
            ),
        };
    }

    // Strict comparisons may still pass on the fuzzy percentage; this keeps
    // parity with existing suites and is switchable via `strictPercentFallback`.
    let threshold = config.strict_fallback_threshold();
    if config.strict_percent_fallback && percent >= threshold {
        return Judgement::Pass {
            note: Some(format!(
                "strict match had {} difference(s) but {percent:.1}% meets fallback threshold {threshold:.1}%",
                diffs.len()
            )),
        };
    }
    Judgement::Fail {
        reason: format!("structural differences found: {} difference(s)", diffs.len()),
    }
}

// ─── Validator ────────────────────────────────────────────────────────────────

/// Selects and runs one strategy per context.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
    rules: RuleTable,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            rules: RuleTable::standard(),
        }
    }

    pub fn with_rules(config: ValidationConfig, rules: RuleTable) -> Self {
        Self { config, rules }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn select(&self, ctx: &ValidationContext) -> Strategy {
        self.rules.select(ctx.method, Capabilities::of(ctx))
    }

    /// Never panics and never returns an error: failures become verdicts.
    pub fn validate(&self, ctx: &ValidationContext) -> MatchResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let strategy = self.select(ctx);
            debug!(method = %ctx.method, %strategy, "Selected validation strategy");
            self.run(strategy, ctx)
        }));

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                debug!(method = %ctx.method, error = %err, "Validation strategy failed");
                MatchResult::fail(format!("validation error: {err}"))
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                debug!(method = %ctx.method, error = %message, "Validation strategy panicked");
                MatchResult::fail(format!("validation error: {message}"))
            }
        }
    }

    fn run(&self, strategy: Strategy, ctx: &ValidationContext) -> Result<MatchResult> {
        let mut verdict = Verdict::default();
        match strategy {
            Strategy::StatusEqual => verdict.status(ctx),
            Strategy::StatusAndDiff => {
                verdict.status(ctx);
                verdict.payload(ctx, &self.config)?;
            }
            Strategy::StatusAndPattern => {
                verdict.status(ctx);
                verdict.pattern(ctx, &self.config)?;
            }
            Strategy::StatusDiffAndPattern => {
                verdict.status(ctx);
                verdict.payload(ctx, &self.config)?;
                verdict.pattern(ctx, &self.config)?;
            }
            Strategy::SavedPayloadEqual => verdict.saved_payload(ctx, &self.config)?,
            Strategy::LogPattern => verdict.logs(ctx),
            Strategy::NoMatchingRule => {
                let caps = Capabilities::of(ctx);
                return Ok(MatchResult::fail(format!(
                    "no matching validation rule for this combination: method={}, status={}, payload={}, pattern={}, logSource={}",
                    ctx.method, caps.status, caps.payload, caps.pattern, caps.log_source
                )));
            }
        }
        Ok(verdict.finish())
    }
}

/// Validate one context with the standard rule table.
pub fn validate(ctx: &ValidationContext, config: &ValidationConfig) -> MatchResult {
    Validator::new(config.clone()).validate(ctx)
}

/// Accumulates the parts of a composite strategy.
#[derive(Debug)]
struct Verdict {
    passed: bool,
    reasons: Vec<String>,
    notes: Vec<String>,
    diffs: Vec<Difference>,
    percent: Option<f64>,
    matches: BTreeMap<String, Value>,
}

impl Default for Verdict {
    fn default() -> Self {
        Self {
            passed: true,
            reasons: Vec::new(),
            notes: Vec::new(),
            diffs: Vec::new(),
            percent: None,
            matches: BTreeMap::new(),
        }
    }
}

impl Verdict {
    fn fail(&mut self, reason: String) {
        self.passed = false;
        self.reasons.push(reason);
    }

    fn apply(&mut self, judgement: Judgement) {
        match judgement {
            Judgement::Pass { note } => self.notes.extend(note),
            Judgement::Fail { reason } => self.fail(reason),
        }
    }

    fn status(&mut self, ctx: &ValidationContext) {
        if status::matches(ctx.expected_status.as_ref(), ctx.actual_status) {
            return;
        }
        let expected = ctx
            .expected_status
            .as_ref()
            .map_or_else(|| "none".to_string(), ToString::to_string);
        let actual = ctx
            .actual_status
            .map_or_else(|| "none".to_string(), |code| code.to_string());
        self.fail(format!("expected status {expected}, got {actual}"));
    }

    fn payload(&mut self, ctx: &ValidationContext, config: &ValidationConfig) -> Result<()> {
        let expected = ctx
            .expected_payload
            .as_ref()
            .ok_or_else(|| Error::comparison("expected payload is not set"))?;
        let diffs = Differ::new(config.ignore_array_order).diff(expected, &ctx.response_body, "");
        let (percent, matches) = match_report(expected, &ctx.response_body);
        self.apply(judge(&diffs, percent, config));
        self.percent = Some(percent);
        self.matches.extend(matches);
        self.diffs.extend(diffs);
        Ok(())
    }

    fn pattern(&mut self, ctx: &ValidationContext, config: &ValidationConfig) -> Result<()> {
        let raw = ctx
            .pattern
            .as_deref()
            .ok_or_else(|| Error::comparison("pattern is not set"))?;
        let classification = classify(raw);
        let outcome = PatternMatcher::new(config.ignore_array_order).evaluate(
            &classification,
            &ctx.response_body,
            &ctx.response_headers,
        )?;

        if outcome.matched {
            self.percent = self.percent.or(Some(100.0));
            return Ok(());
        }

        let json_shaped = matches!(
            classification.kind,
            PatternKind::JsonObject | PatternKind::JsonArray
        );
        if json_shaped {
            match judge(&outcome.diffs, outcome.match_percent, config) {
                Judgement::Pass { note } => self.notes.extend(note),
                Judgement::Fail { reason } => self.fail(format!("{}; {reason}", outcome.detail)),
            }
        } else {
            self.fail(outcome.detail);
        }
        self.percent = self.percent.or(Some(outcome.match_percent));
        self.matches.extend(outcome.matches);
        self.diffs.extend(outcome.diffs);
        Ok(())
    }

    fn saved_payload(&mut self, ctx: &ValidationContext, config: &ValidationConfig) -> Result<()> {
        let saved = ctx
            .prior_saved_payload
            .as_ref()
            .ok_or_else(|| Error::comparison("no saved payload to compare against"))?;
        let body = &ctx.response_body;
        let differ = Differ::new(config.ignore_array_order);

        let mut diffs = differ.diff(saved, body, "");
        let extra: Vec<Difference> = differ
            .diff(body, saved, "")
            .into_iter()
            .filter(|d| d.kind == DiffKind::Missing)
            .filter(|d| !diffs.iter().any(|seen| seen.path == d.path))
            .map(|d| Difference::unexpected(d.path, d.expected))
            .collect();
        diffs.extend(extra);

        let (percent, matches) = match_report(saved, body);
        if !diffs.is_empty() {
            self.fail(format!(
                "response body differs from the payload saved earlier in this flow ({} difference(s))",
                diffs.len()
            ));
        }
        self.percent = Some(percent);
        self.matches = matches;
        self.diffs = diffs;
        Ok(())
    }

    fn logs(&mut self, ctx: &ValidationContext) {
        let pattern = ctx.pattern.as_deref().unwrap_or_default();
        match search_logs(&ctx.body_text(), pattern) {
            LogSearch::Found { line } => self.notes.push(format!("matched log line {line}")),
            LogSearch::FoundBySubstring => {}
            LogSearch::NotFound { candidates } => self.fail(format!(
                "pattern not found in logs: {candidates} line(s) matched level and loggerName but no key phrase"
            )),
            LogSearch::SubstringNotFound => self.fail("pattern not found in logs".to_string()),
        }
    }

    fn finish(self) -> MatchResult {
        if self.passed {
            let result = MatchResult::pass()
                .with_diffs(self.diffs)
                .with_match_percent(self.percent.unwrap_or(100.0))
                .with_matches(self.matches);
            if self.notes.is_empty() {
                result
            } else {
                result.with_reason(self.notes.join("; "))
            }
        } else {
            MatchResult::fail(self.reasons.join("; "))
                .with_diffs(self.diffs)
                .with_match_percent(self.percent.unwrap_or(0.0))
                .with_matches(self.matches)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caps(status: bool, payload: bool, pattern: bool) -> Capabilities {
        Capabilities {
            status,
            payload,
            pattern,
            ..Default::default()
        }
    }

    #[test]
    fn table_follows_method_and_fields() {
        let table = RuleTable::standard();
        assert_eq!(table.select(HttpMethod::Put, caps(true, false, false)), Strategy::StatusEqual);
        assert_eq!(table.select(HttpMethod::Put, caps(true, true, false)), Strategy::StatusAndDiff);
        assert_eq!(table.select(HttpMethod::Put, caps(true, false, true)), Strategy::StatusAndPattern);
        assert_eq!(
            table.select(HttpMethod::Get, caps(true, true, true)),
            Strategy::StatusDiffAndPattern
        );
        assert_eq!(table.select(HttpMethod::Delete, caps(true, false, false)), Strategy::StatusEqual);
        assert_eq!(
            table.select(HttpMethod::Delete, caps(true, true, false)),
            Strategy::NoMatchingRule
        );
        assert_eq!(table.select(HttpMethod::Post, caps(true, false, false)), Strategy::NoMatchingRule);
    }

    #[test]
    fn saved_payload_wins_for_get() {
        let table = RuleTable::standard();
        let c = Capabilities {
            saved_payload: true,
            ..caps(true, true, true)
        };
        assert_eq!(table.select(HttpMethod::Get, c), Strategy::SavedPayloadEqual);
    }

    #[test]
    fn log_source_with_pattern() {
        let table = RuleTable::standard();
        let c = Capabilities {
            log_source: true,
            ..caps(false, false, true)
        };
        assert_eq!(table.select(HttpMethod::Get, c), Strategy::LogPattern);
    }

    #[test]
    fn selection_is_repeatable() {
        let validator = Validator::default();
        let ctx = ValidationContext::new(HttpMethod::Get)
            .with_expected_status(200)
            .with_pattern("ok");
        assert_eq!(validator.select(&ctx), validator.select(&ctx.clone()));
    }

    #[test]
    fn extra_rules_extend_the_table() {
        let table = RuleTable::standard().with_rule(Rule {
            name: "post-status",
            applies: |m, c| m == HttpMethod::Post && c.status_only(),
            strategy: Strategy::StatusEqual,
        });
        assert_eq!(table.select(HttpMethod::Post, caps(true, false, false)), Strategy::StatusEqual);
    }

    #[test]
    fn status_failure_reason() {
        let ctx = ValidationContext::new(HttpMethod::Delete)
            .with_expected_status(204)
            .with_actual_status(404);
        let result = Validator::default().validate(&ctx);
        assert!(!result.passed());
        assert_eq!(result.reason(), Some("expected status 204, got 404"));
    }

    #[test]
    fn payload_diffs_attached_on_failure() {
        let ctx = ValidationContext::new(HttpMethod::Put)
            .with_expected_status("2XX")
            .with_actual_status(201)
            .with_expected_payload(json!({"a": 1, "b": 2}))
            .with_body(json!({"a": 1, "b": 3}));
        let config = ValidationConfig {
            strict_percent_fallback: false,
            ..Default::default()
        };
        let result = validate(&ctx, &config);
        assert!(!result.passed());
        assert_eq!(result.diffs(), &[Difference::mismatch("b", json!(2), json!(3))]);
        assert_eq!(result.match_percent(), 50.0);
    }

    #[test]
    fn strict_fallback_rescues_high_overlap() {
        let ctx = ValidationContext::new(HttpMethod::Get)
            .with_expected_status(200)
            .with_actual_status(200)
            .with_expected_payload(json!({"a": 1, "b": 2, "c": 3, "d": 4}))
            .with_body(json!({"a": 1, "b": 2, "c": 3, "d": 5}));
        let result = validate(&ctx, &ValidationConfig::default());
        assert!(result.passed());
        assert!(result.reason().unwrap().contains("fallback threshold"));
        assert_eq!(result.diffs().len(), 1);
    }

    #[test]
    fn partial_mode_tolerates_missing_keys() {
        let config = ValidationConfig {
            partial_dict_match: true,
            ..Default::default()
        };
        let missing_only = vec![Difference::missing("b", json!(2))];
        assert!(judge(&missing_only, 50.0, &config).passed());
        assert!(judge(&missing_only, 10.0, &config).passed());

        let mismatch = vec![Difference::mismatch("b", json!(2), json!(3))];
        assert!(!judge(&mismatch, 40.0, &config).passed());
        assert!(judge(&mismatch, 50.0, &config).passed());
    }

    #[test]
    fn pattern_failure_reason_mentions_not_found() {
        let ctx = ValidationContext::new(HttpMethod::Get)
            .with_expected_status(200)
            .with_actual_status(200)
            .with_pattern("SUSPENDED")
            .with_body(json!({"nfStatus": "REGISTERED"}));
        let result = Validator::default().validate(&ctx);
        assert!(!result.passed());
        assert!(result.reason().unwrap().contains("pattern not found"));
    }

    #[test]
    fn saved_payload_reports_both_directions() {
        let ctx = ValidationContext::new(HttpMethod::Get)
            .with_prior_saved_payload(json!({"a": 1, "b": 2}))
            .with_body(json!({"a": 1, "c": 3}));
        let result = Validator::default().validate(&ctx);
        assert!(!result.passed());
        let kinds: Vec<DiffKind> = result.diffs().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DiffKind::Missing, DiffKind::Unexpected]);
    }

    #[test]
    fn saved_payload_ignores_status_and_pattern() {
        let ctx = ValidationContext::new(HttpMethod::Get)
            .with_expected_status(200)
            .with_actual_status(500)
            .with_pattern("never")
            .with_prior_saved_payload(json!({"items": [1, 2]}))
            .with_body(json!({"items": [2, 1]}));
        assert!(Validator::default().validate(&ctx).passed());
    }

    #[test]
    fn unsupported_combination_is_reported() {
        let ctx = ValidationContext::new(HttpMethod::Patch).with_expected_status(200);
        let result = Validator::default().validate(&ctx);
        assert!(!result.passed());
        assert!(
            result
                .reason()
                .unwrap()
                .starts_with("no matching validation rule for this combination")
        );
    }

    #[test]
    fn strategy_error_becomes_failed_result() {
        let table = RuleTable {
            rules: vec![Rule {
                name: "always-diff",
                applies: |_, _| true,
                strategy: Strategy::StatusAndDiff,
            }],
        };
        // StatusAndDiff without a payload surfaces a comparison error.
        let validator = Validator::with_rules(ValidationConfig::default(), table);
        let result = validator.validate(&ValidationContext::new(HttpMethod::Get));
        assert!(!result.passed());
        assert!(result.reason().unwrap().starts_with("validation error:"));
    }

    #[test]
    fn panicking_rule_becomes_failed_result() {
        let table = RuleTable {
            rules: vec![Rule {
                name: "exploding",
                applies: |_, _| panic!("rule predicate exploded"),
                strategy: Strategy::StatusEqual,
            }],
        };
        let validator = Validator::with_rules(ValidationConfig::default(), table);
        let ctx = ValidationContext::new(HttpMethod::Get)
            .with_expected_status(200)
            .with_actual_status(200);
        let result = validator.validate(&ctx);
        assert!(!result.passed());
        assert_eq!(result.reason(), Some("validation error: rule predicate exploded"));
        assert!(result.diffs().is_empty());
    }

    #[test]
    fn empty_expected_payload_accepts_empty_body() {
        let ctx = ValidationContext::new(HttpMethod::Put)
            .with_expected_status(204)
            .with_actual_status(204)
            .with_expected_payload(json!({}))
            .with_body_text("");
        let config = ValidationConfig {
            strict_percent_fallback: false,
            ..Default::default()
        };
        let result = validate(&ctx, &config);
        assert!(result.passed(), "{:?}", result.reason());
        assert_eq!(result.match_percent(), 100.0);
    }
}

//! # Step Runner
//!
//! Executes a suite of test steps through a [`Transport`], builds a
//! [`ValidationContext`] for each response and records the verdict.
//!
//! - Serial runs execute every step in file order.
//! - Parallel runs start one worker per target host; steps for the same host
//!   keep their order so PUT-then-GET flows still correlate.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ValidationConfig;
use crate::error::{Error, Result};
use crate::http::client::Transport;
use crate::http::method::HttpMethod;
use crate::http::request::StepRequest;
use crate::reference::ReferenceCache;
use crate::validation::dispatch::Validator;
use crate::validation::types::{ExpectedStatus, MatchResult, ValidationContext, body_from_text};

/// Where a step's response text comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepSource {
    #[default]
    Http,
    /// Newline-delimited structured log output.
    Log,
}

/// One test step as authored in a suite file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body; strings are sent verbatim, anything else as JSON.
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub expected_status: Option<ExpectedStatus>,
    #[serde(default)]
    pub expected_payload: Option<Value>,
    /// Name of a file under the reference directory; wins over `expectedPayload`.
    #[serde(default)]
    pub expected_payload_file: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub source: StepSource,
    /// Compare a GET body against the payload last PUT to the same URL.
    #[serde(default)]
    pub compare_with_saved: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Step {
    fn request_body(&self) -> Option<String> {
        self.body.as_ref().map(|body| match body {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }

    fn host(&self) -> String {
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.host_str()
                    .map(|host| match url.port() {
                        Some(port) => format!("{host}:{port}"),
                        None => host.to_string(),
                    })
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suite {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Suite {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::config(format!("Failed to parse suite file `{}`: {e}", path.display()))
        })
    }
}

/// Execution mode for the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serial,
    Parallel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    pub actual_status: Option<u16>,
    pub duration_ms: u64,
    pub result: MatchResult,
}

impl StepOutcome {
    pub fn passed(&self) -> bool {
        self.result.passed()
    }
}

/// Summary report for a run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub suite: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<StepOutcome>,
}

impl RunReport {
    fn new(suite: &str, results: Vec<StepOutcome>, duration_ms: u64) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        Self {
            suite: suite.to_string(),
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms,
            results,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Plain-text rendering, one line per step plus failure detail.
    pub fn render_text(&self) -> String {
        let mut lines = vec![format!("Suite: {}", self.suite)];
        for outcome in &self.results {
            let mark = if outcome.passed() { "PASS" } else { "FAIL" };
            lines.push(format!(
                "[{mark}] {} {} {} ({} ms)",
                outcome.name, outcome.method, outcome.url, outcome.duration_ms
            ));
            if let Some(reason) = outcome.result.reason() {
                lines.push(format!("       {reason}"));
            }
            for diff in outcome.result.diffs() {
                lines.push(format!("       - {diff}"));
            }
        }
        lines.push(format!(
            "{} total, {} passed, {} failed in {} ms",
            self.total, self.passed, self.failed, self.duration_ms
        ));
        lines.join("\n")
    }
}

// ─── Runner ───────────────────────────────────────────────────────────────────

/// Shared, read-only state for every worker.
struct Shared {
    validator: Validator,
    references: Arc<ReferenceCache>,
    transport: Arc<dyn Transport>,
}

#[derive(Clone)]
pub struct Runner {
    shared: Arc<Shared>,
}

impl Runner {
    pub fn new(config: ValidationConfig, transport: Arc<dyn Transport>) -> Self {
        let references = Arc::new(ReferenceCache::new(config.reference_dir.clone()));
        Self::with_references(config, transport, references)
    }

    pub fn with_references(
        config: ValidationConfig,
        transport: Arc<dyn Transport>,
        references: Arc<ReferenceCache>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                validator: Validator::new(config),
                references,
                transport,
            }),
        }
    }

    pub async fn run(&self, suite: &Suite, mode: RunMode) -> RunReport {
        let started = Instant::now();
        info!(suite = %suite.name, steps = suite.steps.len(), ?mode, "Starting run");

        let indexed: Vec<(usize, Step)> = suite.steps.iter().cloned().enumerate().collect();
        let mut outcomes = match mode {
            RunMode::Serial => run_worker(Arc::clone(&self.shared), indexed).await,
            RunMode::Parallel => self.run_parallel(indexed).await,
        };
        outcomes.sort_by_key(|(index, _)| *index);

        let elapsed = started.elapsed().as_millis() as u64;
        let report = RunReport::new(
            &suite.name,
            outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
            elapsed,
        );
        info!(
            suite = %suite.name,
            passed = report.passed,
            failed = report.failed,
            elapsed_ms = elapsed,
            "Run finished"
        );
        report
    }

    async fn run_parallel(&self, steps: Vec<(usize, Step)>) -> Vec<(usize, StepOutcome)> {
        let mut groups: Vec<(String, Vec<(usize, Step)>)> = Vec::new();
        for (index, step) in steps {
            let host = step.host();
            match groups.iter_mut().find(|(h, _)| *h == host) {
                Some((_, group)) => group.push((index, step)),
                None => groups.push((host, vec![(index, step)])),
            }
        }
        debug!(workers = groups.len(), "Spawning per-host workers");

        let handles: Vec<_> = groups
            .into_iter()
            .map(|(host, group)| {
                let shared = Arc::clone(&self.shared);
                let fallback: Vec<(usize, Step)> = group.clone();
                (host, fallback, tokio::spawn(run_worker(shared, group)))
            })
            .collect();

        let mut outcomes = Vec::new();
        for (host, fallback, handle) in handles {
            match handle.await {
                Ok(results) => outcomes.extend(results),
                Err(err) => {
                    warn!(%host, error = %err, "Worker aborted");
                    outcomes.extend(fallback.into_iter().map(|(index, step)| {
                        let reason = format!("worker for `{host}` aborted: {err}");
                        (index, failed_outcome(&step, reason))
                    }));
                }
            }
        }
        outcomes
    }
}

/// Per-worker flow state: the last payload PUT to each URL.
#[derive(Debug, Default)]
struct Flow {
    saved: HashMap<String, Value>,
}

async fn run_worker(shared: Arc<Shared>, steps: Vec<(usize, Step)>) -> Vec<(usize, StepOutcome)> {
    let mut flow = Flow::default();
    let mut outcomes = Vec::with_capacity(steps.len());
    for (index, step) in steps {
        let outcome = execute_step(&shared, &mut flow, &step).await;
        debug!(step = %step.name, passed = outcome.passed(), "Step finished");
        outcomes.push((index, outcome));
    }
    outcomes
}

async fn execute_step(shared: &Shared, flow: &mut Flow, step: &Step) -> StepOutcome {
    let expected_payload = match &step.expected_payload_file {
        Some(name) => match shared.references.get(name) {
            Ok(payload) => Some((*payload).clone()),
            Err(err @ Error::MissingReferenceFile { .. }) => {
                return failed_outcome(step, format!("missing reference file: {err}"));
            }
            Err(err) => return failed_outcome(step, format!("reference file unreadable: {err}")),
        },
        None => step.expected_payload.clone(),
    };

    let mut request = StepRequest::new(step.method, step.url.clone());
    request.headers = step.headers.clone();
    request.body = step.request_body();
    request.timeout_ms = step.timeout_ms;
    let started = Instant::now();
    let response = match shared.transport.send(&request).await {
        Ok(response) => response,
        Err(err) => return failed_outcome(step, format!("request failed: {err}")),
    };

    let mut ctx = ValidationContext::new(step.method)
        .with_actual_status(response.status)
        .with_headers(response.headers.iter().map(|(k, v)| (k.as_str(), v.clone())));
    ctx = match step.source {
        StepSource::Http => ctx.with_body(body_from_text(&response.body)),
        StepSource::Log => ctx.with_body(Value::String(response.body.clone())).with_log_source(),
    };
    if let Some(status) = &step.expected_status {
        ctx = ctx.with_expected_status(status.clone());
    }
    if let Some(payload) = expected_payload {
        ctx = ctx.with_expected_payload(payload);
    }
    if let Some(pattern) = &step.pattern {
        ctx = ctx.with_pattern(pattern.clone());
    }
    if step.compare_with_saved && step.method == HttpMethod::Get {
        if let Some(saved) = flow.saved.get(&step.url) {
            ctx = ctx.with_prior_saved_payload(saved.clone());
        }
    }

    let result = shared.validator.validate(&ctx);

    if step.method == HttpMethod::Put {
        if let Some(body) = request.body.as_deref() {
            flow.saved.insert(step.url.clone(), body_from_text(body));
        }
    }

    StepOutcome {
        name: step.name.clone(),
        method: step.method,
        url: step.url.clone(),
        actual_status: Some(response.status),
        duration_ms: started.elapsed().as_millis() as u64,
        result,
    }
}

fn failed_outcome(step: &Step, reason: String) -> StepOutcome {
    StepOutcome {
        name: step.name.clone(),
        method: step.method,
        url: step.url.clone(),
        actual_status: None,
        duration_ms: 0,
        result: MatchResult::fail(reason),
    }
}

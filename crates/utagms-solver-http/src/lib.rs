//! [`Solver`] adapters for engines living outside the process.
//!
//! [`HttpJsonSolver`] posts the request to a JSON endpoint. [`FixtureSolver`]
//! replays a recorded outcome and is meant for offline runs and tests.

#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use utagms_core::{EngineError, Solver, SolverOutcome, SolverRequest};

const DEFAULT_TIMEOUT_MS: u64 = 600_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HttpSolverConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Name of the environment variable holding a bearer token.
    #[serde(default)]
    pub auth_bearer_env: Option<String>,
}

impl HttpSolverConfig {
    /// # Errors
    /// Returns [`EngineError::Configuration`] for malformed JSON or invalid values.
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| EngineError::Configuration(format!("invalid solver config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`EngineError::Configuration`] when the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            EngineError::Configuration(format!(
                "failed to read solver config {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }

    /// # Errors
    /// Returns [`EngineError::Configuration`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(EngineError::Configuration(format!(
                "solver url must use http or https, got '{}'",
                self.url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(EngineError::Configuration(
                "solver timeout_ms must be positive".to_string(),
            ));
        }
        if let Some(name) = self
            .headers
            .keys()
            .find(|name| name.eq_ignore_ascii_case("authorization"))
        {
            return Err(EngineError::Configuration(format!(
                "header '{name}' must be supplied through auth_bearer_env"
            )));
        }
        if matches!(&self.auth_bearer_env, Some(name) if name.trim().is_empty()) {
            return Err(EngineError::Configuration(
                "auth_bearer_env must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn bearer_token(&self) -> Result<Option<String>> {
        match &self.auth_bearer_env {
            Some(name) => std::env::var(name).map(Some).map_err(|_| {
                anyhow!("missing env var '{name}' required by auth_bearer_env")
            }),
            None => Ok(None),
        }
    }
}

/// Posts the [`SolverRequest`] as JSON and expects a [`SolverOutcome`] body.
#[derive(Debug, Clone)]
pub struct HttpJsonSolver {
    config: HttpSolverConfig,
    agent: ureq::Agent,
}

impl HttpJsonSolver {
    #[must_use]
    pub fn new(config: HttpSolverConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Self { config, agent }
    }

    #[must_use]
    pub fn config(&self) -> &HttpSolverConfig {
        &self.config
    }
}

impl Solver for HttpJsonSolver {
    fn solver_name(&self) -> &'static str {
        "http_json"
    }

    fn compute(&self, request: &SolverRequest) -> Result<SolverOutcome> {
        let mut call = self
            .agent
            .request("POST", &self.config.url)
            .set("content-type", "application/json");
        for (header, value) in &self.config.headers {
            call = call.set(header, value);
        }
        if let Some(token) = self.config.bearer_token()? {
            call = call.set("authorization", &format!("Bearer {token}"));
        }

        let started = Instant::now();
        debug!(
            url = %self.config.url,
            alternatives = request.performance_table.len(),
            criteria = request.criteria.len(),
            "posting solver request"
        );
        let body: Value = match call.send_json(request) {
            Ok(response) => response
                .into_json()
                .context("solver response is not valid JSON")?,
            Err(ureq::Error::Status(code, response)) => {
                let detail = response.into_string().unwrap_or_default();
                warn!(status = code, "solver endpoint rejected request");
                return Err(anyhow!("solver http status {code}: {}", detail.trim()));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(anyhow!("solver http transport failure: {err}"));
            }
        };
        debug!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "solver responded"
        );

        serde_json::from_value(body).context("solver response does not match the outcome contract")
    }
}

/// Replays a recorded [`SolverOutcome`] regardless of the request.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureSolver {
    outcome: SolverOutcome,
}

impl FixtureSolver {
    #[must_use]
    pub fn new(outcome: SolverOutcome) -> Self {
        Self { outcome }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read solver fixture {}", path.display()))?;
        let outcome = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse solver fixture {}", path.display()))?;
        Ok(Self::new(outcome))
    }
}

impl Solver for FixtureSolver {
    fn solver_name(&self) -> &'static str {
        "fixture"
    }

    fn compute(&self, _request: &SolverRequest) -> Result<SolverOutcome> {
        Ok(self.outcome.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use utagms_core::{PerformanceTable, SamplerConfig};

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/solver")
    }

    fn empty_request() -> SolverRequest {
        SolverRequest {
            performance_table: PerformanceTable::new(),
            comparisons: Vec::new(),
            criteria: Vec::new(),
            positions: Vec::new(),
            intensities: Vec::new(),
            sampler: SamplerConfig {
                enabled: false,
                number_of_samples: 0,
            },
        }
    }

    #[test]
    fn config_defaults_timeout_and_headers() {
        let config = must(HttpSolverConfig::from_json(
            r#"{"url": "http://localhost:8080/solve"}"#,
        ));
        assert_eq!(config.timeout_ms, 600_000);
        assert!(config.headers.is_empty());
        assert_eq!(config.auth_bearer_env, None);
    }

    #[test]
    fn config_rejects_invalid_values() {
        let cases = [
            (r#"{"url": "ftp://solver"}"#, "http or https"),
            (r#"{"url": "http://solver", "timeout_ms": 0}"#, "positive"),
            (
                r#"{"url": "http://solver", "headers": {"Authorization": "x"}}"#,
                "auth_bearer_env",
            ),
            (r#"{"url": "http://solver", "auth_bearer_env": " "}"#, "must not be empty"),
            (r#"{"endpoint": "http://solver"}"#, "invalid solver config"),
        ];
        for (raw, expected) in cases {
            match HttpSolverConfig::from_json(raw) {
                Ok(config) => panic!("expected rejection, got {config:?}"),
                Err(err) => {
                    assert_eq!(err.code(), "configuration.invalid");
                    assert!(err.to_string().contains(expected), "{err}");
                }
            }
        }
    }

    #[test]
    fn missing_bearer_env_fails_before_any_request() {
        let config = must(HttpSolverConfig::from_json(
            r#"{"url": "http://127.0.0.1:9/solve", "auth_bearer_env": "UTAGMS_TEST_TOKEN_THAT_IS_NEVER_SET"}"#,
        ));
        let solver = HttpJsonSolver::new(config);
        match solver.compute(&empty_request()) {
            Ok(outcome) => panic!("unexpected outcome {outcome:?}"),
            Err(err) => assert!(err.to_string().contains("missing env var")),
        }
    }

    #[test]
    fn fixture_solver_replays_recorded_outcomes() {
        let solved = must(FixtureSolver::from_path(&fixtures_dir().join("solved.json")));
        assert_eq!(solved.solver_name(), "fixture");
        match must(solved.compute(&empty_request())) {
            SolverOutcome::Solved(solution) => {
                assert_eq!(solution.ranking.len(), 3);
                assert_eq!(solution.samples_used, 100);
            }
            SolverOutcome::Inconsistent(report) => panic!("unexpected {report:?}"),
        }

        let inconsistent =
            must(FixtureSolver::from_path(&fixtures_dir().join("inconsistent.json")));
        match must(inconsistent.compute(&empty_request())) {
            SolverOutcome::Inconsistent(report) => assert_eq!(report.groups.len(), 1),
            SolverOutcome::Solved(solution) => panic!("unexpected {solution:?}"),
        }
    }

    #[test]
    fn fixture_solver_reports_missing_file() {
        let result = FixtureSolver::from_path(&fixtures_dir().join("absent.json"));
        assert!(result.is_err());
    }
}

//! Category results pipeline for UTA-GMS decision problems.
//!
//! A run for one category goes through:
//! - [`CategoryTree`] to resolve the active subtree and its criteria,
//! - [`PreferenceModelBuilder`] to turn persisted entities into a [`SolverRequest`],
//! - a [`Solver`] implementation (external engine),
//! - [`reconcile_solution`] or [`format_inconsistencies`] to map the outcome back
//!   onto rows that a [`DecisionStore`] persists.
//!
//! [`CategoryResultsRunner`] wires the steps together.

#![forbid(unsafe_code)]

mod builder;
mod inconsistency;
mod memory;
mod model;
mod reconcile;
mod runner;
mod solver;
#[cfg(test)]
mod testing;
mod tree;

use time::{OffsetDateTime, UtcOffset};

pub use builder::PreferenceModelBuilder;
pub use inconsistency::format_inconsistencies;
pub use memory::InMemoryDecisionStore;
pub use model::{
    AcceptabilityIndex, Alternative, AlternativeId, Category, CategoryId, Criterion,
    CriterionCategory, CriterionId, FunctionPoint, InconsistencyKind, InconsistencyRecord,
    JobId, JobRecord, JobStatus, PairwiseComparison, PairwiseWinning, Performance,
    PreferenceIntensity, PreferenceSign, Project, ProjectId, ProjectSnapshot, Ranking, RankingId,
    Relation, RelationKind,
};
pub use reconcile::{assign_ranks, reconcile_solution, CategoryResults, RankAssignment};
pub use runner::{
    prepare_problem, CategoryResultsRunner, ComputedSummary, DecisionStore, InconsistentSummary,
    PreparedProblem, RunOutcome, RunnerConfig, SAMPLER_TURNED_OFF,
};
pub use solver::{
    Comparison, CriterionDescriptor, ExtremeRanks, InconsistencyGroup, InconsistencyReport,
    Intensity, PerformanceTable, Position, SamplerConfig, Solver, SolverOutcome, SolverRequest,
    SolverSolution,
};
pub use tree::CategoryTree;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),
    #[error("category {category_id} has no criteria in its active subtree")]
    EmptyCriteriaSet { category_id: CategoryId },
    #[error("integrity error: {0}")]
    Integrity(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("solver failure: {0:#}")]
    Solver(anyhow::Error),
    #[error(transparent)]
    Store(anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable code used in error envelopes.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CategoryNotFound(_) => "category.not_found",
            Self::EmptyCriteriaSet { .. } => "category.empty_criteria",
            Self::Integrity(_) => "data.integrity",
            Self::Validation(_) => "input.validation",
            Self::Configuration(_) => "configuration.invalid",
            Self::Solver(_) => "solver.failure",
            Self::Store(_) => "store.failure",
        }
    }

    /// Whether the error describes a problem with the user's input rather than
    /// a fault of the system.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::CategoryNotFound(_) | Self::EmptyCriteriaSet { .. } | Self::Validation(_)
        )
    }
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`EngineError::Validation`] when parsing fails or the timestamp is
/// not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, EngineError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| EngineError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(EngineError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`EngineError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, EngineError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| EngineError::Validation(format!("failed to format RFC3339 timestamp: {err}")))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

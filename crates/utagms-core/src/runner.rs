use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::builder::PreferenceModelBuilder;
use crate::inconsistency::format_inconsistencies;
use crate::model::{Category, CategoryId, CriterionId, InconsistencyRecord, ProjectSnapshot};
use crate::reconcile::{reconcile_solution, CategoryResults};
use crate::solver::{SamplerConfig, Solver, SolverOutcome, SolverRequest};
use crate::tree::CategoryTree;
use crate::EngineError;

pub const SAMPLER_TURNED_OFF: &str = "Sampler turned off";

/// Persistence seam of the pipeline. Each write method is atomic.
pub trait DecisionStore {
    /// Loads the whole project owning `category_id`, or `None` when the
    /// category does not exist.
    #[allow(clippy::missing_errors_doc)]
    fn load_snapshot_for_category(
        &self,
        category_id: CategoryId,
    ) -> anyhow::Result<Option<ProjectSnapshot>>;

    #[allow(clippy::missing_errors_doc)]
    fn mark_categories_without_results(&mut self, category_ids: &[CategoryId])
        -> anyhow::Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn clear_inconsistencies(&mut self, category_id: CategoryId) -> anyhow::Result<()>;

    /// Replaces the category's inconsistencies with `records` and clears its
    /// `has_results` flag.
    #[allow(clippy::missing_errors_doc)]
    fn record_inconsistencies(
        &mut self,
        category_id: CategoryId,
        records: &[InconsistencyRecord],
    ) -> anyhow::Result<()>;

    /// Replaces every derived row of the category, updates its rankings and
    /// sampler state, then sets `has_results`.
    #[allow(clippy::missing_errors_doc)]
    fn commit_results(&mut self, results: &CategoryResults) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Stored as the sampler error when the category has sampling disabled.
    pub sampler_off_message: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sampler_off_message: SAMPLER_TURNED_OFF.to_string(),
        }
    }
}

/// Solver input for one category together with the scope it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedProblem {
    pub category: Category,
    pub categories: BTreeSet<CategoryId>,
    pub criteria: BTreeSet<CriterionId>,
    pub request: SolverRequest,
}

/// Resolves the category's active subtree and builds the solver request.
///
/// # Errors
/// Returns [`EngineError::CategoryNotFound`], [`EngineError::EmptyCriteriaSet`]
/// when the subtree has no criteria, or [`EngineError::Integrity`] for
/// inconsistent project data.
pub fn prepare_problem(
    snapshot: &ProjectSnapshot,
    category_id: CategoryId,
) -> Result<PreparedProblem, EngineError> {
    let category = snapshot
        .category(category_id)
        .ok_or(EngineError::CategoryNotFound(category_id))?
        .clone();

    let tree = CategoryTree::from_snapshot(snapshot);
    let categories = tree.categories_subtree(category_id);
    let criteria = tree.criteria_for_category(category_id);
    if criteria.is_empty() {
        return Err(EngineError::EmptyCriteriaSet { category_id });
    }

    let builder = PreferenceModelBuilder::new(snapshot, &tree);
    let request = SolverRequest {
        performance_table: builder.performances(&criteria)?,
        comparisons: builder.comparisons(&categories),
        criteria: builder.criteria(&criteria)?,
        positions: builder.best_worst_positions(&categories),
        intensities: builder.preference_intensities(&categories, &criteria),
        sampler: SamplerConfig {
            enabled: category.samples > 0,
            number_of_samples: category.samples,
        },
    };

    Ok(PreparedProblem {
        category,
        categories,
        criteria,
        request,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComputedSummary {
    pub category_id: CategoryId,
    pub ranked_alternatives: usize,
    pub function_points: usize,
    pub relations: usize,
    pub samples_used: u32,
    pub sampler_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InconsistentSummary {
    pub category_id: CategoryId,
    pub groups: usize,
    pub inconsistencies: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Computed(ComputedSummary),
    Inconsistent(InconsistentSummary),
}

impl RunOutcome {
    #[must_use]
    pub fn category_id(&self) -> CategoryId {
        match self {
            Self::Computed(summary) => summary.category_id,
            Self::Inconsistent(summary) => summary.category_id,
        }
    }
}

/// Runs the results pipeline for single categories against a store and a
/// solver.
pub struct CategoryResultsRunner<'a> {
    store: &'a mut dyn DecisionStore,
    solver: &'a dyn Solver,
    config: RunnerConfig,
}

impl<'a> CategoryResultsRunner<'a> {
    #[must_use]
    pub fn new(store: &'a mut dyn DecisionStore, solver: &'a dyn Solver) -> Self {
        Self {
            store,
            solver,
            config: RunnerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Computes and persists the results of one category.
    ///
    /// An infeasible preference model is a normal outcome
    /// ([`RunOutcome::Inconsistent`]).
    ///
    /// # Errors
    /// Returns [`EngineError::EmptyCriteriaSet`] after marking every category
    /// of the project as having no results; other variants for missing rows,
    /// store failures or solver faults.
    pub fn run(&mut self, category_id: CategoryId) -> Result<RunOutcome, EngineError> {
        let span = info_span!(
            "category_run",
            category_id = %category_id,
            solver = self.solver.solver_name()
        );
        let _entered = span.enter();
        info!("run started");

        let snapshot = self
            .store
            .load_snapshot_for_category(category_id)
            .map_err(EngineError::Store)?
            .ok_or(EngineError::CategoryNotFound(category_id))?;

        let prepared = match prepare_problem(&snapshot, category_id) {
            Err(EngineError::EmptyCriteriaSet { category_id }) => {
                warn!("no criteria in active subtree; clearing results flags of the project");
                self.store
                    .mark_categories_without_results(&snapshot.category_ids())
                    .map_err(EngineError::Store)?;
                return Err(EngineError::EmptyCriteriaSet { category_id });
            }
            other => other?,
        };
        debug!(
            categories = prepared.categories.len(),
            criteria = prepared.criteria.len(),
            comparisons = prepared.request.comparisons.len(),
            intensities = prepared.request.intensities.len(),
            positions = prepared.request.positions.len(),
            "solver request built"
        );

        self.store
            .clear_inconsistencies(category_id)
            .map_err(EngineError::Store)?;

        let sampler_on = prepared.request.sampler.enabled;
        let outcome = self
            .solver
            .compute(&prepared.request)
            .map_err(EngineError::Solver)?;

        match outcome {
            SolverOutcome::Inconsistent(report) => {
                let records = format_inconsistencies(category_id, &report, &snapshot);
                self.store
                    .record_inconsistencies(category_id, &records)
                    .map_err(EngineError::Store)?;
                info!(
                    groups = report.groups.len(),
                    inconsistencies = records.len(),
                    "preference information is inconsistent"
                );
                Ok(RunOutcome::Inconsistent(InconsistentSummary {
                    category_id,
                    groups: report.groups.len(),
                    inconsistencies: records.len(),
                }))
            }
            SolverOutcome::Solved(solution) => {
                let results = reconcile_solution(
                    &snapshot,
                    category_id,
                    sampler_on,
                    &solution,
                    &self.config.sampler_off_message,
                )?;
                self.store
                    .commit_results(&results)
                    .map_err(EngineError::Store)?;
                if let Some(message) = &results.sampler_error {
                    debug!(sampler_error = %message, "sampler did not produce indices");
                }
                info!(
                    ranked = results.rankings.len(),
                    samples_used = results.samples_used,
                    "results committed"
                );
                Ok(RunOutcome::Computed(ComputedSummary {
                    category_id,
                    ranked_alternatives: results.rankings.len(),
                    function_points: results.function_points.len(),
                    relations: results.relations.len(),
                    samples_used: results.samples_used,
                    sampler_error: results.sampler_error,
                }))
            }
        }
    }
}

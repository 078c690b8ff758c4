use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{AlternativeId, CriterionId, PreferenceSign};

pub type PerformanceTable = BTreeMap<AlternativeId, BTreeMap<CriterionId, f64>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CriterionDescriptor {
    pub criterion_id: CriterionId,
    pub gain: bool,
    pub linear_segments: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comparison {
    pub alternative_1: AlternativeId,
    pub alternative_2: AlternativeId,
    pub criteria: Vec<CriterionId>,
    pub sign: PreferenceSign,
}

/// Preference of `alternative_1` over `alternative_2` compared with the
/// preference of `alternative_3` over `alternative_4`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Intensity {
    pub alternative_1: AlternativeId,
    pub alternative_2: AlternativeId,
    pub alternative_3: AlternativeId,
    pub alternative_4: AlternativeId,
    pub criteria: Vec<CriterionId>,
    pub sign: PreferenceSign,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub alternative_id: AlternativeId,
    pub best_position: u32,
    pub worst_position: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SamplerConfig {
    pub enabled: bool,
    pub number_of_samples: u32,
}

/// Input handed to the external engine for one category computation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverRequest {
    pub performance_table: PerformanceTable,
    pub comparisons: Vec<Comparison>,
    pub criteria: Vec<CriterionDescriptor>,
    pub positions: Vec<Position>,
    pub intensities: Vec<Intensity>,
    pub sampler: SamplerConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtremeRanks {
    pub pessimistic_worst: u32,
    pub pessimistic_best: u32,
    pub optimistic_worst: u32,
    pub optimistic_best: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SolverSolution {
    /// Utility of each alternative.
    pub ranking: BTreeMap<AlternativeId, f64>,
    /// Ordered (abscissa, ordinate) knots of each marginal value function.
    pub functions: BTreeMap<CriterionId, Vec<(f64, f64)>>,
    /// Percentages indexed by position, position 1 first.
    #[serde(default)]
    pub acceptability_indices: BTreeMap<AlternativeId, Vec<f64>>,
    #[serde(default)]
    pub pairwise_winnings: BTreeMap<AlternativeId, BTreeMap<AlternativeId, f64>>,
    #[serde(default)]
    pub samples_used: u32,
    pub extreme_ranks: BTreeMap<AlternativeId, ExtremeRanks>,
    #[serde(default)]
    pub necessary: BTreeMap<AlternativeId, Vec<AlternativeId>>,
    #[serde(default)]
    pub possible: BTreeMap<AlternativeId, Vec<AlternativeId>>,
    #[serde(default)]
    pub sampler_error: Option<String>,
}

/// One minimal inconsistent subset of the preference information.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InconsistencyGroup {
    #[serde(default)]
    pub comparisons: Vec<Comparison>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub intensities: Vec<Intensity>,
}

impl InconsistencyGroup {
    #[must_use]
    pub fn len(&self) -> usize {
        self.comparisons.len() + self.positions.len() + self.intensities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InconsistencyReport {
    pub groups: Vec<InconsistencyGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SolverOutcome {
    Solved(SolverSolution),
    Inconsistent(InconsistencyReport),
}

/// External decision engine. Implementations report an infeasible model as
/// [`SolverOutcome::Inconsistent`]; any `Err` is a fault.
pub trait Solver {
    fn solver_name(&self) -> &'static str;

    #[allow(clippy::missing_errors_doc)]
    fn compute(&self, request: &SolverRequest) -> anyhow::Result<SolverOutcome>;
}

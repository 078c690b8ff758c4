use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    AcceptabilityIndex, AlternativeId, CategoryId, CriterionId, FunctionPoint, PairwiseWinning,
    ProjectSnapshot, Relation, RelationKind,
};
use crate::solver::{ExtremeRanks, SolverSolution};
use crate::EngineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RankAssignment {
    pub alternative_id: AlternativeId,
    pub ranking: u32,
    pub ranking_value: f64,
}

/// Everything a successful computation writes for one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryResults {
    pub category_id: CategoryId,
    pub rankings: Vec<RankAssignment>,
    pub extreme_ranks: BTreeMap<AlternativeId, ExtremeRanks>,
    pub function_points: Vec<FunctionPoint>,
    pub acceptability_indices: Vec<AcceptabilityIndex>,
    pub pairwise_winnings: Vec<PairwiseWinning>,
    /// Necessary relations first, then possible ones.
    pub relations: Vec<Relation>,
    pub sampler_error: Option<String>,
    pub samples_used: u32,
}

/// Orders alternatives by utility, highest first, and numbers them 1..N.
/// Equal utilities are ordered by alternative id.
///
/// # Errors
/// Returns [`EngineError::Integrity`] when a utility is NaN or infinite.
pub fn assign_ranks(
    scores: &BTreeMap<AlternativeId, f64>,
) -> Result<Vec<RankAssignment>, EngineError> {
    if let Some((alternative_id, value)) = scores.iter().find(|(_, value)| !value.is_finite()) {
        return Err(EngineError::Integrity(format!(
            "solver returned non-finite utility {value} for alternative {alternative_id}"
        )));
    }

    let mut ordered: Vec<(AlternativeId, f64)> =
        scores.iter().map(|(id, value)| (*id, *value)).collect();
    ordered.sort_by(|left, right| right.1.total_cmp(&left.1).then(left.0.cmp(&right.0)));

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, (alternative_id, ranking_value))| {
            let ranking = u32::try_from(index + 1).map_err(|_| {
                EngineError::Integrity("too many alternatives to rank".to_string())
            })?;
            Ok(RankAssignment {
                alternative_id,
                ranking,
                ranking_value,
            })
        })
        .collect()
}

/// Maps a solver solution onto the rows persisted for `category_id`.
///
/// Sampling rows are produced only when the sampler was enabled and reported
/// no error; otherwise `sampler_error` carries the reported error or
/// `sampler_off_message`.
///
/// # Errors
/// Returns [`EngineError::Integrity`] when the solution references an
/// alternative or criterion unknown to the project, or a utility is not
/// finite.
pub fn reconcile_solution(
    snapshot: &ProjectSnapshot,
    category_id: CategoryId,
    sampler_on: bool,
    solution: &SolverSolution,
    sampler_off_message: &str,
) -> Result<CategoryResults, EngineError> {
    let known = KnownIds::new(snapshot);

    for alternative_id in solution.ranking.keys().chain(solution.extreme_ranks.keys()) {
        known.alternative(*alternative_id)?;
    }
    let rankings = assign_ranks(&solution.ranking)?;

    let mut function_points = Vec::new();
    for (criterion_id, knots) in &solution.functions {
        known.criterion(*criterion_id)?;
        function_points.extend(knots.iter().map(|(abscissa, ordinate)| FunctionPoint {
            category_id,
            criterion_id: *criterion_id,
            abscissa: *abscissa,
            ordinate: *ordinate,
        }));
    }

    let mut relations = Vec::new();
    for (kind, edges) in [
        (RelationKind::Necessary, &solution.necessary),
        (RelationKind::Possible, &solution.possible),
    ] {
        for (alternative_1, dependents) in edges {
            known.alternative(*alternative_1)?;
            for alternative_2 in dependents {
                known.alternative(*alternative_2)?;
                relations.push(Relation {
                    category_id,
                    alternative_1: *alternative_1,
                    alternative_2: *alternative_2,
                    kind,
                });
            }
        }
    }

    let reported_error = solution
        .sampler_error
        .as_deref()
        .map(str::trim)
        .filter(|message| !message.is_empty());

    let mut acceptability_indices = Vec::new();
    let mut pairwise_winnings = Vec::new();
    let sampler_error = match reported_error {
        Some(message) => Some(message.to_string()),
        None if sampler_on => {
            acceptability_indices = acceptability_rows(&known, category_id, solution)?;
            pairwise_winnings = pairwise_winning_rows(&known, category_id, solution)?;
            None
        }
        None => Some(sampler_off_message.to_string()),
    };

    Ok(CategoryResults {
        category_id,
        rankings,
        extreme_ranks: solution.extreme_ranks.clone(),
        function_points,
        acceptability_indices,
        pairwise_winnings,
        relations,
        sampler_error,
        samples_used: solution.samples_used,
    })
}

fn acceptability_rows(
    known: &KnownIds,
    category_id: CategoryId,
    solution: &SolverSolution,
) -> Result<Vec<AcceptabilityIndex>, EngineError> {
    let mut rows = Vec::new();
    for (alternative_id, percentages) in &solution.acceptability_indices {
        known.alternative(*alternative_id)?;
        for (index, percent) in percentages.iter().enumerate() {
            let position = u32::try_from(index + 1)
                .map_err(|_| EngineError::Integrity("acceptability position overflow".to_string()))?;
            rows.push(AcceptabilityIndex {
                category_id,
                alternative_id: *alternative_id,
                position,
                percent: *percent,
            });
        }
    }
    Ok(rows)
}

fn pairwise_winning_rows(
    known: &KnownIds,
    category_id: CategoryId,
    solution: &SolverSolution,
) -> Result<Vec<PairwiseWinning>, EngineError> {
    let mut rows = Vec::new();
    for (alternative_1, opponents) in &solution.pairwise_winnings {
        known.alternative(*alternative_1)?;
        for (alternative_2, percent) in opponents {
            if alternative_1 == alternative_2 {
                continue;
            }
            known.alternative(*alternative_2)?;
            if *percent == 0.0 {
                continue;
            }
            rows.push(PairwiseWinning {
                category_id,
                alternative_1: *alternative_1,
                alternative_2: *alternative_2,
                percent: *percent,
            });
        }
    }
    Ok(rows)
}

struct KnownIds {
    alternatives: Vec<AlternativeId>,
    criteria: Vec<CriterionId>,
}

impl KnownIds {
    fn new(snapshot: &ProjectSnapshot) -> Self {
        let mut alternatives: Vec<_> = snapshot.alternatives.iter().map(|item| item.id).collect();
        alternatives.sort_unstable();
        let mut criteria: Vec<_> = snapshot.criteria.iter().map(|item| item.id).collect();
        criteria.sort_unstable();
        Self {
            alternatives,
            criteria,
        }
    }

    fn alternative(&self, alternative_id: AlternativeId) -> Result<(), EngineError> {
        self.alternatives
            .binary_search(&alternative_id)
            .map(|_| ())
            .map_err(|_| {
                EngineError::Integrity(format!(
                    "solver referenced unknown alternative {alternative_id}"
                ))
            })
    }

    fn criterion(&self, criterion_id: CriterionId) -> Result<(), EngineError> {
        self.criteria
            .binary_search(&criterion_id)
            .map(|_| ())
            .map_err(|_| {
                EngineError::Integrity(format!("solver referenced unknown criterion {criterion_id}"))
            })
    }
}

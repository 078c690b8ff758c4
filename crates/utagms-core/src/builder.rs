use std::collections::{BTreeMap, BTreeSet};

use crate::model::{CategoryId, CriterionId, PreferenceSign, ProjectSnapshot, Ranking};
use crate::solver::{Comparison, CriterionDescriptor, Intensity, PerformanceTable, Position};
use crate::tree::CategoryTree;
use crate::EngineError;

/// Converts persisted project entities into the solver's input model.
pub struct PreferenceModelBuilder<'a> {
    snapshot: &'a ProjectSnapshot,
    tree: &'a CategoryTree,
}

impl<'a> PreferenceModelBuilder<'a> {
    #[must_use]
    pub fn new(snapshot: &'a ProjectSnapshot, tree: &'a CategoryTree) -> Self {
        Self { snapshot, tree }
    }

    /// # Errors
    /// Returns [`EngineError::Integrity`] when a criterion id has no row.
    pub fn criteria(
        &self,
        criteria: &BTreeSet<CriterionId>,
    ) -> Result<Vec<CriterionDescriptor>, EngineError> {
        criteria
            .iter()
            .map(|criterion_id| {
                let criterion = self.snapshot.criterion(*criterion_id).ok_or_else(|| {
                    EngineError::Integrity(format!("criterion {criterion_id} does not exist"))
                })?;
                Ok(CriterionDescriptor {
                    criterion_id: criterion.id,
                    gain: criterion.gain,
                    linear_segments: criterion.linear_segments,
                })
            })
            .collect()
    }

    /// Every alternative of the project, each mapped to its values on the
    /// given criteria.
    ///
    /// # Errors
    /// Returns [`EngineError::Integrity`] for a duplicate (alternative,
    /// criterion) pair or a performance of an unknown alternative.
    pub fn performances(
        &self,
        criteria: &BTreeSet<CriterionId>,
    ) -> Result<PerformanceTable, EngineError> {
        let mut table: PerformanceTable = self
            .snapshot
            .alternatives
            .iter()
            .map(|alternative| (alternative.id, BTreeMap::new()))
            .collect();

        for performance in &self.snapshot.performances {
            if !criteria.contains(&performance.criterion_id) {
                continue;
            }
            let row = table.get_mut(&performance.alternative_id).ok_or_else(|| {
                EngineError::Integrity(format!(
                    "performance references unknown alternative {}",
                    performance.alternative_id
                ))
            })?;
            if row
                .insert(performance.criterion_id, performance.value)
                .is_some()
            {
                return Err(EngineError::Integrity(format!(
                    "duplicate performance for alternative {} on criterion {}",
                    performance.alternative_id, performance.criterion_id
                )));
            }
        }
        Ok(table)
    }

    /// Pairwise statements for the given categories: the stored comparisons in
    /// pairwise mode, otherwise statements derived from reference rankings.
    #[must_use]
    pub fn comparisons(&self, categories: &BTreeSet<CategoryId>) -> Vec<Comparison> {
        if self.snapshot.project.pairwise_mode {
            return self
                .snapshot
                .pairwise_comparisons
                .iter()
                .filter(|item| categories.contains(&item.category_id))
                .map(|item| Comparison {
                    alternative_1: item.alternative_1,
                    alternative_2: item.alternative_2,
                    criteria: self.criteria_list(item.category_id),
                    sign: item.kind,
                })
                .collect();
        }

        let mut comparisons = Vec::new();
        for category_id in categories {
            let rows: Vec<&Ranking> = self.snapshot.rankings_for(*category_id).collect();
            let criteria = self.criteria_list(*category_id);
            comparisons.extend(reference_ranking_comparisons(&rows, &criteria));
        }
        comparisons
    }

    /// Intensities scoped to one of `categories` or to one of `criteria`. An
    /// intensity matching both scopes is emitted twice.
    #[must_use]
    pub fn preference_intensities(
        &self,
        categories: &BTreeSet<CategoryId>,
        criteria: &BTreeSet<CriterionId>,
    ) -> Vec<Intensity> {
        let mut intensities = Vec::new();
        for item in &self.snapshot.preference_intensities {
            let mut emit = |scope: Vec<CriterionId>| {
                intensities.push(Intensity {
                    alternative_1: item.alternative_1,
                    alternative_2: item.alternative_2,
                    alternative_3: item.alternative_3,
                    alternative_4: item.alternative_4,
                    criteria: scope,
                    sign: item.kind,
                });
            };
            if let Some(category_id) = item.category_id {
                if categories.contains(&category_id) {
                    emit(self.criteria_list(category_id));
                }
            }
            if let Some(criterion_id) = item.criterion_id {
                if criteria.contains(&criterion_id) {
                    emit(vec![criterion_id]);
                }
            }
        }
        intensities
    }

    /// Position bounds; a missing bound defaults to 1 (best) or to the number
    /// of ranking rows of the category (worst).
    #[must_use]
    pub fn best_worst_positions(&self, categories: &BTreeSet<CategoryId>) -> Vec<Position> {
        let mut positions = Vec::new();
        for category_id in categories {
            let rows: Vec<&Ranking> = self.snapshot.rankings_for(*category_id).collect();
            let row_count = u32::try_from(rows.len()).unwrap_or(u32::MAX);
            for row in rows {
                let bounds = match (row.best_position, row.worst_position) {
                    (Some(best), Some(worst)) => (best, worst),
                    (Some(best), None) => (best, row_count),
                    (None, Some(worst)) => (1, worst),
                    (None, None) => continue,
                };
                positions.push(Position {
                    alternative_id: row.alternative_id,
                    best_position: bounds.0,
                    worst_position: bounds.1,
                });
            }
        }
        positions
    }

    fn criteria_list(&self, category_id: CategoryId) -> Vec<CriterionId> {
        self.tree
            .criteria_for_category(category_id)
            .into_iter()
            .collect()
    }
}

// Rows on one level are emitted pairwise in both orders; rows on the next
// level are dominated.
fn reference_ranking_comparisons(rows: &[&Ranking], criteria: &[CriterionId]) -> Vec<Comparison> {
    let levels: Vec<u32> = rows
        .iter()
        .map(|row| row.reference_ranking)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut comparisons = Vec::new();
    for row in rows {
        if row.reference_ranking == 0 {
            continue;
        }
        let Ok(index) = levels.binary_search(&row.reference_ranking) else {
            continue;
        };
        let next_level = levels.get(index + 1).copied();
        for other in rows {
            let sign = if Some(other.reference_ranking) == next_level {
                PreferenceSign::Preference
            } else if other.reference_ranking == row.reference_ranking && other.id != row.id {
                PreferenceSign::Indifference
            } else {
                continue;
            };
            comparisons.push(Comparison {
                alternative_1: row.alternative_id,
                alternative_2: other.alternative_id,
                criteria: criteria.to_vec(),
                sign,
            });
        }
    }
    comparisons
}

use crate::model::{
    AcceptabilityIndex, Category, CategoryId, FunctionPoint, InconsistencyRecord, PairwiseWinning,
    ProjectSnapshot, Ranking, RankingId, Relation,
};
use crate::reconcile::CategoryResults;
use crate::runner::DecisionStore;
use crate::EngineError;

/// [`DecisionStore`] kept entirely in memory. Writes build the new state on a
/// copy and swap it in, so a failed write leaves the previous state intact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryDecisionStore {
    state: StoreState,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct StoreState {
    projects: Vec<ProjectSnapshot>,
    inconsistencies: Vec<InconsistencyRecord>,
    function_points: Vec<FunctionPoint>,
    acceptability_indices: Vec<AcceptabilityIndex>,
    pairwise_winnings: Vec<PairwiseWinning>,
    relations: Vec<Relation>,
}

impl StoreState {
    fn project_of_mut(&mut self, category_id: CategoryId) -> Option<&mut ProjectSnapshot> {
        self.projects
            .iter_mut()
            .find(|project| project.category(category_id).is_some())
    }

    fn category_mut(&mut self, category_id: CategoryId) -> Option<&mut Category> {
        self.projects
            .iter_mut()
            .flat_map(|project| project.categories.iter_mut())
            .find(|category| category.id == category_id)
    }

    fn next_ranking_id(&self) -> RankingId {
        let max = self
            .projects
            .iter()
            .flat_map(|project| project.rankings.iter())
            .map(|row| row.id.0)
            .max()
            .unwrap_or(0);
        RankingId(max + 1)
    }
}

impl InMemoryDecisionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&mut self, snapshot: ProjectSnapshot) {
        self.state
            .projects
            .retain(|project| project.project.id != snapshot.project.id);
        self.state.projects.push(snapshot);
    }

    #[must_use]
    pub fn category(&self, category_id: CategoryId) -> Option<Category> {
        self.state
            .projects
            .iter()
            .find_map(|project| project.category(category_id).cloned())
    }

    /// # Errors
    /// Returns [`EngineError::CategoryNotFound`] for an unknown category.
    pub fn set_samples(&mut self, category_id: CategoryId, samples: u32) -> Result<(), EngineError> {
        let category = self
            .state
            .category_mut(category_id)
            .ok_or(EngineError::CategoryNotFound(category_id))?;
        category.samples = samples;
        Ok(())
    }

    /// # Errors
    /// Returns [`EngineError::CategoryNotFound`] for an unknown category.
    pub fn set_has_results(
        &mut self,
        category_id: CategoryId,
        has_results: bool,
    ) -> Result<(), EngineError> {
        let category = self
            .state
            .category_mut(category_id)
            .ok_or(EngineError::CategoryNotFound(category_id))?;
        category.has_results = has_results;
        Ok(())
    }

    /// Ranking rows of the category ordered by alternative id.
    #[must_use]
    pub fn rankings(&self, category_id: CategoryId) -> Vec<Ranking> {
        let mut rows: Vec<Ranking> = self
            .state
            .projects
            .iter()
            .flat_map(|project| project.rankings_for(category_id).cloned())
            .collect();
        rows.sort_by_key(|row| row.alternative_id);
        rows
    }

    #[must_use]
    pub fn inconsistencies(&self, category_id: CategoryId) -> Vec<InconsistencyRecord> {
        scoped(&self.state.inconsistencies, category_id, |row| row.category_id)
    }

    #[must_use]
    pub fn function_points(&self, category_id: CategoryId) -> Vec<FunctionPoint> {
        scoped(&self.state.function_points, category_id, |row| row.category_id)
    }

    #[must_use]
    pub fn acceptability_indices(&self, category_id: CategoryId) -> Vec<AcceptabilityIndex> {
        scoped(&self.state.acceptability_indices, category_id, |row| {
            row.category_id
        })
    }

    #[must_use]
    pub fn pairwise_winnings(&self, category_id: CategoryId) -> Vec<PairwiseWinning> {
        scoped(&self.state.pairwise_winnings, category_id, |row| row.category_id)
    }

    #[must_use]
    pub fn relations(&self, category_id: CategoryId) -> Vec<Relation> {
        scoped(&self.state.relations, category_id, |row| row.category_id)
    }
}

fn scoped<T: Clone>(rows: &[T], category_id: CategoryId, key: fn(&T) -> CategoryId) -> Vec<T> {
    rows.iter()
        .filter(|row| key(row) == category_id)
        .cloned()
        .collect()
}

fn replace_scoped<T>(
    rows: &mut Vec<T>,
    category_id: CategoryId,
    key: fn(&T) -> CategoryId,
    fresh: &[T],
) where
    T: Clone,
{
    rows.retain(|row| key(row) != category_id);
    rows.extend_from_slice(fresh);
}

impl DecisionStore for InMemoryDecisionStore {
    fn load_snapshot_for_category(
        &self,
        category_id: CategoryId,
    ) -> anyhow::Result<Option<ProjectSnapshot>> {
        Ok(self
            .state
            .projects
            .iter()
            .find(|project| project.category(category_id).is_some())
            .cloned())
    }

    fn mark_categories_without_results(
        &mut self,
        category_ids: &[CategoryId],
    ) -> anyhow::Result<()> {
        for category_id in category_ids {
            if let Some(category) = self.state.category_mut(*category_id) {
                category.has_results = false;
            }
        }
        Ok(())
    }

    fn clear_inconsistencies(&mut self, category_id: CategoryId) -> anyhow::Result<()> {
        self.state
            .inconsistencies
            .retain(|row| row.category_id != category_id);
        Ok(())
    }

    fn record_inconsistencies(
        &mut self,
        category_id: CategoryId,
        records: &[InconsistencyRecord],
    ) -> anyhow::Result<()> {
        let mut next = self.state.clone();
        let category = next
            .category_mut(category_id)
            .ok_or_else(|| anyhow::anyhow!("category {category_id} does not exist"))?;
        category.has_results = false;
        replace_scoped(
            &mut next.inconsistencies,
            category_id,
            |row| row.category_id,
            records,
        );
        self.state = next;
        Ok(())
    }

    fn commit_results(&mut self, results: &CategoryResults) -> anyhow::Result<()> {
        let category_id = results.category_id;
        let mut next = self.state.clone();

        replace_scoped(
            &mut next.acceptability_indices,
            category_id,
            |row| row.category_id,
            &results.acceptability_indices,
        );
        replace_scoped(
            &mut next.pairwise_winnings,
            category_id,
            |row| row.category_id,
            &results.pairwise_winnings,
        );
        replace_scoped(
            &mut next.function_points,
            category_id,
            |row| row.category_id,
            &results.function_points,
        );
        replace_scoped(
            &mut next.relations,
            category_id,
            |row| row.category_id,
            &results.relations,
        );

        for row in next
            .projects
            .iter_mut()
            .flat_map(|project| project.rankings.iter_mut())
            .filter(|row| row.category_id == category_id)
        {
            row.ranking = 0;
            row.ranking_value = 0.0;
            row.extreme_pessimistic_worst = 0;
            row.extreme_pessimistic_best = 0;
            row.extreme_optimistic_worst = 0;
            row.extreme_optimistic_best = 0;
        }

        for assignment in &results.rankings {
            let extreme = results.extreme_ranks.get(&assignment.alternative_id);
            let fresh_id = next.next_ranking_id();
            let project = next
                .project_of_mut(category_id)
                .ok_or_else(|| anyhow::anyhow!("category {category_id} does not exist"))?;
            let index = match project.rankings.iter().position(|row| {
                row.category_id == category_id && row.alternative_id == assignment.alternative_id
            }) {
                Some(index) => index,
                None => {
                    project.rankings.push(Ranking {
                        id: fresh_id,
                        category_id,
                        alternative_id: assignment.alternative_id,
                        reference_ranking: 0,
                        best_position: None,
                        worst_position: None,
                        ranking: 0,
                        ranking_value: 0.0,
                        extreme_pessimistic_worst: 0,
                        extreme_pessimistic_best: 0,
                        extreme_optimistic_worst: 0,
                        extreme_optimistic_best: 0,
                    });
                    project.rankings.len() - 1
                }
            };
            let row = &mut project.rankings[index];
            row.ranking = assignment.ranking;
            row.ranking_value = assignment.ranking_value;
            if let Some(extreme) = extreme {
                row.extreme_pessimistic_worst = extreme.pessimistic_worst;
                row.extreme_pessimistic_best = extreme.pessimistic_best;
                row.extreme_optimistic_worst = extreme.optimistic_worst;
                row.extreme_optimistic_best = extreme.optimistic_best;
            }
        }

        let category = next
            .category_mut(category_id)
            .ok_or_else(|| anyhow::anyhow!("category {category_id} does not exist"))?;
        category.sampler_error.clone_from(&results.sampler_error);
        category.has_results = true;

        self.state = next;
        Ok(())
    }
}

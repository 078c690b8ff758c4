use std::fmt::Display;

use crate::model::{
    Alternative, AlternativeId, Category, CategoryId, Criterion, CriterionCategory, CriterionId,
    PairwiseComparison, Performance, PreferenceIntensity, PreferenceSign, Project, ProjectId,
    ProjectSnapshot, Ranking, RankingId,
};

pub(crate) fn must<T, E: Display>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("expected Ok(..), got error: {err}"),
    }
}

pub(crate) struct Fixture {
    snapshot: ProjectSnapshot,
}

impl Fixture {
    pub(crate) fn new(pairwise_mode: bool) -> Self {
        Self {
            snapshot: ProjectSnapshot {
                project: Project {
                    id: ProjectId(1),
                    name: "fixture".to_string(),
                    pairwise_mode,
                },
                categories: Vec::new(),
                criteria: Vec::new(),
                criterion_categories: Vec::new(),
                alternatives: Vec::new(),
                performances: Vec::new(),
                pairwise_comparisons: Vec::new(),
                rankings: Vec::new(),
                preference_intensities: Vec::new(),
            },
        }
    }

    pub(crate) fn category(mut self, id: i64, parent: Option<i64>, samples: u32) -> Self {
        self.snapshot.categories.push(Category {
            id: CategoryId(id),
            project_id: ProjectId(1),
            name: format!("category-{id}"),
            parent_id: parent.map(CategoryId),
            active: true,
            samples,
            has_results: false,
            sampler_error: None,
        });
        self
    }

    pub(crate) fn inactive(mut self, id: i64) -> Self {
        for category in &mut self.snapshot.categories {
            if category.id == CategoryId(id) {
                category.active = false;
            }
        }
        self
    }

    pub(crate) fn criterion(mut self, id: i64, name: &str, gain: bool, segments: u32) -> Self {
        self.snapshot.criteria.push(Criterion {
            id: CriterionId(id),
            project_id: ProjectId(1),
            name: name.to_string(),
            gain,
            linear_segments: segments,
        });
        self
    }

    pub(crate) fn assign(mut self, category: i64, criterion: i64) -> Self {
        self.snapshot.criterion_categories.push(CriterionCategory {
            category_id: CategoryId(category),
            criterion_id: CriterionId(criterion),
        });
        self
    }

    pub(crate) fn alternative(mut self, id: i64, name: &str) -> Self {
        self.snapshot.alternatives.push(Alternative {
            id: AlternativeId(id),
            project_id: ProjectId(1),
            name: name.to_string(),
        });
        self
    }

    pub(crate) fn performance(mut self, alternative: i64, criterion: i64, value: f64) -> Self {
        self.snapshot.performances.push(Performance {
            alternative_id: AlternativeId(alternative),
            criterion_id: CriterionId(criterion),
            value,
        });
        self
    }

    pub(crate) fn ranking(
        mut self,
        id: i64,
        category: i64,
        alternative: i64,
        reference: u32,
        bounds: (Option<u32>, Option<u32>),
    ) -> Self {
        self.snapshot.rankings.push(Ranking {
            id: RankingId(id),
            category_id: CategoryId(category),
            alternative_id: AlternativeId(alternative),
            reference_ranking: reference,
            best_position: bounds.0,
            worst_position: bounds.1,
            ranking: 0,
            ranking_value: 0.0,
            extreme_pessimistic_worst: 0,
            extreme_pessimistic_best: 0,
            extreme_optimistic_worst: 0,
            extreme_optimistic_best: 0,
        });
        self
    }

    pub(crate) fn comparison(
        mut self,
        id: i64,
        category: i64,
        pair: (i64, i64),
        kind: PreferenceSign,
    ) -> Self {
        self.snapshot.pairwise_comparisons.push(PairwiseComparison {
            id,
            category_id: CategoryId(category),
            alternative_1: AlternativeId(pair.0),
            alternative_2: AlternativeId(pair.1),
            kind,
        });
        self
    }

    pub(crate) fn intensity(
        mut self,
        id: i64,
        alternatives: [i64; 4],
        scope: (Option<i64>, Option<i64>),
        kind: PreferenceSign,
    ) -> Self {
        self.snapshot.preference_intensities.push(PreferenceIntensity {
            id,
            project_id: ProjectId(1),
            alternative_1: AlternativeId(alternatives[0]),
            alternative_2: AlternativeId(alternatives[1]),
            alternative_3: AlternativeId(alternatives[2]),
            alternative_4: AlternativeId(alternatives[3]),
            criterion_id: scope.0.map(CriterionId),
            category_id: scope.1.map(CategoryId),
            kind,
        });
        self
    }

    pub(crate) fn build(self) -> ProjectSnapshot {
        self.snapshot
    }
}

/// Root category 1 (samples 100) with child 2, criteria `price` (cost,
/// assigned to 1) and `quality` (gain, assigned to 2), alternatives A, B, C
/// fully evaluated, and reference ranking A=1, B=2, C unplaced in category 1.
pub(crate) fn standard_project() -> ProjectSnapshot {
    Fixture::new(false)
        .category(1, None, 100)
        .category(2, Some(1), 0)
        .criterion(10, "price", false, 0)
        .criterion(11, "quality", true, 2)
        .assign(1, 10)
        .assign(2, 11)
        .alternative(1, "A")
        .alternative(2, "B")
        .alternative(3, "C")
        .performance(1, 10, 10.0)
        .performance(1, 11, 4.0)
        .performance(2, 10, 12.0)
        .performance(2, 11, 3.0)
        .performance(3, 10, 8.0)
        .performance(3, 11, 1.0)
        .ranking(101, 1, 1, 1, (None, None))
        .ranking(102, 1, 2, 2, (None, None))
        .ranking(103, 1, 3, 0, (None, None))
        .build()
}

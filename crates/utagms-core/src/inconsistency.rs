use crate::model::{
    AlternativeId, CategoryId, CriterionId, InconsistencyKind, InconsistencyRecord,
    PreferenceSign, ProjectSnapshot,
};
use crate::solver::{Comparison, InconsistencyReport, Intensity, Position};

/// Renders every item of every group as a sentence using display names.
/// Groups are numbered from 1 in report order.
#[must_use]
pub fn format_inconsistencies(
    category_id: CategoryId,
    report: &InconsistencyReport,
    snapshot: &ProjectSnapshot,
) -> Vec<InconsistencyRecord> {
    let names = Names(snapshot);
    let mut records = Vec::new();
    for (group, items) in (1u32..).zip(&report.groups) {
        let mut push = |kind: InconsistencyKind, data: String| {
            records.push(InconsistencyRecord {
                category_id,
                group,
                kind,
                data,
            });
        };
        for comparison in &items.comparisons {
            push(comparison.sign.into(), names.comparison(comparison));
        }
        for position in &items.positions {
            push(InconsistencyKind::Position, names.position(position));
        }
        for intensity in &items.intensities {
            push(InconsistencyKind::Intensity, names.intensity(intensity));
        }
    }
    records
}

struct Names<'a>(&'a ProjectSnapshot);

impl Names<'_> {
    fn alternative(&self, alternative_id: AlternativeId) -> String {
        self.0.alternative_name(alternative_id)
    }

    fn criteria(&self, criteria: &[CriterionId]) -> String {
        criteria
            .iter()
            .map(|criterion_id| self.0.criterion_name(*criterion_id))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn comparison(&self, comparison: &Comparison) -> String {
        let relation = match comparison.sign {
            PreferenceSign::Preference => "is preferred to",
            PreferenceSign::WeakPreference => "is weakly preferred to",
            PreferenceSign::Indifference => "is indifferent to",
        };
        format!(
            "{} {relation} {} (criteria: {})",
            self.alternative(comparison.alternative_1),
            self.alternative(comparison.alternative_2),
            self.criteria(&comparison.criteria)
        )
    }

    fn position(&self, position: &Position) -> String {
        format!(
            "{} must be ranked between positions {} and {}",
            self.alternative(position.alternative_id),
            position.best_position,
            position.worst_position
        )
    }

    fn intensity(&self, intensity: &Intensity) -> String {
        let relation = match intensity.sign {
            PreferenceSign::Preference => "is stronger than",
            PreferenceSign::WeakPreference => "is at least as strong as",
            PreferenceSign::Indifference => "is equal to",
        };
        format!(
            "preference of {} over {} {relation} preference of {} over {} (criteria: {})",
            self.alternative(intensity.alternative_1),
            self.alternative(intensity.alternative_2),
            self.alternative(intensity.alternative_3),
            self.alternative(intensity.alternative_4),
            self.criteria(&intensity.criteria)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::InconsistencyGroup;
    use crate::testing::standard_project;

    #[test]
    fn groups_are_one_indexed_and_use_display_names() {
        let snapshot = standard_project();
        let report = InconsistencyReport {
            groups: vec![
                InconsistencyGroup {
                    comparisons: vec![Comparison {
                        alternative_1: AlternativeId(1),
                        alternative_2: AlternativeId(2),
                        criteria: vec![CriterionId(10), CriterionId(11)],
                        sign: PreferenceSign::Preference,
                    }],
                    positions: vec![Position {
                        alternative_id: AlternativeId(2),
                        best_position: 1,
                        worst_position: 1,
                    }],
                    intensities: Vec::new(),
                },
                InconsistencyGroup {
                    comparisons: vec![Comparison {
                        alternative_1: AlternativeId(3),
                        alternative_2: AlternativeId(1),
                        criteria: vec![CriterionId(10)],
                        sign: PreferenceSign::Indifference,
                    }],
                    positions: Vec::new(),
                    intensities: vec![Intensity {
                        alternative_1: AlternativeId(1),
                        alternative_2: AlternativeId(2),
                        alternative_3: AlternativeId(3),
                        alternative_4: AlternativeId(42),
                        criteria: vec![CriterionId(11)],
                        sign: PreferenceSign::WeakPreference,
                    }],
                },
            ],
        };

        let records = format_inconsistencies(CategoryId(1), &report, &snapshot);
        let summary: Vec<_> = records
            .iter()
            .map(|row| (row.group, row.kind, row.data.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (
                    1,
                    InconsistencyKind::Preference,
                    "A is preferred to B (criteria: price, quality)"
                ),
                (
                    1,
                    InconsistencyKind::Position,
                    "B must be ranked between positions 1 and 1"
                ),
                (
                    2,
                    InconsistencyKind::Indifference,
                    "C is indifferent to A (criteria: price)"
                ),
                (
                    2,
                    InconsistencyKind::Intensity,
                    "preference of A over B is at least as strong as preference of C over alternative #42 (criteria: quality)"
                ),
            ]
        );
        assert!(records.iter().all(|row| row.category_id == CategoryId(1)));
    }

    #[test]
    fn empty_report_yields_no_records() {
        let snapshot = standard_project();
        let records =
            format_inconsistencies(CategoryId(1), &InconsistencyReport::default(), &snapshot);
        assert!(records.is_empty());
    }
}

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Transaction};
use serde::{Deserialize, Serialize};
use tracing::info;
use utagms_core::{AlternativeId, CategoryId, CriterionId, EngineError, PreferenceSign, ProjectId};

use crate::{bool_to_sql, SqliteDecisionStore};

/// Name of the root category created for documents that declare none.
pub const DEFAULT_ROOT_CATEGORY: &str = "General";

const DEFAULT_SAMPLES: u32 = 100;

fn default_true() -> bool {
    true
}

fn default_samples() -> u32 {
    DEFAULT_SAMPLES
}

/// A whole project described by names instead of database ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectDocument {
    pub name: String,
    #[serde(default)]
    pub pairwise_mode: bool,
    #[serde(default)]
    pub criteria: Vec<CriterionDocument>,
    #[serde(default)]
    pub alternatives: Vec<AlternativeDocument>,
    #[serde(default)]
    pub categories: Vec<CategoryDocument>,
    #[serde(default)]
    pub preference_intensities: Vec<IntensityDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CriterionDocument {
    pub name: String,
    pub gain: bool,
    #[serde(default)]
    pub linear_segments: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AlternativeDocument {
    pub name: String,
    /// Criterion name to value.
    #[serde(default)]
    pub performances: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CategoryDocument {
    pub name: String,
    /// Must name a category declared earlier in the document.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_samples")]
    pub samples: u32,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub rankings: Vec<RankingDocument>,
    #[serde(default)]
    pub pairwise_comparisons: Vec<ComparisonDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RankingDocument {
    pub alternative: String,
    #[serde(default)]
    pub reference_ranking: u32,
    #[serde(default)]
    pub best_position: Option<u32>,
    #[serde(default)]
    pub worst_position: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ComparisonDocument {
    pub alternative_1: String,
    pub alternative_2: String,
    #[serde(rename = "type")]
    pub kind: PreferenceSign,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IntensityDocument {
    pub alternatives: [String; 4],
    #[serde(default)]
    pub criterion: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: PreferenceSign,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportedProject {
    pub project_id: ProjectId,
    pub category_ids: BTreeMap<String, CategoryId>,
    pub criterion_ids: BTreeMap<String, CriterionId>,
    pub alternative_ids: BTreeMap<String, AlternativeId>,
}

impl ProjectDocument {
    /// # Errors
    /// Returns [`EngineError::Validation`] when the JSON cannot be decoded or
    /// the decoded document is invalid.
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        let document: Self = serde_json::from_str(raw)
            .map_err(|err| EngineError::Validation(format!("invalid project document: {err}")))?;
        document.validate()?;
        Ok(document)
    }

    /// Checks that every name reference resolves and that names are unique.
    ///
    /// # Errors
    /// Returns [`EngineError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(invalid("project name must not be empty"));
        }

        let criteria = unique_names("criterion", self.criteria.iter().map(|item| &item.name))?;
        let alternatives =
            unique_names("alternative", self.alternatives.iter().map(|item| &item.name))?;

        for alternative in &self.alternatives {
            for criterion in alternative.performances.keys() {
                require(&criteria, "criterion", criterion)?;
            }
        }

        let mut declared = BTreeSet::new();
        let mut roots = 0usize;
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(invalid("category name must not be empty"));
            }
            match &category.parent {
                Some(parent) if !declared.contains(parent.as_str()) => {
                    return Err(invalid(&format!(
                        "parent category {parent} of {} must be declared before it",
                        category.name
                    )));
                }
                Some(_) => {}
                None => roots += 1,
            }
            if !declared.insert(category.name.as_str()) {
                return Err(invalid(&format!("duplicate category name {}", category.name)));
            }
            for criterion in &category.criteria {
                require(&criteria, "criterion", criterion)?;
            }
            let mut ranked = BTreeSet::new();
            for ranking in &category.rankings {
                require(&alternatives, "alternative", &ranking.alternative)?;
                if !ranked.insert(ranking.alternative.as_str()) {
                    return Err(invalid(&format!(
                        "alternative {} is ranked twice in category {}",
                        ranking.alternative, category.name
                    )));
                }
                validate_bounds(ranking)?;
            }
            for comparison in &category.pairwise_comparisons {
                require(&alternatives, "alternative", &comparison.alternative_1)?;
                require(&alternatives, "alternative", &comparison.alternative_2)?;
            }
        }
        if !self.categories.is_empty() && roots != 1 {
            return Err(invalid(&format!(
                "project must have exactly one root category, found {roots}"
            )));
        }

        for intensity in &self.preference_intensities {
            for alternative in &intensity.alternatives {
                require(&alternatives, "alternative", alternative)?;
            }
            if intensity.criterion.is_none() && intensity.category.is_none() {
                return Err(invalid(
                    "preference intensity must be scoped to a criterion or a category",
                ));
            }
            if let Some(criterion) = &intensity.criterion {
                require(&criteria, "criterion", criterion)?;
            }
            if let Some(category) = &intensity.category {
                if !declared.contains(category.as_str()) {
                    return Err(invalid(&format!("unknown category {category}")));
                }
            }
        }

        Ok(())
    }

    /// Root category used when the document declares none: every criterion
    /// assigned and every alternative unplaced.
    fn default_root(&self) -> CategoryDocument {
        CategoryDocument {
            name: DEFAULT_ROOT_CATEGORY.to_string(),
            parent: None,
            active: true,
            samples: DEFAULT_SAMPLES,
            criteria: self.criteria.iter().map(|item| item.name.clone()).collect(),
            rankings: self
                .alternatives
                .iter()
                .map(|item| RankingDocument {
                    alternative: item.name.clone(),
                    reference_ranking: 0,
                    best_position: None,
                    worst_position: None,
                })
                .collect(),
            pairwise_comparisons: Vec::new(),
        }
    }
}

fn invalid(message: &str) -> EngineError {
    EngineError::Validation(message.to_string())
}

fn unique_names<'a>(
    kind: &str,
    names: impl Iterator<Item = &'a String>,
) -> Result<BTreeSet<&'a str>, EngineError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(invalid(&format!("{kind} name must not be empty")));
        }
        if !seen.insert(name.as_str()) {
            return Err(invalid(&format!("duplicate {kind} name {name}")));
        }
    }
    Ok(seen)
}

fn require(known: &BTreeSet<&str>, kind: &str, name: &str) -> Result<(), EngineError> {
    if known.contains(name) {
        Ok(())
    } else {
        Err(invalid(&format!("unknown {kind} {name}")))
    }
}

fn validate_bounds(ranking: &RankingDocument) -> Result<(), EngineError> {
    for bound in [ranking.best_position, ranking.worst_position].into_iter().flatten() {
        if bound == 0 {
            return Err(invalid(&format!(
                "position bounds of {} must be at least 1",
                ranking.alternative
            )));
        }
    }
    if let (Some(best), Some(worst)) = (ranking.best_position, ranking.worst_position) {
        if best > worst {
            return Err(invalid(&format!(
                "best position {best} of {} is after worst position {worst}",
                ranking.alternative
            )));
        }
    }
    Ok(())
}

fn lookup<T: Copy>(ids: &BTreeMap<String, T>, kind: &str, name: &str) -> Result<T> {
    ids.get(name)
        .copied()
        .ok_or_else(|| anyhow!("unknown {kind} {name}"))
}

impl SqliteDecisionStore {
    /// Imports a project document as a new project in one transaction. Every
    /// category of the imported project starts without results.
    pub fn import_project(&mut self, document: &ProjectDocument) -> Result<ImportedProject> {
        document
            .validate()
            .map_err(|err| anyhow!("project document rejected: {err}"))?;

        let default_root;
        let categories = if document.categories.is_empty() {
            default_root = [document.default_root()];
            &default_root[..]
        } else {
            &document.categories[..]
        };

        let tx = self
            .conn
            .transaction()
            .context("failed to start import transaction")?;

        tx.execute(
            "INSERT INTO projects(name, pairwise_mode) VALUES (?1, ?2)",
            params![document.name, bool_to_sql(document.pairwise_mode)],
        )
        .context("failed to insert project")?;
        let project_id = ProjectId(tx.last_insert_rowid());

        let criterion_ids = insert_criteria(&tx, project_id, &document.criteria)?;
        let alternative_ids =
            insert_alternatives(&tx, project_id, &document.alternatives, &criterion_ids)?;

        let mut category_ids = BTreeMap::new();
        for category in categories {
            let category_id =
                insert_category(&tx, project_id, category, &category_ids, &criterion_ids)?;
            insert_category_preferences(&tx, category_id, category, &alternative_ids)?;
            category_ids.insert(category.name.clone(), category_id);
        }

        for intensity in &document.preference_intensities {
            let mut alternatives = [0_i64; 4];
            for (slot, name) in alternatives.iter_mut().zip(&intensity.alternatives) {
                *slot = lookup(&alternative_ids, "alternative", name)?.0;
            }
            let criterion_id = intensity
                .criterion
                .as_deref()
                .map(|name| lookup(&criterion_ids, "criterion", name))
                .transpose()?;
            let category_id = intensity
                .category
                .as_deref()
                .map(|name| lookup(&category_ids, "category", name))
                .transpose()?;
            tx.execute(
                "INSERT INTO preference_intensities(
                    project_id, alternative_1, alternative_2, alternative_3, alternative_4,
                    criterion_id, category_id, type
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    project_id.0,
                    alternatives[0],
                    alternatives[1],
                    alternatives[2],
                    alternatives[3],
                    criterion_id.map(|id| id.0),
                    category_id.map(|id| id.0),
                    intensity.kind.as_str(),
                ],
            )
            .context("failed to insert preference intensity")?;
        }

        tx.execute(
            "UPDATE categories SET has_results = 0 WHERE project_id = ?1",
            params![project_id.0],
        )
        .context("failed to reset results flags")?;

        tx.commit().context("failed to commit import transaction")?;
        info!(
            project_id = %project_id,
            categories = category_ids.len(),
            criteria = criterion_ids.len(),
            alternatives = alternative_ids.len(),
            "project imported"
        );

        Ok(ImportedProject {
            project_id,
            category_ids,
            criterion_ids,
            alternative_ids,
        })
    }
}

fn insert_criteria(
    tx: &Transaction<'_>,
    project_id: ProjectId,
    criteria: &[CriterionDocument],
) -> Result<BTreeMap<String, CriterionId>> {
    let mut ids = BTreeMap::new();
    for criterion in criteria {
        tx.execute(
            "INSERT INTO criteria(project_id, name, gain, linear_segments) VALUES (?1, ?2, ?3, ?4)",
            params![
                project_id.0,
                criterion.name,
                bool_to_sql(criterion.gain),
                i64::from(criterion.linear_segments),
            ],
        )
        .with_context(|| format!("failed to insert criterion {}", criterion.name))?;
        ids.insert(criterion.name.clone(), CriterionId(tx.last_insert_rowid()));
    }
    Ok(ids)
}

fn insert_alternatives(
    tx: &Transaction<'_>,
    project_id: ProjectId,
    alternatives: &[AlternativeDocument],
    criterion_ids: &BTreeMap<String, CriterionId>,
) -> Result<BTreeMap<String, AlternativeId>> {
    let mut ids = BTreeMap::new();
    for alternative in alternatives {
        tx.execute(
            "INSERT INTO alternatives(project_id, name) VALUES (?1, ?2)",
            params![project_id.0, alternative.name],
        )
        .with_context(|| format!("failed to insert alternative {}", alternative.name))?;
        let alternative_id = AlternativeId(tx.last_insert_rowid());

        for (criterion, value) in &alternative.performances {
            let criterion_id = lookup(criterion_ids, "criterion", criterion)?;
            tx.execute(
                "INSERT INTO performances(alternative_id, criterion_id, value) VALUES (?1, ?2, ?3)",
                params![alternative_id.0, criterion_id.0, value],
            )
            .context("failed to insert performance")?;
        }
        ids.insert(alternative.name.clone(), alternative_id);
    }
    Ok(ids)
}

fn insert_category(
    tx: &Transaction<'_>,
    project_id: ProjectId,
    category: &CategoryDocument,
    category_ids: &BTreeMap<String, CategoryId>,
    criterion_ids: &BTreeMap<String, CriterionId>,
) -> Result<CategoryId> {
    let parent_id = category
        .parent
        .as_deref()
        .map(|name| lookup(category_ids, "category", name))
        .transpose()?;
    tx.execute(
        "INSERT INTO categories(project_id, name, parent_id, active, samples, has_results)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![
            project_id.0,
            category.name,
            parent_id.map(|id| id.0),
            bool_to_sql(category.active),
            i64::from(category.samples),
        ],
    )
    .with_context(|| format!("failed to insert category {}", category.name))?;
    let category_id = CategoryId(tx.last_insert_rowid());

    for criterion in &category.criteria {
        let criterion_id = lookup(criterion_ids, "criterion", criterion)?;
        tx.execute(
            "INSERT OR IGNORE INTO criterion_categories(category_id, criterion_id) VALUES (?1, ?2)",
            params![category_id.0, criterion_id.0],
        )
        .context("failed to assign criterion to category")?;
    }
    Ok(category_id)
}

fn insert_category_preferences(
    tx: &Transaction<'_>,
    category_id: CategoryId,
    category: &CategoryDocument,
    alternative_ids: &BTreeMap<String, AlternativeId>,
) -> Result<()> {
    for ranking in &category.rankings {
        let alternative_id = lookup(alternative_ids, "alternative", &ranking.alternative)?;
        tx.execute(
            "INSERT INTO rankings(category_id, alternative_id, reference_ranking, best_position, worst_position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                category_id.0,
                alternative_id.0,
                i64::from(ranking.reference_ranking),
                ranking.best_position.map(i64::from),
                ranking.worst_position.map(i64::from),
            ],
        )
        .context("failed to insert ranking")?;
    }

    for comparison in &category.pairwise_comparisons {
        tx.execute(
            "INSERT INTO pairwise_comparisons(category_id, alternative_1, alternative_2, type)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                category_id.0,
                lookup(alternative_ids, "alternative", &comparison.alternative_1)?.0,
                lookup(alternative_ids, "alternative", &comparison.alternative_2)?.0,
                comparison.kind.as_str(),
            ],
        )
        .context("failed to insert pairwise comparison")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err:#}"),
        }
    }

    fn store() -> SqliteDecisionStore {
        let store = must(SqliteDecisionStore::open(Path::new(":memory:")));
        must(store.migrate());
        store
    }

    fn parse(raw: &str) -> Result<ProjectDocument, EngineError> {
        ProjectDocument::from_json(raw)
    }

    #[test]
    fn document_without_categories_gets_general_root() {
        let mut store = store();
        let document = match parse(
            r#"{
                "name": "Flats",
                "criteria": [{"name": "area", "gain": true}, {"name": "rent", "gain": false}],
                "alternatives": [
                    {"name": "north", "performances": {"area": 50.0, "rent": 900.0}},
                    {"name": "south", "performances": {"area": 65.0, "rent": 1100.0}}
                ]
            }"#,
        ) {
            Ok(document) => document,
            Err(err) => panic!("document rejected: {err}"),
        };

        let report = must(store.import_project(&document));
        assert_eq!(report.category_ids.len(), 1);
        let root = match report.category_ids.get(DEFAULT_ROOT_CATEGORY) {
            Some(id) => *id,
            None => panic!("missing default root"),
        };

        let snapshot = match must(store.load_project(report.project_id)) {
            Some(snapshot) => snapshot,
            None => panic!("imported project missing"),
        };
        let category = &snapshot.categories[0];
        assert_eq!(category.id, root);
        assert_eq!(category.parent_id, None);
        assert_eq!(category.samples, 100);
        assert!(category.active);
        assert_eq!(snapshot.criterion_categories.len(), 2);
        assert_eq!(snapshot.rankings.len(), 2);
        assert!(snapshot.rankings.iter().all(|row| row.reference_ranking == 0));
    }

    #[test]
    fn validation_rejects_dangling_and_duplicate_names() {
        let cases = [
            (r#"{"name": ""}"#, "project name"),
            (
                r#"{"name": "p", "criteria": [{"name": "x", "gain": true}, {"name": "x", "gain": false}]}"#,
                "duplicate criterion",
            ),
            (
                r#"{"name": "p", "alternatives": [{"name": "a", "performances": {"zzz": 1.0}}]}"#,
                "unknown criterion zzz",
            ),
            (
                r#"{"name": "p", "categories": [{"name": "child", "parent": "root"}, {"name": "root"}]}"#,
                "must be declared before",
            ),
            (
                r#"{"name": "p", "categories": [{"name": "a"}, {"name": "b"}]}"#,
                "exactly one root",
            ),
            (
                r#"{"name": "p", "alternatives": [{"name": "a"}],
                    "categories": [{"name": "r", "rankings": [{"alternative": "a", "best_position": 3, "worst_position": 1}]}]}"#,
                "after worst position",
            ),
            (
                r#"{"name": "p", "alternatives": [{"name": "a"}],
                    "preference_intensities": [{"alternatives": ["a", "a", "a", "a"], "type": ">"}]}"#,
                "scoped",
            ),
            (r#"{"name": "p", "color": "teal"}"#, "unknown field"),
        ];

        for (raw, expected) in cases {
            match parse(raw) {
                Ok(_) => panic!("expected rejection for {raw}"),
                Err(err) => assert!(
                    err.to_string().contains(expected),
                    "error {err} does not mention {expected}"
                ),
            }
        }
    }

    #[test]
    fn intensities_and_comparisons_resolve_names() {
        let mut store = store();
        let document = match parse(
            r#"{
                "name": "Pairs",
                "pairwise_mode": true,
                "criteria": [{"name": "g", "gain": true}],
                "alternatives": [{"name": "a"}, {"name": "b"}, {"name": "c"}, {"name": "d"}],
                "categories": [{
                    "name": "root",
                    "criteria": ["g"],
                    "pairwise_comparisons": [{"alternative_1": "a", "alternative_2": "b", "type": ">="}]
                }],
                "preference_intensities": [
                    {"alternatives": ["a", "b", "c", "d"], "criterion": "g", "category": "root", "type": "="}
                ]
            }"#,
        ) {
            Ok(document) => document,
            Err(err) => panic!("document rejected: {err}"),
        };

        let report = must(store.import_project(&document));
        let snapshot = match must(store.load_project(report.project_id)) {
            Some(snapshot) => snapshot,
            None => panic!("imported project missing"),
        };
        assert!(snapshot.project.pairwise_mode);
        assert_eq!(snapshot.pairwise_comparisons.len(), 1);
        assert_eq!(snapshot.pairwise_comparisons[0].kind, PreferenceSign::WeakPreference);
        assert_eq!(
            snapshot.pairwise_comparisons[0].alternative_1,
            report.alternative_ids["a"]
        );

        let intensity = &snapshot.preference_intensities[0];
        assert_eq!(intensity.alternative_4, report.alternative_ids["d"]);
        assert_eq!(intensity.criterion_id, Some(report.criterion_ids["g"]));
        assert_eq!(intensity.category_id, Some(report.category_ids["root"]));
        assert_eq!(intensity.kind, PreferenceSign::Indifference);
    }
}

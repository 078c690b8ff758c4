#![allow(clippy::missing_errors_doc)]

mod import;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ulid::Ulid;
use utagms_core::{
    format_rfc3339, now_utc, parse_rfc3339_utc, AcceptabilityIndex, Alternative, AlternativeId,
    Category, CategoryId, CategoryResults, Criterion, CriterionCategory, CriterionId,
    DecisionStore, FunctionPoint, InconsistencyKind, InconsistencyRecord, JobId, JobRecord,
    JobStatus, PairwiseComparison, PairwiseWinning, Performance, PreferenceIntensity,
    PreferenceSign, Project, ProjectId, ProjectSnapshot, Ranking, RankingId, Relation,
    RelationKind,
};

pub use import::{
    AlternativeDocument, CategoryDocument, ComparisonDocument, CriterionDocument,
    ImportedProject, IntensityDocument, ProjectDocument, RankingDocument, DEFAULT_ROOT_CATEGORY,
};

const DECISION_MIGRATION_VERSION: i64 = 1;

const SCHEMA_DECISION_V1: &str = r"
CREATE TABLE IF NOT EXISTS projects (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  pairwise_mode INTEGER NOT NULL DEFAULT 0 CHECK (pairwise_mode IN (0, 1))
);

CREATE TABLE IF NOT EXISTS categories (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  parent_id INTEGER REFERENCES categories(id) ON DELETE CASCADE,
  active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1)),
  samples INTEGER NOT NULL DEFAULT 100 CHECK (samples >= 0),
  has_results INTEGER NOT NULL DEFAULT 0 CHECK (has_results IN (0, 1)),
  sampler_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_categories_project ON categories(project_id);
CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);

CREATE TABLE IF NOT EXISTS criteria (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  gain INTEGER NOT NULL CHECK (gain IN (0, 1)),
  linear_segments INTEGER NOT NULL DEFAULT 0 CHECK (linear_segments >= 0)
);

CREATE TABLE IF NOT EXISTS criterion_categories (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  criterion_id INTEGER NOT NULL REFERENCES criteria(id) ON DELETE CASCADE,
  UNIQUE (category_id, criterion_id)
);

CREATE TABLE IF NOT EXISTS alternatives (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS performances (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  alternative_id INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  criterion_id INTEGER NOT NULL REFERENCES criteria(id) ON DELETE CASCADE,
  value REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS pairwise_comparisons (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  alternative_1 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  alternative_2 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  type TEXT NOT NULL CHECK (type IN ('>', '>=', '='))
);

CREATE TABLE IF NOT EXISTS rankings (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  alternative_id INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  reference_ranking INTEGER NOT NULL DEFAULT 0 CHECK (reference_ranking >= 0),
  best_position INTEGER CHECK (best_position >= 1 OR best_position IS NULL),
  worst_position INTEGER CHECK (worst_position >= 1 OR worst_position IS NULL),
  ranking INTEGER NOT NULL DEFAULT 0,
  ranking_value REAL NOT NULL DEFAULT 0,
  extreme_pessimistic_worst INTEGER NOT NULL DEFAULT 0,
  extreme_pessimistic_best INTEGER NOT NULL DEFAULT 0,
  extreme_optimistic_worst INTEGER NOT NULL DEFAULT 0,
  extreme_optimistic_best INTEGER NOT NULL DEFAULT 0,
  UNIQUE (category_id, alternative_id)
);

CREATE TABLE IF NOT EXISTS preference_intensities (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  alternative_1 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  alternative_2 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  alternative_3 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  alternative_4 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  criterion_id INTEGER REFERENCES criteria(id) ON DELETE CASCADE,
  category_id INTEGER REFERENCES categories(id) ON DELETE CASCADE,
  type TEXT NOT NULL CHECK (type IN ('>', '>=', '='))
);

CREATE TABLE IF NOT EXISTS inconsistencies (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  group_number INTEGER NOT NULL CHECK (group_number >= 1),
  type TEXT NOT NULL CHECK (type IN ('>', '>=', '=', 'position', 'intensity')),
  data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS function_points (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  criterion_id INTEGER NOT NULL REFERENCES criteria(id) ON DELETE CASCADE,
  abscissa REAL NOT NULL,
  ordinate REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS acceptability_indices (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  alternative_id INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  position INTEGER NOT NULL CHECK (position >= 1),
  percent REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS pairwise_winnings (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  alternative_1 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  alternative_2 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  percent REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS relations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  alternative_1 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  alternative_2 INTEGER NOT NULL REFERENCES alternatives(id) ON DELETE CASCADE,
  type TEXT NOT NULL CHECK (type IN ('necessary', 'possible'))
);

CREATE TABLE IF NOT EXISTS jobs (
  job_id TEXT PRIMARY KEY,
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  job_group INTEGER NOT NULL CHECK (job_group >= 1),
  status TEXT NOT NULL CHECK (
    status IN ('queued', 'running', 'succeeded', 'inconsistent', 'failed')
  ),
  detail TEXT,
  created_at TEXT NOT NULL,
  finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_project_group ON jobs(project_id, job_group);
";

/// Tables holding rows regenerated on every successful run of a category.
const DERIVED_TABLES: [&str; 4] = [
    "acceptability_indices",
    "pairwise_winnings",
    "function_points",
    "relations",
];

pub struct SqliteDecisionStore {
    conn: Connection,
}

/// Persisted results of one category as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCategoryResults {
    pub category: Category,
    pub rankings: Vec<Ranking>,
    pub function_points: Vec<FunctionPoint>,
    pub acceptability_indices: Vec<AcceptabilityIndex>,
    pub pairwise_winnings: Vec<PairwiseWinning>,
    pub relations: Vec<Relation>,
    pub inconsistencies: Vec<InconsistencyRecord>,
}

impl SqliteDecisionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_DECISION_V1)
            .context("failed to apply decision schema")?;

        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![DECISION_MIGRATION_VERSION, now],
            )
            .context("failed to register decision schema migration")?;
        if inserted > 0 {
            info!(version = DECISION_MIGRATION_VERSION, "decision schema migrated");
        }

        Ok(())
    }

    pub fn project(&self, project_id: ProjectId) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, name, pairwise_mode FROM projects WHERE id = ?1",
                params![project_id.0],
                parse_project_row,
            )
            .optional()
            .context("failed to load project")
    }

    pub fn category(&self, category_id: CategoryId) -> Result<Option<Category>> {
        self.conn
            .query_row(
                "SELECT id, project_id, name, parent_id, active, samples, has_results, sampler_error
                 FROM categories WHERE id = ?1",
                params![category_id.0],
                parse_category_row,
            )
            .optional()
            .context("failed to load category")
    }

    pub fn project_categories(&self, project_id: ProjectId) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name, parent_id, active, samples, has_results, sampler_error
             FROM categories WHERE project_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![project_id.0], parse_category_row)?;
        collect_rows(rows)
    }

    /// Loads every entity of one project in id order.
    pub fn load_project(&self, project_id: ProjectId) -> Result<Option<ProjectSnapshot>> {
        let Some(project) = self.project(project_id)? else {
            return Ok(None);
        };
        let id = project_id.0;

        let categories = self.project_categories(project_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name, gain, linear_segments
             FROM criteria WHERE project_id = ?1 ORDER BY id ASC",
        )?;
        let criteria = collect_rows(stmt.query_map(params![id], parse_criterion_row)?)?;

        let mut stmt = self.conn.prepare(
            "SELECT cc.category_id, cc.criterion_id
             FROM criterion_categories cc
             JOIN categories c ON c.id = cc.category_id
             WHERE c.project_id = ?1
             ORDER BY cc.id ASC",
        )?;
        let criterion_categories = collect_rows(stmt.query_map(params![id], |row| {
            Ok(CriterionCategory {
                category_id: CategoryId(row.get(0)?),
                criterion_id: CriterionId(row.get(1)?),
            })
        })?)?;

        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name FROM alternatives WHERE project_id = ?1 ORDER BY id ASC",
        )?;
        let alternatives = collect_rows(stmt.query_map(params![id], |row| {
            Ok(Alternative {
                id: AlternativeId(row.get(0)?),
                project_id: ProjectId(row.get(1)?),
                name: row.get(2)?,
            })
        })?)?;

        let mut stmt = self.conn.prepare(
            "SELECT p.alternative_id, p.criterion_id, p.value
             FROM performances p
             JOIN alternatives a ON a.id = p.alternative_id
             WHERE a.project_id = ?1
             ORDER BY p.id ASC",
        )?;
        let performances = collect_rows(stmt.query_map(params![id], |row| {
            Ok(Performance {
                alternative_id: AlternativeId(row.get(0)?),
                criterion_id: CriterionId(row.get(1)?),
                value: row.get(2)?,
            })
        })?)?;

        let mut stmt = self.conn.prepare(
            "SELECT pc.id, pc.category_id, pc.alternative_1, pc.alternative_2, pc.type
             FROM pairwise_comparisons pc
             JOIN categories c ON c.id = pc.category_id
             WHERE c.project_id = ?1
             ORDER BY pc.id ASC",
        )?;
        let pairwise_comparisons =
            collect_rows(stmt.query_map(params![id], parse_comparison_row)?)?;

        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.category_id, r.alternative_id, r.reference_ranking,
                    r.best_position, r.worst_position, r.ranking, r.ranking_value,
                    r.extreme_pessimistic_worst, r.extreme_pessimistic_best,
                    r.extreme_optimistic_worst, r.extreme_optimistic_best
             FROM rankings r
             JOIN categories c ON c.id = r.category_id
             WHERE c.project_id = ?1
             ORDER BY r.id ASC",
        )?;
        let rankings = collect_rows(stmt.query_map(params![id], parse_ranking_row)?)?;

        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, alternative_1, alternative_2, alternative_3, alternative_4,
                    criterion_id, category_id, type
             FROM preference_intensities WHERE project_id = ?1 ORDER BY id ASC",
        )?;
        let preference_intensities =
            collect_rows(stmt.query_map(params![id], parse_intensity_row)?)?;

        Ok(Some(ProjectSnapshot {
            project,
            categories,
            criteria,
            criterion_categories,
            alternatives,
            performances,
            pairwise_comparisons,
            rankings,
            preference_intensities,
        }))
    }

    /// Reads back everything persisted for one category.
    pub fn category_results(&self, category_id: CategoryId) -> Result<Option<StoredCategoryResults>> {
        let Some(category) = self.category(category_id)? else {
            return Ok(None);
        };
        let id = category_id.0;

        let mut stmt = self.conn.prepare(
            "SELECT id, category_id, alternative_id, reference_ranking,
                    best_position, worst_position, ranking, ranking_value,
                    extreme_pessimistic_worst, extreme_pessimistic_best,
                    extreme_optimistic_worst, extreme_optimistic_best
             FROM rankings WHERE category_id = ?1
             ORDER BY CASE WHEN ranking = 0 THEN 1 ELSE 0 END, ranking ASC, alternative_id ASC",
        )?;
        let rankings = collect_rows(stmt.query_map(params![id], parse_ranking_row)?)?;

        let mut stmt = self.conn.prepare(
            "SELECT category_id, criterion_id, abscissa, ordinate
             FROM function_points WHERE category_id = ?1 ORDER BY id ASC",
        )?;
        let function_points = collect_rows(stmt.query_map(params![id], |row| {
            Ok(FunctionPoint {
                category_id: CategoryId(row.get(0)?),
                criterion_id: CriterionId(row.get(1)?),
                abscissa: row.get(2)?,
                ordinate: row.get(3)?,
            })
        })?)?;

        let mut stmt = self.conn.prepare(
            "SELECT category_id, alternative_id, position, percent
             FROM acceptability_indices WHERE category_id = ?1 ORDER BY id ASC",
        )?;
        let acceptability_indices = collect_rows(stmt.query_map(params![id], |row| {
            Ok(AcceptabilityIndex {
                category_id: CategoryId(row.get(0)?),
                alternative_id: AlternativeId(row.get(1)?),
                position: to_u32(2, row.get(2)?)?,
                percent: row.get(3)?,
            })
        })?)?;

        let mut stmt = self.conn.prepare(
            "SELECT category_id, alternative_1, alternative_2, percent
             FROM pairwise_winnings WHERE category_id = ?1 ORDER BY id ASC",
        )?;
        let pairwise_winnings = collect_rows(stmt.query_map(params![id], |row| {
            Ok(PairwiseWinning {
                category_id: CategoryId(row.get(0)?),
                alternative_1: AlternativeId(row.get(1)?),
                alternative_2: AlternativeId(row.get(2)?),
                percent: row.get(3)?,
            })
        })?)?;

        let mut stmt = self.conn.prepare(
            "SELECT category_id, alternative_1, alternative_2, type
             FROM relations WHERE category_id = ?1 ORDER BY id ASC",
        )?;
        let relations = collect_rows(stmt.query_map(params![id], parse_relation_row)?)?;

        let mut stmt = self.conn.prepare(
            "SELECT category_id, group_number, type, data
             FROM inconsistencies WHERE category_id = ?1 ORDER BY group_number ASC, id ASC",
        )?;
        let inconsistencies = collect_rows(stmt.query_map(params![id], parse_inconsistency_row)?)?;

        Ok(Some(StoredCategoryResults {
            category,
            rankings,
            function_points,
            acceptability_indices,
            pairwise_winnings,
            relations,
            inconsistencies,
        }))
    }

    /// Job group number for a new batch of runs of the project.
    pub fn next_job_group(&self, project_id: ProjectId) -> Result<u32> {
        let max: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(job_group), 0) FROM jobs WHERE project_id = ?1",
                params![project_id.0],
                |row| row.get(0),
            )
            .context("failed to read max job group")?;
        u32::try_from(max + 1).with_context(|| format!("invalid job group: {max}"))
    }

    pub fn create_job(
        &self,
        project_id: ProjectId,
        category_id: CategoryId,
        group: u32,
    ) -> Result<JobRecord> {
        let job = JobRecord {
            job_id: JobId::new(),
            project_id,
            category_id,
            group,
            status: JobStatus::Queued,
            detail: None,
            created_at: now_utc(),
            finished_at: None,
        };
        self.conn
            .execute(
                "INSERT INTO jobs(job_id, project_id, category_id, job_group, status, detail, created_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL)",
                params![
                    job.job_id.to_string(),
                    project_id.0,
                    category_id.0,
                    i64::from(group),
                    job.status.as_str(),
                    format_rfc3339(job.created_at).map_err(|err| anyhow!(err.to_string()))?,
                ],
            )
            .context("failed to insert job")?;
        debug!(job_id = %job.job_id, category_id = %category_id, group, "job queued");
        Ok(job)
    }

    pub fn update_job(&self, job_id: JobId, status: JobStatus, detail: Option<&str>) -> Result<()> {
        let finished_at = if status.is_finished() {
            Some(format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?)
        } else {
            None
        };
        let updated = self
            .conn
            .execute(
                "UPDATE jobs SET status = ?2, detail = ?3, finished_at = ?4 WHERE job_id = ?1",
                params![job_id.to_string(), status.as_str(), detail, finished_at],
            )
            .context("failed to update job")?;
        if updated == 0 {
            return Err(anyhow!("job {job_id} does not exist"));
        }
        Ok(())
    }

    pub fn list_jobs(&self, project_id: ProjectId) -> Result<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT job_id, project_id, category_id, job_group, status, detail, created_at, finished_at
             FROM jobs WHERE project_id = ?1
             ORDER BY job_group DESC, created_at ASC, job_id ASC",
        )?;
        let rows = stmt.query_map(params![project_id.0], parse_job_row)?;
        collect_rows(rows)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl DecisionStore for SqliteDecisionStore {
    fn load_snapshot_for_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Option<ProjectSnapshot>> {
        let project_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT project_id FROM categories WHERE id = ?1",
                params![category_id.0],
                |row| row.get(0),
            )
            .optional()
            .context("failed to resolve project of category")?;
        match project_id {
            Some(project_id) => self.load_project(ProjectId(project_id)),
            None => Ok(None),
        }
    }

    fn mark_categories_without_results(&mut self, category_ids: &[CategoryId]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start results flag transaction")?;
        for category_id in category_ids {
            tx.execute(
                "UPDATE categories SET has_results = 0 WHERE id = ?1",
                params![category_id.0],
            )
            .context("failed to clear has_results")?;
        }
        tx.commit()
            .context("failed to commit results flag transaction")?;
        Ok(())
    }

    fn clear_inconsistencies(&mut self, category_id: CategoryId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM inconsistencies WHERE category_id = ?1",
                params![category_id.0],
            )
            .context("failed to clear inconsistencies")?;
        Ok(())
    }

    fn record_inconsistencies(
        &mut self,
        category_id: CategoryId,
        records: &[InconsistencyRecord],
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start inconsistency transaction")?;

        tx.execute(
            "DELETE FROM inconsistencies WHERE category_id = ?1",
            params![category_id.0],
        )
        .context("failed to clear inconsistencies")?;
        for record in records {
            tx.execute(
                "INSERT INTO inconsistencies(category_id, group_number, type, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.category_id.0,
                    i64::from(record.group),
                    record.kind.as_str(),
                    record.data,
                ],
            )
            .context("failed to insert inconsistency")?;
        }
        set_category_flag(&tx, category_id, None, false)?;

        tx.commit()
            .context("failed to commit inconsistency transaction")?;
        debug!(category_id = %category_id, records = records.len(), "inconsistencies recorded");
        Ok(())
    }

    fn commit_results(&mut self, results: &CategoryResults) -> Result<()> {
        let category_id = results.category_id;
        let tx = self
            .conn
            .transaction()
            .context("failed to start results transaction")?;

        for table in DERIVED_TABLES {
            tx.execute(
                &format!("DELETE FROM {table} WHERE category_id = ?1"),
                params![category_id.0],
            )
            .with_context(|| format!("failed to clear {table}"))?;
        }
        tx.execute(
            "UPDATE rankings SET
               ranking = 0,
               ranking_value = 0,
               extreme_pessimistic_worst = 0,
               extreme_pessimistic_best = 0,
               extreme_optimistic_worst = 0,
               extreme_optimistic_best = 0
             WHERE category_id = ?1",
            params![category_id.0],
        )
        .context("failed to reset derived ranking fields")?;

        for row in &results.acceptability_indices {
            tx.execute(
                "INSERT INTO acceptability_indices(category_id, alternative_id, position, percent)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    row.category_id.0,
                    row.alternative_id.0,
                    i64::from(row.position),
                    row.percent,
                ],
            )
            .context("failed to insert acceptability index")?;
        }

        for row in &results.pairwise_winnings {
            tx.execute(
                "INSERT INTO pairwise_winnings(category_id, alternative_1, alternative_2, percent)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    row.category_id.0,
                    row.alternative_1.0,
                    row.alternative_2.0,
                    row.percent,
                ],
            )
            .context("failed to insert pairwise winning")?;
        }

        for row in &results.function_points {
            tx.execute(
                "INSERT INTO function_points(category_id, criterion_id, abscissa, ordinate)
                 VALUES (?1, ?2, ?3, ?4)",
                params![row.category_id.0, row.criterion_id.0, row.abscissa, row.ordinate],
            )
            .context("failed to insert function point")?;
        }

        for row in &results.relations {
            tx.execute(
                "INSERT INTO relations(category_id, alternative_1, alternative_2, type)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    row.category_id.0,
                    row.alternative_1.0,
                    row.alternative_2.0,
                    row.kind.as_str(),
                ],
            )
            .context("failed to insert relation")?;
        }

        for assignment in &results.rankings {
            let extreme = results.extreme_ranks.get(&assignment.alternative_id);
            tx.execute(
                "INSERT INTO rankings(
                    category_id, alternative_id, ranking, ranking_value,
                    extreme_pessimistic_worst, extreme_pessimistic_best,
                    extreme_optimistic_worst, extreme_optimistic_best
                 ) VALUES (?1, ?2, ?3, ?4, COALESCE(?5, 0), COALESCE(?6, 0), COALESCE(?7, 0), COALESCE(?8, 0))
                 ON CONFLICT(category_id, alternative_id) DO UPDATE SET
                   ranking = excluded.ranking,
                   ranking_value = excluded.ranking_value,
                   extreme_pessimistic_worst = COALESCE(?5, 0),
                   extreme_pessimistic_best = COALESCE(?6, 0),
                   extreme_optimistic_worst = COALESCE(?7, 0),
                   extreme_optimistic_best = COALESCE(?8, 0)",
                params![
                    category_id.0,
                    assignment.alternative_id.0,
                    i64::from(assignment.ranking),
                    assignment.ranking_value,
                    extreme.map(|ranks| i64::from(ranks.pessimistic_worst)),
                    extreme.map(|ranks| i64::from(ranks.pessimistic_best)),
                    extreme.map(|ranks| i64::from(ranks.optimistic_worst)),
                    extreme.map(|ranks| i64::from(ranks.optimistic_best)),
                ],
            )
            .context("failed to upsert ranking")?;
        }

        set_category_flag(&tx, category_id, Some(results.sampler_error.as_deref()), true)?;

        tx.commit().context("failed to commit results transaction")?;
        debug!(
            category_id = %category_id,
            rankings = results.rankings.len(),
            function_points = results.function_points.len(),
            relations = results.relations.len(),
            "results committed"
        );
        Ok(())
    }
}

/// Updates `has_results` and, when `sampler_error` is given, the stored
/// sampler error of a category.
fn set_category_flag(
    tx: &Transaction<'_>,
    category_id: CategoryId,
    sampler_error: Option<Option<&str>>,
    has_results: bool,
) -> Result<()> {
    let updated = match sampler_error {
        Some(message) => tx.execute(
            "UPDATE categories SET sampler_error = ?2, has_results = ?3 WHERE id = ?1",
            params![category_id.0, message, bool_to_sql(has_results)],
        ),
        None => tx.execute(
            "UPDATE categories SET has_results = ?2 WHERE id = ?1",
            params![category_id.0, bool_to_sql(has_results)],
        ),
    }
    .context("failed to update category flags")?;
    if updated == 0 {
        return Err(anyhow!("category {category_id} does not exist"));
    }
    Ok(())
}

fn parse_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: ProjectId(row.get(0)?),
        name: row.get(1)?,
        pairwise_mode: row.get::<_, i64>(2)? != 0,
    })
}

fn parse_category_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: CategoryId(row.get(0)?),
        project_id: ProjectId(row.get(1)?),
        name: row.get(2)?,
        parent_id: row.get::<_, Option<i64>>(3)?.map(CategoryId),
        active: row.get::<_, i64>(4)? != 0,
        samples: to_u32(5, row.get(5)?)?,
        has_results: row.get::<_, i64>(6)? != 0,
        sampler_error: row.get(7)?,
    })
}

fn parse_criterion_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Criterion> {
    Ok(Criterion {
        id: CriterionId(row.get(0)?),
        project_id: ProjectId(row.get(1)?),
        name: row.get(2)?,
        gain: row.get::<_, i64>(3)? != 0,
        linear_segments: to_u32(4, row.get(4)?)?,
    })
}

fn parse_comparison_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PairwiseComparison> {
    Ok(PairwiseComparison {
        id: row.get(0)?,
        category_id: CategoryId(row.get(1)?),
        alternative_1: AlternativeId(row.get(2)?),
        alternative_2: AlternativeId(row.get(3)?),
        kind: parse_sign(4, &row.get::<_, String>(4)?)?,
    })
}

fn parse_ranking_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ranking> {
    Ok(Ranking {
        id: RankingId(row.get(0)?),
        category_id: CategoryId(row.get(1)?),
        alternative_id: AlternativeId(row.get(2)?),
        reference_ranking: to_u32(3, row.get(3)?)?,
        best_position: row
            .get::<_, Option<i64>>(4)?
            .map(|value| to_u32(4, value))
            .transpose()?,
        worst_position: row
            .get::<_, Option<i64>>(5)?
            .map(|value| to_u32(5, value))
            .transpose()?,
        ranking: to_u32(6, row.get(6)?)?,
        ranking_value: row.get(7)?,
        extreme_pessimistic_worst: to_u32(8, row.get(8)?)?,
        extreme_pessimistic_best: to_u32(9, row.get(9)?)?,
        extreme_optimistic_worst: to_u32(10, row.get(10)?)?,
        extreme_optimistic_best: to_u32(11, row.get(11)?)?,
    })
}

fn parse_intensity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PreferenceIntensity> {
    Ok(PreferenceIntensity {
        id: row.get(0)?,
        project_id: ProjectId(row.get(1)?),
        alternative_1: AlternativeId(row.get(2)?),
        alternative_2: AlternativeId(row.get(3)?),
        alternative_3: AlternativeId(row.get(4)?),
        alternative_4: AlternativeId(row.get(5)?),
        criterion_id: row.get::<_, Option<i64>>(6)?.map(CriterionId),
        category_id: row.get::<_, Option<i64>>(7)?.map(CategoryId),
        kind: parse_sign(8, &row.get::<_, String>(8)?)?,
    })
}

fn parse_relation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Relation> {
    let raw: String = row.get(3)?;
    let kind = RelationKind::parse(&raw)
        .ok_or_else(|| invalid_data(3, rusqlite::types::Type::Text, format!("invalid relation type: {raw}")))?;
    Ok(Relation {
        category_id: CategoryId(row.get(0)?),
        alternative_1: AlternativeId(row.get(1)?),
        alternative_2: AlternativeId(row.get(2)?),
        kind,
    })
}

fn parse_inconsistency_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InconsistencyRecord> {
    let raw: String = row.get(2)?;
    let kind = InconsistencyKind::parse(&raw).ok_or_else(|| {
        invalid_data(2, rusqlite::types::Type::Text, format!("invalid inconsistency type: {raw}"))
    })?;
    Ok(InconsistencyRecord {
        category_id: CategoryId(row.get(0)?),
        group: to_u32(1, row.get(1)?)?,
        kind,
        data: row.get(3)?,
    })
}

fn parse_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let job_id_raw: String = row.get(0)?;
    let job_id = Ulid::from_string(&job_id_raw).map_err(|_| {
        invalid_data(0, rusqlite::types::Type::Text, format!("invalid ULID: {job_id_raw}"))
    })?;
    let status_raw: String = row.get(4)?;
    let status = JobStatus::parse(&status_raw).ok_or_else(|| {
        invalid_data(4, rusqlite::types::Type::Text, format!("invalid job status: {status_raw}"))
    })?;
    let finished_at = row
        .get::<_, Option<String>>(7)?
        .map(|raw| parse_rfc3339_utc(&raw).map_err(to_sql_error))
        .transpose()?;

    Ok(JobRecord {
        job_id: JobId(job_id),
        project_id: ProjectId(row.get(1)?),
        category_id: CategoryId(row.get(2)?),
        group: to_u32(3, row.get(3)?)?,
        status,
        detail: row.get(5)?,
        created_at: parse_rfc3339_utc(&row.get::<_, String>(6)?).map_err(to_sql_error)?,
        finished_at,
    })
}

fn parse_sign(column: usize, raw: &str) -> rusqlite::Result<PreferenceSign> {
    PreferenceSign::parse(raw).ok_or_else(|| {
        invalid_data(column, rusqlite::types::Type::Text, format!("invalid preference type: {raw}"))
    })
}

fn to_u32(column: usize, value: i64) -> rusqlite::Result<u32> {
    u32::try_from(value).map_err(|_| {
        invalid_data(
            column,
            rusqlite::types::Type::Integer,
            format!("value out of range: {value}"),
        )
    })
}

fn invalid_data(column: usize, ty: rusqlite::types::Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        ty,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

#[allow(clippy::needless_pass_by_value)]
fn to_sql_error(err: utagms_core::EngineError) -> rusqlite::Error {
    invalid_data(0, rusqlite::types::Type::Text, err.to_string())
}

fn bool_to_sql(value: bool) -> i64 {
    i64::from(value)
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

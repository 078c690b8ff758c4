//! `utagms` command surface.
//!
//! Every command prints one JSON document on stdout carrying a
//! `contract_version`. Failures are reported by [`error_envelope`] and logs go
//! to stderr, so stdout stays machine readable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utagms_core::{
    format_rfc3339, prepare_problem, CategoryId, CategoryResultsRunner, DecisionStore,
    EngineError, JobRecord, JobStatus, ProjectId, RunOutcome, RunnerConfig, Solver,
    SolverRequest,
};
use utagms_solver_http::{FixtureSolver, HttpJsonSolver, HttpSolverConfig};
use utagms_store_sqlite::{ImportedProject, ProjectDocument, SqliteDecisionStore, StoredCategoryResults};

pub const LOG_ENV: &str = "UTAGMS_LOG";

#[derive(Debug, Parser)]
#[command(name = "utagms")]
#[command(about = "UTA-GMS category results pipeline")]
pub struct Cli {
    #[arg(long, default_value = "./utagms.sqlite3")]
    db: PathBuf,

    /// JSON file describing the HTTP solver endpoint.
    #[arg(long, global = true, conflicts_with = "solver_fixture")]
    solver_config: Option<PathBuf>,

    /// JSON file with a recorded solver outcome to replay.
    #[arg(long, global = true)]
    solver_fixture: Option<PathBuf>,

    /// Message stored as the sampler error of categories with sampling disabled.
    #[arg(long, global = true)]
    sampler_off_message: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    Category {
        #[command(subcommand)]
        command: CategoryCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Import a project document as a new project.
    Import(ImportArgs),
    /// Compute results for every active category of a project.
    Run(ProjectArgs),
    /// List recorded runs of a project, newest group first.
    Jobs(ProjectArgs),
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    /// Compute and persist results for one category.
    Run(CategoryArgs),
    /// Print the solver request a run would send, without running.
    Request(CategoryArgs),
    /// Print the persisted results of a category.
    Show(CategoryArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Args)]
pub struct ProjectArgs {
    #[arg(long)]
    project_id: i64,
}

#[derive(Debug, Args)]
pub struct CategoryArgs {
    #[arg(long)]
    category_id: i64,
}

#[derive(Debug, Serialize)]
struct ImportPayload {
    contract_version: &'static str,
    #[serde(flatten)]
    imported: ImportedProject,
}

#[derive(Debug, Serialize)]
struct CategoryRunPayload {
    contract_version: &'static str,
    solver: &'static str,
    result: RunOutcome,
}

#[derive(Debug, Serialize)]
struct CategoryRequestPayload {
    contract_version: &'static str,
    category_id: CategoryId,
    categories: Vec<CategoryId>,
    request: SolverRequest,
}

#[derive(Debug, Serialize)]
struct CategoryResultsPayload {
    contract_version: &'static str,
    #[serde(flatten)]
    results: StoredCategoryResults,
}

#[derive(Debug, Serialize)]
struct ProjectRunPayload {
    contract_version: &'static str,
    project_id: ProjectId,
    job_group: u32,
    jobs: Vec<JobView>,
}

#[derive(Debug, Serialize)]
struct ProjectJobsPayload {
    contract_version: &'static str,
    project_id: ProjectId,
    jobs: Vec<JobView>,
}

#[derive(Debug, Serialize)]
struct JobView {
    job_id: String,
    category_id: CategoryId,
    group: u32,
    status: JobStatus,
    detail: Option<String>,
    created_at: String,
    finished_at: Option<String>,
}

impl JobView {
    fn from_record(job: &JobRecord) -> Result<Self> {
        Ok(Self {
            job_id: job.job_id.to_string(),
            category_id: job.category_id,
            group: job.group,
            status: job.status,
            detail: job.detail.clone(),
            created_at: format_rfc3339(job.created_at)?,
            finished_at: job.finished_at.map(format_rfc3339).transpose()?,
        })
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    contract_version: &'static str,
    code: &'a str,
    message: String,
}

/// Installs the stderr log subscriber filtered by `UTAGMS_LOG` (default `warn`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if installed.is_err() {
        warn!("tracing subscriber already installed");
    }
}

/// Renders a failure as the JSON error document printed on stderr.
#[must_use]
pub fn error_envelope(err: &anyhow::Error) -> String {
    let code = err
        .downcast_ref::<EngineError>()
        .map_or("cli.failure", EngineError::code);
    let envelope = ErrorEnvelope {
        contract_version: "error.v1",
        code,
        message: format!("{err:#}"),
    };
    serde_json::to_string(&envelope)
        .unwrap_or_else(|_| format!("{{\"code\":\"{code}\",\"message\":\"unrenderable error\"}}"))
}

/// Process exit status for a failed command: 2 when the input was at fault,
/// 1 for every other failure.
#[must_use]
pub fn failure_exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<EngineError>() {
        Some(engine) if engine.is_user_facing() => 2,
        _ => 1,
    }
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when the store cannot be opened, the solver is
/// misconfigured, or the requested command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let mut store = SqliteDecisionStore::open(&cli.db)?;
    store.migrate()?;
    let config = runner_config(cli.sampler_off_message.clone());
    let solvers = SolverOptions {
        config: cli.solver_config,
        fixture: cli.solver_fixture,
    };

    match cli.command {
        Command::Project { command } => run_project(command, &mut store, &solvers, &config),
        Command::Category { command } => run_category(command, &mut store, &solvers, &config),
    }
}

fn runner_config(sampler_off_message: Option<String>) -> RunnerConfig {
    match sampler_off_message {
        Some(message) => RunnerConfig {
            sampler_off_message: message,
        },
        None => RunnerConfig::default(),
    }
}

struct SolverOptions {
    config: Option<PathBuf>,
    fixture: Option<PathBuf>,
}

impl SolverOptions {
    fn build(&self) -> Result<Box<dyn Solver>> {
        match (&self.config, &self.fixture) {
            (Some(path), _) => {
                let config = HttpSolverConfig::from_path(path)?;
                info!(url = %config.url, timeout_ms = config.timeout_ms, "using http solver");
                Ok(Box::new(HttpJsonSolver::new(config)))
            }
            (None, Some(path)) => {
                info!(fixture = %path.display(), "using fixture solver");
                Ok(Box::new(FixtureSolver::from_path(path)?))
            }
            (None, None) => Err(EngineError::Configuration(
                "a solver is required: pass --solver-config or --solver-fixture".to_string(),
            )
            .into()),
        }
    }
}

fn run_project(
    command: ProjectCommand,
    store: &mut SqliteDecisionStore,
    solvers: &SolverOptions,
    config: &RunnerConfig,
) -> Result<()> {
    match command {
        ProjectCommand::Import(args) => {
            let document = read_document(&args.file)?;
            let imported = store.import_project(&document)?;
            print_json(&ImportPayload {
                contract_version: "project_import.v1",
                imported,
            })
        }
        ProjectCommand::Run(args) => {
            let project_id = ProjectId(args.project_id);
            let solver = solvers.build()?;
            let payload = run_project_categories(store, solver.as_ref(), config, project_id)?;
            print_json(&payload)
        }
        ProjectCommand::Jobs(args) => {
            let project_id = existing_project(store, args.project_id)?;
            let jobs = store
                .list_jobs(project_id)?
                .iter()
                .map(JobView::from_record)
                .collect::<Result<Vec<_>>>()?;
            print_json(&ProjectJobsPayload {
                contract_version: "project_jobs.v1",
                project_id,
                jobs,
            })
        }
    }
}

fn run_category(
    command: CategoryCommand,
    store: &mut SqliteDecisionStore,
    solvers: &SolverOptions,
    config: &RunnerConfig,
) -> Result<()> {
    match command {
        CategoryCommand::Run(args) => {
            let category_id = CategoryId(args.category_id);
            let solver = solvers.build()?;
            let result = CategoryResultsRunner::new(store, solver.as_ref())
                .with_config(config.clone())
                .run(category_id)?;
            print_json(&CategoryRunPayload {
                contract_version: "category_run.v1",
                solver: solver.solver_name(),
                result,
            })
        }
        CategoryCommand::Request(args) => {
            let category_id = CategoryId(args.category_id);
            let snapshot = store
                .load_snapshot_for_category(category_id)?
                .ok_or(EngineError::CategoryNotFound(category_id))?;
            let prepared = prepare_problem(&snapshot, category_id)?;
            print_json(&CategoryRequestPayload {
                contract_version: "solver_request.v1",
                category_id,
                categories: prepared.categories.into_iter().collect(),
                request: prepared.request,
            })
        }
        CategoryCommand::Show(args) => {
            let category_id = CategoryId(args.category_id);
            let results = store
                .category_results(category_id)?
                .ok_or(EngineError::CategoryNotFound(category_id))?;
            print_json(&CategoryResultsPayload {
                contract_version: "category_results.v1",
                results,
            })
        }
    }
}

/// Runs every active category of the project as one job group. A failing
/// category is recorded on its job and does not stop the others.
fn run_project_categories(
    store: &mut SqliteDecisionStore,
    solver: &dyn Solver,
    config: &RunnerConfig,
    project_id: ProjectId,
) -> Result<ProjectRunPayload> {
    let project_id = existing_project(store, project_id.0)?;
    let categories: Vec<CategoryId> = store
        .project_categories(project_id)?
        .into_iter()
        .filter(|category| category.active)
        .map(|category| category.id)
        .collect();

    let job_group = store.next_job_group(project_id)?;
    let queued = categories
        .iter()
        .map(|category_id| store.create_job(project_id, *category_id, job_group))
        .collect::<Result<Vec<_>>>()?;
    info!(project_id = %project_id, job_group, jobs = queued.len(), "project run queued");

    for job in &queued {
        store.update_job(job.job_id, JobStatus::Running, None)?;
        let outcome = CategoryResultsRunner::new(store, solver)
            .with_config(config.clone())
            .run(job.category_id);
        let (status, detail) = match outcome {
            Ok(RunOutcome::Computed(summary)) => (JobStatus::Succeeded, summary.sampler_error),
            Ok(RunOutcome::Inconsistent(summary)) => (
                JobStatus::Inconsistent,
                Some(format!(
                    "{} inconsistencies in {} groups",
                    summary.inconsistencies, summary.groups
                )),
            ),
            Err(err) => {
                warn!(category_id = %job.category_id, code = err.code(), "category run failed");
                (JobStatus::Failed, Some(format!("{}: {err:#}", err.code())))
            }
        };
        store.update_job(job.job_id, status, detail.as_deref())?;
    }

    let jobs = store
        .list_jobs(project_id)?
        .iter()
        .filter(|job| job.group == job_group)
        .map(JobView::from_record)
        .collect::<Result<Vec<_>>>()?;
    Ok(ProjectRunPayload {
        contract_version: "project_run.v1",
        project_id,
        job_group,
        jobs,
    })
}

fn existing_project(store: &SqliteDecisionStore, raw: i64) -> Result<ProjectId> {
    let project_id = ProjectId(raw);
    match store.project(project_id)? {
        Some(project) => Ok(project.id),
        None => Err(EngineError::Validation(format!("project {project_id} not found")).into()),
    }
}

fn read_document(path: &Path) -> Result<ProjectDocument> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read project document {}", path.display()))?;
    Ok(ProjectDocument::from_json(&raw)?)
}

fn print_json<T: Serialize>(payload: &T) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(payload).map_err(|err| anyhow!("failed to render output: {err}"))?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    #[test]
    fn solver_flags_are_mutually_exclusive() {
        let parsed = Cli::try_parse_from([
            "utagms",
            "--solver-config",
            "solver.json",
            "--solver-fixture",
            "fixture.json",
            "category",
            "run",
            "--category-id",
            "1",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn runs_without_solver_report_configuration_error() {
        let options = SolverOptions {
            config: None,
            fixture: None,
        };
        let Err(err) = options.build() else {
            panic!("expected missing solver error");
        };
        assert!(error_envelope(&err).contains("\"code\":\"configuration.invalid\""));
    }

    #[test]
    fn error_envelope_uses_engine_codes_through_context() {
        let err = anyhow::Error::from(EngineError::CategoryNotFound(CategoryId(7)))
            .context("category run failed");
        let value: serde_json::Value = must(serde_json::from_str(&error_envelope(&err)));
        assert_eq!(value["code"], "category.not_found");
        assert_eq!(value["contract_version"], "error.v1");
        assert!(must(value["message"].as_str().ok_or("message missing")).contains("category 7"));

        let plain = anyhow!("disk full");
        let value: serde_json::Value = must(serde_json::from_str(&error_envelope(&plain)));
        assert_eq!(value["code"], "cli.failure");
    }

    #[test]
    fn user_input_failures_exit_with_two() {
        let missing = anyhow::Error::from(EngineError::CategoryNotFound(CategoryId(7)))
            .context("category show failed");
        assert_eq!(failure_exit_code(&missing), 2);

        let config = anyhow::Error::from(EngineError::Configuration("no solver".to_string()));
        assert_eq!(failure_exit_code(&config), 1);
        assert_eq!(failure_exit_code(&anyhow!("disk full")), 1);
    }

    #[test]
    fn sampler_off_message_flag_overrides_default() {
        assert_eq!(runner_config(None), RunnerConfig::default());
        assert_eq!(
            runner_config(Some("sampling disabled".to_string())).sampler_off_message,
            "sampling disabled"
        );
    }
}

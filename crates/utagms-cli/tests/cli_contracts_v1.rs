#![allow(clippy::single_match_else, clippy::uninlined_format_args)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use jsonschema::JSONSchema;
use rusqlite::Connection;
use serde_json::Value;
use ulid::Ulid;

fn repo_root() -> PathBuf {
    match Path::new(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize() {
        Ok(path) => path,
        Err(err) => panic!("failed to canonicalize repo root: {err}"),
    }
}

fn fixture(relative: &str) -> PathBuf {
    repo_root().join("fixtures").join(relative)
}

fn temp_db(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("utagms-{label}-{}.sqlite3", Ulid::new()))
}

fn utagms_output(db_path: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_utagms"));
    command.arg("--db").arg(db_path);
    for arg in args {
        command.arg(arg);
    }
    match command.output() {
        Ok(output) => output,
        Err(err) => panic!("failed to run utagms {:?}: {err}", args),
    }
}

fn stdout_json(output: &Output) -> Value {
    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(value) => value,
        Err(err) => panic!(
            "failed to parse stdout as JSON: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

/// Last stderr line holds the error envelope; earlier lines may be logs.
fn stderr_envelope(output: &Output) -> Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let Some(line) = stderr.lines().rev().find(|line| !line.trim().is_empty()) else {
        panic!("stderr is empty");
    };
    match serde_json::from_str::<Value>(line) {
        Ok(value) => value,
        Err(err) => panic!("failed to parse error envelope: {err}\nstderr={stderr}"),
    }
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed\nstdout={}\nstderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_schema(schema_name: &str, value: &Value) {
    let path = repo_root().join("contracts/cli/v1").join(schema_name);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) => panic!("failed to read {}: {err}", path.display()),
    };
    let schema: Value = match serde_json::from_str(&raw) {
        Ok(schema) => schema,
        Err(err) => panic!("failed to parse {}: {err}", path.display()),
    };
    let compiled = match JSONSchema::compile(&schema) {
        Ok(compiled) => compiled,
        Err(err) => panic!("failed to compile {}: {err}", path.display()),
    };
    if let Err(errors) = compiled.validate(value) {
        let messages: Vec<String> = errors.map(|err| err.to_string()).collect();
        panic!("{} validation failed:\n{}", schema_name, messages.join("\n"));
    };
}

fn import(db_path: &Path, document: &str) -> Value {
    let file = fixture(document);
    let output = utagms_output(
        db_path,
        &["project", "import", "--file", &file.to_string_lossy()],
    );
    assert_success(&output);
    stdout_json(&output)
}

fn category_id(imported: &Value, name: &str) -> String {
    match imported["category_ids"][name].as_i64() {
        Some(id) => id.to_string(),
        None => panic!("category {name} missing from {imported}"),
    }
}

#[test]
fn help_lists_project_and_category_commands() {
    let output = match Command::new(env!("CARGO_BIN_EXE_utagms"))
        .arg("--help")
        .output()
    {
        Ok(value) => value,
        Err(err) => panic!("failed to run help command: {err}"),
    };
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for required in ["project", "category", "--db", "--solver-config", "--solver-fixture"] {
        assert!(stdout.contains(required), "help is missing {required}");
    }
}

#[test]
fn imported_project_starts_without_results() {
    let db_path = temp_db("import");
    let imported = import(&db_path, "projects/cars.json");
    assert_eq!(imported["contract_version"], "project_import.v1");
    assert_eq!(imported["category_ids"].as_object().map(serde_json::Map::len), Some(3));

    let general = category_id(&imported, "General");
    let output = utagms_output(&db_path, &["category", "show", "--category-id", &general]);
    assert_success(&output);
    let results = stdout_json(&output);
    assert_schema("category-results.schema.json", &results);
    assert_eq!(results["category"]["has_results"], false);
    assert_eq!(results["category"]["samples"], 100);
    assert_eq!(results["rankings"].as_array().map(Vec::len), Some(3));
    assert_eq!(results["function_points"].as_array().map(Vec::len), Some(0));
}

#[test]
fn category_run_commits_fixture_solution() {
    let db_path = temp_db("category-run");
    let imported = import(&db_path, "projects/cars.json");
    let general = category_id(&imported, "General");
    let solved = fixture("solver/solved.json");

    let output = utagms_output(
        &db_path,
        &[
            "--solver-fixture",
            &solved.to_string_lossy(),
            "category",
            "run",
            "--category-id",
            &general,
        ],
    );
    assert_success(&output);
    let run = stdout_json(&output);
    assert_eq!(run["contract_version"], "category_run.v1");
    assert_eq!(run["solver"], "fixture");
    assert_eq!(run["result"]["outcome"], "computed");
    assert_eq!(run["result"]["ranked_alternatives"], 3);
    assert_eq!(run["result"]["function_points"], 5);
    assert_eq!(run["result"]["relations"], 5);
    assert_eq!(run["result"]["samples_used"], 100);

    let output = utagms_output(&db_path, &["category", "show", "--category-id", &general]);
    assert_success(&output);
    let results = stdout_json(&output);
    assert_schema("category-results.schema.json", &results);
    assert_eq!(results["category"]["has_results"], true);
    assert_eq!(results["category"]["sampler_error"], Value::Null);

    let order: Vec<(i64, i64)> = match results["rankings"].as_array() {
        Some(rows) => rows
            .iter()
            .map(|row| {
                (
                    row["alternative_id"].as_i64().unwrap_or_default(),
                    row["ranking"].as_i64().unwrap_or_default(),
                )
            })
            .collect(),
        None => panic!("rankings missing"),
    };
    assert_eq!(order, vec![(1, 1), (3, 2), (2, 3)]);
    assert_eq!(results["acceptability_indices"].as_array().map(Vec::len), Some(9));
    assert_eq!(results["pairwise_winnings"].as_array().map(Vec::len), Some(6));
}

#[test]
fn inconsistent_run_records_sentences_and_clears_flag() {
    let db_path = temp_db("inconsistent");
    let imported = import(&db_path, "projects/cars.json");
    let general = category_id(&imported, "General");
    let inconsistent = fixture("solver/inconsistent.json");

    let output = utagms_output(
        &db_path,
        &[
            "--solver-fixture",
            &inconsistent.to_string_lossy(),
            "category",
            "run",
            "--category-id",
            &general,
        ],
    );
    assert_success(&output);
    let run = stdout_json(&output);
    assert_eq!(run["result"]["outcome"], "inconsistent");
    assert_eq!(run["result"]["groups"], 1);
    assert_eq!(run["result"]["inconsistencies"], 2);

    let output = utagms_output(&db_path, &["category", "show", "--category-id", &general]);
    assert_success(&output);
    let results = stdout_json(&output);
    assert_schema("category-results.schema.json", &results);
    assert_eq!(results["category"]["has_results"], false);
    assert_eq!(
        results["inconsistencies"][0]["data"],
        "B is preferred to A (criteria: price, comfort)"
    );
    assert_eq!(
        results["inconsistencies"][1]["data"],
        "C must be ranked between positions 2 and 2"
    );
}

#[test]
fn empty_criteria_fails_and_keeps_flags_cleared() {
    let db_path = temp_db("empty-criteria");
    let imported = import(&db_path, "projects/no-criteria.json");
    let general = category_id(&imported, "General");
    let solved = fixture("solver/solved.json");

    let output = utagms_output(
        &db_path,
        &[
            "--solver-fixture",
            &solved.to_string_lossy(),
            "category",
            "run",
            "--category-id",
            &general,
        ],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let envelope = stderr_envelope(&output);
    assert_schema("error-envelope.schema.json", &envelope);
    assert_eq!(envelope["code"], "category.empty_criteria");

    let conn = match Connection::open(&db_path) {
        Ok(conn) => conn,
        Err(err) => panic!("failed to open db: {err}"),
    };
    let flagged: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM categories WHERE has_results = 1",
        [],
        |row| row.get(0),
    ) {
        Ok(count) => count,
        Err(err) => panic!("failed to count categories: {err}"),
    };
    assert_eq!(flagged, 0);
}

#[test]
fn unknown_category_reports_not_found() {
    let db_path = temp_db("unknown-category");
    let output = utagms_output(&db_path, &["category", "show", "--category-id", "999"]);
    assert_eq!(output.status.code(), Some(2));
    let envelope = stderr_envelope(&output);
    assert_schema("error-envelope.schema.json", &envelope);
    assert_eq!(envelope["code"], "category.not_found");
}

#[test]
fn run_without_solver_is_a_configuration_error() {
    let db_path = temp_db("no-solver");
    let imported = import(&db_path, "projects/cars.json");
    let general = category_id(&imported, "General");

    let output = utagms_output(&db_path, &["category", "run", "--category-id", &general]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stderr_envelope(&output)["code"], "configuration.invalid");
}

#[test]
fn project_run_groups_jobs_of_active_categories() {
    let db_path = temp_db("project-run");
    let imported = import(&db_path, "projects/cars.json");
    let project_id = match imported["project_id"].as_i64() {
        Some(id) => id.to_string(),
        None => panic!("project_id missing"),
    };
    let solved = fixture("solver/solved.json");
    let solved = solved.to_string_lossy();

    let first = utagms_output(
        &db_path,
        &["--solver-fixture", &solved, "project", "run", "--project-id", &project_id],
    );
    assert_success(&first);
    let first = stdout_json(&first);
    assert_eq!(first["contract_version"], "project_run.v1");
    assert_eq!(first["job_group"], 1);
    let jobs = match first["jobs"].as_array() {
        Some(jobs) => jobs.clone(),
        None => panic!("jobs missing"),
    };
    assert_eq!(jobs.len(), 2, "inactive Archive category must be skipped");
    assert!(jobs.iter().all(|job| job["status"] == "succeeded"));
    assert!(jobs.iter().all(|job| job["finished_at"].is_string()));
    let comfort = category_id(&imported, "Comfort");
    let comfort_job = jobs
        .iter()
        .find(|job| job["category_id"].to_string() == comfort);
    match comfort_job {
        Some(job) => assert_eq!(job["detail"], "Sampler turned off"),
        None => panic!("no job for Comfort"),
    }

    let second = utagms_output(
        &db_path,
        &["--solver-fixture", &solved, "project", "run", "--project-id", &project_id],
    );
    assert_success(&second);
    assert_eq!(stdout_json(&second)["job_group"], 2);

    let listed = utagms_output(&db_path, &["project", "jobs", "--project-id", &project_id]);
    assert_success(&listed);
    let listed = stdout_json(&listed);
    assert_eq!(listed["contract_version"], "project_jobs.v1");
    let groups: Vec<i64> = match listed["jobs"].as_array() {
        Some(jobs) => jobs
            .iter()
            .map(|job| job["group"].as_i64().unwrap_or_default())
            .collect(),
        None => panic!("jobs missing"),
    };
    assert_eq!(groups, vec![2, 2, 1, 1]);
}

#[test]
fn request_command_prints_solver_contract() {
    let db_path = temp_db("request");
    let imported = import(&db_path, "projects/cars.json");
    let general = category_id(&imported, "General");

    let output = utagms_output(&db_path, &["category", "request", "--category-id", &general]);
    assert_success(&output);
    let payload = stdout_json(&output);
    assert_eq!(payload["contract_version"], "solver_request.v1");
    assert_eq!(payload["categories"].as_array().map(Vec::len), Some(2));

    let schema_path = repo_root().join("contracts/solver/v1/solver-request.schema.json");
    let raw = match fs::read_to_string(&schema_path) {
        Ok(raw) => raw,
        Err(err) => panic!("failed to read solver schema: {err}"),
    };
    let schema: Value = match serde_json::from_str(&raw) {
        Ok(schema) => schema,
        Err(err) => panic!("failed to parse solver schema: {err}"),
    };
    let compiled = match JSONSchema::compile(&schema) {
        Ok(compiled) => compiled,
        Err(err) => panic!("failed to compile solver schema: {err}"),
    };
    assert!(compiled.is_valid(&payload["request"]));

    let request = &payload["request"];
    assert_eq!(request["sampler"]["enabled"], true);
    assert_eq!(request["sampler"]["number_of_samples"], 100);
    assert_eq!(request["criteria"].as_array().map(Vec::len), Some(2));
    // A (1) above B (2); C has no reference rank but a best position.
    assert_eq!(request["comparisons"].as_array().map(Vec::len), Some(1));
    assert_eq!(request["positions"].as_array().map(Vec::len), Some(1));
}

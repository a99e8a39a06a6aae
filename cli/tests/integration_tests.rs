use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn dbshell(db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dbshell"))
        .arg("--db")
        .arg(db)
        .args(args)
        .output()
        .expect("failed to run dbshell")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "dbshell failed\nstdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Creates `cereals.db` in `dir` with three rows.
fn seeded_db(dir: &TempDir) -> PathBuf {
    let db = dir.path().join("cereals.db");
    assert_success(&dbshell(
        &db,
        &[
            "add-table",
            "cereals",
            "id INTEGER PRIMARY KEY",
            "name TEXT NOT NULL",
            "brand TEXT",
        ],
    ));
    assert_success(&dbshell(
        &db,
        &[
            "insert",
            "cereals",
            "-c",
            "name",
            "brand",
            "-v",
            "Sugar Berries",
            "Super Health",
            "Shreddy Bois",
            "Dr. Wheat",
            "Bran Flakes",
            "NULL",
        ],
    ));
    db
}

fn names_as_json(db: &Path, extra: &[&str]) -> Vec<String> {
    let mut args = vec!["--format", "json", "select", "cereals", "-o", "id"];
    args.extend_from_slice(extra);
    let output = dbshell(db, &args);
    assert_success(&output);
    let rows: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    rows.as_array()
        .expect("rows should be an array")
        .iter()
        .map(|row| row["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Data commands
// ---------------------------------------------------------------------------

#[test]
fn select_prints_json_rows() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let output = dbshell(&db, &["--format", "json", "select", "cereals", "-o", "id"]);
    assert_success(&output);
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[0]["brand"], "Super Health");
    assert!(rows[2]["brand"].is_null());
}

#[test]
fn select_grid_shows_headers_and_cells() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let output = dbshell(&db, &["select", "cereals", "-c", "name", "-w", "brand = 'Dr. Wheat'"]);
    assert_success(&output);
    let out = stdout(&output);
    assert!(out.contains("| name"), "{out}");
    assert!(out.contains("Shreddy Bois"), "{out}");
    assert!(!out.contains("Sugar Berries"), "{out}");
    assert!(out.contains("1 rows from cereals"), "{out}");
}

#[test]
fn insert_rejects_values_that_do_not_fill_rows() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let output = dbshell(&db, &["insert", "cereals", "-c", "name", "brand", "-v", "Lonely"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("do not divide"), "{}", stderr(&output));
    assert_eq!(names_as_json(&db, &[]).len(), 3);
}

#[test]
fn update_requires_where_or_all() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let output = dbshell(&db, &["update", "cereals", "brand", "Big Gravy"]);
    assert!(!output.status.success());

    let output = dbshell(
        &db,
        &["update", "cereals", "brand", "Big Gravy", "-w", "name = 'Bran Flakes'"],
    );
    assert_success(&output);
    assert!(stdout(&output).contains("Updated 1 rows"));

    let output = dbshell(&db, &["update", "cereals", "brand", "Store Brand", "--all"]);
    assert_success(&output);
    assert!(stdout(&output).contains("Updated 3 rows"));
}

#[test]
fn delete_with_filter_keeps_other_rows() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    assert!(!dbshell(&db, &["delete", "cereals"]).status.success());

    let output = dbshell(&db, &["delete", "cereals", "-w", "brand IS NULL"]);
    assert_success(&output);
    assert!(stdout(&output).contains("Deleted 1 rows"));
    assert_eq!(
        names_as_json(&db, &[]),
        vec!["Sugar Berries".to_string(), "Shreddy Bois".to_string()]
    );
}

#[test]
fn query_binds_parameters() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let output = dbshell(
        &db,
        &[
            "--format",
            "json",
            "query",
            "SELECT name FROM cereals WHERE id > ? ORDER BY id",
            "-p",
            "1",
        ],
    );
    assert_success(&output);
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
    assert_eq!(rows[0]["name"], "Shreddy Bois");
}

#[test]
fn failing_query_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let output = dbshell(&db, &["query", "SELEC name FROM cereals"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.starts_with("error: "), "{err}");
    assert!(err.contains("syntax error"), "{err}");
}

// ---------------------------------------------------------------------------
// Schema commands
// ---------------------------------------------------------------------------

#[test]
fn tables_and_describe_list_the_schema() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let output = dbshell(&db, &["tables"]);
    assert_success(&output);
    assert!(stdout(&output).contains("cereals"));

    let output = dbshell(&db, &["--format", "json", "describe", "cereals"]);
    assert_success(&output);
    let columns: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = columns
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["id", "name", "brand"]);
    assert_eq!(columns[0]["primary_key"], 1);
    assert_eq!(columns[1]["not_null"], 1);
}

#[test]
fn rename_table_then_count() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    assert_success(&dbshell(&db, &["rename-table", "cereals", "breakfast"]));

    let output = dbshell(&db, &["--format", "json", "count", "breakfast", "-c", "brand", "-d"]);
    assert_success(&output);
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["count"], 2);
}

#[test]
fn oversized_timeout_is_rejected() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cereals.db");

    let output = dbshell(&db, &["--timeout", "3000000", "tables"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.starts_with("error: "), "{err}");
    assert!(err.contains("timeout"), "{err}");
    assert!(!err.contains("panicked"), "{err}");
}

#[test]
fn missing_database_path_is_an_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_dbshell"))
        .arg("tables")
        .output()
        .expect("failed to run dbshell");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("No database given"));
}

// ---------------------------------------------------------------------------
// File commands
// ---------------------------------------------------------------------------

#[test]
fn dump_writes_schema_and_data_files() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let out_dir = dir.path().join("dumps");

    let output = dbshell(&db, &["dump", "-o", out_dir.to_str().unwrap()]);
    assert_success(&output);

    let mut files: Vec<String> = fs::read_dir(&out_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files.len(), 2, "{files:?}");
    assert!(files[0].starts_with("cereals_data_") && files[0].ends_with(".sql"));
    assert!(files[1].starts_with("cereals_schema_") && files[1].ends_with(".sql"));

    let schema = fs::read_to_string(out_dir.join(&files[1])).unwrap();
    assert!(schema.contains("CREATE TABLE"), "{schema}");
    let data = fs::read_to_string(out_dir.join(&files[0])).unwrap();
    assert!(data.contains("INSERT INTO"), "{data}");
    assert!(data.contains("'Dr. Wheat'"), "{data}");
}

#[test]
fn backup_and_restore_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    assert_success(&dbshell(&db, &["backup"]));
    let backup = dir.path().join("cereals_backup.db");
    assert!(backup.is_file());

    assert_success(&dbshell(&db, &["delete", "cereals", "--all"]));
    assert!(names_as_json(&db, &[]).is_empty());

    assert_success(&dbshell(&db, &["restore", backup.to_str().unwrap()]));
    assert_eq!(names_as_json(&db, &[]).len(), 3);
}

#[test]
fn log_file_records_writes_and_can_be_flushed() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let log = dir.path().join("cerealsdb.log");

    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("created table"), "{contents}");
    assert!(contents.contains("inserted rows"), "{contents}");

    assert_success(&dbshell(&db, &["flush-log"]));
    assert_eq!(fs::metadata(&log).unwrap().len(), 0);
}

#[test]
fn log_dir_moves_the_log_file() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cereals.db");
    let logs = dir.path().join("logs");

    let output = dbshell(
        &db,
        &["--log-dir", logs.to_str().unwrap(), "add-table", "t", "id INTEGER"],
    );
    assert_success(&output);
    assert!(logs.join("cerealsdb.log").is_file());
    assert!(!dir.path().join("cerealsdb.log").exists());
}

#[test]
fn properties_prints_yaml() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cereals.db");

    let output = dbshell(&db, &["--no-foreign-keys", "properties"]);
    assert_success(&output);
    let out = stdout(&output);
    assert!(out.contains("enforce_foreign_keys: false"), "{out}");
    assert!(out.contains("max_variables: 900"), "{out}");
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

fn run_shell(db: &Path, input: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_dbshell"))
        .arg("--db")
        .arg(db)
        .arg("shell")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start shell");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().expect("shell did not finish")
}

#[test]
fn shell_continues_after_errors() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cereals.db");

    let output = run_shell(
        &db,
        "select missing_table\n\
         add-table t \"id INTEGER PRIMARY KEY\" \"name TEXT\"\n\
         insert t -c name -v Alice\n\
         SELECT name FROM t\n\
         quit\n",
    );
    assert_success(&output);
    assert!(stderr(&output).contains("error: "), "{}", stderr(&output));
    assert!(stdout(&output).contains("Alice"), "{}", stdout(&output));
}

#[test]
fn shell_commits_between_commands() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    let output = run_shell(
        &db,
        "update cereals brand \"Big Gravy\" -w \"name = 'Bran Flakes'\"\n\
         exit\n",
    );
    assert_success(&output);

    let output = dbshell(&db, &["--format", "json", "select", "cereals", "-w", "brand = 'Big Gravy'"]);
    assert_success(&output);
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["name"], "Bran Flakes");
}

#[test]
fn shell_ends_at_end_of_input() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cereals.db");

    let output = run_shell(&db, "tables\n");
    assert_success(&output);
}

#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;

fn conductor(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("conductor").unwrap();
    cmd.current_dir(dir.path())
        .env("CONDUCTOR_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn engine_dir(dir: &TempDir) -> PathBuf {
    let engine = dir.path().join("maa");
    std::fs::create_dir_all(engine.join("config")).unwrap();
    engine
}

fn init_project(dir: &TempDir) {
    let engine = engine_dir(dir);
    conductor(dir)
        .args(["init", "--engine"])
        .arg(&engine)
        .assert()
        .success();
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// ---------------------------------------------------------------------------
// conductor init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config() {
    let dir = TempDir::new().unwrap();
    conductor(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .conductor/config.yaml"));

    assert!(dir.path().join(".conductor/config.yaml").exists());
    assert!(dir.path().join(".conductor/backups").is_dir());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    conductor(&dir).arg("init").assert().success();
    conductor(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));
}

// ---------------------------------------------------------------------------
// conductor config
// ---------------------------------------------------------------------------

#[test]
fn config_requires_init() {
    let dir = TempDir::new().unwrap();
    conductor(&dir)
        .args(["config", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn config_check_flags_missing_engine_path() {
    let dir = TempDir::new().unwrap();
    conductor(&dir).arg("init").assert().success();
    conductor(&dir)
        .args(["config", "check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("engine.path is not set"));
}

#[test]
fn config_check_passes_after_init_with_engine() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_show_json_includes_defaults() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let output = conductor(&dir)
        .args(["config", "show", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let config = stdout_json(&output);
    assert_eq!(config["retry"]["max_attempts"], 4);
    assert!(config["profiles"]["daily"].is_object());
}

#[test]
fn config_profiles_lists_starter_profile() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("daily"))
        .stdout(predicate::str::contains("Fight"));
}

// ---------------------------------------------------------------------------
// conductor build
// ---------------------------------------------------------------------------

#[test]
fn build_infers_fight_from_params() {
    let dir = TempDir::new().unwrap();
    let output = conductor(&dir)
        .args(["build", "-p", "stage=1-7", "-p", "medicine_count=20", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let built = stdout_json(&output);
    let tasks: Vec<&str> = built["config"]["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(tasks.contains(&"StartUp"));
    assert!(tasks.contains(&"Fight"));

    let fight = built["task_queue"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["TaskType"] == "Fight")
        .unwrap();
    assert_eq!(fight["IsEnable"], true);
    assert_eq!(fight["UseMedicine"], true);
    assert_eq!(fight["MedicineCount"], 20);
}

#[test]
fn build_rejects_unknown_task() {
    let dir = TempDir::new().unwrap();
    conductor(&dir)
        .args(["build", "--task", "nap"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown task 'nap'"));
}

#[test]
fn build_rejects_malformed_param() {
    let dir = TempDir::new().unwrap();
    conductor(&dir)
        .args(["build", "--param", "stage"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

#[test]
fn build_profile_prints_queue_table() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .args(["build", "--profile", "daily"])
        .assert()
        .success()
        .stdout(predicate::str::contains("刷理智"))
        .stdout(predicate::str::contains("ENABLED"));
}

#[test]
fn build_unknown_profile_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .args(["build", "--profile", "weekly"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("profile not found: weekly"));
}

// ---------------------------------------------------------------------------
// conductor run
// ---------------------------------------------------------------------------

#[test]
fn run_without_engine_binary_fails_and_restores_config() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let gui = dir.path().join("maa/config/gui.json");
    std::fs::write(&gui, r#"{"Current":"Default"}"#).unwrap();

    conductor(&dir)
        .args(["run", "--task", "fight", "--address", "127.0.0.1:5555"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("engine spawn"));

    assert_eq!(
        std::fs::read_to_string(&gui).unwrap(),
        r#"{"Current":"Default"}"#
    );
    assert!(!dir.path().join("maa/config/gui.new.json").exists());
}

#[test]
fn run_rejects_unknown_emulator() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .args(["run", "--profile", "daily", "--emulator", "mumu"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown emulator 'mumu'"));
}

#[test]
fn run_profile_conflicts_with_inline_tasks() {
    let dir = TempDir::new().unwrap();
    conductor(&dir)
        .args(["run", "--profile", "daily", "--task", "fight"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// conductor schedule
// ---------------------------------------------------------------------------

#[test]
fn schedule_list_reports_empty() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .args(["schedule", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No schedules configured."));
}

#[test]
fn schedule_list_shows_entries() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let path = dir.path().join(".conductor/config.yaml");
    let mut yaml = std::fs::read_to_string(&path).unwrap();
    yaml.push_str(
        "schedules:\n  - name: morning\n    profile: daily\n    time: \"04:05\"\n    days: [mon, fri]\n",
    );
    std::fs::write(&path, yaml).unwrap();

    conductor(&dir)
        .args(["schedule", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("morning"))
        .stdout(predicate::str::contains("04:05"))
        .stdout(predicate::str::contains("Mon,Fri"));
}

#[test]
fn schedule_loop_requires_entries() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    conductor(&dir)
        .arg("schedule")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no schedules configured"));
}

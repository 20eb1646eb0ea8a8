use std::path::Path;
use std::process::{Command, Output};

use git2::{Repository, RepositoryInitOptions, Signature, Time};

const AS_OF: &str = "2024-06-01T00:00:00Z";
const T0: i64 = 1_714_550_400; // 2024-05-01T08:00:00Z

fn repopulse(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_repopulse"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

/// A `main` branch where alice writes `lib.rs` over several days.
fn seeded_repo(dir: &Path) {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(dir, &opts).unwrap();

    let mut parent = None;
    for day in 0..5i64 {
        let content = format!("pub fn v{day}() {{}}\n").repeat(day as usize + 1);
        let blob = repo.blob(content.as_bytes()).unwrap();
        let parent_commit = parent.map(|oid| repo.find_commit(oid).unwrap());
        let base = parent_commit.as_ref().map(|c| c.tree().unwrap());
        let mut builder = repo.treebuilder(base.as_ref()).unwrap();
        builder.insert("lib.rs", blob, 0o100_644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();

        let signature = Signature::new("alice", "alice@example.com", &Time::new(T0 + day * 86_400, 0)).unwrap();
        let parents: Vec<_> = parent_commit.iter().collect();
        parent = Some(
            repo.commit(Some("refs/heads/main"), &signature, &signature, "work", &tree, &parents)
                .unwrap(),
        );
    }
}

fn json_stdout(output: &Output) -> serde_json::Value {
    assert!(output.status.success(), "repopulse failed: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn metrics_lists_every_analyzer() {
    let dir = tempfile::tempdir().unwrap();
    let list = json_stdout(&repopulse(dir.path(), &["metrics", "--format", "json"]));

    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["metric"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 8);
    assert_eq!(names[0], "bus_factor");
    assert!(names.contains(&"cycle_time"));
}

#[test]
fn bus_factor_of_a_single_author_repository() {
    let dir = tempfile::tempdir().unwrap();
    seeded_repo(dir.path());

    let report = json_stdout(&repopulse(
        dir.path(),
        &["analyze", "bus_factor", "--format", "json", "--as-of", AS_OF],
    ));
    assert_eq!(report["metric"], "bus_factor");
    assert_eq!(report["status"], "complete");
    assert_eq!(report["result"]["bus_factor"], 1);
    assert_eq!(report["result"]["total_contributors"], 1);
    assert!(!report["recommendations"].as_array().unwrap().is_empty());
}

#[test]
fn analyze_all_reports_every_metric() {
    let dir = tempfile::tempdir().unwrap();
    seeded_repo(dir.path());

    let reports = json_stdout(&repopulse(
        dir.path(),
        &["analyze", "all", "--format", "json", "--as-of", AS_OF],
    ));
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 8);

    // no feature branches exist
    let flow = reports.iter().find(|r| r["metric"] == "flow_efficiency").unwrap();
    assert_eq!(flow["status"], "no_data");
    assert_eq!(flow["result"]["error"], "No suitable branches found for analysis");
}

#[test]
fn analyze_all_applies_plain_params_where_accepted() {
    let dir = tempfile::tempdir().unwrap();
    seeded_repo(dir.path());

    let reports = json_stdout(&repopulse(
        dir.path(),
        &[
            "analyze",
            "all",
            "--format",
            "json",
            "--as-of",
            AS_OF,
            "--param",
            "lookback_months=2",
            "--param",
            "weeks_lookback=6",
        ],
    ));
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 8);
    let velocity = reports.iter().find(|r| r["metric"] == "velocity_trend").unwrap();
    assert_eq!(velocity["result"]["weeks_analyzed"], 6);

    let output = repopulse(
        dir.path(),
        &["analyze", "all", "--as-of", AS_OF, "--param", "lookback_weeks=6"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("lookback_weeks"));
}

#[test]
fn config_params_are_overridden_by_flags() {
    let dir = tempfile::tempdir().unwrap();
    seeded_repo(dir.path());
    std::fs::write(
        dir.path().join(".repopulse.toml"),
        "[metrics.bus_factor]\nknowledge_threshold = 0.5\nlookback_months = 3\n",
    )
    .unwrap();

    let from_config = json_stdout(&repopulse(
        dir.path(),
        &["analyze", "bus_factor", "--format", "json", "--as-of", AS_OF],
    ));
    assert_eq!(from_config["result"]["knowledge_threshold"], 0.5);

    let from_flag = json_stdout(&repopulse(
        dir.path(),
        &[
            "analyze",
            "bus_factor",
            "--format",
            "json",
            "--as-of",
            AS_OF,
            "--param",
            "knowledge_threshold=0.7",
        ],
    ));
    assert_eq!(from_flag["result"]["knowledge_threshold"], 0.7);
}

#[test]
fn markdown_output_has_headings() {
    let dir = tempfile::tempdir().unwrap();
    seeded_repo(dir.path());

    let output = repopulse(
        dir.path(),
        &["analyze", "critical_files", "--format", "markdown", "--as-of", AS_OF],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("## Critical File Identification"));
    assert!(stdout.contains("| Field | Value |"));
}

#[test]
fn unknown_metric_fails() {
    let dir = tempfile::tempdir().unwrap();
    seeded_repo(dir.path());

    let output = repopulse(dir.path(), &["analyze", "not_a_real_metric"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown metric"));
}

#[test]
fn unknown_parameter_fails() {
    let dir = tempfile::tempdir().unwrap();
    seeded_repo(dir.path());

    let output = repopulse(
        dir.path(),
        &["analyze", "velocity_trend", "--param", "weeks=4"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("weeks"));
}

#[test]
fn missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    seeded_repo(dir.path());

    let output = repopulse(dir.path(), &["--config", "missing.toml", "analyze", "bus_factor"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("file not found") && stderr.contains("missing.toml"), "{stderr}");
}

#[test]
fn outside_a_repository_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = repopulse(dir.path(), &["analyze", "bus_factor", "--path", "."]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Not a git repository"));
}

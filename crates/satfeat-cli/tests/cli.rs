use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const POINTS: &str = "id,lon,lat\n1,36.80,-1.30\n2,36.81,-1.29\n3,36.95,-1.10\n4,37.20,-0.90\n";

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    fs::write(dir.join("points.csv"), POINTS).unwrap();
    let path = dir.join("run.toml");
    fs::write(
        &path,
        format!(
            r#"
bands = ["B04", "B08"]
region = "KEN"
points = "points.csv"
start_year = 2019
end_year = 2019
start_month = 3
end_month = 5
num_features = 16
output_dir = "{}"
{extra}
"#,
            dir.join("out").display()
        ),
    )
    .unwrap();
    path
}

fn fixture(extra: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), extra);
    (dir, config)
}

fn satfeat() -> Command {
    Command::cargo_bin("satfeat").unwrap()
}

#[test]
fn validate_accepts_a_complete_config() {
    let (_dir, config) = fixture("");
    satfeat()
        .args(["validate", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config OK: 4 points, 3 period(s)"));
}

#[test]
fn validate_rejects_odd_feature_count() {
    let (_dir, config) = fixture("");
    let text = fs::read_to_string(&config)
        .unwrap()
        .replace("num_features = 16", "num_features = 7");
    fs::write(&config, text).unwrap();
    satfeat()
        .args(["validate", config.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("positive even number"));
}

#[test]
fn run_rejects_invalid_config_before_touching_the_catalog() {
    // An unroutable catalog: reaching it would hang or fail differently.
    let (dir, config) = fixture("catalog_url = \"http://127.0.0.1:9\"\nbatch_size = 0");
    satfeat()
        .args(["run", config.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size"));
    assert!(!dir.path().join("out").join("batch_manifest.json").exists());
}

#[test]
fn periods_lists_output_names() {
    let (_dir, config) = fixture("");
    satfeat()
        .args(["periods", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("2019-03-01/2019-03-31"))
        .stdout(predicate::str::contains(
            "s2_4-8_KEN_0k-points_16-features_2019_05.parquet",
        ));
}

#[test]
fn periods_as_json() {
    let (_dir, config) = fixture("");
    let output = satfeat()
        .args(["periods", config.to_str().unwrap(), "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1]["period"], "2019-04");
}

#[test]
fn partition_summary_reports_balanced_sizes() {
    let (_dir, config) = fixture("");
    satfeat()
        .args(["partition", config.to_str().unwrap(), "--partitions", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 points in 2 partition(s), sizes 2..=2"));
}

#[test]
fn unknown_points_format_is_reported() {
    let (dir, config) = fixture("");
    fs::rename(dir.path().join("points.csv"), dir.path().join("points.txt")).unwrap();
    let text = fs::read_to_string(&config)
        .unwrap()
        .replace("points.csv", "points.txt");
    fs::write(&config, text).unwrap();
    satfeat()
        .args(["validate", config.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported points extension"));
}

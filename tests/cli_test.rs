//! CLI integration tests
//!
//! Tests for the command-line interface using assert_cmd.
//!
//! These tests verify:
//! - Help and version flags
//! - Configuration validation
//! - Dry run mode
//! - Error handling for invalid configuration

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// Get a command for the rsolr-exporter binary
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("rsolr-exporter").expect("Failed to find rsolr-exporter binary")
}

/// Helper to create a temporary config file with given content
fn create_temp_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file.flush().expect("Failed to flush");
    file
}

/// Test --help flag displays usage information
#[test]
fn test_help_flag() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--base-url"))
        .stdout(predicate::str::contains("--zk-host"));
}

/// Test --version flag displays version
#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

/// Test that a valid configuration is accepted via --validate flag
#[test]
fn test_validate_valid_config() {
    let config = r#"
solr:
  base_url: "http://localhost:8983/solr"
  timeout_ms: 5000

server:
  port: 19090
  path: /metrics

categories:
  mbeans:
    enable: true
    category: QUERY
"#;

    let file = create_temp_config(config);

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

/// Test that a missing config file falls back to defaults
#[test]
fn test_validate_missing_config_uses_defaults() {
    cmd()
        .arg("-c")
        .arg("/nonexistent/path/config.yaml")
        .arg("--validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

/// Test that malformed YAML is rejected
#[test]
fn test_validate_invalid_config_bad_yaml() {
    let file = create_temp_config("solr:\n  base_url: [unclosed\n");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure();
}

/// Test that invalid port (0) is rejected
#[test]
fn test_invalid_port_zero() {
    let file = create_temp_config("server:\n  port: 0\n");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("port"));
}

/// Test that the metrics path cannot shadow the health route
#[test]
fn test_metrics_path_conflict_with_health() {
    let file = create_temp_config("server:\n  path: /health\n");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure();
}

/// Test that an invalid Solr URL is rejected
#[test]
fn test_invalid_base_url() {
    let file = create_temp_config("");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--base-url")
        .arg("ftp://solr/solr")
        .arg("--validate")
        .assert()
        .failure();
}

/// Test that a query that does not compile fails validation
#[test]
fn test_validate_rejects_broken_query() {
    let config = r#"
queries:
  - name: broken
    collection: techproducts
    extractions:
      - path: "response.{"
        name: solr_broken
"#;
    let file = create_temp_config(config);

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken"));
}

/// Test CLI and environment overrides
#[test]
fn test_port_and_env_overrides() {
    let file = create_temp_config("");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("-p")
        .arg("19999")
        .env("RSOLR_MODE", "cloud")
        .env("RSOLR_ZK_HOST", "zk1:2181")
        .arg("--validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

/// Test --validate with JSON output
#[test]
fn test_validate_json_output() {
    let file = create_temp_config("");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .arg("--output-format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\":true"));
}

/// Test --dry-run lists categories and queries
#[test]
fn test_dry_run_text() {
    let config = r#"
solr:
  base_url: http://solr1:8983/solr
categories:
  mbeans: { enable: true }
queries:
  - name: num_found
    collection: techproducts
    extractions:
      - path: response.numFound
        name: solr_num_found
"#;
    let file = create_temp_config(config);

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("http://solr1:8983/solr (standalone)"))
        .stdout(predicate::str::contains("- mbeans ("))
        .stdout(predicate::str::contains("- core_status ("))
        .stdout(predicate::str::contains("Always:      solr_scrape_duration_seconds"))
        .stdout(predicate::str::contains("num_found"));
}

/// Test --dry-run with JSON output
#[test]
fn test_dry_run_json() {
    let file = create_temp_config("solr:\n  mode: cloud\n");

    let output = cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--dry-run")
        .arg("--output-format")
        .arg("json")
        .output()
        .expect("Failed to run binary");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Dry run output is not JSON");
    assert_eq!(report["mode"], "cloud");
    assert_eq!(report["always_emitted"], serde_json::json!(["solr_scrape_duration_seconds"]));
    assert!(report["categories"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["name"] == "cluster_status" && c["rules"].as_u64().unwrap() > 0));
    assert!(report["rejected_queries"].as_array().unwrap().is_empty());
}

/// Test --dry-run with YAML output
#[test]
fn test_dry_run_yaml() {
    let file = create_temp_config("");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--dry-run")
        .arg("--output-format")
        .arg("yaml")
        .assert()
        .success()
        .stdout(predicate::str::contains("mode: standalone"));
}

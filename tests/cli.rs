use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("tryon").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tryon 0.1.0"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("tryon").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Quota-metered virtual try-on generation orchestrator",
        ));
}

#[test]
fn test_cli_generate_missing_args() {
    let mut cmd = Command::cargo_bin("tryon").unwrap();
    cmd.arg("generate")
        .assert()
        .failure() // 'person' and 'garment-url' are required
        .stderr(predicate::str::contains(
            "required arguments were not provided",
        ));
}

#[test]
fn test_cli_generate_rejects_unknown_category() {
    let mut cmd = Command::cargo_bin("tryon").unwrap();
    cmd.args([
        "generate",
        "--person",
        "https://img.example/p.jpg",
        "--garment-url",
        "https://img.example/g.jpg",
        "--category",
        "socks",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown garment category"));
}

#[test]
fn test_cli_quota_requires_an_identity() {
    let mut cmd = Command::cargo_bin("tryon").unwrap();
    cmd.arg("quota")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DEVICE_FINGERPRINT_REQUIRED"));
}

#[test]
fn test_cli_quota_reports_fresh_standing() {
    let mut cmd = Command::cargo_bin("tryon").unwrap();
    cmd.args(["quota", "--fingerprint", "fp-1", "--ip", "1.2.3.4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"can_generate\": true"))
        .stdout(predicate::str::contains("\"remaining\": 3"));
}

#[test]
fn test_cli_quota_resolves_configured_token() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[[auth.tokens]]
token = "tok-1"
user_id = "user-1"
"#
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("tryon").unwrap();
    cmd.args([
        "--config",
        file.path().to_str().unwrap(),
        "quota",
        "--token",
        "tok-1",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"can_generate\": true"))
    // User standing, not the anonymous limit of 3.
    .stdout(predicate::str::contains("\"remaining\": 10"));
}

#[test]
fn test_cli_fingerprint_is_deterministic_hex() {
    let run = || {
        let mut cmd = Command::cargo_bin("tryon").unwrap();
        let output = cmd
            .args([
                "fingerprint",
                "--user-agent",
                "Mozilla/5.0",
                "--timezone",
                "UTC",
            ])
            .env("TRYON_FINGERPRINT_SECRET", "test-secret")
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    };

    let first = run();
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(first, run());
}

#[test]
fn test_cli_sweep_reports_empty_pass() {
    let mut cmd = Command::cargo_bin("tryon").unwrap();
    cmd.arg("sweep")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"attempted\": 0"));
}

#[test]
fn test_cli_no_command_prints_hint() {
    let mut cmd = Command::cargo_bin("tryon").unwrap();
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No command specified"));
}

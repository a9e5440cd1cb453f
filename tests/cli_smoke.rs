use std::process::Command;

use serde_json::Value;
use tempfile::tempdir;

fn paraphrase() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_paraphrase"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn cli_score_prints_breakdown_json() {
    let output = paraphrase()
        .args(["score", "--text", "I'm glad. You're right. However, it's fine."])
        .output()
        .unwrap();
    assert!(output.status.success());

    let score: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(score["total"], 34);
    assert_eq!(score["vocabulary_diversity"], 20);
    assert_eq!(score["transition_words"], 5);
    assert_eq!(score["natural_patterns"], 9);
}

#[test]
fn cli_score_reads_file_and_honors_ceiling() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("input.txt");
    std::fs::write(&path, "I'm glad. You're right. However, it's fine.").unwrap();

    let output = paraphrase()
        .args(["score", "--ceiling", "25", "--file"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let score: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(score["total"], 25);
}

#[test]
fn cli_providers_lists_config_without_calling_out() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("paraphrase.toml");
    std::fs::write(
        &path,
        r#"
active = ["openai"]

[[providers]]
id = "openai"
kind = "chat"
api_key_env = "PARAPHRASE_TEST_UNSET_KEY"

[[providers]]
id = "t5"
kind = "hosted"
model = "Vamsi/T5_Paraphrase"
"#,
    )
    .unwrap();

    let output = paraphrase()
        .current_dir(dir.path())
        .env_remove("PARAPHRASE_TEST_UNSET_KEY")
        .args(["providers", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("* openai\tchat\tgpt-3.5-turbo\tPARAPHRASE_TEST_UNSET_KEY=missing"));
    assert!(stdout.contains("t5\thosted\tVamsi/T5_Paraphrase"));
}

#[test]
fn cli_run_fails_cleanly_without_credentials() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("paraphrase.toml");
    std::fs::write(
        &path,
        r#"
active = ["openai"]
call_timeout_seconds = 5

[[providers]]
id = "openai"
kind = "chat"
base_url = "http://127.0.0.1:9"
api_key_env = "PARAPHRASE_TEST_UNSET_KEY"
"#,
    )
    .unwrap();

    let output = paraphrase()
        .current_dir(dir.path())
        .env_remove("PARAPHRASE_TEST_UNSET_KEY")
        .args(["run", "--text", "hello there", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.to_lowercase().contains("authentication"), "{stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn cli_rejects_invalid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("paraphrase.toml");
    std::fs::write(&path, "active = [\"ghost\"]\n").unwrap();

    let output = paraphrase()
        .args(["providers", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ghost"));
}

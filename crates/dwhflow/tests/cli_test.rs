#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

const SAMPLE_CONFIG: &str = "\
[AWS]
KEY =
SECRET =
REGION_NAME = us-west-2

[DWH]
DWH_CLUSTER_TYPE = multi-node
DWH_NUM_NODES = 4
DWH_NODE_TYPE = dc2.large
DWH_CLUSTER_IDENTIFIER = dwhCluster
DWH_DB = dwh
DWH_DB_USER = dwhuser
DWH_DB_PASSWORD = Passw0rd
DWH_PORT = 5439
DWH_IAM_ROLE_NAME = dwhRole
DWH_ENDPOINT =

[IAM_ROLE]
ARN =
";

/// 外部の環境変数に影響されないコマンド
fn dwh(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("dwh").unwrap();
    cmd.current_dir(dir)
        .env_remove("DWHFLOW_CONFIG")
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let temp_dir = tempfile::tempdir().unwrap();
    dwh(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("データウェアハウス"))
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("down"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("state"))
        .stdout(predicate::str::contains("params"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let temp_dir = tempfile::tempdir().unwrap();
    dwh(temp_dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dwhflow"));
}

/// upコマンドのヘルプが正しく表示されることを確認
#[test]
fn test_up_help() {
    let temp_dir = tempfile::tempdir().unwrap();
    dwh(temp_dir.path())
        .arg("up")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--poll-interval"))
        .stdout(predicate::str::contains("--max-wait"));
}

/// downコマンドのヘルプが正しく表示されることを確認
#[test]
fn test_down_help() {
    let temp_dir = tempfile::tempdir().unwrap();
    dwh(temp_dir.path())
        .arg("down")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--wait"))
        .stdout(predicate::str::contains("--yes"));
}

/// 設定ファイルがない場合はエラーになることを確認
#[test]
fn test_params_without_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    dwh(temp_dir.path())
        .arg("params")
        .assert()
        .failure()
        .stderr(predicate::str::contains("設定ファイルが見つかりません"));
}

/// 指定した設定ファイルが存在しない場合はエラーになることを確認
#[test]
fn test_explicit_missing_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    dwh(temp_dir.path())
        .args(["--config", "missing.cfg", "params"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.cfg"));
}

/// paramsコマンドがパスワードをマスクすることを確認
#[test]
fn test_params_masks_password() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("dwh.cfg"), SAMPLE_CONFIG).unwrap();

    dwh(temp_dir.path())
        .arg("params")
        .assert()
        .success()
        .stdout(predicate::str::contains("DWH_CLUSTER_IDENTIFIER"))
        .stdout(predicate::str::contains("dwhCluster"))
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("Passw0rd").not());
}

/// 空のパラメータが警告されることを確認
#[test]
fn test_params_reports_empty_parameters() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = SAMPLE_CONFIG.replace("DWH_DB = dwh", "DWH_DB =");
    fs::write(temp_dir.path().join("dwh.cfg"), config).unwrap();

    dwh(temp_dir.path())
        .arg("params")
        .assert()
        .success()
        .stdout(predicate::str::contains("[DWH] DWH_DB"))
        .stdout(predicate::str::contains("[AWS] KEY"));
}

/// 設定ファイルを --config で指定できることを確認
#[test]
fn test_params_with_explicit_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("custom.cfg");
    fs::write(&config_path, SAMPLE_CONFIG).unwrap();

    dwh(temp_dir.path())
        .arg("--config")
        .arg(&config_path)
        .arg("params")
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.cfg"));
}

/// 不正な設定では AWS に接続する前に失敗することを確認
#[test]
fn test_up_rejects_invalid_config_before_connecting() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = SAMPLE_CONFIG.replace("DWH_PORT = 5439", "DWH_PORT = 0");
    fs::write(temp_dir.path().join("dwh.cfg"), config).unwrap();

    dwh(temp_dir.path())
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DWH_PORT"))
        .stdout(predicate::str::contains("接続中").not());

    assert!(!temp_dir.path().join(".dwhflow").exists());
}

/// 状態ファイルがない場合は空の値を出力することを確認
#[test]
fn test_state_without_state_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    dwh(temp_dir.path())
        .arg("state")
        .assert()
        .success()
        .stdout(predicate::str::contains("DWH_ENDPOINT=\n"))
        .stdout(predicate::str::contains("DWH_ROLE_ARN=\n"));
}

/// 保存済みの状態を env / json 形式で出力できることを確認
#[test]
fn test_state_exports_saved_state() {
    let temp_dir = tempfile::tempdir().unwrap();
    let state_dir = temp_dir.path().join(".dwhflow");
    fs::create_dir(&state_dir).unwrap();
    fs::write(
        state_dir.join("state.json"),
        r#"{
  "version": 1,
  "updated_at": "2026-01-01T00:00:00Z",
  "cluster_identifier": "dwhcluster",
  "role_arn": "arn:aws:iam::123456789012:role/dwhRole",
  "endpoint": "dwhcluster.abc.us-west-2.redshift.amazonaws.com",
  "port": 5439,
  "vpc_id": "vpc-0abc",
  "security_group_id": "sg-0abc",
  "last_status": "available"
}"#,
    )
    .unwrap();

    dwh(temp_dir.path())
        .arg("state")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "DWH_ENDPOINT=dwhcluster.abc.us-west-2.redshift.amazonaws.com",
        ))
        .stdout(predicate::str::contains("DWH_PORT=5439"))
        .stdout(predicate::str::contains(
            "DWH_ROLE_ARN=arn:aws:iam::123456789012:role/dwhRole",
        ))
        .stdout(predicate::str::contains("DWH_STATUS=available"));

    let output = dwh(temp_dir.path())
        .args(["state", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["cluster_identifier"], "dwhcluster");
    assert_eq!(json["port"], 5439);
}

/// 未知の形式は拒否されることを確認
#[test]
fn test_state_rejects_unknown_format() {
    let temp_dir = tempfile::tempdir().unwrap();
    dwh(temp_dir.path())
        .args(["state", "--format", "yaml"])
        .assert()
        .failure();
}

use colored::Colorize;
use dwhflow_cloud::{
    ControlPlane, FileStateStore, ProvisioningState, StepOutcome, StepRecord,
};
use dwhflow_cloud_aws::AwsSettings;
use dwhflow_config::Settings;
use std::path::Path;
use std::sync::Arc;

/// 設定ファイルを探して読み込み、読み込んだファイルを表示する
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = Settings::discover(explicit)?;
    println!("📄 読み込んだ設定ファイル:");
    println!("  • {}", settings.source().display().to_string().cyan());
    Ok(settings)
}

/// 空のパラメータを警告として表示
pub fn print_empty_parameters(settings: &Settings) {
    let empty = settings.empty_parameters();
    if empty.is_empty() {
        return;
    }

    println!();
    println!(
        "{}",
        format!(
            "⚠ 値が空のセクションがあります: {}",
            settings.empty_sections().join(", ")
        )
        .yellow()
    );
    for param in empty {
        println!("  • {}", param.to_string().yellow());
    }
}

/// AWS に接続する
pub async fn connect(settings: &Settings) -> anyhow::Result<ControlPlane> {
    let credentials = settings.aws()?;

    let mut aws = AwsSettings::new(&credentials.region);
    match credentials.static_keys {
        Some((key, secret)) => {
            aws = aws.with_static_credentials(key, secret);
        }
        None => {
            tracing::warn!("[AWS] KEY/SECRET are empty, using the default credential chain");
            println!(
                "{}",
                "ℹ KEY/SECRET が空のため、デフォルトの認証情報を使用します".dimmed()
            );
        }
    }

    println!("{}", format!("AWS ({}) に接続中...", aws.region).blue());
    Ok(dwhflow_cloud_aws::connect(&aws).await)
}

/// プロジェクトの状態ファイル
pub fn state_store(project_root: &Path) -> Arc<FileStateStore> {
    Arc::new(FileStateStore::new(project_root))
}

/// y/N の確認
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    use std::io::Write;

    print!("{} [y/N]: ", prompt);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// 1 ステップの結果を表示
pub fn print_step(record: &StepRecord) {
    let step = record.step.to_string();
    match &record.outcome {
        StepOutcome::Applied => println!("  ✓ {}", step.green()),
        StepOutcome::AlreadyInDesiredState => {
            println!("  ✓ {} {}", step.green(), "(変更なし)".dimmed())
        }
        StepOutcome::Warning(message) => {
            println!("  ⚠ {}: {}", step.yellow(), message)
        }
        StepOutcome::Skipped(reason) => {
            println!("  - {} {}", step.dimmed(), format!("(スキップ: {})", reason).dimmed())
        }
        StepOutcome::Failed(error) => println!("  ✗ {}: {}", step.red(), error),
    }
}

/// 後続ツール向けの環境変数形式
pub fn state_env_lines(state: &ProvisioningState) -> Vec<String> {
    vec![
        format!("DWH_CLUSTER_IDENTIFIER={}", state.cluster_identifier),
        format!("DWH_ENDPOINT={}", state.endpoint),
        format!(
            "DWH_PORT={}",
            state.port.map(|p| p.to_string()).unwrap_or_default()
        ),
        format!("DWH_ROLE_ARN={}", state.role_arn),
        format!("DWH_VPC_ID={}", state.vpc_id),
        format!("DWH_SECURITY_GROUP_ID={}", state.security_group_id),
        format!(
            "DWH_STATUS={}",
            state
                .last_status
                .map(|s| s.to_string())
                .unwrap_or_default()
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwhflow_cloud::ClusterStatus;

    #[test]
    fn test_state_env_lines() {
        let mut state = ProvisioningState::new();
        state.cluster_identifier = "dwhcluster".to_string();
        state.set_role_arn("arn:aws:iam::123456789012:role/dwhRole");
        state.set_endpoint("dwhcluster.abc.us-west-2.redshift.amazonaws.com", 5439);
        state.set_status(ClusterStatus::Available);

        let lines = state_env_lines(&state);
        assert!(lines.contains(&"DWH_CLUSTER_IDENTIFIER=dwhcluster".to_string()));
        assert!(lines.contains(
            &"DWH_ENDPOINT=dwhcluster.abc.us-west-2.redshift.amazonaws.com".to_string()
        ));
        assert!(lines.contains(&"DWH_PORT=5439".to_string()));
        assert!(lines.contains(&"DWH_ROLE_ARN=arn:aws:iam::123456789012:role/dwhRole".to_string()));
        assert!(lines.contains(&"DWH_STATUS=available".to_string()));
    }

    #[test]
    fn test_state_env_lines_for_empty_state() {
        let lines = state_env_lines(&ProvisioningState::new());
        assert!(lines.contains(&"DWH_ENDPOINT=".to_string()));
        assert!(lines.contains(&"DWH_PORT=".to_string()));
        assert!(lines.contains(&"DWH_ROLE_ARN=".to_string()));
    }
}

use crate::utils;
use colored::Colorize;
use dwhflow_cloud::{ClusterStatus, Orchestrator};
use std::path::Path;

pub async fn handle(project_root: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let settings = utils::load_settings(config)?;
    let environment = settings.environment()?;
    let plane = utils::connect(&settings).await?;

    let orchestrator = Orchestrator::new(plane, utils::state_store(project_root), environment);
    let status = orchestrator.status().await?;
    let environment = orchestrator.environment();

    println!();
    println!("{}", "現在の状態:".bold());
    println!("  フェーズ: {}", status.phase().to_string().cyan());

    match &status.role_arn {
        Some(arn) => println!("  • IAM ロール {}: {}", environment.role.name, arn.green()),
        None => println!("  • IAM ロール {}: {}", environment.role.name, "なし".dimmed()),
    }

    match &status.cluster {
        Some(cluster) => {
            let shown = match cluster.status {
                ClusterStatus::Available => cluster.raw_status.green(),
                ClusterStatus::Failed => cluster.raw_status.red(),
                _ => cluster.raw_status.yellow(),
            };
            println!("  • クラスタ {}: {}", cluster.identifier, shown);
            if let Some(endpoint) = cluster.endpoint() {
                println!("    endpoint: {}:{}", endpoint.address, endpoint.port);
            }
        }
        None => println!(
            "  • クラスタ {}: {}",
            environment.cluster.identifier,
            "なし".dimmed()
        ),
    }

    let state = &status.state;
    println!();
    println!("{}", "保存済みの状態 (.dwhflow/state.json):".bold());
    if state.is_empty() {
        println!("  {}", "記録なし".dimmed());
    } else {
        for line in utils::state_env_lines(state) {
            println!("  {}", line);
        }
    }

    Ok(())
}

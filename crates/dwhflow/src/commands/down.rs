use crate::utils;
use colored::Colorize;
use dwhflow_cloud::{Orchestrator, TeardownOptions};
use std::path::Path;

/// 全ステップが成功した場合に true を返す
pub async fn handle(
    project_root: &Path,
    config: Option<&Path>,
    wait: bool,
    yes: bool,
) -> anyhow::Result<bool> {
    println!("{}", "データウェアハウスを削除中...".yellow());
    let settings = utils::load_settings(config)?;
    let environment = settings.environment()?;

    println!();
    println!("{}", "削除対象:".bold());
    println!("  • クラスタ: {}", environment.cluster.identifier.cyan());
    println!("  • ingress: tcp/{} from {}", environment.cluster.port, environment.ingress_cidr);
    println!("  • IAM ロール: {}", environment.role.name.cyan());
    println!();

    if !yes
        && !utils::confirm(&format!(
            "クラスタ {} を最終スナップショットなしで削除しますか？",
            environment.cluster.identifier
        ))?
    {
        println!("{}", "中止しました".dimmed());
        return Ok(true);
    }

    let plane = utils::connect(&settings).await?;
    let orchestrator = Orchestrator::new(plane, utils::state_store(project_root), environment);

    let report = orchestrator
        .teardown(TeardownOptions {
            wait_for_deletion: wait,
        })
        .await?;

    println!();
    println!("{}", "実行結果:".bold());
    for record in &report.steps {
        utils::print_step(record);
    }

    println!();
    let summary = report.summary();
    if report.is_success() {
        println!("{}", format!("✓ 削除完了 ({})", summary).green().bold());
        if !wait {
            println!(
                "{}",
                "ℹ クラスタの削除はバックグラウンドで続行されます (dwh status で確認)".dimmed()
            );
        }
    } else {
        println!("{}", format!("✗ 一部のステップが失敗しました ({})", summary).red().bold());
        println!(
            "{}",
            "再実行すると残りのリソースの削除を再試行します".yellow()
        );
    }

    Ok(report.is_success())
}

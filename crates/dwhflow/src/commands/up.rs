use crate::utils;
use colored::Colorize;
use dwhflow_cloud::{ErrorKind, Orchestrator, ProvisionReport, WaitConfig};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn handle(
    project_root: &Path,
    config: Option<&Path>,
    poll_interval: u64,
    max_wait: u64,
) -> anyhow::Result<()> {
    println!("{}", "データウェアハウスを構築中...".yellow());
    let settings = utils::load_settings(config)?;
    utils::print_empty_parameters(&settings);

    // リモート呼び出しの前に検証する
    let environment = settings.environment()?;

    println!();
    println!("{}", "構成:".bold());
    println!("  • IAM ロール: {}", environment.role.name.cyan());
    println!(
        "  • クラスタ: {} ({}, {} × {})",
        environment.cluster.identifier.cyan(),
        environment.cluster.cluster_type,
        environment.cluster.node_count,
        environment.cluster.node_type
    );
    println!(
        "  • ingress: tcp/{} from {}",
        environment.cluster.port, environment.ingress_cidr
    );
    println!();

    let plane = utils::connect(&settings).await?;

    // Ctrl-C で待機を中断する
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let wait = WaitConfig {
        poll_interval: Duration::from_secs(poll_interval.max(1)),
        max_wait: Duration::from_secs(max_wait),
        ..WaitConfig::default()
    };

    let orchestrator = Orchestrator::new(plane, utils::state_store(project_root), environment)
        .with_wait_config(wait)
        .with_cancellation(cancel);

    println!(
        "{}",
        "クラスタが利用可能になるまで数分かかります (Ctrl-C で中断)".dimmed()
    );
    let result = orchestrator.provision().await;
    watcher.abort();

    match result {
        Ok(report) => {
            print_report(&report, orchestrator.environment());
            Ok(())
        }
        Err(err) => {
            println!();
            match err.kind() {
                ErrorKind::TimedOut => println!(
                    "{}",
                    "⏱ 待機がタイムアウトしました。再実行すると作成済みのクラスタの待機を再開します"
                        .yellow()
                ),
                ErrorKind::Cancelled => println!(
                    "{}",
                    "中断しました。再実行すると続きから再開します".yellow()
                ),
                ErrorKind::TransientRemote => println!(
                    "{}",
                    "一時的なエラーです。しばらくしてから再実行してください".yellow()
                ),
                _ => {}
            }
            Err(err.into())
        }
    }
}

fn print_report(report: &ProvisionReport, environment: &dwhflow_cloud::EnvironmentSpec) {
    println!();
    println!("{}", "実行結果:".bold());
    for record in &report.steps {
        utils::print_step(record);
    }

    println!();
    println!(
        "{}",
        format!(
            "✓ 構築完了 ({}, {:.1}秒)",
            report.phase,
            report.duration_ms as f64 / 1000.0
        )
        .green()
        .bold()
    );

    // 後続のロード処理向けの接続情報
    let state = &report.state;
    println!();
    println!("{}", "接続情報:".bold());
    println!("  host:     {}", state.endpoint.cyan());
    println!(
        "  port:     {}",
        state.port.unwrap_or(environment.cluster.port)
    );
    println!("  database: {}", environment.cluster.db_name);
    println!("  user:     {}", environment.cluster.master_username);
    println!("  role ARN: {}", state.role_arn.cyan());
}

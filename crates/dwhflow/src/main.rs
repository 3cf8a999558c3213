mod commands;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dwh")]
#[command(about = "dwh.cfg ひとつで、データウェアハウスを立てて、片付ける。", long_about = None)]
struct Cli {
    /// 設定ファイルのパス (省略時は dwh.cfg を自動探索)
    #[arg(short, long, global = true, env = "DWHFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// IAM ロール・クラスタ・ingress ルールを作成
    Up {
        /// ステータス確認の間隔 (秒)
        #[arg(long, default_value = "10")]
        poll_interval: u64,
        /// クラスタが利用可能になるまでの最大待ち時間 (秒)
        #[arg(long, default_value = "1800")]
        max_wait: u64,
    },
    /// クラスタ・ingress ルール・IAM ロールを削除
    Down {
        /// クラスタの削除完了を待ってからロールを削除する
        #[arg(short, long)]
        wait: bool,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 保存済みの状態と現在のステータスを表示
    Status,
    /// 保存済みの状態を出力 (後続ツール向け)
    State {
        /// 出力形式
        #[arg(short, long, value_enum, default_value = "env")]
        format: StateFormat,
    },
    /// 設定パラメータを表示 (パスワードはマスク)
    Params,
    /// バージョン情報を表示
    Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StateFormat {
    Env,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout は state 出力に使うので、ログは stderr に出す
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let project_root = std::env::current_dir()?;

    match cli.command {
        Commands::Version => {
            println!("dwhflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::State { format } => {
            commands::state::handle(&project_root, format).await?;
        }
        Commands::Params => {
            commands::params::handle(cli.config.as_deref())?;
        }
        Commands::Status => {
            commands::status::handle(&project_root, cli.config.as_deref()).await?;
        }
        Commands::Up {
            poll_interval,
            max_wait,
        } => {
            commands::up::handle(&project_root, cli.config.as_deref(), poll_interval, max_wait)
                .await?;
        }
        Commands::Down { wait, yes } => {
            let success =
                commands::down::handle(&project_root, cli.config.as_deref(), wait, yes).await?;
            if !success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

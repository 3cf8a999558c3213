use crate::StateFormat;
use crate::utils;
use dwhflow_cloud::StateStore;
use std::path::Path;

/// 保存済みの状態を stdout に出力する (リモート呼び出しなし)
pub async fn handle(project_root: &Path, format: StateFormat) -> anyhow::Result<()> {
    let state = utils::state_store(project_root).load().await?;

    match format {
        StateFormat::Env => {
            for line in utils::state_env_lines(&state) {
                println!("{}", line);
            }
        }
        StateFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}

use crate::utils;
use colored::Colorize;
use std::path::Path;

/// 設定パラメータの一覧 (リモート呼び出しなし)
pub fn handle(config: Option<&Path>) -> anyhow::Result<()> {
    let settings = utils::load_settings(config)?;

    println!();
    println!("{}", "[DWH] パラメータ:".bold());
    let params = settings.parameters();
    let width = params.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, value) in &params {
        let shown = if value.is_empty() {
            "(空)".dimmed()
        } else {
            value.cyan()
        };
        println!("  {:<width$}  {}", key, shown, width = width);
    }

    utils::print_empty_parameters(&settings);

    if let Err(err) = settings.environment() {
        println!();
        println!("{}", format!("✗ {}", err).red());
    } else {
        println!();
        println!("{}", "✓ 設定は有効です".green());
    }

    Ok(())
}

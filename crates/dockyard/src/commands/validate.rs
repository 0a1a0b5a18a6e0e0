use crate::utils;
use colored::Colorize;
use dockyard_compose::{LocalFileSystem, missing_files};
use std::path::Path;

pub async fn handle(config_path: Option<&Path>, stack: Option<&str>) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());

    let loaded = match utils::load_stack(config_path, stack) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    utils::print_loaded_config(&loaded);
    let config = &loaded.config;

    let mut files = config.compose_files.clone();
    files.extend(config.env_files.iter().cloned());
    let missing = missing_files(&LocalFileSystem, &files).await;
    if !missing.is_empty() {
        eprintln!();
        eprintln!("{}", "✗ 設定エラー".red().bold());
        for path in &missing {
            eprintln!("  ファイルが見つかりません: {}", path.display());
        }
        std::process::exit(1);
    }

    println!("{}", "✓ 設定ファイルは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  ライフサイクル: {}", config.lifecycle.as_str().cyan());
    println!("  プロジェクト名ベース: {}", config.project_base.cyan());
    println!("  composeファイル: {}個", config.compose_files.len());
    for file in &config.compose_files {
        println!("    - {}", file.display());
    }
    if !config.env_files.is_empty() {
        println!("  envファイル: {}個", config.env_files.len());
        for file in &config.env_files {
            println!("    - {}", file.display());
        }
    }
    if !config.wait_for_healthy.is_empty() {
        println!(
            "  healthy待機: {}",
            config.wait_for_healthy.join(", ").cyan()
        );
    }
    if !config.wait_for_running.is_empty() {
        println!(
            "  running待機: {}",
            config.wait_for_running.join(", ").cyan()
        );
    }
    println!(
        "  タイムアウト: {}秒（{}秒間隔）",
        config.timeout.as_secs(),
        config.poll_interval.as_secs()
    );
    println!("  Composeコマンド: {}", config.compose_command);
    println!("  出力ディレクトリ: {}", config.build_dir.display());

    Ok(())
}

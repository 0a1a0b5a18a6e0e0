use crate::utils::{self, LoadedStack};
use colored::Colorize;
use dockyard_core::ProjectIdentity;

pub async fn handle(loaded: &LoadedStack, project: &str) -> anyhow::Result<()> {
    println!("{}", "スタックを停止中...".yellow());
    utils::print_loaded_config(loaded);

    let identity = ProjectIdentity::from_token(project);
    println!("プロジェクト: {}", identity.token().cyan());

    let orchestrator = utils::orchestrator(loaded)?;
    let (down, cleanup) = orchestrator.stop_project(&identity).await;

    let mut warnings: Vec<String> = down.warning().into_iter().collect();
    warnings.extend(cleanup.warnings());

    if !cleanup.removed.is_empty() {
        println!(
            "  残存コンテナを削除: {}",
            cleanup.removed.join(", ").dimmed()
        );
    }

    if warnings.is_empty() {
        println!("{}", "✓ 停止しました".green().bold());
    } else {
        utils::print_warnings(&warnings);
    }

    Ok(())
}

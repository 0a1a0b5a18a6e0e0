use crate::utils::{self, LoadedStack};
use colored::Colorize;
use dockyard_core::ProjectIdentity;

pub async fn handle(loaded: &LoadedStack, project: &str) -> anyhow::Result<()> {
    println!("{}", "残存リソースを削除中...".yellow());

    let identity = ProjectIdentity::from_token(project);
    println!("プロジェクト: {}", identity.token().cyan());

    let orchestrator = utils::orchestrator(loaded)?;
    let report = orchestrator.cleanup().run(&identity).await;

    for step in &report.steps {
        match &step.error {
            None => println!("  ✓ {}", step.step),
            Some(e) => println!("  {} {}: {}", "✗".red(), step.step, e.dimmed()),
        }
    }

    if report.removed.is_empty() {
        println!("{}", "削除対象のコンテナはありませんでした".dimmed());
    } else {
        println!(
            "{}",
            format!("✓ {}個のコンテナを削除しました", report.removed.len()).green()
        );
    }

    Ok(())
}

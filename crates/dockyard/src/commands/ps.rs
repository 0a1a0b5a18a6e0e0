use crate::utils::{self, LoadedStack};
use colored::Colorize;
use dockyard_core::ProjectIdentity;

pub async fn handle(loaded: &LoadedStack, project: &str) -> anyhow::Result<()> {
    println!("{}", "サービス一覧を取得中...".blue());
    utils::print_loaded_config(loaded);

    let identity = ProjectIdentity::from_token(project);
    println!("プロジェクト: {}", identity.token().cyan());

    let orchestrator = utils::orchestrator(loaded)?;
    let services = orchestrator
        .controller()
        .service_states(&identity, &loaded.config.compose_files)
        .await?;

    println!();
    utils::print_services(&services);

    Ok(())
}

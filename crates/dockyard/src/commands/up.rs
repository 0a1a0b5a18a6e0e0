use crate::CycleArgs;
use crate::utils::{self, LoadedStack};
use colored::Colorize;

pub async fn handle(loaded: &LoadedStack, cycle: &CycleArgs) -> anyhow::Result<()> {
    println!("{}", "スタックを起動中...".green());
    utils::print_loaded_config(loaded);

    let orchestrator = utils::orchestrator(loaded)?;
    let scope = orchestrator.scope_for(&cycle.group, cycle.case.as_deref())?;
    let ctx = orchestrator
        .setup(scope, cycle.correlation.as_deref())
        .await?;

    utils::print_cycle(&ctx);

    println!();
    println!("{}", "停止するには:".bold());
    println!(
        "  {} down --project {}",
        "dockyard".cyan(),
        ctx.project_name()
    );

    Ok(())
}

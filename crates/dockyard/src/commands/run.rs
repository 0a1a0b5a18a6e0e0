use crate::CycleArgs;
use crate::utils::{self, LoadedStack};
use colored::Colorize;
use dockyard_compose::{CycleContext, CycleError};
use std::process::Stdio;

/// 子プロセスに渡す環境変数
pub const STATE_FILE_ENV: &str = "DOCKYARD_STATE_FILE";
pub const PROJECT_NAME_ENV: &str = "DOCKYARD_PROJECT_NAME";

/// スタックの中でコマンドを実行し、その終了コードを返す
pub async fn handle(
    loaded: &LoadedStack,
    cycle: &CycleArgs,
    command: &[String],
) -> anyhow::Result<i32> {
    println!("{}", "スタックを起動中...".green());
    utils::print_loaded_config(loaded);

    let orchestrator = utils::orchestrator(loaded)?;
    let scope = orchestrator.scope_for(&cycle.group, cycle.case.as_deref())?;

    let result = orchestrator
        .run_guarded(scope, cycle.correlation.as_deref(), |ctx| async move {
            utils::print_cycle(&ctx);
            run_child(command, &ctx).await
        })
        .await;

    match result {
        Ok(code) => {
            if code == 0 {
                println!("{}", "✓ コマンドが成功しました".green().bold());
            } else {
                println!(
                    "{}",
                    format!("✗ コマンドが終了コード {} で終了しました", code).red()
                );
            }
            Ok(code)
        }
        Err(CycleError::Setup(e)) => Err(e.into()),
        Err(CycleError::Guarded(e)) => Err(e),
    }
}

async fn run_child(command: &[String], ctx: &CycleContext) -> anyhow::Result<i32> {
    let Some((program, args)) = command.split_first() else {
        anyhow::bail!("実行するコマンドが指定されていません");
    };

    println!();
    println!("{} {}", "▶".cyan(), command.join(" ").bold());

    let mut child = tokio::process::Command::new(program);
    child
        .args(args)
        .env(PROJECT_NAME_ENV, ctx.project_name())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(path) = &ctx.state_file {
        child.env(STATE_FILE_ENV, path);
    }

    let status = child
        .status()
        .await
        .map_err(|e| anyhow::anyhow!("コマンドを起動できません: {}\n理由: {}", program, e))?;

    // シグナルで終了した場合は 1
    Ok(status.code().unwrap_or(1))
}

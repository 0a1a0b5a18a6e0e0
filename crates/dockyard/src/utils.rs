use colored::Colorize;
use dockyard_compose::{CycleContext, LifecycleOrchestrator, LifecycleServices};
use dockyard_config::ConfigError;
use dockyard_core::properties::keys;
use dockyard_core::{
    GlobalProperties, OrchestrationConfig, OrchestrationSettings, PropertyStore, ServiceInfo,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 読み込み済みのスタック設定
pub struct LoadedStack {
    /// 設定ファイル（プロパティだけで構成した場合は `None`）
    pub source: Option<PathBuf>,
    pub name: String,
    pub config: OrchestrationConfig,
}

/// `KEY=VALUE` を分解
pub fn parse_property(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(anyhow::anyhow!(
            "プロパティの形式が不正です: '{}'\n\nヒント:\n  • -P dockyard.wait.timeout=120 のように KEY=VALUE で指定してください",
            raw
        )),
    }
}

/// `-P` で渡されたプロパティをプロセス全体のプロパティに設定
pub fn apply_properties(raw: &[String]) -> anyhow::Result<()> {
    let props = GlobalProperties;
    for entry in raw {
        let (key, value) = parse_property(entry)?;
        tracing::debug!("Property override: {}={}", key, value);
        props.set(&key, &value);
    }
    Ok(())
}

/// 設定ファイルを読み込み、スタックを選んでプロパティの上書きを適用する
///
/// 設定ファイルが見つからなくても、`dockyard.compose.files` プロパティがあれば
/// プロパティだけで構成する。
pub fn load_stack(config_path: Option<&Path>, stack: Option<&str>) -> anyhow::Result<LoadedStack> {
    let props = GlobalProperties;

    let path = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => match dockyard_config::find_config_file() {
            Ok(path) => Some(path),
            Err(ConfigError::ConfigFileNotFound) if props.get(keys::COMPOSE_FILES).is_some() => {
                None
            }
            Err(e) => return Err(e.into()),
        },
    };

    let (name, settings) = match &path {
        Some(path) => {
            let file = dockyard_config::load_file(path)?;
            file.select_stack(stack)?
        }
        None => {
            let settings = OrchestrationSettings {
                stack_name: stack.map(str::to_string),
                ..Default::default()
            };
            (stack.unwrap_or_default().to_string(), settings)
        }
    };

    let config = settings.resolve(&props)?;
    let name = if name.is_empty() {
        config.stack_name.clone()
    } else {
        name
    };

    Ok(LoadedStack {
        source: path,
        name,
        config,
    })
}

/// 実プロセスで動くオーケストレーター
pub fn orchestrator(loaded: &LoadedStack) -> anyhow::Result<LifecycleOrchestrator> {
    Ok(LifecycleOrchestrator::new(
        loaded.config.clone(),
        LifecycleServices::system(),
    )?)
}

/// 読み込んだ設定ファイル情報を表示
pub fn print_loaded_config(loaded: &LoadedStack) {
    match &loaded.source {
        Some(path) => println!("📄 設定ファイル: {}", path.display().to_string().cyan()),
        None => println!("📄 設定ファイル: {}", "(プロパティのみ)".dimmed()),
    }
    println!("スタック: {}", loaded.name.cyan());
}

/// サービス一覧を表形式で表示
pub fn print_services(services: &BTreeMap<String, ServiceInfo>) {
    if services.is_empty() {
        println!("{}", "サービスはありません".dimmed());
        return;
    }

    println!(
        "{}",
        format!(
            "{:<16} {:<36} {:<12} {:<40}",
            "SERVICE", "CONTAINER", "STATUS", "PORTS"
        )
        .bold()
    );
    println!("{}", "─".repeat(104).dimmed());

    for (name, info) in services {
        let status = format!("{:<12}", info.status.as_str());
        let status_colored = match info.status {
            dockyard_core::ServiceStatus::Healthy => status.green(),
            dockyard_core::ServiceStatus::Running => status.cyan(),
            dockyard_core::ServiceStatus::Restarting => status.yellow(),
            dockyard_core::ServiceStatus::Stopped => status.red(),
            dockyard_core::ServiceStatus::Unknown => status.dimmed(),
        };
        let ports = info
            .ports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        println!(
            "{:<16} {:<36} {} {}",
            name.cyan(),
            info.container_name,
            status_colored,
            ports
        );
    }
}

/// セットアップ結果を表示
pub fn print_cycle(ctx: &CycleContext) {
    println!();
    println!("プロジェクト: {}", ctx.project_name().cyan().bold());
    if ctx.is_degraded() {
        println!(
            "{}",
            "⚠ 一部のサービスが準備完了になりませんでした（続行します）".yellow()
        );
    } else {
        println!("{}", "✓ サービスの準備が完了しました".green());
    }

    if let Some(state) = &ctx.compose_state {
        println!();
        print_services(&state.services);
    }

    if let Some(path) = &ctx.state_file {
        println!();
        println!("状態ファイル: {}", path.display().to_string().cyan());
    }
}

/// 警告の一覧を表示
pub fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("{}", "⚠ 警告:".yellow().bold());
    for warning in warnings {
        println!("  • {}", warning.yellow());
    }
}

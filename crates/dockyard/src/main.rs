mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(
    about = "結合テストのための使い捨て Docker Compose スタック",
    long_about = None
)]
struct Cli {
    /// 設定ファイル（省略時は dockyard.yaml を自動検出）
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// スタック名
    #[arg(short = 's', long, env = "DOCKYARD_STACK", global = true)]
    stack: Option<String>,

    /// プロパティの上書き（例: -P dockyard.wait.timeout=120）
    #[arg(short = 'P', long = "property", value_name = "KEY=VALUE", global = true)]
    properties: Vec<String>,

    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// テストサイクルの指定
#[derive(Args, Debug, Clone)]
pub struct CycleArgs {
    /// テストグループ名（クラス名など）
    #[arg(short, long, default_value = "cli")]
    pub group: String,

    /// テストケース名（method ライフサイクルで必須）
    #[arg(short, long)]
    pub case: Option<String>,

    /// 発見レコードの相関ID
    #[arg(long)]
    pub correlation: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 設定を検証
    Validate,
    /// スタックを起動して準備完了まで待機（停止はしない）
    Up {
        #[command(flatten)]
        cycle: CycleArgs,
    },
    /// プロジェクトのサービス一覧を表示
    Ps {
        /// プロジェクト名
        #[arg(short, long)]
        project: String,
    },
    /// プロジェクトを停止して残存リソースを削除
    Down {
        /// プロジェクト名
        #[arg(short, long)]
        project: String,
    },
    /// 残存コンテナとネットワークだけを削除
    Cleanup {
        /// プロジェクト名
        #[arg(short, long)]
        project: String,
    },
    /// スタックを起動してコマンドを実行し、終了後に必ず破棄する
    Run {
        #[command(flatten)]
        cycle: CycleArgs,
        /// 実行するコマンド（-- 以降）
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    utils::apply_properties(&cli.properties)?;

    let config_path = cli.config.as_deref();
    let stack = cli.stack.as_deref();

    match cli.command {
        // 設定ファイル不要
        Commands::Version => {
            println!("dockyard {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate => {
            commands::validate::handle(config_path, stack).await?;
        }
        Commands::Up { cycle } => {
            let loaded = utils::load_stack(config_path, stack)?;
            commands::up::handle(&loaded, &cycle).await?;
        }
        Commands::Ps { project } => {
            let loaded = utils::load_stack(config_path, stack)?;
            commands::ps::handle(&loaded, &project).await?;
        }
        Commands::Down { project } => {
            let loaded = utils::load_stack(config_path, stack)?;
            commands::down::handle(&loaded, &project).await?;
        }
        Commands::Cleanup { project } => {
            let loaded = utils::load_stack(config_path, stack)?;
            commands::cleanup::handle(&loaded, &project).await?;
        }
        Commands::Run { cycle, command } => {
            let loaded = utils::load_stack(config_path, stack)?;
            let code = commands::run::handle(&loaded, &cycle, &command).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}

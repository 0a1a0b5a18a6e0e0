//! Compose CLI によるスタックの起動・停止・状態取得

use crate::fs::FileSystem;
use crate::process::{CommandSpec, ProcessRunner};
use crate::report::StepReport;
use crate::waiter::StatusSource;
use async_trait::async_trait;
use dockyard_core::{
    ComposeCommand, ComposeState, LifecycleError, ProjectIdentity, Result, ServiceInfo,
    ServiceStatus, parse_service_records,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const UP_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DOWN_TIMEOUT: Duration = Duration::from_secs(2 * 60);
pub const PS_TIMEOUT: Duration = Duration::from_secs(30);

/// 1つの Compose プロジェクトを操作する
pub struct StackController {
    runner: Arc<dyn ProcessRunner>,
    fs: Arc<dyn FileSystem>,
    compose: ComposeCommand,
    env_files: Vec<PathBuf>,
}

impl StackController {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        fs: Arc<dyn FileSystem>,
        compose: ComposeCommand,
        env_files: Vec<PathBuf>,
    ) -> Self {
        Self {
            runner,
            fs,
            compose,
            env_files,
        }
    }

    /// `<compose> -p <project> -f <file>... [--env-file <file>...]`
    fn base_command(
        &self,
        identity: &ProjectIdentity,
        files: &[PathBuf],
        env_files: &[PathBuf],
        timeout: Duration,
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.compose.program, timeout)
            .args(self.compose.args.iter().cloned())
            .args(["-p", identity.token()]);
        for file in files {
            spec = spec.arg("-f").arg(file.display().to_string());
        }
        for env_file in env_files {
            spec = spec.arg("--env-file").arg(env_file.display().to_string());
        }
        spec
    }

    async fn existing(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut found = Vec::with_capacity(paths.len());
        for path in paths {
            if self.fs.exists(path).await {
                found.push(path.clone());
            }
        }
        found
    }

    async fn ensure_exists(&self, identity: &ProjectIdentity, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            if !self.fs.exists(path).await {
                return Err(LifecycleError::ComposeFileNotFound {
                    project: identity.token().to_string(),
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    /// スタックを起動し、起動直後の状態を返す
    ///
    /// composeファイルと env ファイルはプロセス起動前にすべて存在確認する。
    pub async fn up(&self, files: &[PathBuf], identity: &ProjectIdentity) -> Result<ComposeState> {
        self.ensure_exists(identity, files).await?;
        self.ensure_exists(identity, &self.env_files).await?;

        info!("Starting compose project {}", identity);
        let spec = self
            .base_command(identity, files, &self.env_files, UP_TIMEOUT)
            .args(["up", "-d", "--remove-orphans"]);

        let output = match self.runner.run(&spec).await {
            Ok(output) => output,
            Err(e) => {
                return Err(LifecycleError::StartupFailed {
                    project: identity.token().to_string(),
                    exit_code: None,
                    output: e.to_string(),
                });
            }
        };

        if !output.success() {
            return Err(LifecycleError::StartupFailed {
                project: identity.token().to_string(),
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }

        let services = match self.service_states(identity, files).await {
            Ok(services) => services,
            Err(e) => {
                warn!(
                    "Failed to query services of {} after startup: {}",
                    identity, e
                );
                BTreeMap::new()
            }
        };

        Ok(ComposeState::new(identity.token(), files.to_vec()).with_services(services))
    }

    /// スタックを停止してボリュームごと削除する
    ///
    /// 失敗してもエラーは返さず、結果を報告する。
    pub async fn down(&self, identity: &ProjectIdentity, files: &[PathBuf]) -> StepReport {
        let files = self.existing(files).await;
        let env_files = self.existing(&self.env_files).await;
        let spec = self
            .base_command(identity, &files, &env_files, DOWN_TIMEOUT)
            .args(["down", "--remove-orphans", "--volumes"]);

        match self.runner.run(&spec).await {
            Ok(output) if output.success() => {
                info!("Stopped compose project {}", identity);
                StepReport::ok("down")
            }
            Ok(output) => {
                let reason = format!(
                    "exit code {:?}: {}",
                    output.exit_code,
                    output.combined()
                );
                warn!("compose down failed for {}: {}", identity, reason);
                StepReport::failed("down", reason)
            }
            Err(e) => {
                warn!("compose down failed for {}: {}", identity, e);
                StepReport::failed("down", e)
            }
        }
    }

    /// `ps --all --format json` の結果をサービス名ごとに返す
    pub async fn service_states(
        &self,
        identity: &ProjectIdentity,
        files: &[PathBuf],
    ) -> Result<BTreeMap<String, ServiceInfo>> {
        let files = self.existing(files).await;
        let env_files = self.existing(&self.env_files).await;
        let spec = self
            .base_command(identity, &files, &env_files, PS_TIMEOUT)
            .args(["ps", "--all", "--format", "json"]);

        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(LifecycleError::CommandFailed {
                command: spec.to_string(),
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }

        let services = parse_service_records(&output.stdout);
        debug!("{} reports {} service(s)", identity, services.len());
        Ok(services)
    }

    /// 待機ループ用の状態取得アダプタ
    pub fn status_source<'a>(
        &'a self,
        identity: &'a ProjectIdentity,
        files: &'a [PathBuf],
    ) -> ComposeStatusSource<'a> {
        ComposeStatusSource {
            controller: self,
            identity,
            files,
        }
    }

    pub fn compose_command(&self) -> &ComposeCommand {
        &self.compose
    }

    pub fn env_files(&self) -> &[PathBuf] {
        &self.env_files
    }
}

/// [`StackController::service_states`] を [`StatusSource`] として使う
pub struct ComposeStatusSource<'a> {
    controller: &'a StackController,
    identity: &'a ProjectIdentity,
    files: &'a [PathBuf],
}

#[async_trait]
impl StatusSource for ComposeStatusSource<'_> {
    async fn service_statuses(&self) -> Result<BTreeMap<String, ServiceStatus>> {
        let services = self
            .controller
            .service_states(self.identity, self.files)
            .await?;
        Ok(services
            .into_iter()
            .map(|(name, info)| (name, info.status))
            .collect())
    }
}

/// 与えられたパスのうち存在しないものを返す（検証表示用）
pub async fn missing_files(fs: &dyn FileSystem, paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    for path in paths {
        if !fs.exists(path).await {
            missing.push(path.clone());
        }
    }
    missing
}

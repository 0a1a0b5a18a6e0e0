//! 残存コンテナ・ネットワークのクリーンアップ
//!
//! `compose down` が失敗したり途中で中断された場合に備え、Docker CLI で
//! プロジェクトに属するリソースを直接削除する。3つの戦略は互いに独立しており、
//! どれかが失敗しても残りは必ず実行される。

use crate::clock::Clock;
use crate::process::{CommandSpec, ProcessOutput, ProcessRunner};
use crate::report::{StepReport, collect_warnings};
use dockyard_core::{LifecycleError, ProjectIdentity, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Compose が付与するプロジェクトラベル
pub const PROJECT_LABEL: &str = "com.docker.compose.project";

const LIST_TIMEOUT: Duration = Duration::from_secs(30);
const REMOVE_TIMEOUT: Duration = Duration::from_secs(10);
const PRUNE_TIMEOUT: Duration = Duration::from_secs(30);
/// 戦略間で Docker デーモンの状態が落ち着くのを待つ時間
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// クリーンアップ戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStrategy {
    /// コンテナ名にプロジェクト名を含むものを一括削除
    NamePattern,
    /// プロジェクトラベル付きの停止済みコンテナとネットワークを prune
    LabelPrune,
    /// プロジェクトラベル付きのコンテナを1つずつ強制削除
    LabelSweep,
}

impl CleanupStrategy {
    pub const ALL: [CleanupStrategy; 3] = [
        CleanupStrategy::NamePattern,
        CleanupStrategy::LabelPrune,
        CleanupStrategy::LabelSweep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupStrategy::NamePattern => "name-pattern",
            CleanupStrategy::LabelPrune => "label-prune",
            CleanupStrategy::LabelSweep => "label-sweep",
        }
    }
}

impl std::fmt::Display for CleanupStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// クリーンアップ結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub project: String,
    pub steps: Vec<StepReport>,
    /// 削除したコンテナID
    pub removed: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(StepReport::is_ok)
    }

    pub fn warnings(&self) -> Vec<String> {
        collect_warnings(&self.steps)
    }
}

/// Docker CLI によるクリーンアップ
pub struct CleanupCoordinator {
    runner: Arc<dyn ProcessRunner>,
    clock: Arc<dyn Clock>,
    docker: String,
}

impl CleanupCoordinator {
    pub fn new(runner: Arc<dyn ProcessRunner>, clock: Arc<dyn Clock>) -> Self {
        Self {
            runner,
            clock,
            docker: "docker".to_string(),
        }
    }

    pub fn with_docker_program(mut self, program: impl Into<String>) -> Self {
        self.docker = program.into();
        self
    }

    /// 全戦略を順に実行する
    ///
    /// エラーは返さず、失敗は [`CleanupReport`] の警告に集約される。
    pub async fn run(&self, identity: &ProjectIdentity) -> CleanupReport {
        let project = identity.token();
        let mut report = CleanupReport {
            project: project.to_string(),
            steps: Vec::with_capacity(CleanupStrategy::ALL.len()),
            removed: Vec::new(),
        };

        for (i, strategy) in CleanupStrategy::ALL.into_iter().enumerate() {
            if i > 0 {
                self.clock.sleep(SETTLE_DELAY).await;
            }

            let step = format!("cleanup:{}", strategy);
            let removed = &mut report.removed;
            let result = match strategy {
                CleanupStrategy::NamePattern => self.remove_by_name(project, removed).await,
                CleanupStrategy::LabelPrune => self.prune_by_label(project).await,
                CleanupStrategy::LabelSweep => self.sweep_by_label(project, removed).await,
            };

            match result {
                Ok(()) => report.steps.push(StepReport::ok(step)),
                Err(e) => {
                    debug!("{} failed for {}: {}", step, project, e);
                    report.steps.push(StepReport::failed(step, e));
                }
            }
        }

        if report.is_clean() {
            if !report.removed.is_empty() {
                info!(
                    "Removed {} leftover container(s) of {}",
                    report.removed.len(),
                    project
                );
            }
        } else {
            warn!(
                "Cleanup of {} finished with warnings: {}",
                project,
                report.warnings().join("; ")
            );
        }

        report
    }

    fn docker(&self, timeout: Duration) -> CommandSpec {
        CommandSpec::new(&self.docker, timeout)
    }

    async fn checked(&self, spec: CommandSpec) -> Result<ProcessOutput> {
        let output = self.runner.run(&spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(LifecycleError::CommandFailed {
                command: spec.to_string(),
                exit_code: output.exit_code,
                output: output.combined(),
            })
        }
    }

    async fn list_ids(&self, filter: String) -> Result<Vec<String>> {
        let output = self
            .checked(
                self.docker(LIST_TIMEOUT)
                    .args(["ps", "-aq", "--filter"])
                    .arg(filter),
            )
            .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn remove_by_name(&self, project: &str, removed: &mut Vec<String>) -> Result<()> {
        let ids = self.list_ids(format!("name={}", project)).await?;
        if ids.is_empty() {
            return Ok(());
        }

        self.checked(
            self.docker(REMOVE_TIMEOUT)
                .args(["rm", "-f"])
                .args(ids.iter().cloned()),
        )
        .await?;
        removed.extend(ids);
        Ok(())
    }

    async fn prune_by_label(&self, project: &str) -> Result<()> {
        let label = format!("label={}={}", PROJECT_LABEL, project);
        self.checked(
            self.docker(PRUNE_TIMEOUT)
                .args(["container", "prune", "-f", "--filter"])
                .arg(label.clone()),
        )
        .await?;
        self.checked(
            self.docker(PRUNE_TIMEOUT)
                .args(["network", "prune", "-f", "--filter"])
                .arg(label),
        )
        .await?;
        Ok(())
    }

    async fn sweep_by_label(&self, project: &str, removed: &mut Vec<String>) -> Result<()> {
        let ids = self
            .list_ids(format!("label={}={}", PROJECT_LABEL, project))
            .await?;

        let mut failures = Vec::new();
        for id in ids {
            match self
                .checked(self.docker(REMOVE_TIMEOUT).args(["rm", "-f"]).arg(id.clone()))
                .await
            {
                Ok(_) => {
                    debug!("Removed container {}", id);
                    removed.push(id);
                }
                Err(e) => {
                    warn!("Failed to remove container {}: {}", id, e);
                    failures.push(id);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::CommandFailed {
                command: format!("{} rm -f", self.docker),
                exit_code: None,
                output: format!("削除できなかったコンテナ: {}", failures.join(", ")),
            })
        }
    }
}

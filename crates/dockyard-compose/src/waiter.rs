//! サービスの準備完了待機
//!
//! 指定したサービスがすべて目標の状態に達するまで、一定間隔で状態を問い合わせる。
//! タイムアウトはエラーではなく `WaitOutcome::TimedOut` として返す。

use crate::clock::Clock;
use async_trait::async_trait;
use dockyard_core::{LifecycleError, Result, ServiceStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// サービス状態の取得元
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// サービス名 → 現在の状態
    async fn service_statuses(&self) -> Result<BTreeMap<String, ServiceStatus>>;
}

/// 待機条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    pub project: String,
    pub services: Vec<String>,
    pub target: ServiceStatus,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// 待機結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied {
        attempts: u32,
        elapsed: Duration,
    },
    TimedOut {
        attempts: u32,
        elapsed: Duration,
        /// 条件を満たさなかったサービスと最後に観測した状態
        pending: Vec<(String, ServiceStatus)>,
    },
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            WaitOutcome::Satisfied { attempts, .. } | WaitOutcome::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }

    /// タイムアウトを `ReadinessTimeout` エラーに変換する
    pub fn into_result(self, spec: &WaitSpec) -> Result<Duration> {
        match self {
            WaitOutcome::Satisfied { elapsed, .. } => Ok(elapsed),
            WaitOutcome::TimedOut { pending, .. } => Err(LifecycleError::ReadinessTimeout {
                project: spec.project.clone(),
                timeout: spec.timeout,
                pending: pending
                    .into_iter()
                    .map(|(name, status)| format!("{}={}", name, status))
                    .collect(),
            }),
        }
    }
}

/// 状態をポーリングして待機する
pub struct ReadinessWaiter {
    clock: Arc<dyn Clock>,
}

impl ReadinessWaiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub async fn wait(&self, source: &dyn StatusSource, spec: &WaitSpec) -> WaitOutcome {
        if spec.services.is_empty() {
            return WaitOutcome::Satisfied {
                attempts: 0,
                elapsed: Duration::ZERO,
            };
        }

        info!(
            "Waiting for {} to become {} in {} (timeout {:?})",
            spec.services.join(", "),
            spec.target,
            spec.project,
            spec.timeout
        );

        let started = self.clock.elapsed();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let observed = match source.service_statuses().await {
                Ok(statuses) => statuses,
                Err(e) => {
                    // 取得失敗は「未準備」とみなす
                    debug!("Status query failed (attempt {}): {}", attempts, e);
                    BTreeMap::new()
                }
            };

            let pending: Vec<(String, ServiceStatus)> = spec
                .services
                .iter()
                .filter_map(|name| {
                    let status = observed.get(name).copied().unwrap_or_default();
                    (!status.satisfies(spec.target)).then(|| (name.clone(), status))
                })
                .collect();

            let elapsed = self.clock.elapsed().saturating_sub(started);

            if pending.is_empty() {
                info!(
                    "Services ready in {} after {} attempt(s) ({:?})",
                    spec.project, attempts, elapsed
                );
                return WaitOutcome::Satisfied { attempts, elapsed };
            }

            if elapsed >= spec.timeout {
                let summary: Vec<String> = pending
                    .iter()
                    .map(|(name, status)| format!("{}={}", name, status))
                    .collect();
                warn!(
                    "Timed out waiting for services in {} after {:?}: {}",
                    spec.project,
                    elapsed,
                    summary.join(", ")
                );
                return WaitOutcome::TimedOut {
                    attempts,
                    elapsed,
                    pending,
                };
            }

            let remaining = spec.timeout - elapsed;
            self.clock.sleep(spec.poll_interval.min(remaining)).await;
        }
    }
}

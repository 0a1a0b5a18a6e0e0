//! サービス状態

use serde::{Deserialize, Serialize};

/// Composeサービスの状態
///
/// `Healthy` は `Running` を含意する（ヘルスチェックに合格したコンテナは当然起動している）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    /// 状態を判別できない
    #[default]
    Unknown,
    /// 実行中
    Running,
    /// 実行中かつヘルスチェック合格
    Healthy,
    /// 停止済み
    Stopped,
    /// 再起動中
    Restarting,
}

impl ServiceStatus {
    /// この状態が待機目標 `target` を満たすか
    ///
    /// * `Healthy` 目標は `Healthy` のみ
    /// * `Running` 目標は `Running` または `Healthy`
    /// * それ以外は完全一致
    pub fn satisfies(self, target: ServiceStatus) -> bool {
        match target {
            ServiceStatus::Healthy => self == ServiceStatus::Healthy,
            ServiceStatus::Running => {
                matches!(self, ServiceStatus::Running | ServiceStatus::Healthy)
            }
            other => self == other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "UNKNOWN",
            ServiceStatus::Running => "RUNNING",
            ServiceStatus::Healthy => "HEALTHY",
            ServiceStatus::Stopped => "STOPPED",
            ServiceStatus::Restarting => "RESTARTING",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_satisfies_running() {
        assert!(ServiceStatus::Healthy.satisfies(ServiceStatus::Running));
        assert!(ServiceStatus::Healthy.satisfies(ServiceStatus::Healthy));
        assert!(ServiceStatus::Running.satisfies(ServiceStatus::Running));
    }

    #[test]
    fn test_running_does_not_satisfy_healthy() {
        assert!(!ServiceStatus::Running.satisfies(ServiceStatus::Healthy));
        assert!(!ServiceStatus::Unknown.satisfies(ServiceStatus::Running));
        assert!(!ServiceStatus::Restarting.satisfies(ServiceStatus::Running));
        assert!(!ServiceStatus::Stopped.satisfies(ServiceStatus::Running));
    }

    #[test]
    fn test_serialized_as_uppercase() {
        let json = serde_json::to_string(&ServiceStatus::Healthy).unwrap();
        assert_eq!(json, "\"HEALTHY\"");
    }
}

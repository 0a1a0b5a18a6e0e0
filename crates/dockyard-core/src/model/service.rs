//! サービス情報とスタック状態

use super::port::PortMapping;
use super::status::ServiceStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 起動中スタック内の1コンテナの情報
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub container_id: String,
    pub container_name: String,
    pub status: ServiceStatus,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

impl ServiceInfo {
    /// コンテナポートに対応するホストポートを取得
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.container == container_port)
            .map(|p| p.host)
    }
}

/// `up` 成功後のスタック状態
///
/// サイクル中だけ保持され、ティアダウンで破棄される。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeState {
    /// プロジェクト名（ProjectIdentity のトークン）
    pub project: String,
    pub compose_files: Vec<PathBuf>,
    /// サービス名 → サービス情報
    pub services: BTreeMap<String, ServiceInfo>,
}

impl ComposeState {
    pub fn new(project: impl Into<String>, compose_files: Vec<PathBuf>) -> Self {
        Self {
            project: project.into(),
            compose_files,
            services: BTreeMap::new(),
        }
    }

    pub fn with_services(mut self, services: BTreeMap<String, ServiceInfo>) -> Self {
        self.services = services;
        self
    }

    pub fn service(&self, name: &str) -> Option<&ServiceInfo> {
        self.services.get(name)
    }
}

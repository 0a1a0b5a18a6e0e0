//! Compose CLI 出力のパーサー
//!
//! すべて副作用のない純粋関数。CLIの出力形式はバージョンによって揺れるため、
//! 解釈できない入力はエラーにせず `Unknown` / 除外として扱う。

mod port;


pub use port::{parse_port_mapping, parse_port_list};

use crate::model::{PortMapping, ServiceInfo, ServiceStatus};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// 状態テキストから ServiceStatus を判定
///
/// 大文字小文字を区別しない部分一致で、"healthy" が最優先。
/// 例: "running (healthy)" -> Healthy
pub fn parse_service_status(text: &str) -> ServiceStatus {
    let text = text.to_lowercase();

    if text.contains("healthy") {
        ServiceStatus::Healthy
    } else if text.contains("restart") {
        ServiceStatus::Restarting
    } else if text.contains("exit") || text.contains("stop") || text.contains("dead") {
        ServiceStatus::Stopped
    } else if text.contains("running") || text.contains("up") {
        ServiceStatus::Running
    } else {
        ServiceStatus::Unknown
    }
}

/// `docker compose ps --format json` の1レコード
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PsRecord {
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Names")]
    names: Option<String>,
    #[serde(rename = "Service")]
    service: Option<String>,
    #[serde(rename = "State")]
    state: Option<String>,
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(rename = "Health")]
    health: Option<String>,
    #[serde(rename = "Ports")]
    ports: Option<String>,
    #[serde(rename = "Publishers")]
    publishers: Option<Vec<Publisher>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Publisher {
    #[serde(rename = "TargetPort")]
    target_port: u16,
    #[serde(rename = "PublishedPort")]
    published_port: u16,
    #[serde(rename = "Protocol")]
    protocol: Option<String>,
}

impl PsRecord {
    fn container_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.names.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Service フィールド、なければ `{project}_{service}_{ordinal}` の2番目
    fn service_name(&self) -> Option<String> {
        if let Some(service) = self.service.as_deref().map(str::trim)
            && !service.is_empty()
        {
            return Some(service.to_string());
        }

        self.container_name()?
            .split('_')
            .nth(1)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn service_status(&self) -> ServiceStatus {
        let health = self
            .health
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty());

        match health {
            Some(h) if h.eq_ignore_ascii_case("healthy") => ServiceStatus::Healthy,
            // unhealthy / starting はヘルス判定が出ていない扱い
            Some(_) => {
                let text = self.state.as_deref().or(self.status.as_deref());
                match text.map(parse_service_status) {
                    Some(ServiceStatus::Healthy) => ServiceStatus::Running,
                    Some(status) => status,
                    None => ServiceStatus::Unknown,
                }
            }
            None => {
                let from_status = self
                    .status
                    .as_deref()
                    .map(parse_service_status)
                    .unwrap_or_default();
                if from_status != ServiceStatus::Unknown {
                    return from_status;
                }
                self.state
                    .as_deref()
                    .map(parse_service_status)
                    .unwrap_or_default()
            }
        }
    }

    fn port_mappings(&self) -> Vec<PortMapping> {
        let mut mappings: Vec<PortMapping> = Vec::new();
        if let Some(publishers) = &self.publishers {
            for p in publishers.iter().filter(|p| p.published_port > 0) {
                let mapping = PortMapping::new(
                    p.target_port,
                    p.published_port,
                    p.protocol
                        .as_deref()
                        .filter(|s| !s.is_empty())
                        .unwrap_or("tcp")
                        .to_lowercase(),
                );
                if !mappings.contains(&mapping) {
                    mappings.push(mapping);
                }
            }
        }

        if mappings.is_empty()
            && let Some(ports) = &self.ports
        {
            mappings = parse_port_list(ports);
        }
        mappings
    }

    fn into_service(self) -> Option<(String, ServiceInfo)> {
        let service = self.service_name()?;
        let info = ServiceInfo {
            container_id: self.id.clone().unwrap_or_default(),
            container_name: self.container_name().unwrap_or_default().to_string(),
            status: self.service_status(),
            ports: self.port_mappings(),
        };
        Some((service, info))
    }
}

/// `docker compose ps --format json` の出力をサービス情報に変換
///
/// 1行1オブジェクト（NDJSON）が基本。古いComposeが出力するJSON配列も受け付ける。
/// 壊れた行は個別に読み飛ばし、サービス名を導出できないレコードは除外する。
pub fn parse_service_records(output: &str) -> BTreeMap<String, ServiceInfo> {
    let trimmed = output.trim();
    let mut services = BTreeMap::new();

    let records: Vec<PsRecord> = if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<serde_json::Value>>(trimmed) {
            Ok(values) => values
                .into_iter()
                .filter_map(|v| serde_json::from_value::<PsRecord>(v).ok())
                .collect(),
            Err(e) => {
                debug!(error = %e, "Skipping malformed compose ps array");
                Vec::new()
            }
        }
    } else {
        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match serde_json::from_str::<PsRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(error = %e, line, "Skipping malformed compose ps line");
                    None
                }
            })
            .collect()
    };

    for record in records {
        if let Some((name, info)) = record.into_service() {
            services.insert(name, info);
        }
    }
    services
}

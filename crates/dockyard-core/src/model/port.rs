//! ポートマッピング

use serde::{Deserialize, Serialize};

/// 公開ポートのマッピング（ホスト → コンテナ）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    pub container: u16,
    pub host: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl PortMapping {
    pub fn new(container: u16, host: u16, protocol: impl Into<String>) -> Self {
        Self {
            container,
            host,
            protocol: protocol.into(),
        }
    }

    pub fn tcp(container: u16, host: u16) -> Self {
        Self::new(container, host, default_protocol())
    }
}

impl std::fmt::Display for PortMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}/{}", self.host, self.container, self.protocol)
    }
}

//! ポート表記のパース

use crate::model::PortMapping;
use regex::Regex;
use std::sync::LazyLock;

/// `[host-ip:]hostPort->containerPort[/protocol]`
static PORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[\d.]+:)?(\d+)->(\d+)(?:/(\w+))?").expect("port pattern is valid")
});

/// 1件のポート表記をパース
///
/// 形式に一致しない場合は `None`（呼び出し側で除外する）。
pub fn parse_port_mapping(entry: &str) -> Option<PortMapping> {
    let caps = PORT_PATTERN.captures(entry.trim())?;
    let host = caps.get(1)?.as_str().parse::<u16>().ok()?;
    let container = caps.get(2)?.as_str().parse::<u16>().ok()?;
    let protocol = caps
        .get(3)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| "tcp".to_string());

    Some(PortMapping::new(container, host, protocol))
}

/// `docker compose ps` の Ports 列（カンマ区切り）をパース
///
/// 不正なエントリは捨て、IPv4/IPv6で重複する同一マッピングは1つにまとめる。
pub fn parse_port_list(text: &str) -> Vec<PortMapping> {
    let mut mappings: Vec<PortMapping> = Vec::new();
    for mapping in text.split(',').filter_map(parse_port_mapping) {
        if !mappings.contains(&mapping) {
            mappings.push(mapping);
        }
    }
    mappings
}

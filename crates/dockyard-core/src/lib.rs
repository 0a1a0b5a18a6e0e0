//! Dockyard core
//!
//! Composeスタックを使った結合テストのライフサイクル管理で共有される
//! データモデル、CLI出力パーサー、設定解決、プロセス全体のプロパティを提供します。

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod properties;

pub use config::{ComposeCommand, OrchestrationConfig, OrchestrationSettings};
pub use error::{LifecycleError, Result};
pub use model::*;
pub use parser::{
    parse_port_list, parse_port_mapping, parse_service_records, parse_service_status,
};
pub use properties::{GlobalProperties, MemoryProperties, PropertyStore};

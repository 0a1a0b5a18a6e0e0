//! プロセス全体で共有されるキー・バリュー型プロパティ
//!
//! 状態ファイルのパスやプロジェクト名を、直接の呼び出し関係がないテストコードへ
//! 渡すための経路。並列に複数サイクルが動くと上書きし合うため、
//! 真に並列な場合は相関IDによるファイル発見（recorder）を使うこと。

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

/// プロパティキー
pub mod keys {
    /// 状態ファイルの絶対パス（公開）
    pub const STATE_FILE: &str = "dockyard.state.file";
    /// 解決済みプロジェクト名（公開）
    pub const PROJECT_NAME: &str = "dockyard.project.name";

    // 設定の上書き
    pub const STACK_NAME: &str = "dockyard.stack.name";
    pub const COMPOSE_FILES: &str = "dockyard.compose.files";
    pub const LIFECYCLE: &str = "dockyard.lifecycle";
    pub const WAIT_HEALTHY: &str = "dockyard.wait.healthy";
    pub const WAIT_RUNNING: &str = "dockyard.wait.running";
    pub const WAIT_TIMEOUT: &str = "dockyard.wait.timeout";
    pub const WAIT_POLL: &str = "dockyard.wait.poll";
    pub const PROJECT_BASE: &str = "dockyard.project.base";
    pub const BUILD_DIR: &str = "dockyard.build.dir";
}

/// プロパティの読み書き
pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str) -> Option<String>;

    /// 現在の値が `expected` の場合だけ削除する
    ///
    /// 別サイクルが上書きした値を消さないために使う。
    fn remove_if(&self, key: &str, expected: &str) -> bool;
}

fn remove_if_matches(map: &mut HashMap<String, String>, key: &str, expected: &str) -> bool {
    if map.get(key).is_some_and(|v| v == expected) {
        map.remove(key);
        true
    } else {
        false
    }
}

static GLOBAL: LazyLock<RwLock<HashMap<String, String>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// プロセス全体のプロパティ
///
/// 読み取りはプロセス内のマップを優先し、なければ環境変数にフォールバックする
/// （`dockyard.stack.name` ⇔ `DOCKYARD_STACK_NAME`）。書き込みはマップのみ。
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalProperties;

impl GlobalProperties {
    pub fn env_var_name(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl PropertyStore for GlobalProperties {
    fn get(&self, key: &str) -> Option<String> {
        let map = GLOBAL.read().unwrap_or_else(|e| e.into_inner());
        if let Some(value) = map.get(key) {
            return Some(value.clone());
        }
        std::env::var(Self::env_var_name(key)).ok()
    }

    fn set(&self, key: &str, value: &str) {
        let mut map = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) -> Option<String> {
        let mut map = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
        map.remove(key)
    }

    fn remove_if(&self, key: &str, expected: &str) -> bool {
        let mut map = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
        remove_if_matches(&mut map, key, expected)
    }
}

/// 独立したプロパティ（テストや組み込み利用向け）
#[derive(Debug, Default)]
pub struct MemoryProperties {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }
}

impl PropertyStore for MemoryProperties {
    fn get(&self, key: &str) -> Option<String> {
        let map = self.values.read().unwrap_or_else(|e| e.into_inner());
        map.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut map = self.values.write().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) -> Option<String> {
        let mut map = self.values.write().unwrap_or_else(|e| e.into_inner());
        map.remove(key)
    }

    fn remove_if(&self, key: &str, expected: &str) -> bool {
        let mut map = self.values.write().unwrap_or_else(|e| e.into_inner());
        remove_if_matches(&mut map, key, expected)
    }
}

//! Dockyard の設定ファイル
//!
//! ```yaml
//! stacks:
//!   database:
//!     composeFiles: [docker/compose.yml]
//!     waitForHealthy: [db]
//! ```

pub mod error;

pub use error::*;

use dockyard_core::OrchestrationSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 設定ファイルの場所を直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "DOCKYARD_CONFIG_PATH";

const CANDIDATES: [&str; 3] = ["dockyard.local.yaml", "dockyard.yaml", ".dockyard.yaml"];

/// 設定ファイル全体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockyardFile {
    #[serde(default)]
    pub stacks: BTreeMap<String, OrchestrationSettings>,
    /// 読み込み元（相対パスの基準）
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl DockyardFile {
    /// 使用するスタックを決める
    ///
    /// 名前の指定がなければ `default`、スタックが1つだけならそれを選ぶ。
    pub fn select_stack(&self, name: Option<&str>) -> Result<(String, OrchestrationSettings)> {
        let name = match name {
            Some(name) => name.to_string(),
            None if self.stacks.contains_key("default") => "default".to_string(),
            None if self.stacks.len() == 1 => match self.stacks.keys().next() {
                Some(only) => only.clone(),
                None => return Err(self.not_specified()),
            },
            None => return Err(self.not_specified()),
        };

        match self.stacks.get(&name) {
            Some(settings) => Ok((name, settings.clone())),
            None => Err(ConfigError::StackNotFound {
                name,
                available: self.available(),
            }),
        }
    }

    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.keys().map(String::as_str).collect()
    }

    fn available(&self) -> String {
        self.stack_names().join(", ")
    }

    fn not_specified(&self) -> ConfigError {
        ConfigError::StackNotSpecified {
            available: self.available(),
        }
    }
}

/// Dockyard のグローバル設定ディレクトリ（~/.config/dockyard）
pub fn global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dockyard"))
}

/// プロジェクトの設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 DOCKYARD_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: dockyard.local.yaml, dockyard.yaml, .dockyard.yaml
/// 3. ./.dockyard/ ディレクトリ内: 同様の順序
/// 4. ~/.config/dockyard/dockyard.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.dockyard/ ディレクトリで検索
    let dockyard_dir = current_dir.join(".dockyard");
    if dockyard_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = dockyard_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. グローバル設定ファイル
    if let Some(global_dir) = global_config_dir() {
        let global_config = global_dir.join("dockyard.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// 設定ファイルを読み込む
///
/// 相対パスは設定ファイルのあるディレクトリ基準で解決し、
/// `stackName` が省略されたスタックにはキー名を入れる。
pub fn load_file(path: &Path) -> Result<DockyardFile> {
    let content = std::fs::read_to_string(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut file = parse_str(&content, &base_dir).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    if file.stacks.is_empty() {
        return Err(ConfigError::NoStacks {
            path: path.to_path_buf(),
        });
    }

    file.source = Some(path.to_path_buf());
    debug!(
        "Loaded {} stack(s) from {}",
        file.stacks.len(),
        path.display()
    );
    Ok(file)
}

/// YAML文字列を解析し、相対パスを `base_dir` 基準に解決する
pub fn parse_str(content: &str, base_dir: &Path) -> std::result::Result<DockyardFile, serde_yaml::Error> {
    let mut file: DockyardFile = serde_yaml::from_str(content)?;

    for (name, settings) in file.stacks.iter_mut() {
        if settings.stack_name.is_none() {
            settings.stack_name = Some(name.clone());
        }
        if let Some(files) = settings.compose_files.as_mut() {
            resolve_all(files, base_dir);
        }
        if let Some(files) = settings.env_files.as_mut() {
            resolve_all(files, base_dir);
        }
        if let Some(dir) = settings.build_dir.as_mut() {
            *dir = resolve(dir, base_dir);
        }
    }

    Ok(file)
}

fn resolve(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn resolve_all(paths: &mut [PathBuf], base_dir: &Path) {
    for path in paths.iter_mut() {
        *path = resolve(path, base_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::LifecycleMode;
    use serial_test::serial;
    use std::fs;

    const SAMPLE: &str = r#"
stacks:
  database:
    composeFiles: [docker/compose.yml]
    lifecycle: method
    waitForHealthy: [db]
    timeoutSeconds: 90
    envFiles: [docker/.env]
  cache:
    stackName: redis-cache
    composeFiles: [/opt/compose/redis.yml]
    buildDir: target
"#;

    #[test]
    fn test_parse_resolves_relative_paths() {
        let file = parse_str(SAMPLE, Path::new("/work/project")).unwrap();

        let db = &file.stacks["database"];
        assert_eq!(db.stack_name.as_deref(), Some("database"));
        assert_eq!(
            db.compose_files,
            Some(vec![PathBuf::from("/work/project/docker/compose.yml")])
        );
        assert_eq!(
            db.env_files,
            Some(vec![PathBuf::from("/work/project/docker/.env")])
        );
        assert_eq!(db.lifecycle, Some(LifecycleMode::Method));
        assert_eq!(db.timeout_seconds, Some(90));

        let cache = &file.stacks["cache"];
        assert_eq!(cache.stack_name.as_deref(), Some("redis-cache"));
        assert_eq!(
            cache.compose_files,
            Some(vec![PathBuf::from("/opt/compose/redis.yml")])
        );
        assert_eq!(cache.build_dir, Some(PathBuf::from("/work/project/target")));
    }

    #[test]
    fn test_select_stack() {
        let file = parse_str(SAMPLE, Path::new("/work")).unwrap();

        let (name, _) = file.select_stack(Some("cache")).unwrap();
        assert_eq!(name, "cache");

        match file.select_stack(None) {
            Err(ConfigError::StackNotSpecified { available }) => {
                assert_eq!(available, "cache, database")
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(matches!(
            file.select_stack(Some("queue")),
            Err(ConfigError::StackNotFound { .. })
        ));
    }

    #[test]
    fn test_select_single_or_default_stack() {
        let single = parse_str("stacks:\n  only:\n    composeFiles: [a.yml]\n", Path::new("/")).unwrap();
        assert_eq!(single.select_stack(None).unwrap().0, "only");

        let with_default = parse_str(
            "stacks:\n  default:\n    composeFiles: [a.yml]\n  other:\n    composeFiles: [b.yml]\n",
            Path::new("/"),
        )
        .unwrap();
        assert_eq!(with_default.select_stack(None).unwrap().0, "default");
    }

    #[test]
    fn test_parse_rejects_unknown_lifecycle() {
        let result = parse_str(
            "stacks:\n  db:\n    lifecycle: weekly\n",
            Path::new("/"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_file_errors() {
        let temp_dir = tempfile::tempdir().unwrap();

        let empty = temp_dir.path().join("empty.yaml");
        fs::write(&empty, "stacks: {}\n").unwrap();
        assert!(matches!(load_file(&empty), Err(ConfigError::NoStacks { .. })));

        let broken = temp_dir.path().join("broken.yaml");
        fs::write(&broken, "stacks: [unclosed\n").unwrap();
        assert!(matches!(load_file(&broken), Err(ConfigError::Yaml { .. })));

        let missing = temp_dir.path().join("missing.yaml");
        assert!(matches!(load_file(&missing), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_file_records_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("dockyard.yaml");
        fs::write(&path, "stacks:\n  db:\n    composeFiles: [compose.yml]\n").unwrap();

        let file = load_file(&path).unwrap();
        assert_eq!(file.source.as_deref(), Some(path.as_path()));
        assert_eq!(
            file.stacks["db"].compose_files,
            Some(vec![temp_dir.path().join("compose.yml")])
        );
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("dockyard.yaml"), "stacks: {}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_config_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("dockyard.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("dockyard.yaml"), "stacks: {}").unwrap();
        fs::write(temp_dir.path().join("dockyard.local.yaml"), "stacks: {}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_config_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        // dockyard.local.yaml が優先される
        assert!(result.ends_with("dockyard.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_dockyard_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let dockyard_dir = temp_dir.path().join(".dockyard");
        fs::create_dir(&dockyard_dir).unwrap();
        fs::write(dockyard_dir.join("dockyard.yaml"), "stacks: {}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_config_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.ends_with(".dockyard/dockyard.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "stacks: {}").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(config_path.as_os_str()), || {
            let result = find_config_file().unwrap();
            assert_eq!(result, config_path);
        });
    }
}

//! オーケストレーション設定
//!
//! 設定ファイルに明示された値（[`OrchestrationSettings`]）とプロパティによる上書きを
//! 突き合わせ、検証済みの [`OrchestrationConfig`] を作る。
//! 同じ項目に両方から異なる値が来た場合は黙って片方を選ばず、エラーにする。

use crate::error::{LifecycleError, Result};
use crate::model::LifecycleMode;
use crate::properties::{PropertyStore, keys};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: i64 = 60;
pub const DEFAULT_POLL_SECS: i64 = 2;
pub const DEFAULT_BUILD_DIR: &str = "build";
pub const DEFAULT_COMPOSE_COMMAND: &str = "docker compose";

/// 設定ファイルに書かれたスタック設定（すべて任意）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestrationSettings {
    pub stack_name: Option<String>,
    pub compose_files: Option<Vec<PathBuf>>,
    pub lifecycle: Option<LifecycleMode>,
    pub wait_for_healthy: Option<Vec<String>>,
    pub wait_for_running: Option<Vec<String>>,
    pub timeout_seconds: Option<i64>,
    pub poll_seconds: Option<i64>,
    /// プロジェクト名のベース（省略時はスタック名）
    pub project_name: Option<String>,
    pub build_dir: Option<PathBuf>,
    pub env_files: Option<Vec<PathBuf>>,
    pub compose_command: Option<String>,
}

/// Compose CLI の呼び出し方（`docker compose` または `docker-compose`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ComposeCommand {
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Default for ComposeCommand {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            args: vec!["compose".to_string()],
        }
    }
}

impl std::fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// 検証済みの設定
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationConfig {
    pub stack_name: String,
    pub compose_files: Vec<PathBuf>,
    pub lifecycle: LifecycleMode,
    pub wait_for_healthy: Vec<String>,
    pub wait_for_running: Vec<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub project_base: String,
    pub build_dir: PathBuf,
    pub env_files: Vec<PathBuf>,
    pub compose_command: ComposeCommand,
}

impl OrchestrationConfig {
    /// デフォルト値で設定を作る（ライブラリから直接使う場合）
    pub fn new(stack_name: impl Into<String>, compose_files: Vec<PathBuf>) -> Self {
        let stack_name = stack_name.into();
        Self {
            project_base: stack_name.clone(),
            stack_name,
            compose_files,
            lifecycle: LifecycleMode::default(),
            wait_for_healthy: Vec::new(),
            wait_for_running: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS as u64),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS as u64),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            env_files: Vec::new(),
            compose_command: ComposeCommand::default(),
        }
    }

    /// 外部プロセスを起動する前に行う検証
    pub fn validate(&self) -> Result<()> {
        if self.stack_name.trim().is_empty() {
            return Err(LifecycleError::invalid(
                "stackName",
                "(空)",
                "スタック名が指定されていません",
                format!(
                    "stacks.<name> に定義するか -P {}=<name> を指定してください",
                    keys::STACK_NAME
                ),
            ));
        }
        if self.compose_files.is_empty() {
            return Err(LifecycleError::invalid(
                "composeFiles",
                "[]",
                "composeファイルが1つも指定されていません",
                format!(
                    "composeFiles: [docker-compose.yml] のように指定するか -P {}=<path> を指定してください",
                    keys::COMPOSE_FILES
                ),
            ));
        }
        if self.timeout.is_zero() {
            return Err(LifecycleError::invalid(
                "timeoutSeconds",
                "0",
                "タイムアウトは正の値である必要があります",
                "timeoutSeconds: 60 のように1以上を指定してください",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(LifecycleError::invalid(
                "pollSeconds",
                "0",
                "ポーリング間隔は正の値である必要があります",
                "pollSeconds: 2 のように1以上を指定してください",
            ));
        }
        Ok(())
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleMode) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_wait_for_healthy(mut self, services: Vec<String>) -> Self {
        self.wait_for_healthy = services;
        self
    }

    pub fn with_wait_for_running(mut self, services: Vec<String>) -> Self {
        self.wait_for_running = services;
        self
    }

    pub fn with_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = build_dir.into();
        self
    }
}

impl OrchestrationSettings {
    /// プロパティによる上書きを適用し、検証済みの設定を返す
    pub fn resolve(&self, props: &dyn PropertyStore) -> Result<OrchestrationConfig> {
        let stack_name = merge(
            "stackName",
            keys::STACK_NAME,
            self.stack_name.clone(),
            props,
            |raw| Ok(raw.to_string()),
        )?
        .unwrap_or_default();

        let compose_files = merge(
            "composeFiles",
            keys::COMPOSE_FILES,
            self.compose_files.clone(),
            props,
            |raw| Ok(split_list(raw).into_iter().map(PathBuf::from).collect()),
        )?
        .unwrap_or_default();

        let lifecycle = merge(
            "lifecycle",
            keys::LIFECYCLE,
            self.lifecycle,
            props,
            |raw| {
                raw.parse::<LifecycleMode>().map_err(|reason| {
                    LifecycleError::invalid(
                        "lifecycle",
                        raw,
                        reason,
                        "class または method を指定してください",
                    )
                })
            },
        )?
        .unwrap_or_default();

        let wait_for_healthy = merge(
            "waitForHealthy",
            keys::WAIT_HEALTHY,
            self.wait_for_healthy.clone(),
            props,
            |raw| Ok(split_list(raw)),
        )?
        .unwrap_or_default();

        let wait_for_running = merge(
            "waitForRunning",
            keys::WAIT_RUNNING,
            self.wait_for_running.clone(),
            props,
            |raw| Ok(split_list(raw)),
        )?
        .unwrap_or_default();

        let timeout_secs = merge(
            "timeoutSeconds",
            keys::WAIT_TIMEOUT,
            self.timeout_seconds,
            props,
            |raw| parse_seconds("timeoutSeconds", raw),
        )?
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let poll_secs = merge(
            "pollSeconds",
            keys::WAIT_POLL,
            self.poll_seconds,
            props,
            |raw| parse_seconds("pollSeconds", raw),
        )?
        .unwrap_or(DEFAULT_POLL_SECS);

        let project_base = merge(
            "projectName",
            keys::PROJECT_BASE,
            self.project_name.clone(),
            props,
            |raw| Ok(raw.to_string()),
        )?
        .unwrap_or_else(|| stack_name.clone());

        let build_dir = merge(
            "buildDir",
            keys::BUILD_DIR,
            self.build_dir.clone(),
            props,
            |raw| Ok(PathBuf::from(raw)),
        )?
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_DIR));

        let compose_command = match self.compose_command.as_deref() {
            Some(raw) => ComposeCommand::parse(raw).ok_or_else(|| {
                LifecycleError::invalid(
                    "composeCommand",
                    raw,
                    "コマンドが空です",
                    "docker compose または docker-compose を指定してください",
                )
            })?,
            None => ComposeCommand::default(),
        };

        let config = OrchestrationConfig {
            stack_name,
            compose_files,
            lifecycle,
            wait_for_healthy,
            wait_for_running,
            timeout: positive_duration("timeoutSeconds", timeout_secs)?,
            poll_interval: positive_duration("pollSeconds", poll_secs)?,
            project_base,
            build_dir,
            env_files: self.env_files.clone().unwrap_or_default(),
            compose_command,
        };
        config.validate()?;
        Ok(config)
    }
}

/// 明示値とプロパティ値を突き合わせる
fn merge<T, F>(
    setting: &str,
    key: &str,
    explicit: Option<T>,
    props: &dyn PropertyStore,
    parse: F,
) -> Result<Option<T>>
where
    T: PartialEq + Debug,
    F: Fn(&str) -> Result<T>,
{
    let overridden = match props.get(key) {
        Some(raw) if !raw.trim().is_empty() => Some(parse(raw.trim())?),
        _ => None,
    };

    match (explicit, overridden) {
        (Some(a), Some(b)) if a != b => Err(LifecycleError::ConflictingConfig {
            setting: setting.to_string(),
            property: key.to_string(),
            explicit: format!("{:?}", a),
            overridden: format!("{:?}", b),
        }),
        (Some(a), _) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_seconds(setting: &str, raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| {
        LifecycleError::invalid(
            setting,
            raw,
            "整数ではありません",
            "秒数を整数で指定してください",
        )
    })
}

fn positive_duration(setting: &str, secs: i64) -> Result<Duration> {
    if secs <= 0 {
        return Err(LifecycleError::invalid(
            setting,
            secs.to_string(),
            "正の値である必要があります",
            format!("{}: 1 以上の値を指定してください", setting),
        ));
    }
    Ok(Duration::from_secs(secs as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::MemoryProperties;

    fn settings() -> OrchestrationSettings {
        OrchestrationSettings {
            stack_name: Some("database".to_string()),
            compose_files: Some(vec![PathBuf::from("docker/compose.yml")]),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let config = settings().resolve(&MemoryProperties::new()).unwrap();

        assert_eq!(config.stack_name, "database");
        assert_eq!(config.project_base, "database");
        assert_eq!(config.lifecycle, LifecycleMode::Class);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.build_dir, PathBuf::from("build"));
        assert_eq!(config.compose_command, ComposeCommand::default());
    }

    #[test]
    fn test_property_only_value_is_used() {
        let props = MemoryProperties::from_pairs([
            (keys::WAIT_HEALTHY, "db, cache"),
            (keys::LIFECYCLE, "method"),
            (keys::WAIT_TIMEOUT, "30"),
        ]);

        let config = settings().resolve(&props).unwrap();
        assert_eq!(config.wait_for_healthy, vec!["db", "cache"]);
        assert_eq!(config.lifecycle, LifecycleMode::Method);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_equal_values_do_not_conflict() {
        let props = MemoryProperties::from_pairs([(keys::STACK_NAME, "database")]);
        let config = settings().resolve(&props).unwrap();
        assert_eq!(config.stack_name, "database");
    }

    #[test]
    fn test_differing_values_conflict() {
        let props = MemoryProperties::from_pairs([(keys::STACK_NAME, "other")]);
        let err = settings().resolve(&props).unwrap_err();

        match err {
            LifecycleError::ConflictingConfig {
                setting, property, ..
            } => {
                assert_eq!(setting, "stackName");
                assert_eq!(property, keys::STACK_NAME);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_stack_name_is_fatal() {
        let settings = OrchestrationSettings {
            compose_files: Some(vec![PathBuf::from("compose.yml")]),
            ..Default::default()
        };
        let err = settings.resolve(&MemoryProperties::new()).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("stackName"));
        assert!(err.to_string().contains("ヒント"));
    }

    #[test]
    fn test_empty_compose_files_is_fatal() {
        let settings = OrchestrationSettings {
            stack_name: Some("s".to_string()),
            compose_files: Some(vec![]),
            ..Default::default()
        };
        let err = settings.resolve(&MemoryProperties::new()).unwrap_err();
        assert!(err.to_string().contains("composeFiles"));
    }

    #[test]
    fn test_non_positive_timing_is_fatal() {
        let mut s = settings();
        s.timeout_seconds = Some(0);
        assert!(s.resolve(&MemoryProperties::new()).is_err());

        let mut s = settings();
        s.poll_seconds = Some(-1);
        assert!(s.resolve(&MemoryProperties::new()).is_err());

        let props = MemoryProperties::from_pairs([(keys::WAIT_POLL, "soon")]);
        assert!(settings().resolve(&props).is_err());
    }

    #[test]
    fn test_compose_command_parse() {
        let cmd = ComposeCommand::parse("docker-compose").unwrap();
        assert_eq!(cmd.program, "docker-compose");
        assert!(cmd.args.is_empty());

        assert_eq!(ComposeCommand::default().to_string(), "docker compose");
        assert_eq!(ComposeCommand::parse("   "), None);
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{"stackName":"web","composeFiles":["a.yml"],"lifecycle":"method","waitForRunning":["api"],"pollSeconds":1}"#;
        let settings: OrchestrationSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.lifecycle, Some(LifecycleMode::Method));
        assert_eq!(settings.wait_for_running, Some(vec!["api".to_string()]));
        assert_eq!(settings.poll_seconds, Some(1));
    }
}

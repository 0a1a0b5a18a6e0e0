use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("無効な設定: {setting} = {value}\n理由: {reason}\n\nヒント:\n  • {hint}")]
    InvalidConfig {
        setting: String,
        value: String,
        reason: String,
        hint: String,
    },

    #[error(
        "設定が競合しています: {setting}\n  設定ファイル: {explicit}\n  プロパティ ({property}): {overridden}\n\nヒント:\n  • どちらか一方だけを指定してください"
    )]
    ConflictingConfig {
        setting: String,
        property: String,
        explicit: String,
        overridden: String,
    },

    #[error(
        "composeファイルが見つかりません: {path}（プロジェクト: {project}）\n\nヒント:\n  • パスが設定ファイルのあるディレクトリからの相対パスになっているか確認してください"
    )]
    ComposeFileNotFound { project: String, path: PathBuf },

    #[error("スタック '{project}' の起動に失敗しました（終了コード: {}）\n{output}", display_code(.exit_code))]
    StartupFailed {
        project: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error(
        "サービスの準備完了を待機中にタイムアウトしました（プロジェクト: {project}, {timeout:?}）: {}\n\nヒント:\n  • ヘルスチェックが正しく設定されているか確認してください\n  • timeoutSeconds を増やしてみてください",
        .pending.join(", ")
    )]
    ReadinessTimeout {
        project: String,
        timeout: Duration,
        pending: Vec<String>,
    },

    #[error("コマンドを起動できません: {command}\n理由: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("コマンドがタイムアウトしました（{timeout:?}）: {command}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("コマンドが失敗しました（終了コード: {}）: {command}\n{output}", display_code(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),
}

impl LifecycleError {
    /// 起動失敗（ロールバック対象）かどうか
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            LifecycleError::ComposeFileNotFound { .. } | LifecycleError::StartupFailed { .. }
        )
    }

    /// 外部プロセスを一切起動する前に検出される設定エラーかどうか
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            LifecycleError::InvalidConfig { .. } | LifecycleError::ConflictingConfig { .. }
        )
    }

    pub fn invalid(
        setting: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        LifecycleError::InvalidConfig {
            setting: setting.into(),
            value: value.into(),
            reason: reason.into(),
            hint: hint.into(),
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "なし".to_string())
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

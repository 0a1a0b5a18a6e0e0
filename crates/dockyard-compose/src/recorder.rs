//! スタック状態ファイルの記録と発見
//!
//! テストコードは状態ファイルから各サービスのコンテナ名と公開ポートを読む。
//! 状態ファイルの場所は2通りで伝わる:
//!
//! * プロセス全体のプロパティ `dockyard.state.file`（並列サイクルでは上書きされ得る）
//! * 相関IDごとの発見レコード `<buildDir>/dockyard/discovery/<id>.json`

use crate::clock::Clock;
use crate::fs::FileSystem;
use crate::report::StepReport;
use chrono::{DateTime, Utc};
use dockyard_core::properties::keys;
use dockyard_core::{
    ComposeState, LifecycleError, LifecycleMode, PortMapping, ProjectIdentity, PropertyStore,
    Result, ServiceStatus, sanitize_name,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STATE_DIR: &str = "dockyard/state";
const DISCOVERY_DIR: &str = "dockyard/discovery";

/// 状態ファイルの内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    pub stack_name: String,
    pub project_name: String,
    pub lifecycle: LifecycleMode,
    pub test_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_method: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceEntry>,
}

/// 状態ファイル内の1サービス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub container_id: String,
    pub container_name: String,
    pub state: ServiceStatus,
    #[serde(default)]
    pub published_ports: Vec<PortMapping>,
}

/// 相関IDから状態ファイルを引くためのレコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRecord {
    pub project_name: String,
    pub state_file: PathBuf,
}

impl StateDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LifecycleError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 公開プロパティから現在のスタックの状態を読む
    ///
    /// プロパティが無ければ稼働中のスタックは無いとみなして `None`。
    pub fn from_properties(props: &dyn PropertyStore) -> Result<Option<Self>> {
        match props.get(keys::STATE_FILE) {
            Some(path) => Self::load(Path::new(&path)).map(Some),
            None => Ok(None),
        }
    }

    /// 相関IDの発見レコードから状態を読む
    pub fn discover(build_dir: &Path, correlation: &str) -> Result<Option<Self>> {
        let record_path = discovery_path(build_dir, correlation);
        if !record_path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&record_path).map_err(|e| LifecycleError::IoError {
                path: record_path.clone(),
                message: e.to_string(),
            })?;
        let record: DiscoveryRecord = serde_json::from_str(&content)?;
        Self::load(&record.state_file).map(Some)
    }

    /// サービスのコンテナポートに対応するホストポート
    pub fn port_for(&self, service: &str, container_port: u16) -> Option<u16> {
        self.services
            .get(service)?
            .published_ports
            .iter()
            .find(|p| p.container == container_port)
            .map(|p| p.host)
    }

    fn build(
        stack_name: &str,
        identity: &ProjectIdentity,
        state: &ComposeState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let scope = identity.scope();
        let services = state
            .services
            .iter()
            .map(|(name, info)| {
                let entry = ServiceEntry {
                    container_id: info.container_id.clone(),
                    container_name: info.container_name.clone(),
                    state: info.status,
                    published_ports: info.ports.clone(),
                };
                (name.clone(), entry)
            })
            .collect();

        Self {
            stack_name: stack_name.to_string(),
            project_name: identity.token().to_string(),
            lifecycle: scope.mode(),
            test_class: scope.group_name().to_string(),
            test_method: scope.case_name().map(str::to_string),
            timestamp,
            services,
        }
    }
}

/// `<buildDir>/dockyard/state/<project>/<stack>-<group>[-<case>]-state.json`
///
/// プロジェクト名ごとのディレクトリに置くため、同じスタック・グループの
/// サイクルが並行しても互いのファイルを上書きしない。
pub fn state_file_path(build_dir: &Path, stack_name: &str, identity: &ProjectIdentity) -> PathBuf {
    let scope = identity.scope();
    let mut parts = vec![sanitize_name(stack_name), sanitize_name(scope.group_name())];
    if let Some(case) = scope.case_name() {
        parts.push(sanitize_name(case));
    }
    build_dir
        .join(STATE_DIR)
        .join(identity.token())
        .join(format!("{}-state.json", parts.join("-")))
}

/// `<buildDir>/dockyard/discovery/<correlation>.json`
pub fn discovery_path(build_dir: &Path, correlation: &str) -> PathBuf {
    build_dir
        .join(DISCOVERY_DIR)
        .join(format!("{}.json", sanitize_name(correlation)))
}

/// 記録対象のサイクル
#[derive(Debug, Clone, Copy)]
pub struct RecordRequest<'a> {
    pub stack_name: &'a str,
    pub identity: &'a ProjectIdentity,
    pub correlation: Option<&'a str>,
}

/// 状態ファイルを書き出し、場所を公開する
pub struct StateRecorder {
    fs: Arc<dyn FileSystem>,
    props: Arc<dyn PropertyStore>,
    clock: Arc<dyn Clock>,
    build_dir: PathBuf,
}

impl StateRecorder {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        props: Arc<dyn PropertyStore>,
        clock: Arc<dyn Clock>,
        build_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs,
            props,
            clock,
            build_dir: build_dir.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// 状態を記録して絶対パスを返す
    ///
    /// `state` が無い（起動に至らなかった）場合は警告のみで `Ok(None)`。
    pub async fn record(
        &self,
        request: &RecordRequest<'_>,
        state: Option<&ComposeState>,
    ) -> Result<Option<PathBuf>> {
        let Some(state) = state else {
            warn!(
                "No compose state for {}, skipping state file",
                request.identity
            );
            return Ok(None);
        };

        let document =
            StateDocument::build(request.stack_name, request.identity, state, self.clock.now());
        let path = std::path::absolute(state_file_path(
            &self.build_dir,
            request.stack_name,
            request.identity,
        ))?;

        self.write_json(&path, &serde_json::to_vec_pretty(&document)?)
            .await?;

        let path_str = path.display().to_string();
        self.props.set(keys::STATE_FILE, &path_str);
        self.props.set(keys::PROJECT_NAME, request.identity.token());

        if let Some(correlation) = request.correlation {
            let record = DiscoveryRecord {
                project_name: request.identity.token().to_string(),
                state_file: path.clone(),
            };
            let record_path = std::path::absolute(discovery_path(&self.build_dir, correlation))?;
            self.write_json(&record_path, &serde_json::to_vec_pretty(&record)?)
                .await?;
            debug!("Discovery record written: {}", record_path.display());
        }

        info!(
            "State file written for {}: {}",
            request.identity,
            path.display()
        );
        Ok(Some(path))
    }

    async fn write_json(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.fs.create_dir_all(parent).await?;
        }
        self.fs.write_atomic(path, contents).await
    }

    /// 公開したプロパティと発見レコードを取り下げる
    ///
    /// プロパティは、まだこのサイクルの値を保持している場合だけ削除する。
    /// 状態ファイル自体は調査用に残す。
    pub async fn retract(
        &self,
        identity: &ProjectIdentity,
        state_file: Option<&Path>,
        correlation: Option<&str>,
    ) -> StepReport {
        if let Some(path) = state_file {
            self.props
                .remove_if(keys::STATE_FILE, &path.display().to_string());
        }
        self.props.remove_if(keys::PROJECT_NAME, identity.token());

        if let Some(correlation) = correlation {
            let record_path = discovery_path(&self.build_dir, correlation);
            if let Err(e) = self.fs.remove_file(&record_path).await {
                warn!("Failed to remove discovery record: {}", e);
                return StepReport::failed("retract", e);
            }
        }
        StepReport::ok("retract")
    }
}

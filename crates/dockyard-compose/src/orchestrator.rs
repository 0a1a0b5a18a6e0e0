//! テストサイクルのオーケストレーション
//!
//! 1サイクルの流れ:
//!
//! 1. プロジェクト識別子を生成
//! 2. 事前クリーンアップ
//! 3. `compose up`（失敗時はクリーンアップと `down` でロールバックして元のエラーを返す）
//! 4. healthy / running 対象の待機（タイムアウトは Degraded として続行）
//! 5. 状態ファイルの記録
//! 6. テストコードの実行
//! 7. `down` → クリーンアップ → 公開プロパティの取り下げ（失敗しても全ステップ実行）
//!
//! サイクル固有の状態は [`CycleContext`] だけが持つ。オーケストレーター自体は
//! 不変なので、複数のサイクルを別タスクで同時に走らせられる。

use crate::cleanup::{CleanupCoordinator, CleanupReport};
use crate::clock::{Clock, SystemClock};
use crate::controller::StackController;
use crate::fs::{FileSystem, LocalFileSystem};
use crate::process::{ProcessRunner, SystemProcessRunner};
use crate::recorder::{RecordRequest, StateRecorder};
use crate::report::{StepReport, collect_warnings};
use crate::waiter::{ReadinessWaiter, WaitOutcome, WaitSpec};
use dockyard_core::{
    ComposeState, GlobalProperties, LifecycleError, LifecycleMode, OrchestrationConfig,
    ProjectIdentity, PropertyStore, Result, Scope, ServiceStatus,
};
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// サイクルの段階
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePhase {
    #[default]
    Idle,
    Starting,
    Ready,
    /// 待機がタイムアウトしたが続行中
    Degraded,
    RunningGuardedCode,
    TearingDown,
}

/// 1サイクル分の状態
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub identity: ProjectIdentity,
    pub correlation: Option<String>,
    pub compose_state: Option<ComposeState>,
    pub state_file: Option<PathBuf>,
    pub wait_outcomes: Vec<WaitOutcome>,
    pub phase: CyclePhase,
}

impl CycleContext {
    fn new(identity: ProjectIdentity, correlation: Option<&str>) -> Self {
        Self {
            identity,
            correlation: correlation.map(str::to_string),
            compose_state: None,
            state_file: None,
            wait_outcomes: Vec::new(),
            phase: CyclePhase::Idle,
        }
    }

    pub fn project_name(&self) -> &str {
        self.identity.token()
    }

    pub fn is_degraded(&self) -> bool {
        self.wait_outcomes.iter().any(|o| !o.is_satisfied())
    }
}

/// ティアダウンの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub project: String,
    pub down: StepReport,
    pub cleanup: CleanupReport,
    pub retract: StepReport,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.down.is_ok() && self.cleanup.is_clean() && self.retract.is_ok()
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = collect_warnings([&self.down]);
        warnings.extend(self.cleanup.warnings());
        warnings.extend(collect_warnings([&self.retract]));
        warnings
    }
}

/// 保護付き実行のエラー
#[derive(Debug)]
pub enum CycleError<E> {
    /// セットアップ失敗（テストコードは実行されていない）
    Setup(LifecycleError),
    /// テストコード自身のエラー
    Guarded(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CycleError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleError::Setup(e) => write!(f, "スタックのセットアップに失敗しました: {}", e),
            CycleError::Guarded(e) => write!(f, "{}", e),
        }
    }
}

impl<E> std::error::Error for CycleError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CycleError::Setup(e) => Some(e),
            CycleError::Guarded(e) => Some(e),
        }
    }
}

/// オーケストレーターが使う外部サービス
#[derive(Clone)]
pub struct LifecycleServices {
    pub runner: Arc<dyn ProcessRunner>,
    pub fs: Arc<dyn FileSystem>,
    pub clock: Arc<dyn Clock>,
    pub properties: Arc<dyn PropertyStore>,
}

impl LifecycleServices {
    /// 実プロセス・ローカルディスク・実時間・プロセス全体のプロパティ
    pub fn system() -> Self {
        Self {
            runner: Arc::new(SystemProcessRunner::new()),
            fs: Arc::new(LocalFileSystem),
            clock: Arc::new(SystemClock::new()),
            properties: Arc::new(GlobalProperties),
        }
    }
}

pub struct LifecycleOrchestrator {
    config: OrchestrationConfig,
    controller: StackController,
    cleanup: CleanupCoordinator,
    waiter: ReadinessWaiter,
    recorder: StateRecorder,
    clock: Arc<dyn Clock>,
}

impl LifecycleOrchestrator {
    /// 設定を検証して作成する（外部プロセスはまだ起動しない）
    pub fn new(config: OrchestrationConfig, services: LifecycleServices) -> Result<Self> {
        config.validate()?;

        let controller = StackController::new(
            services.runner.clone(),
            services.fs.clone(),
            config.compose_command.clone(),
            config.env_files.clone(),
        );
        let cleanup = CleanupCoordinator::new(services.runner.clone(), services.clock.clone());
        let waiter = ReadinessWaiter::new(services.clock.clone());
        let recorder = StateRecorder::new(
            services.fs,
            services.properties,
            services.clock.clone(),
            config.build_dir.clone(),
        );

        Ok(Self {
            config,
            controller,
            cleanup,
            waiter,
            recorder,
            clock: services.clock,
        })
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn controller(&self) -> &StackController {
        &self.controller
    }

    pub fn cleanup(&self) -> &CleanupCoordinator {
        &self.cleanup
    }

    /// ライフサイクル設定に応じたスコープ
    pub fn scope_for(&self, group: &str, case: Option<&str>) -> Result<Scope> {
        match (self.config.lifecycle, case) {
            (LifecycleMode::Class, _) => Ok(Scope::group(group)),
            (LifecycleMode::Method, Some(case)) => Ok(Scope::group_and_case(group, case)),
            (LifecycleMode::Method, None) => Err(LifecycleError::invalid(
                "lifecycle",
                "method",
                "method ライフサイクルにはテストケース名が必要です",
                "テストケース名を指定するか、lifecycle を class に変更してください",
            )),
        }
    }

    /// スタックを起動して待機し、状態を記録する
    #[tracing::instrument(skip(self), fields(stack = %self.config.stack_name))]
    pub async fn setup(&self, scope: Scope, correlation: Option<&str>) -> Result<CycleContext> {
        let identity =
            ProjectIdentity::generate(&self.config.project_base, scope, self.clock.now());
        let mut ctx = CycleContext::new(identity, correlation);
        ctx.phase = CyclePhase::Starting;
        info!("Starting cycle {}", ctx.identity);

        self.cleanup.run(&ctx.identity).await;

        match self
            .controller
            .up(&self.config.compose_files, &ctx.identity)
            .await
        {
            Ok(state) => ctx.compose_state = Some(state),
            Err(e) => {
                error!("Failed to start {}: {}", ctx.identity, e);
                self.rollback(&ctx.identity).await;
                return Err(e);
            }
        }

        for (services, target) in [
            (&self.config.wait_for_healthy, ServiceStatus::Healthy),
            (&self.config.wait_for_running, ServiceStatus::Running),
        ] {
            if services.is_empty() {
                continue;
            }
            let spec = WaitSpec {
                project: ctx.identity.token().to_string(),
                services: services.clone(),
                target,
                timeout: self.config.timeout,
                poll_interval: self.config.poll_interval,
            };
            let source = self
                .controller
                .status_source(&ctx.identity, &self.config.compose_files);
            ctx.wait_outcomes.push(self.waiter.wait(&source, &spec).await);
        }

        ctx.phase = if ctx.is_degraded() {
            warn!("Continuing {} with services not ready", ctx.identity);
            CyclePhase::Degraded
        } else {
            CyclePhase::Ready
        };

        // 待機後の状態で記録する
        if !ctx.wait_outcomes.is_empty() {
            match self
                .controller
                .service_states(&ctx.identity, &self.config.compose_files)
                .await
            {
                Ok(services) => {
                    if let Some(state) = ctx.compose_state.as_mut() {
                        state.services = services;
                    }
                }
                Err(e) => warn!("Failed to refresh services of {}: {}", ctx.identity, e),
            }
        }

        let request = RecordRequest {
            stack_name: &self.config.stack_name,
            identity: &ctx.identity,
            correlation: ctx.correlation.as_deref(),
        };
        match self
            .recorder
            .record(&request, ctx.compose_state.as_ref())
            .await
        {
            Ok(path) => ctx.state_file = path,
            Err(e) => warn!("Failed to write state file for {}: {}", ctx.identity, e),
        }

        Ok(ctx)
    }

    async fn rollback(&self, identity: &ProjectIdentity) {
        info!("Rolling back {}", identity);
        self.cleanup.run(identity).await;
        self.controller
            .down(identity, &self.config.compose_files)
            .await;
    }

    /// スタックを停止して後片付けする
    ///
    /// 各ステップは前のステップの失敗に関係なく実行される。
    #[tracing::instrument(skip(self, ctx), fields(project = %ctx.identity))]
    pub async fn teardown(&self, ctx: &mut CycleContext) -> TeardownReport {
        ctx.phase = CyclePhase::TearingDown;

        let files = ctx
            .compose_state
            .as_ref()
            .map(|s| s.compose_files.clone())
            .unwrap_or_else(|| self.config.compose_files.clone());

        let down = self.controller.down(&ctx.identity, &files).await;
        let cleanup = self.cleanup.run(&ctx.identity).await;
        let retract = self
            .recorder
            .retract(
                &ctx.identity,
                ctx.state_file.as_deref(),
                ctx.correlation.as_deref(),
            )
            .await;

        let report = TeardownReport {
            project: ctx.identity.token().to_string(),
            down,
            cleanup,
            retract,
        };

        if report.is_clean() {
            info!("Cycle {} torn down", ctx.identity);
        } else {
            warn!(
                "Teardown of {} finished with warnings: {}",
                ctx.identity,
                report.warnings().join("; ")
            );
        }

        ctx.compose_state = None;
        ctx.phase = CyclePhase::Idle;
        report
    }

    /// スタックの中でテストコードを実行する
    ///
    /// ティアダウンはテストコードがエラーを返しても panic しても必ず実行され、
    /// テストコードの結果がそのまま返る（panic は再送出される）。
    pub async fn run_guarded<F, Fut, T, E>(
        &self,
        scope: Scope,
        correlation: Option<&str>,
        f: F,
    ) -> std::result::Result<T, CycleError<E>>
    where
        F: FnOnce(CycleContext) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut ctx = self
            .setup(scope, correlation)
            .await
            .map_err(CycleError::Setup)?;
        ctx.phase = CyclePhase::RunningGuardedCode;

        // future を返す前のクロージャ内の panic も捕捉対象
        let guarded_ctx = ctx.clone();
        let outcome = AssertUnwindSafe(async move { f(guarded_ctx).await })
            .catch_unwind()
            .await;

        self.teardown(&mut ctx).await;

        match outcome {
            Ok(result) => result.map_err(CycleError::Guarded),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// 識別子だけが分かるスタックを停止する（CLI の down 用）
    pub async fn stop_project(&self, identity: &ProjectIdentity) -> (StepReport, CleanupReport) {
        let down = self
            .controller
            .down(identity, &self.config.compose_files)
            .await;
        let cleanup = self.cleanup.run(identity).await;
        (down, cleanup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessOutput;
    use crate::recorder::StateDocument;
    use crate::testing::{FakeClock, ScriptedRunner, ps_line};
    use dockyard_core::MemoryProperties;
    use dockyard_core::properties::keys;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        runner: Arc<ScriptedRunner>,
        props: Arc<MemoryProperties>,
        orchestrator: LifecycleOrchestrator,
    }

    fn harness(runner: ScriptedRunner, configure: impl FnOnce(OrchestrationConfig) -> OrchestrationConfig) -> Harness {
        let dir = TempDir::new().unwrap();
        let compose_file = dir.path().join("compose.yml");
        std::fs::write(&compose_file, "services: {}\n").unwrap();

        let config = OrchestrationConfig::new("database", vec![compose_file])
            .with_build_dir(dir.path().join("build"))
            .with_timing(Duration::from_secs(6), Duration::from_secs(2));
        let config = configure(config);

        let runner = Arc::new(runner);
        let props = Arc::new(MemoryProperties::new());
        let services = LifecycleServices {
            runner: runner.clone(),
            fs: Arc::new(LocalFileSystem),
            clock: Arc::new(FakeClock::new()),
            properties: props.clone(),
        };

        Harness {
            dir,
            runner,
            props,
            orchestrator: LifecycleOrchestrator::new(config, services).unwrap(),
        }
    }

    fn healthy_db() -> ScriptedRunner {
        ScriptedRunner::new().on(
            "ps --all",
            ProcessOutput::ok(ps_line("db", "database", "healthy", &[(5432, 15432)])),
        )
    }

    #[tokio::test]
    async fn test_happy_path_records_state_and_clears_properties() {
        let h = harness(healthy_db(), |c| c.with_wait_for_healthy(vec!["db".into()]));

        let result: std::result::Result<(u16, PathBuf), CycleError<std::io::Error>> = h
            .orchestrator
            .run_guarded(Scope::group("RepositoryIT"), None, |ctx| {
                let props = h.props.clone();
                async move {
                    assert_eq!(ctx.phase, CyclePhase::Ready);
                    assert_eq!(
                        props.get(keys::PROJECT_NAME).as_deref(),
                        Some(ctx.project_name())
                    );
                    let doc = StateDocument::from_properties(&*props).unwrap().unwrap();
                    Ok((doc.port_for("db", 5432).unwrap(), ctx.state_file.unwrap()))
                }
            })
            .await;

        let (port, state_file) = result.unwrap();
        assert_eq!(port, 15432);
        assert_eq!(h.props.get(keys::STATE_FILE), None);
        assert_eq!(h.props.get(keys::PROJECT_NAME), None);
        assert!(state_file.ends_with("database-repositoryit-state.json"));
        assert!(state_file.starts_with(h.dir.path().join("build/dockyard/state")));
        assert!(state_file.exists());

        // cleanup → up → wait → record → down → cleanup
        let up = h.runner.position("up -d").unwrap();
        let down = h.runner.position("down --remove-orphans").unwrap();
        assert!(h.runner.position("--filter name=").unwrap() < up);
        assert!(up < down);
        assert_eq!(h.runner.count("--filter name="), 2);
    }

    #[tokio::test]
    async fn test_missing_compose_file_rolls_back_without_up() {
        let h = harness(ScriptedRunner::new(), |c| {
            let missing = c.compose_files[0].with_file_name("missing.yml");
            let mut c = c;
            c.compose_files.push(missing);
            c
        });

        let err = h
            .orchestrator
            .setup(Scope::group("RepositoryIT"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::ComposeFileNotFound { .. }));
        assert_eq!(h.runner.count("up -d"), 0);
        assert_eq!(h.runner.count("down --remove-orphans"), 1);
        // 事前クリーンアップとロールバック
        assert_eq!(h.runner.count("--filter name="), 2);
        assert_eq!(h.props.get(keys::STATE_FILE), None);
    }

    #[tokio::test]
    async fn test_startup_failure_skips_guarded_code() {
        let h = harness(
            ScriptedRunner::new().fail_on("up -d", 1, "no such image"),
            |c| c,
        );
        let mut ran = false;

        let result: std::result::Result<(), CycleError<std::io::Error>> = h
            .orchestrator
            .run_guarded(Scope::group("RepositoryIT"), None, |_| {
                ran = true;
                async { Ok(()) }
            })
            .await;

        match result {
            Err(CycleError::Setup(LifecycleError::StartupFailed { exit_code, .. })) => {
                assert_eq!(exit_code, Some(1))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!ran);
        assert_eq!(h.runner.count("down --remove-orphans"), 1);
    }

    #[tokio::test]
    async fn test_guarded_error_is_returned_after_teardown() {
        let h = harness(ScriptedRunner::new(), |c| c);

        let result: std::result::Result<(), CycleError<std::io::Error>> = h
            .orchestrator
            .run_guarded(Scope::group("RepositoryIT"), None, |_| async {
                Err(std::io::Error::other("assertion failed"))
            })
            .await;

        match result {
            Err(CycleError::Guarded(e)) => assert_eq!(e.to_string(), "assertion failed"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(h.runner.count("down --remove-orphans"), 1);
        assert_eq!(h.runner.count("container prune"), 2);
        assert_eq!(h.runner.count("ps -aq --filter label="), 2);
    }

    #[tokio::test]
    async fn test_guarded_panic_still_tears_down() {
        let h = harness(ScriptedRunner::new(), |c| c);

        let outcome = AssertUnwindSafe(h.orchestrator.run_guarded(
            Scope::group("RepositoryIT"),
            None,
            |_| async {
                if true {
                    panic!("test body exploded");
                }
                Ok::<(), std::io::Error>(())
            },
        ))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(h.runner.count("down --remove-orphans"), 1);
    }

    #[tokio::test]
    async fn test_panic_before_future_still_tears_down() {
        let h = harness(ScriptedRunner::new(), |c| c);

        let outcome = AssertUnwindSafe(h.orchestrator.run_guarded(
            Scope::group("RepositoryIT"),
            None,
            |_| -> std::future::Ready<std::result::Result<(), std::io::Error>> {
                panic!("fixture setup exploded");
            },
        ))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(h.runner.count("up -d"), 1);
        assert_eq!(h.runner.count("down --remove-orphans"), 1);
        assert_eq!(h.runner.count("ps -aq --filter label="), 2);
    }

    #[tokio::test]
    async fn test_healthy_on_third_poll() {
        let starting = ps_line("db", "database", "starting", &[]);
        let healthy = ps_line("db", "database", "healthy", &[(5432, 15432)]);
        // up 直後の取得 → ポーリング3回
        let runner = ScriptedRunner::new()
            .on("ps --all", ProcessOutput::ok(starting.clone()))
            .on("ps --all", ProcessOutput::ok(starting.clone()))
            .on("ps --all", ProcessOutput::ok(starting))
            .on("ps --all", ProcessOutput::ok(healthy));
        let h = harness(runner, |c| {
            c.with_wait_for_healthy(vec!["db".into()])
                .with_timing(Duration::from_secs(5), Duration::from_secs(1))
        });

        let ctx = h
            .orchestrator
            .setup(Scope::group("RepositoryIT"), None)
            .await
            .unwrap();

        assert_eq!(ctx.phase, CyclePhase::Ready);
        match &ctx.wait_outcomes[..] {
            [WaitOutcome::Satisfied { attempts, elapsed }] => {
                assert_eq!(*attempts, 3);
                assert!(*elapsed >= Duration::from_secs(2));
                assert!(*elapsed < Duration::from_secs(5));
            }
            other => panic!("unexpected outcomes: {:?}", other),
        }
        let db = ctx.compose_state.as_ref().unwrap().service("db").unwrap();
        assert_eq!(db.status, ServiceStatus::Healthy);
    }

    #[tokio::test]
    async fn test_wait_timeout_degrades_but_continues() {
        let runner = ScriptedRunner::new().on(
            "ps --all",
            ProcessOutput::ok(ps_line("db", "database", "starting", &[])),
        );
        let h = harness(runner, |c| {
            c.with_wait_for_healthy(vec!["db".into()])
                .with_wait_for_running(vec!["db".into()])
        });

        let mut ctx = h
            .orchestrator
            .setup(Scope::group("RepositoryIT"), None)
            .await
            .unwrap();

        assert_eq!(ctx.phase, CyclePhase::Degraded);
        assert_eq!(ctx.wait_outcomes.len(), 2);
        assert!(!ctx.wait_outcomes[0].is_satisfied());
        assert!(ctx.wait_outcomes[1].is_satisfied());
        assert!(ctx.state_file.is_some());

        let report = h.orchestrator.teardown(&mut ctx).await;
        assert!(report.is_clean());
        assert_eq!(ctx.phase, CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_teardown_attempts_every_step() {
        let runner = ScriptedRunner::new()
            .fail_on("down --remove-orphans", 1, "daemon gone")
            .fail_on("--filter name=", 1, "daemon gone");
        let h = harness(runner, |c| c);

        let mut ctx = h
            .orchestrator
            .setup(Scope::group("RepositoryIT"), Some("job-1"))
            .await
            .unwrap();
        assert!(h.props.get(keys::STATE_FILE).is_some());

        let report = h.orchestrator.teardown(&mut ctx).await;

        assert!(!report.is_clean());
        assert!(!report.down.is_ok());
        assert!(report.retract.is_ok());
        assert_eq!(report.warnings().len(), 2);
        assert_eq!(h.props.get(keys::STATE_FILE), None);
        assert_eq!(h.runner.count("network prune"), 2);
    }

    #[tokio::test]
    async fn test_method_scope_requires_case() {
        let h = harness(ScriptedRunner::new(), |c| {
            c.with_lifecycle(LifecycleMode::Method)
        });

        let err = h.orchestrator.scope_for("OrderIT", None).unwrap_err();
        assert!(err.is_configuration_error());

        let scope = h
            .orchestrator
            .scope_for("OrderIT", Some("createsOrder"))
            .unwrap();
        assert_eq!(scope.case_name(), Some("createsOrder"));
    }

    #[tokio::test]
    async fn test_concurrent_cycles_get_distinct_identities() {
        let h = harness(ScriptedRunner::new(), |c| c);

        let (a, b) = tokio::join!(
            h.orchestrator.setup(Scope::group("Suite"), Some("a")),
            h.orchestrator.setup(Scope::group("Suite"), Some("b")),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.project_name(), b.project_name());
        assert_ne!(a.state_file, b.state_file);

        let build = h.orchestrator.config().build_dir.clone();
        let found_a = StateDocument::discover(&build, "a").unwrap().unwrap();
        let found_b = StateDocument::discover(&build, "b").unwrap().unwrap();
        assert_eq!(found_a.project_name, a.project_name());
        assert_eq!(found_b.project_name, b.project_name());
    }

    #[test]
    fn test_invalid_config_rejected_before_any_process() {
        let runner = Arc::new(ScriptedRunner::new());
        let services = LifecycleServices {
            runner: runner.clone(),
            fs: Arc::new(LocalFileSystem),
            clock: Arc::new(FakeClock::new()),
            properties: Arc::new(MemoryProperties::new()),
        };

        let err = LifecycleOrchestrator::new(OrchestrationConfig::new("db", vec![]), services)
            .err()
            .unwrap();

        assert!(err.is_configuration_error());
        assert!(runner.calls().is_empty());
    }
}

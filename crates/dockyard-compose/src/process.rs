//! 外部プロセスの実行
//!
//! Compose / Docker CLI の呼び出しはすべてここを通る。各コマンドには上限時間があり、
//! 超過したプロセスは SIGTERM → 猶予 → SIGKILL の順で停止させる。

use async_trait::async_trait;
use dockyard_core::{LifecycleError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// SIGTERM 送信後に終了を待つ時間
const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(3);

/// プロセス終了後に出力パイプを読み切るまでの上限
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 実行するコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// プロセスの実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// シグナルで終了した場合は `None`
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// 診断用に stdout と stderr を結合
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// 外部プロセス実行の抽象
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// コマンドを実行して終了を待つ
    ///
    /// 非ゼロ終了はエラーではなく `ProcessOutput` として返す。
    /// 起動失敗は `CommandSpawn`、上限時間超過は `CommandTimeout`。
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput>;
}

/// 実プロセスを起動するランナー
#[derive(Debug, Clone)]
pub struct SystemProcessRunner {
    kill_grace: Duration,
    drain_timeout: Duration,
}

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self {
            kill_grace: DEFAULT_KILL_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// 子プロセスが残した孫プロセスがパイプを開いたままでも、この時間で読み取りを打ち切る
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!("Running: {}", spec);

        let mut child = cmd.spawn().map_err(|source| LifecycleError::CommandSpawn {
            command: spec.to_string(),
            source,
        })?;

        let stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr = tokio::spawn(read_pipe(child.stderr.take()));

        match timeout(spec.timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                let (stdout, stderr) = tokio::join!(
                    collect_pipe(stdout, self.drain_timeout),
                    collect_pipe(stderr, self.drain_timeout),
                );
                Ok(ProcessOutput {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Err(_) => {
                warn!(
                    "Command timed out after {:?}, terminating: {}",
                    spec.timeout, spec
                );
                terminate(&mut child, self.kill_grace).await;
                Err(LifecycleError::CommandTimeout {
                    command: spec.to_string(),
                    timeout: spec.timeout,
                })
            }
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe
        && let Err(e) = pipe.read_to_end(&mut buf).await
    {
        debug!("Failed to read process output: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect_pipe(mut task: JoinHandle<String>, limit: Duration) -> String {
    match timeout(limit, &mut task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!("Output reader task failed: {}", e);
            String::new()
        }
        Err(_) => {
            warn!(
                "Output pipe still open {:?} after process exit, discarding output",
                limit
            );
            task.abort();
            String::new()
        }
    }
}

/// プロセスをグレースフルに停止する
async fn terminate(child: &mut Child, grace: Duration) {
    // 1. SIGTERM を送信して猶予時間だけ待つ
    if let Some(pid) = child.id()
        && send_sigterm(pid)
    {
        if timeout(grace, child.wait()).await.is_ok() {
            debug!("Process {} exited gracefully", pid);
            return;
        }
        warn!("Grace period elapsed. Killing process {}", pid);
    }

    // 2. 強制終了
    if let Err(e) = child.kill().await {
        debug!("Failed to kill process: {}", e);
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            // 既に終了している
            debug!("Failed to send SIGTERM to {}: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> bool {
    false
}

//! テスト用の決定的なフェイク

use crate::clock::Clock;
use crate::process::{CommandSpec, ProcessOutput, ProcessRunner};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dockyard_core::{LifecycleError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

enum Reply {
    Output(ProcessOutput),
    Timeout,
}

struct Rule {
    pattern: String,
    replies: VecDeque<Reply>,
}

/// コマンドラインの部分一致で応答を返すランナー
///
/// 規則ごとに応答をキューで持ち、最後の応答は繰り返し返す。
/// 一致する規則がなければ空出力の成功を返す。
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, pattern: &str, reply: Reply) {
        let mut rules = self.rules.lock().unwrap();
        if let Some(rule) = rules.iter_mut().find(|r| r.pattern == pattern) {
            rule.replies.push_back(reply);
        } else {
            rules.push(Rule {
                pattern: pattern.to_string(),
                replies: VecDeque::from([reply]),
            });
        }
    }

    pub fn on(self, pattern: &str, output: ProcessOutput) -> Self {
        self.push(pattern, Reply::Output(output));
        self
    }

    pub fn fail_on(self, pattern: &str, exit_code: i32, stderr: &str) -> Self {
        self.on(pattern, ProcessOutput::failed(exit_code, stderr))
    }

    pub fn timeout_on(self, pattern: &str) -> Self {
        self.push(pattern, Reply::Timeout);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.contains(pattern))
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let line = spec.to_string();
        self.calls.lock().unwrap().push(line.clone());

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| line.contains(&r.pattern)) else {
            return Ok(ProcessOutput::ok(""));
        };

        let reply = if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            None
        };
        let reply = reply.as_ref().or(rule.replies.front());

        match reply {
            Some(Reply::Output(output)) => Ok(output.clone()),
            Some(Reply::Timeout) => Err(LifecycleError::CommandTimeout {
                command: line,
                timeout: spec.timeout,
            }),
            None => Ok(ProcessOutput::ok("")),
        }
    }
}

/// sleep で仮想時間だけが進む時計
pub struct FakeClock {
    start: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock().unwrap();
        self.start + chrono::Duration::from_std(offset).unwrap()
    }

    fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// `docker compose ps --format json` の1行
pub fn ps_line(service: &str, project: &str, health: &str, ports: &[(u16, u16)]) -> String {
    let publishers: Vec<serde_json::Value> = ports
        .iter()
        .map(|(target, published)| {
            serde_json::json!({
                "URL": "0.0.0.0",
                "TargetPort": target,
                "PublishedPort": published,
                "Protocol": "tcp",
            })
        })
        .collect();

    serde_json::json!({
        "ID": format!("id-{}", service),
        "Name": format!("{}-{}-1", project, service),
        "Service": service,
        "State": "running",
        "Status": "Up 3 seconds",
        "Health": health,
        "Publishers": publishers,
    })
    .to_string()
}

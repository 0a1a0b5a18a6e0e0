//! 時計の抽象
//!
//! 待機ループやクリーンアップの待ち時間をテストで決定的に進めるために分離している。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

#[async_trait]
pub trait Clock: Send + Sync {
    /// 現在時刻（識別子とタイムスタンプ用）
    fn now(&self) -> DateTime<Utc>;

    /// 時計の生成からの経過時間（単調増加）
    fn elapsed(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// 実時間の時計
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

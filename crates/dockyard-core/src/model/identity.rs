//! プロジェクト識別子とライフサイクル粒度

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

/// タイムスタンプ接尾辞の書式（ミリ秒まで）
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// サニタイズ後に空になった名前の代替
const FALLBACK_NAME: &str = "stack";

/// スタックを共有する粒度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleMode {
    /// テストグループ（クラス）単位で1スタック
    #[default]
    Class,
    /// テストケース（メソッド）ごとに1スタック
    Method,
}

impl LifecycleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleMode::Class => "class",
            LifecycleMode::Method => "method",
        }
    }
}

impl std::fmt::Display for LifecycleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "class" | "suite" => Ok(LifecycleMode::Class),
            "method" | "test" => Ok(LifecycleMode::Method),
            other => Err(format!("不明なライフサイクル: '{}'", other)),
        }
    }
}

/// 1サイクルが対象とする範囲
///
/// 識別子と状態ファイル名の決め方だけが変わり、オーケストレーションの手順は同じ。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Group { group: String },
    GroupAndCase { group: String, case: String },
}

impl Scope {
    pub fn group(group: impl Into<String>) -> Self {
        Scope::Group {
            group: group.into(),
        }
    }

    pub fn group_and_case(group: impl Into<String>, case: impl Into<String>) -> Self {
        Scope::GroupAndCase {
            group: group.into(),
            case: case.into(),
        }
    }

    pub fn group_name(&self) -> &str {
        match self {
            Scope::Group { group } | Scope::GroupAndCase { group, .. } => group,
        }
    }

    pub fn case_name(&self) -> Option<&str> {
        match self {
            Scope::Group { .. } => None,
            Scope::GroupAndCase { case, .. } => Some(case),
        }
    }

    pub fn mode(&self) -> LifecycleMode {
        match self {
            Scope::Group { .. } => LifecycleMode::Class,
            Scope::GroupAndCase { .. } => LifecycleMode::Method,
        }
    }
}

/// 1サイクル分のスタックを隔離する一意なプロジェクト名
///
/// トークンは常に `^[a-z0-9][a-z0-9_-]*$` に一致する（Composeのプロジェクト名規則）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectIdentity {
    base: String,
    scope: Scope,
    created_at: DateTime<Utc>,
    token: String,
}

impl ProjectIdentity {
    pub fn new(base: &str, scope: Scope, created_at: DateTime<Utc>) -> Self {
        let mut parts = vec![sanitize_name(base), sanitize_name(scope.group_name())];
        if let Some(case) = scope.case_name() {
            parts.push(sanitize_name(case));
        }
        parts.push(created_at.format(TIMESTAMP_FORMAT).to_string());

        Self {
            base: base.to_string(),
            scope,
            created_at,
            token: parts.join("-"),
        }
    }

    /// 現在時刻から識別子を発行する
    ///
    /// 同一プロセス内で同じミリ秒に複数発行された場合は1ミリ秒ずつ進めるため、
    /// 返されるトークンは互いに重複しない。
    pub fn generate(base: &str, scope: Scope, now: DateTime<Utc>) -> Self {
        static LAST_ISSUED: AtomicI64 = AtomicI64::new(i64::MIN);

        let requested = now.timestamp_millis();
        let mut last = LAST_ISSUED.load(Ordering::SeqCst);
        let issued = loop {
            let candidate = requested.max(last.saturating_add(1));
            match LAST_ISSUED.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break candidate,
                Err(current) => last = current,
            }
        };

        let created_at = DateTime::from_timestamp_millis(issued).unwrap_or(now);
        Self::new(base, scope, created_at)
    }

    /// 既存のプロジェクト名から識別子を復元（CLIの down / cleanup 用）
    ///
    /// 名前はサニタイズされるだけで、タイムスタンプは付与しない。
    pub fn from_token(token: &str) -> Self {
        let token = sanitize_name(token);
        Self {
            base: token.clone(),
            scope: Scope::group(token.clone()),
            created_at: Utc::now(),
            token,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl std::fmt::Display for ProjectIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token)
    }
}

/// 名前を Compose のプロジェクト名として使える形に変換
///
/// 例: "My Test!!" -> "my-test"
pub fn sanitize_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
            c
        } else {
            '-'
        };
        // 連続するハイフンは1つにまとめる
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out
        .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
        .trim_end_matches(['-', '_']);

    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

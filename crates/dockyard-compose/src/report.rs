//! ティアダウン系の処理結果
//!
//! ティアダウンとクリーンアップの失敗は呼び出し元へエラーとして返さず、
//! 警告として集約する。

/// 1ステップの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: String,
    /// 失敗時の理由
    pub error: Option<String>,
}

impl StepReport {
    pub fn ok(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            error: None,
        }
    }

    pub fn failed(step: impl Into<String>, error: impl ToString) -> Self {
        Self {
            step: step.into(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 失敗していれば "step: reason" 形式の警告文
    pub fn warning(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| format!("{}: {}", self.step, e))
    }
}

/// 失敗したステップの警告をまとめる
pub(crate) fn collect_warnings<'a>(steps: impl IntoIterator<Item = &'a StepReport>) -> Vec<String> {
    steps.into_iter().filter_map(StepReport::warning).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_warnings_skips_successful_steps() {
        let steps = [
            StepReport::ok("down"),
            StepReport::failed("cleanup:name-pattern", "exit 1"),
        ];

        assert_eq!(
            collect_warnings(&steps),
            vec!["cleanup:name-pattern: exit 1".to_string()]
        );
    }
}

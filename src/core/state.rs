//! 步骤状态机
//!
//! Pending -> Running{attempt} -> Succeeded | Failed{retryable} | TimedOut；
//! 可重试失败回到 Running；条件不满足时 Pending -> Skipped；全局截止时间到达时 Pending/Running -> Cancelled。

use serde::{Deserialize, Serialize};

/// 单个步骤的执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running { attempt: u32 },
    Succeeded,
    Failed { retryable: bool },
    TimedOut,
    Skipped,
    Cancelled,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running { .. })
    }

    /// 是否使回复降级（Skipped 不算）
    pub fn is_degrading(&self) -> bool {
        matches!(
            self,
            StepState::Failed { .. } | StepState::TimedOut | StepState::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running { .. } => "running",
            StepState::Succeeded => "succeeded",
            StepState::Failed { .. } => "failed",
            StepState::TimedOut => "timed_out",
            StepState::Skipped => "skipped",
            StepState::Cancelled => "cancelled",
        }
    }

    /// 状态迁移是否合法
    pub fn can_transition_to(&self, next: &StepState) -> bool {
        use StepState::*;
        match (self, next) {
            (Pending, Running { attempt: 1 }) => true,
            (Pending, Skipped) | (Pending, Cancelled) => true,
            (Running { attempt: a }, Running { attempt: b }) => *b == a + 1,
            (Running { .. }, Succeeded)
            | (Running { .. }, Failed { .. })
            | (Running { .. }, TimedOut)
            | (Running { .. }, Cancelled) => true,
            _ => false,
        }
    }
}

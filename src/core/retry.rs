//! 专家调用的重试策略：有界重试 + 指数退避（封顶）
//!
//! mock 模式不退避；live 模式的退避时间不会越过全局截止时间。

use std::time::Duration;

use tokio::time::Instant;

use crate::agents::AgentResult;
use crate::config::OrchestratorSection;

/// 指数退避参数
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Backoff {
    /// 第 attempt 次失败后的等待时间（attempt 从 1 开始）
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = self.initial.as_millis() as f64 * self.multiplier.max(1.0).powi(exp);
        let capped = ms.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大重试次数；总尝试次数 = retry_bound + 1
    pub retry_bound: u32,
    /// None 表示不退避（mock 模式）
    pub backoff: Option<Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_bound: 2,
            backoff: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(retry_bound: u32) -> Self {
        Self {
            retry_bound,
            backoff: None,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// live 为 false（mock 模式）时不退避
    pub fn from_config(cfg: &OrchestratorSection, live: bool) -> Self {
        let policy = Self::new(cfg.retry_bound);
        if live {
            policy.with_backoff(Backoff {
                initial: Duration::from_millis(cfg.initial_backoff_ms),
                max: Duration::from_millis(cfg.max_backoff_ms),
                multiplier: cfg.backoff_multiplier,
            })
        } else {
            policy
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_bound.saturating_add(1)
    }

    /// 只有可重试失败且还有预算时才重试；Timeout 不重试
    pub fn should_retry(&self, result: &AgentResult, attempt: u32) -> bool {
        matches!(result, AgentResult::Failure { retryable: true, .. }) && attempt < self.max_attempts()
    }

    /// 下一次尝试前的等待；退避会越过截止时间时返回 None
    pub fn delay_before_next(&self, attempt: u32, deadline: Instant) -> Option<Duration> {
        let delay = self
            .backoff
            .as_ref()
            .map_or(Duration::ZERO, |b| b.delay(attempt));
        Instant::now()
            .checked_add(delay)
            .is_some_and(|at| at < deadline)
            .then_some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_exponential_and_capped() {
        let b = backoff();
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(400));
        assert_eq!(b.delay(4), Duration::from_millis(500));
        assert_eq!(b.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_retry_only_retryable_failures() {
        let policy = RetryPolicy::new(2);
        assert_eq!(policy.max_attempts(), 3);
        let retryable = AgentResult::failure("503", true);
        assert!(policy.should_retry(&retryable, 1));
        assert!(policy.should_retry(&retryable, 2));
        assert!(!policy.should_retry(&retryable, 3));
        assert!(!policy.should_retry(&AgentResult::failure("bad input", false), 1));
        assert!(!policy.should_retry(&AgentResult::Timeout, 1));
    }

    #[test]
    fn test_mock_mode_has_no_backoff() {
        let cfg = OrchestratorSection::default();
        assert_eq!(RetryPolicy::from_config(&cfg, false).backoff, None);
        assert!(RetryPolicy::from_config(&cfg, true).backoff.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_never_outlives_deadline() {
        let policy = RetryPolicy::new(5).with_backoff(backoff());
        let deadline = Instant::now() + Duration::from_millis(150);
        assert_eq!(
            policy.delay_before_next(1, deadline),
            Some(Duration::from_millis(100))
        );
        assert_eq!(policy.delay_before_next(2, deadline), None);
    }
}

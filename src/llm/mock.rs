//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 原样返回最后一条 User 消息，润色结果即输入本身；`failing()` 变体总是返回传输错误。

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient {
    fail: bool,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次调用都失败，用于验证回退路径
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if self.fail {
            return Err(LlmError::Transport("mock transport failure".to_string()));
        }
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echoes_last_user_message() {
        let llm = MockLlmClient::new();
        let out = llm
            .complete(&[
                Message::system("be brief"),
                Message::user("first"),
                Message::user("second"),
            ])
            .await
            .unwrap();
        assert_eq!(out, "second");
    }

    #[tokio::test]
    async fn test_failing_is_retryable() {
        let err = MockLlmClient::failing()
            .complete(&[Message::user("x")])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}

//! LLM 客户端抽象
//!
//! 专家用它把收集到的事实组织成回复，编排器用它润色最终答复；两处都在出错时退回确定性文本。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 网络 / 限流 / 服务端错误，可重试
    #[error("LLM request failed: {0}")]
    Transport(String),
    /// 请求构造失败，重试无意义
    #[error("invalid LLM request: {0}")]
    InvalidRequest(String),
    #[error("LLM returned an empty completion")]
    EmptyResponse,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Transport(_) | LlmError::EmptyResponse)
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 用于日志与 /api/agents
    fn name(&self) -> &str;
}

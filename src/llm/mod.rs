//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};

use crate::config::LlmSection;

/// 按配置创建 LLM；mock 或缺少 OPENAI_API_KEY 时返回 None（专家走确定性模板）
pub fn create_llm_from_config(cfg: &LlmSection) -> Option<Arc<dyn LlmClient>> {
    let provider = cfg.provider.to_lowercase();
    if provider != "openai" {
        tracing::info!(provider = %provider, "Using mock mode (deterministic replies)");
        return None;
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => {
            tracing::info!("Using OpenAI LLM ({})", cfg.model);
            Some(Arc::new(OpenAiClient::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                &key,
            )))
        }
        _ => {
            tracing::warn!("provider = openai but OPENAI_API_KEY is not set, using mock mode");
            None
        }
    }
}

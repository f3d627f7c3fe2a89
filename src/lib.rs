//! CareCrew - 多智能体客服编排
//!
//! 模块划分：
//! - **agents**: 专家 Agent（订单、技术支持、产品、解决方案）与 mock 目录数据
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器、计划执行、重试、步骤状态机、回复合成
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话记忆、实体抽取、上下文快照
//! - **observability**: 日志初始化
//! - **planning**: 意图识别、计划生成与校验

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planning;

pub use crate::core::{ChatReply, ChatRequest, Orchestrator, OrchestratorBuilder, SynthesizedResponse};

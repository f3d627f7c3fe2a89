//! 专家 Agent：订单、技术支持、产品、解决方案
//!
//! 编排器只通过 [`SpecialistAgent::handle`] 调用专家，按 [`AgentKind`] 从 [`AgentRoster`] 取槽位，
//! 从不对具体类型做分支。专家无状态；有 LLM 时让模型组织措辞，否则输出确定性模板。

pub mod catalog;
pub mod order;
pub mod product;
pub mod solutions;
pub mod tech_support;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{ContextPayload, EntityKind, EntityMap, Message};
use crate::planning::StepId;

pub use order::OrderAgent;
pub use product::ProductAgent;
pub use solutions::SolutionsAgent;
pub use tech_support::TechSupportAgent;

/// 专家类型；声明顺序即调用优先级（Order > TechSupport > Product > Solutions）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Order,
    TechSupport,
    Product,
    Solutions,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Order,
        AgentKind::TechSupport,
        AgentKind::Product,
        AgentKind::Solutions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Order => "order",
            AgentKind::TechSupport => "tech_support",
            AgentKind::Product => "product",
            AgentKind::Solutions => "solutions",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentKind::Order => "Order lookup, tracking, warranty status and return eligibility",
            AgentKind::TechSupport => "Hardware and software troubleshooting",
            AgentKind::Product => "Specifications, comparisons, recommendations and availability",
            AgentKind::Solutions => "Returns, exchanges, compensation and issue resolution",
        }
    }

    /// 该专家关心的实体类型
    pub fn relevant_entities(&self) -> &'static [EntityKind] {
        match self {
            AgentKind::Order => &[EntityKind::OrderNumber, EntityKind::Product],
            AgentKind::TechSupport => &[EntityKind::Issue, EntityKind::Product, EntityKind::OrderNumber],
            AgentKind::Product => &[EntityKind::Product],
            AgentKind::Solutions => &[EntityKind::OrderNumber, EntityKind::Issue, EntityKind::Product],
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单步任务：指令 + 原始请求 + 相关实体
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskPayload {
    pub instruction: String,
    pub request: String,
    pub entities: EntityMap,
}

impl TaskPayload {
    /// 先看任务自带实体，再看会话快照
    pub fn entity<'a>(&'a self, ctx: &'a StepContext, kind: EntityKind) -> Option<&'a str> {
        self.entities
            .first(kind)
            .or_else(|| ctx.session.entities.first(kind))
    }
}

/// 专家成功时的输出
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentPayload {
    pub agent: AgentKind,
    /// 面向客户的文本
    pub text: String,
    pub tools_used: Vec<String>,
    pub confidence: f32,
}

/// 一次专家调用的结果
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AgentResult {
    Success { payload: AgentPayload },
    Failure { reason: String, retryable: bool },
    Timeout,
}

impl AgentResult {
    pub fn success(payload: AgentPayload) -> Self {
        AgentResult::Success { payload }
    }

    pub fn failure(reason: impl Into<String>, retryable: bool) -> Self {
        AgentResult::Failure {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AgentResult::Success { .. })
    }

    pub fn payload(&self) -> Option<&AgentPayload> {
        match self {
            AgentResult::Success { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            AgentResult::Success { .. } => "success",
            AgentResult::Failure { .. } => "failure",
            AgentResult::Timeout => "timeout",
        }
    }
}

/// 依赖步骤的成功输出
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriorOutput {
    pub step: StepId,
    pub payload: AgentPayload,
}

/// 传给专家的只读上下文：会话快照 + 依赖步骤输出
#[derive(Clone, Debug, Default)]
pub struct StepContext {
    pub session: ContextPayload,
    pub prior: Vec<PriorOutput>,
}

impl StepContext {
    pub fn new(session: ContextPayload) -> Self {
        Self {
            session,
            prior: Vec::new(),
        }
    }

    pub fn prior_from(&self, agent: AgentKind) -> Option<&AgentPayload> {
        self.prior
            .iter()
            .map(|p| &p.payload)
            .find(|p| p.agent == agent)
    }
}

/// 专家内部错误，转换为 AgentResult::Failure
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("{0}")]
    Internal(String),
}

impl From<AgentError> for AgentResult {
    fn from(err: AgentError) -> Self {
        let retryable = match &err {
            AgentError::Llm(e) => e.is_retryable(),
            AgentError::Internal(_) => false,
        };
        AgentResult::failure(err.to_string(), retryable)
    }
}

/// 专家能力接口
#[async_trait]
pub trait SpecialistAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// deadline 仅供参考；执行器会在到期时中止调用
    async fn handle(&self, task: &TaskPayload, ctx: &StepContext, deadline: Instant) -> AgentResult;
}

/// 每种 AgentKind 一个槽位
#[derive(Clone)]
pub struct AgentRoster {
    order: Arc<dyn SpecialistAgent>,
    tech_support: Arc<dyn SpecialistAgent>,
    product: Arc<dyn SpecialistAgent>,
    solutions: Arc<dyn SpecialistAgent>,
}

impl AgentRoster {
    /// 内置四个专家；llm 为 None 时走确定性模板
    pub fn builtin(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            order: Arc::new(OrderAgent::new(llm.clone())),
            tech_support: Arc::new(TechSupportAgent::new(llm.clone())),
            product: Arc::new(ProductAgent::new(llm.clone())),
            solutions: Arc::new(SolutionsAgent::new(llm)),
        }
    }

    pub fn get(&self, kind: AgentKind) -> Arc<dyn SpecialistAgent> {
        let slot = match kind {
            AgentKind::Order => &self.order,
            AgentKind::TechSupport => &self.tech_support,
            AgentKind::Product => &self.product,
            AgentKind::Solutions => &self.solutions,
        };
        Arc::clone(slot)
    }

    /// 替换某个槽位（测试注入失败 / 慢 / panic 的专家）
    pub fn with(mut self, kind: AgentKind, agent: Arc<dyn SpecialistAgent>) -> Self {
        let slot = match kind {
            AgentKind::Order => &mut self.order,
            AgentKind::TechSupport => &mut self.tech_support,
            AgentKind::Product => &mut self.product,
            AgentKind::Solutions => &mut self.solutions,
        };
        *slot = agent;
        self
    }
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self::builtin(None)
    }
}

/// 把专家收集到的事实交给 LLM 组织成回复；没有 LLM 时原样返回
pub(crate) async fn phrase(
    llm: Option<&Arc<dyn LlmClient>>,
    kind: AgentKind,
    request: &str,
    facts: String,
) -> Result<String, AgentError> {
    let Some(llm) = llm else {
        return Ok(facts);
    };
    let messages = [
        Message::system(format!(
            "You are the {} specialist of a customer care team ({}). \
             Answer the customer using only the facts provided. Be concise and friendly.",
            kind,
            kind.description()
        )),
        Message::user(format!(
            "Customer request: {}\n\nFacts:\n{}",
            request, facts
        )),
    ];
    Ok(llm.complete(&messages).await?)
}

/// 把列表格式化为编号步骤
pub(crate) fn numbered(items: &[&str]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_priority_order() {
        let mut kinds = vec![
            AgentKind::Solutions,
            AgentKind::Product,
            AgentKind::Order,
            AgentKind::TechSupport,
        ];
        kinds.sort();
        assert_eq!(kinds, AgentKind::ALL.to_vec());
    }

    #[test]
    fn test_agent_kind_serde() {
        let json = serde_json::to_string(&AgentKind::TechSupport).unwrap();
        assert_eq!(json, "\"tech_support\"");
        let back: AgentKind = serde_json::from_str("\"solutions\"").unwrap();
        assert_eq!(back, AgentKind::Solutions);
    }

    #[test]
    fn test_roster_slots_match_kind() {
        let roster = AgentRoster::default();
        for kind in AgentKind::ALL {
            assert_eq!(roster.get(kind).kind(), kind);
        }
    }

    #[test]
    fn test_llm_error_maps_to_retryable_failure() {
        let result: AgentResult = AgentError::from(LlmError::Transport("503".into())).into();
        assert!(matches!(result, AgentResult::Failure { retryable: true, .. }));
        let result: AgentResult = AgentError::Internal("bad".into()).into();
        assert!(matches!(result, AgentResult::Failure { retryable: false, .. }));
    }

    #[tokio::test]
    async fn test_phrase_without_llm_returns_facts() {
        let out = phrase(None, AgentKind::Order, "hi", "facts".to_string())
            .await
            .unwrap();
        assert_eq!(out, "facts");

        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::failing());
        let err = phrase(Some(&llm), AgentKind::Order, "hi", "facts".to_string()).await;
        assert!(matches!(err, Err(AgentError::Llm(_))));
    }
}

//! 回复合成：按计划顺序拼接成功输出，补充缺口说明，必要时交给 LLM 润色

use std::sync::Arc;

use tokio::time::{timeout_at, Instant};

use super::executor::PlanOutcome;
use super::state::StepState;
use crate::agents::AgentKind;
use crate::llm::LlmClient;
use crate::memory::Message;

/// 没有任何专家成功时的固定回复
pub const FALLBACK_APOLOGY: &str = "I apologize, but I'm having trouble processing your request right now. Please try again or contact our support team directly.";

/// 超过全局截止时间时追加在回复末尾
pub const DEADLINE_QUALIFIER: &str = "Some parts of your request took longer than expected, so this answer may be incomplete. Feel free to ask again and I'll pick up where we left off.";

/// 合成回复自身的置信度上限
const SYNTHESIS_CONFIDENCE: f32 = 0.7;
/// 兜底回复的置信度
const FALLBACK_CONFIDENCE: f32 = 0.3;

const SYNTHESIS_PROMPT: &str = "You are a customer service representative. The user message contains a draft reply \
assembled from several specialists. Rewrite it as one coherent reply that keeps every fact \
(order numbers, product names, steps, options) and flows naturally. Reply with the rewritten text only.";

/// 某个专家没能给出结果时的简短说明
fn gap_note(agent: AgentKind) -> &'static str {
    match agent {
        AgentKind::Order => "I couldn't retrieve your order details just now.",
        AgentKind::TechSupport => "I couldn't load troubleshooting guidance just now.",
        AgentKind::Product => "I couldn't look up product information just now.",
        AgentKind::Solutions => "I couldn't prepare resolution options just now.",
    }
}

/// 合成器；llm 为 None 时只做确定性拼接
pub struct Synthesizer {
    llm: Option<Arc<dyn LlmClient>>,
}

impl Synthesizer {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    /// 整体置信度：min(合成上限, 最好的步骤置信度)；没有成功步骤时为兜底值
    pub fn confidence(&self, outcome: &PlanOutcome) -> f32 {
        outcome
            .best_confidence()
            .map_or(FALLBACK_CONFIDENCE, |best| best.min(SYNTHESIS_CONFIDENCE))
    }

    /// 确定性拼接（不含截止说明）
    pub fn compose(&self, outcome: &PlanOutcome) -> String {
        let parts: Vec<&str> = outcome
            .succeeded()
            .filter_map(|r| r.result.payload())
            .map(|p| p.text.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if parts.is_empty() {
            return FALLBACK_APOLOGY.to_string();
        }

        let mut reply = parts.join("\n\n");
        let mut noted = Vec::new();
        for trace in &outcome.trace {
            let missing = matches!(trace.status, StepState::Failed { .. } | StepState::TimedOut);
            if missing && !noted.contains(&trace.agent) {
                noted.push(trace.agent);
            }
        }
        if !noted.is_empty() {
            let notes: Vec<&str> = noted.into_iter().map(gap_note).collect();
            reply.push_str("\n\n");
            reply.push_str(&notes.join(" "));
        }
        reply
    }

    /// 完整合成：拼接 -> 润色（仅有 LLM 且有成功输出时）-> 截止说明
    pub async fn synthesize(&self, user_message: &str, outcome: &PlanOutcome, deadline: Instant) -> String {
        let composed = self.compose(outcome);
        let mut reply = if outcome.succeeded().next().is_some() {
            self.polish(user_message, composed, deadline).await
        } else {
            composed
        };
        if outcome.deadline_exceeded {
            reply.push_str("\n\n");
            reply.push_str(DEADLINE_QUALIFIER);
        }
        reply
    }

    /// 润色失败、超时或返回空文本时保留原文
    async fn polish(&self, user_message: &str, composed: String, deadline: Instant) -> String {
        let Some(llm) = &self.llm else {
            return composed;
        };
        if Instant::now() >= deadline {
            return composed;
        }
        let messages = [
            Message::system(format!("{}\n\nCustomer request: {}", SYNTHESIS_PROMPT, user_message)),
            Message::user(composed.clone()),
        ];
        match timeout_at(deadline, llm.complete(&messages)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) => composed,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "polish failed, keeping composed reply");
                composed
            }
            Err(_) => {
                tracing::warn!("polish hit the deadline, keeping composed reply");
                composed
            }
        }
    }
}

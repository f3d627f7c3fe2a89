//! 技术支持专家：识别故障与设备，给出知识库排查步骤与升级建议

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use super::catalog;
use super::{contains_any, numbered, phrase, AgentKind, AgentPayload, AgentResult, SpecialistAgent, StepContext, TaskPayload};
use crate::llm::LlmClient;
use crate::memory::entities::normalize;
use crate::memory::EntityKind;

/// 关键词 -> 知识库条目（按顺序匹配）
const ISSUE_KEYWORDS: &[(&str, &str)] = &[
    ("won't turn on", "laptop_wont_turn_on"),
    ("not turning on", "laptop_wont_turn_on"),
    ("power", "laptop_wont_turn_on"),
    ("battery", "laptop_wont_turn_on"),
    ("charging", "laptop_wont_turn_on"),
    ("overheating", "laptop_overheating"),
    ("hot", "laptop_overheating"),
    ("heating", "laptop_overheating"),
    ("slow", "slow_performance"),
    ("performance", "slow_performance"),
    ("lag", "slow_performance"),
    ("freeze", "slow_performance"),
    ("wifi", "wifi_issues"),
    ("internet", "wifi_issues"),
    ("network", "wifi_issues"),
    ("connection", "wifi_issues"),
    ("screen", "screen_issues"),
    ("display", "screen_issues"),
    ("monitor", "screen_issues"),
];

const COMPLEX_WORDS: &[&str] = &[
    "blue screen", "bsod", "kernel", "driver", "firmware", "boot", "crash", "error code",
];

pub struct TechSupportAgent {
    llm: Option<Arc<dyn LlmClient>>,
}

impl TechSupportAgent {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    fn issue_key(lower: &str, ctx: &StepContext) -> Option<&'static str> {
        let from_text = |t: &str| {
            ISSUE_KEYWORDS
                .iter()
                .find(|(kw, _)| t.contains(kw))
                .map(|(_, key)| *key)
        };
        from_text(lower).or_else(|| {
            ctx.session
                .entities
                .values(EntityKind::Issue)
                .find_map(from_text)
        })
    }

    /// 设备名：消息中的产品 > 订单里的产品 > "laptop"
    fn device(task: &TaskPayload, ctx: &StepContext) -> String {
        if let Some(product) = task.entity(ctx, EntityKind::Product) {
            return product.to_string();
        }
        task.entity(ctx, EntityKind::OrderNumber)
            .and_then(catalog::find_order)
            .and_then(|o| catalog::find_product(o.product_id))
            .map(|p| p.name.to_string())
            .unwrap_or_else(|| "laptop".to_string())
    }
}

#[async_trait]
impl SpecialistAgent for TechSupportAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::TechSupport
    }

    async fn handle(&self, task: &TaskPayload, ctx: &StepContext, _deadline: Instant) -> AgentResult {
        let lower = normalize(&task.request);
        let device = Self::device(task, ctx);
        let mut tools_used = vec!["knowledge_base_search".to_string()];

        let (facts, confidence) = match Self::issue_key(&lower, ctx) {
            Some(key) => {
                let mut text = format!(
                    "For your {}, please try these troubleshooting steps:\n{}",
                    device,
                    numbered(catalog::troubleshooting_steps(key))
                );
                if contains_any(&lower, COMPLEX_WORDS) {
                    tools_used.push("escalation_check".to_string());
                    text.push_str(&format!(
                        "\nThis may need a technician. Please escalate if: {}.",
                        catalog::ESCALATION_SIGNS.join("; ")
                    ));
                } else {
                    text.push_str("\nIf the problem persists after these steps, we can arrange a repair.");
                }
                (text, 0.85)
            }
            None => (
                format!(
                    "Let's troubleshoot your {} step by step:\n{}",
                    device,
                    numbered(catalog::GENERAL_STEPS)
                ),
                0.5,
            ),
        };

        match phrase(self.llm.as_ref(), self.kind(), &task.request, facts).await {
            Ok(text) => AgentResult::success(AgentPayload {
                agent: self.kind(),
                text,
                tools_used,
                confidence,
            }),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::EntityExtractor;

    fn task(text: &str) -> TaskPayload {
        TaskPayload {
            instruction: "Provide technical assistance".to_string(),
            request: text.to_string(),
            entities: EntityExtractor::extract(text),
        }
    }

    #[tokio::test]
    async fn test_wont_turn_on_uses_power_steps() {
        let agent = TechSupportAgent::new(None);
        let result = agent
            .handle(&task("My laptop order #12345 won't turn on"), &StepContext::default(), Instant::now())
            .await;
        let text = &result.payload().unwrap().text;
        assert!(text.contains("TechBook Pro 15"));
        assert!(text.contains("power adapter"));
    }

    #[tokio::test]
    async fn test_unknown_issue_gets_general_steps() {
        let agent = TechSupportAgent::new(None);
        let result = agent
            .handle(&task("something is weird"), &StepContext::default(), Instant::now())
            .await;
        let payload = result.payload().unwrap();
        assert!(payload.text.contains("Restart the device"));
        assert!(payload.confidence < 0.6);
    }

    #[tokio::test]
    async fn test_complex_issue_suggests_escalation() {
        let agent = TechSupportAgent::new(None);
        let result = agent
            .handle(&task("blue screen crash when the screen wakes"), &StepContext::default(), Instant::now())
            .await;
        assert!(result.payload().unwrap().text.contains("technician"));
    }
}

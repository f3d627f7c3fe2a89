//! 解决方案专家：退货、换货、补偿、保修索赔与一般问题处理
//!
//! 依赖前序步骤：有技术支持输出时按"产品质量"给出方案，有订单时结合订单的保修与退货资格。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use super::catalog::{self, EXCHANGE_POLICY, RETURN_POLICY};
use super::order::return_reason;
use super::{contains_any, numbered, phrase, AgentKind, AgentPayload, AgentResult, SpecialistAgent, StepContext, TaskPayload};
use crate::llm::LlmClient;
use crate::memory::entities::normalize;
use crate::memory::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolutionType {
    Return,
    Exchange,
    Compensation,
    WarrantyClaim,
    General,
}

impl SolutionType {
    fn classify(lower: &str) -> Self {
        if contains_any(lower, &["return", "send back", "give back"]) {
            SolutionType::Return
        } else if contains_any(lower, &["exchange", "swap", "replace with"]) {
            SolutionType::Exchange
        } else if contains_any(lower, &["refund", "money back", "compensation", "credit"]) {
            SolutionType::Compensation
        } else if contains_any(lower, &["warranty", "repair", "covered"]) {
            SolutionType::WarrantyClaim
        } else {
            SolutionType::General
        }
    }
}

pub struct SolutionsAgent {
    llm: Option<Arc<dyn LlmClient>>,
}

impl SolutionsAgent {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    fn return_options(lower: &str) -> String {
        let reason = return_reason(lower);
        let free = RETURN_POLICY.free_return_reasons.contains(&reason);
        let fee = if free {
            "no restocking fee applies".to_string()
        } else {
            format!("a {:.0}% restocking fee applies", RETURN_POLICY.restocking_fee * 100.0)
        };
        format!(
            "You can return the item within {} days of purchase; for this reason ({}) {}. Here's how:\n{}",
            RETURN_POLICY.period_days,
            reason,
            fee,
            numbered(RETURN_POLICY.process)
        )
    }

    fn exchange_options() -> String {
        format!(
            "Exchanges are available within {} days for a ${:.0} fee, within the same product category (price difference applies).",
            EXCHANGE_POLICY.period_days, EXCHANGE_POLICY.fee
        )
    }

    fn compensation(lower: &str) -> String {
        let offer = if contains_any(lower, &["terrible", "awful", "horrible", "worst", "never again"]) {
            "a full refund plus $100 in additional compensation"
        } else if contains_any(lower, &["frustrated", "disappointed", "upset", "annoyed", "unacceptable"]) {
            "a $50 partial refund or equivalent store credit"
        } else {
            "$25 in store credit for the inconvenience"
        };
        format!("I'm sorry for the trouble. We can offer {}.", offer)
    }

    fn warranty_claim(order_years: Option<u32>) -> String {
        let coverage = catalog::warranty_coverage(order_years.unwrap_or(2)).join(", ");
        format!(
            "Your warranty covers {}. To file a claim:\n{}",
            coverage,
            numbered(catalog::WARRANTY_PROCESS)
        )
    }

    fn issue_category(lower: &str, ctx: &StepContext) -> &'static str {
        if contains_any(lower, &["delivery", "shipping", "late", "delayed"]) {
            "delivery_delay"
        } else if contains_any(lower, &["bill", "charge", "payment"]) {
            "billing_issue"
        } else if ctx.prior_from(AgentKind::TechSupport).is_some()
            || ctx.session.entities.has(EntityKind::Issue)
            || contains_any(lower, &["quality", "defective", "broken", "poor", "won't turn on"])
        {
            "product_quality"
        } else {
            "service_issue"
        }
    }
}

#[async_trait]
impl SpecialistAgent for SolutionsAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Solutions
    }

    async fn handle(&self, task: &TaskPayload, ctx: &StepContext, _deadline: Instant) -> AgentResult {
        let lower = normalize(&task.request);
        let order = task
            .entity(ctx, EntityKind::OrderNumber)
            .and_then(catalog::find_order);
        let solution_type = SolutionType::classify(&lower);

        let (mut facts, tool) = match solution_type {
            SolutionType::Return => (Self::return_options(&lower), "return_policy_lookup"),
            SolutionType::Exchange => (Self::exchange_options(), "exchange_policy_lookup"),
            SolutionType::Compensation => (Self::compensation(&lower), "compensation_assessment"),
            SolutionType::WarrantyClaim => (
                Self::warranty_claim(order.map(|o| o.warranty_years)),
                "warranty_policy_lookup",
            ),
            SolutionType::General => {
                let category = Self::issue_category(&lower, ctx);
                let lead = if ctx.prior_from(AgentKind::TechSupport).is_some() {
                    "If those steps don't fix it, here are your options:"
                } else {
                    "Here are the options we can offer:"
                };
                (
                    format!(
                        "{}\n{}",
                        lead,
                        catalog::resolution_options(category)
                            .iter()
                            .map(|o| format!("- {}", o))
                            .collect::<Vec<_>>()
                            .join("\n")
                    ),
                    "resolution_planning",
                )
            }
        };

        if let Some(o) = order {
            if solution_type == SolutionType::General {
                let warranty_active = catalog::days_until(o.warranty_expires).is_some_and(|d| d > 0);
                if warranty_active {
                    facts.push_str(&format!(
                        "\nOrder #{} is still under warranty, so a repair or replacement would be free of charge.",
                        o.id
                    ));
                }
            }
        }

        match phrase(self.llm.as_ref(), self.kind(), &task.request, facts).await {
            Ok(text) => AgentResult::success(AgentPayload {
                agent: self.kind(),
                text,
                tools_used: vec![tool.to_string()],
                confidence: 0.8,
            }),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentPayload, PriorOutput};
    use crate::memory::EntityExtractor;

    fn task(text: &str) -> TaskPayload {
        TaskPayload {
            instruction: "Provide resolution options".to_string(),
            request: text.to_string(),
            entities: EntityExtractor::extract(text),
        }
    }

    #[tokio::test]
    async fn test_after_tech_support_offers_replacement() {
        let mut ctx = StepContext::default();
        ctx.prior.push(PriorOutput {
            step: 1,
            payload: AgentPayload {
                agent: AgentKind::TechSupport,
                text: "try these steps".to_string(),
                tools_used: vec![],
                confidence: 0.8,
            },
        });
        let result = SolutionsAgent::new(None)
            .handle(&task("My laptop order #12345 won't turn on"), &ctx, Instant::now())
            .await;
        let text = &result.payload().unwrap().text;
        assert!(text.contains("If those steps don't fix it"));
        assert!(text.contains("Full replacement with expedited shipping"));
    }

    #[tokio::test]
    async fn test_return_defective_is_free() {
        let result = SolutionsAgent::new(None)
            .handle(&task("I want to return it, it's defective"), &StepContext::default(), Instant::now())
            .await;
        let text = &result.payload().unwrap().text;
        assert!(text.contains("no restocking fee"));
        assert!(text.contains("30 days"));
    }

    #[tokio::test]
    async fn test_compensation_scales_with_severity() {
        let result = SolutionsAgent::new(None)
            .handle(&task("I'm really disappointed, I want compensation"), &StepContext::default(), Instant::now())
            .await;
        assert!(result.payload().unwrap().text.contains("$50 partial refund"));
    }
}

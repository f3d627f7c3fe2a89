//! 订单专家：订单查询、物流跟踪、保修状态、退货资格

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use super::catalog::{self, Order, OrderStatus, RETURN_POLICY};
use super::{contains_any, phrase, AgentKind, AgentPayload, AgentResult, SpecialistAgent, StepContext, TaskPayload};
use crate::llm::LlmClient;
use crate::memory::entities::normalize;
use crate::memory::EntityKind;

const TRACKING_WORDS: &[&str] = &["track", "shipping", "delivery", "where is"];
const RETURN_WORDS: &[&str] = &["return", "exchange", "refund"];

pub struct OrderAgent {
    llm: Option<Arc<dyn LlmClient>>,
}

impl OrderAgent {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    fn summary(order: &Order) -> String {
        let product = catalog::find_product(order.product_id)
            .map(|p| p.name)
            .unwrap_or(order.product_id);
        let mut text = format!(
            "Order #{} for a {} (${:.2}, placed {}) is {}.",
            order.id,
            product,
            order.price,
            order.order_date,
            order.status.as_str()
        );
        match order.status {
            OrderStatus::Delivered => {
                text.push_str(&format!(" It was delivered on {}.", order.delivery_date))
            }
            OrderStatus::Shipped => text.push_str(&format!(
                " It is on its way and expected by {}.",
                order.delivery_date
            )),
            OrderStatus::Processing => text.push_str(" It has not shipped yet."),
        }
        text
    }

    fn warranty(order: &Order, detailed: bool) -> String {
        let mut text = match catalog::days_until(order.warranty_expires) {
            Some(days) if days > 0 => format!(
                "It is covered by a {}-year warranty until {} ({} days remaining).",
                order.warranty_years, order.warranty_expires, days
            ),
            _ => format!(
                "Its {}-year warranty ended on {}.",
                order.warranty_years, order.warranty_expires
            ),
        };
        if detailed {
            text.push_str(&format!(
                " Coverage: {}. Not covered: {}.",
                catalog::warranty_coverage(order.warranty_years).join(", "),
                catalog::WARRANTY_EXCLUSIONS.join(", ")
            ));
        }
        text
    }

    fn tracking(order: &Order) -> String {
        format!(
            "Tracking number TRK{}2024 with FastShip Express. Current location: {}.",
            order.id,
            order.status.location()
        )
    }

    fn return_eligibility(order: &Order, reason: &str) -> String {
        if order.status != OrderStatus::Delivered {
            return "A return can be started once the order has been delivered.".to_string();
        }
        let age = catalog::days_until(order.order_date).map(|d| -d).unwrap_or(i64::MAX);
        if age > RETURN_POLICY.period_days {
            return format!(
                "This order is outside the {}-day return window.",
                RETURN_POLICY.period_days
            );
        }
        let free = RETURN_POLICY.free_return_reasons.contains(&reason);
        let fee = if free { 0.0 } else { order.price * RETURN_POLICY.restocking_fee };
        format!(
            "This order is eligible for a return (reason: {}). Restocking fee: ${:.2}, estimated refund: ${:.2}.",
            reason,
            fee,
            order.price - fee
        )
    }
}

/// 从文本推断退货原因
pub(crate) fn return_reason(lower: &str) -> &'static str {
    const REASONS: &[(&str, &[&str])] = &[
        (
            "defective",
            &["defective", "broken", "not working", "doesn't work", "won't turn on", "faulty"],
        ),
        ("damaged_shipping", &["damaged", "arrived broken"]),
        ("wrong_item", &["wrong", "incorrect", "not what i ordered"]),
        ("size_issue", &["size", "too big", "too small", "doesn't fit"]),
        ("performance_issue", &["slow", "performance", "not fast enough"]),
        ("customer_preference", &["changed mind", "don't like", "don't need"]),
    ];
    REASONS
        .iter()
        .find(|(_, words)| contains_any(lower, words))
        .map(|(reason, _)| *reason)
        .unwrap_or("other")
}

#[async_trait]
impl SpecialistAgent for OrderAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Order
    }

    async fn handle(&self, task: &TaskPayload, ctx: &StepContext, _deadline: Instant) -> AgentResult {
        let lower = normalize(&task.request);
        let mut tools_used = Vec::new();

        let (facts, confidence) = match task.entity(ctx, EntityKind::OrderNumber) {
            None => (
                "I can look that up for you. Could you share your order number?".to_string(),
                0.4,
            ),
            Some(id) => {
                tools_used.push("order_lookup".to_string());
                match catalog::find_order(id) {
                    None => (
                        format!(
                            "I couldn't find an order with number #{}. Please double-check the number.",
                            id
                        ),
                        0.3,
                    ),
                    Some(order) => {
                        let wants_warranty = lower.contains("warranty");
                        let mut lines = vec![Self::summary(order), Self::warranty(order, wants_warranty)];
                        if wants_warranty {
                            tools_used.push("warranty_check".to_string());
                        }
                        if contains_any(&lower, TRACKING_WORDS) {
                            lines.push(Self::tracking(order));
                            tools_used.push("shipment_tracking".to_string());
                        }
                        if contains_any(&lower, RETURN_WORDS) {
                            lines.push(Self::return_eligibility(order, return_reason(&lower)));
                            tools_used.push("return_eligibility".to_string());
                        }
                        (lines.join(" "), 0.9)
                    }
                }
            }
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
    use crate::memory::{ContextPayload, EntityExtractor};

    fn task(text: &str) -> TaskPayload {
        TaskPayload {
            instruction: "Retrieve order information".to_string(),
            request: text.to_string(),
            entities: EntityExtractor::extract(text),
        }
    }

    #[tokio::test]
    async fn test_known_order_reports_status() {
        let agent = OrderAgent::new(None);
        let result = agent
            .handle(&task("where is order #12347?"), &StepContext::default(), Instant::now())
            .await;
        let payload = result.payload().unwrap();
        assert!(payload.text.contains("#12347"));
        assert!(payload.text.contains("shipped"));
        assert!(payload.text.contains("TRK123472024"));
        assert!(payload.tools_used.contains(&"shipment_tracking".to_string()));
    }

    #[tokio::test]
    async fn test_order_number_from_session_context() {
        let agent = OrderAgent::new(None);
        let mut session = ContextPayload::empty("s");
        session.entities.insert(EntityKind::OrderNumber, "12345");
        let result = agent
            .handle(&task("is it still under warranty?"), &StepContext::new(session), Instant::now())
            .await;
        let text = &result.payload().unwrap().text;
        assert!(text.contains("TechBook Pro 15"));
        assert!(text.contains("Coverage:"));
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_a_failure() {
        let agent = OrderAgent::new(None);
        let result = agent
            .handle(&task("order 99999"), &StepContext::default(), Instant::now())
            .await;
        assert!(result.payload().unwrap().text.contains("couldn't find"));
    }

    #[test]
    fn test_return_reason() {
        assert_eq!(return_reason("it won't turn on"), "defective");
        assert_eq!(return_reason("i changed mind"), "customer_preference");
        assert_eq!(return_reason("just because"), "other");
    }
}

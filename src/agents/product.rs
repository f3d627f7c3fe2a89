//! 产品专家：规格、对比、推荐、替代品与库存

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use super::catalog::{self, Product, PRODUCTS};
use super::{contains_any, phrase, AgentKind, AgentPayload, AgentResult, SpecialistAgent, StepContext, TaskPayload};
use crate::llm::LlmClient;
use crate::memory::entities::normalize;
use crate::memory::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestType {
    Comparison,
    Alternatives,
    Recommendation,
    Availability,
    Info,
}

impl RequestType {
    fn classify(lower: &str) -> Self {
        if contains_any(lower, &["compare", "comparison", " vs", "versus", "difference"]) {
            RequestType::Comparison
        } else if contains_any(lower, &["alternative", "similar", "other options"]) {
            RequestType::Alternatives
        } else if contains_any(lower, &["recommend", "suggest", "best", "which should", "what should"]) {
            RequestType::Recommendation
        } else if contains_any(lower, &["available", "in stock", "inventory", "how many"]) {
            RequestType::Availability
        } else {
            RequestType::Info
        }
    }

    fn tool(&self) -> &'static str {
        match self {
            RequestType::Comparison => "product_comparison",
            RequestType::Alternatives => "alternative_search",
            RequestType::Recommendation => "recommendation_engine",
            RequestType::Availability => "inventory_check",
            RequestType::Info => "product_lookup",
        }
    }
}

pub struct ProductAgent {
    llm: Option<Arc<dyn LlmClient>>,
}

impl ProductAgent {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    /// 任务实体优先，再补会话实体；保持去重与顺序
    fn mentioned(task: &TaskPayload, ctx: &StepContext) -> Vec<&'static Product> {
        let mut found: Vec<&'static Product> = Vec::new();
        let names = task
            .entities
            .values(EntityKind::Product)
            .chain(ctx.session.entities.values(EntityKind::Product));
        for name in names {
            if let Some(p) = catalog::find_product_by_name(name) {
                if !found.iter().any(|f| f.id == p.id) {
                    found.push(p);
                }
            }
        }
        found
    }

    fn info(p: &Product) -> String {
        let s = &p.specs;
        format!(
            "The {} ({} tier, ${:.2}, rated {}/5) has an {} processor, {} RAM, {} storage, {} graphics, \
             a {} display, {} battery life and weighs {}. It comes with a {}-year warranty and is {}.",
            p.name,
            p.price_tier(),
            p.price,
            p.rating,
            s.processor,
            s.ram,
            s.storage,
            s.graphics,
            s.display,
            s.battery,
            s.weight,
            p.warranty_years,
            p.availability().to_lowercase()
        )
    }

    fn compare(products: &[&Product]) -> String {
        let rows: Vec<String> = products
            .iter()
            .map(|p| {
                format!(
                    "- {}: ${:.2}, {}, {}, {}, {} battery, rated {}",
                    p.name, p.price, p.specs.processor, p.specs.ram, p.specs.graphics, p.specs.battery, p.rating
                )
            })
            .collect();
        let mut text = format!("Here is how they compare:\n{}", rows.join("\n"));
        let cheapest = products.iter().min_by(|a, b| a.price.total_cmp(&b.price));
        let best = products.iter().max_by(|a, b| a.rating.total_cmp(&b.rating));
        if let (Some(c), Some(b)) = (cheapest, best) {
            text.push_str(&format!(
                "\nBest value: {}. Highest rated: {}.",
                c.name, b.name
            ));
        }
        text
    }

    fn recommend(lower: &str) -> String {
        let category = if contains_any(lower, &["gaming", "games", "gamer"]) {
            Some("gaming")
        } else if contains_any(lower, &["business", "work", "office", "professional"]) {
            Some("professional")
        } else if contains_any(lower, &["travel", "portable", "light", "thin"]) {
            Some("ultrabook")
        } else if contains_any(lower, &["student", "school", "cheap", "affordable", "budget"]) {
            Some("budget")
        } else {
            None
        };
        let budget = budget_from(lower);

        let mut picks: Vec<&Product> = PRODUCTS
            .iter()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .filter(|p| budget.map_or(true, |b| p.price <= b))
            .collect();
        if picks.is_empty() {
            picks = PRODUCTS.iter().filter(|p| budget.map_or(true, |b| p.price <= b * 1.2)).collect();
        }
        picks.sort_by(|a, b| b.rating.total_cmp(&a.rating));

        match picks.first() {
            Some(p) => format!(
                "I'd recommend the {} at ${:.2} (rated {}/5, {}). {}",
                p.name,
                p.price,
                p.rating,
                p.category,
                Self::info(p)
            ),
            None => "None of our laptops fit that budget right now. The most affordable option is the TechBook Basic 14 at $599.99.".to_string(),
        }
    }

    fn alternatives(p: &Product) -> String {
        let mut others: Vec<&Product> = PRODUCTS.iter().filter(|o| o.id != p.id).collect();
        others.sort_by(|a, b| {
            (a.price - p.price)
                .abs()
                .total_cmp(&(b.price - p.price).abs())
        });
        let lines: Vec<String> = others
            .iter()
            .take(2)
            .map(|o| {
                let diff = o.price - p.price;
                let note = if diff > 0.0 {
                    format!("${:.0} more", diff)
                } else {
                    format!("${:.0} less", -diff)
                };
                format!("- {} ({}, {})", o.name, o.category, note)
            })
            .collect();
        format!("Alternatives to the {}:\n{}", p.name, lines.join("\n"))
    }

    fn availability(p: &Product) -> String {
        format!(
            "The {} is {} ({} units). Restock: {}.",
            p.name,
            p.availability(),
            p.inventory,
            p.restock_estimate()
        )
    }

    fn lineup() -> String {
        let names: Vec<String> = PRODUCTS
            .iter()
            .map(|p| format!("{} (${:.2})", p.name, p.price))
            .collect();
        format!(
            "Our current TechBook lineup: {}. Which one would you like to know more about?",
            names.join(", ")
        )
    }
}

/// "$1000" / "under 1000" 之类的预算
fn budget_from(lower: &str) -> Option<f64> {
    let digits: String = lower
        .split(|c: char| !c.is_ascii_digit())
        .filter(|d| d.len() >= 3)
        .take(1)
        .collect();
    digits.parse().ok()
}

#[async_trait]
impl SpecialistAgent for ProductAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Product
    }

    async fn handle(&self, task: &TaskPayload, ctx: &StepContext, _deadline: Instant) -> AgentResult {
        let lower = normalize(&task.request);
        let request_type = RequestType::classify(&lower);
        let products = Self::mentioned(task, ctx);

        let (facts, confidence) = match (request_type, products.as_slice()) {
            (RequestType::Comparison, [_, _, ..]) => (Self::compare(&products), 0.9),
            (RequestType::Comparison, _) => (Self::compare(&PRODUCTS.iter().collect::<Vec<_>>()), 0.7),
            (RequestType::Recommendation, _) => (Self::recommend(&lower), 0.8),
            (RequestType::Alternatives, [p, ..]) => (Self::alternatives(p), 0.8),
            (RequestType::Availability, [p, ..]) => (Self::availability(p), 0.9),
            (RequestType::Info, [p, ..]) => (Self::info(p), 0.9),
            (_, []) => (Self::lineup(), 0.5),
        };

        match phrase(self.llm.as_ref(), self.kind(), &task.request, facts).await {
            Ok(text) => AgentResult::success(AgentPayload {
                agent: self.kind(),
                text,
                tools_used: vec![request_type.tool().to_string()],
                confidence,
            }),
            Err(e) => e.into(),
        }
    }
}

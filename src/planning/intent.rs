//! 意图识别模块
//!
//! 基于关键词的快速规则匹配，不调用 LLM：把用户输入映射为一组意图信号，供 Planner 选专家。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::memory::entities::normalize;
use crate::memory::{ContextPayload, EntityExtractor, EntityKind, EntityMap};

/// 意图信号；顺序与专家优先级一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSignal {
    /// 订单查询、物流、保修
    Order,
    /// 故障排查
    Troubleshooting,
    /// 产品规格、对比、推荐
    Product,
    /// 退换货、退款、补偿
    Resolution,
}

/// 识别结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub text: String,
    pub signals: BTreeSet<IntentSignal>,
    /// 当前消息自身抽取出的实体
    pub entities: EntityMap,
}

impl Intent {
    pub fn has(&self, signal: IntentSignal) -> bool {
        self.signals.contains(&signal)
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

const ORDER_WORDS: &[&str] = &[
    "order", "tracking", "track my", "delivery", "delivered", "shipping", "shipped", "package", "warranty",
];

const TROUBLE_WORDS: &[&str] = &[
    "won't turn on",
    "not turning on",
    "won't start",
    "not working",
    "doesn't work",
    "stopped working",
    "broken",
    "overheating",
    "slow",
    "crash",
    "freez",
    "not charging",
    "won't charge",
    "blue screen",
    "flicker",
    "troubleshoot",
    "fix",
    "problem",
    "issue",
    "error",
];

const PRODUCT_WORDS: &[&str] = &[
    "spec", "compare", "comparison", "recommend", "alternative", "features", "price", "which laptop",
    "best laptop", "in stock", "available", " vs ", "versus",
];

const RESOLUTION_WORDS: &[&str] = &[
    "return",
    "refund",
    "exchange",
    "compensation",
    "money back",
    "replace",
    "replacement",
    "disappointed",
    "unsatisfied",
    "frustrated",
    "unacceptable",
    "complaint",
    "resolve",
];

/// 关键词须从词首开始匹配（"border" 不算 "order"）；允许词尾变化，如 "orders"
fn starts_word(haystack: &str, needle: &str) -> bool {
    if !needle.starts_with(|c: char| c.is_alphanumeric()) {
        return haystack.contains(needle);
    }
    haystack.match_indices(needle).any(|(at, _)| {
        !haystack[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_alphanumeric)
    })
}

/// 意图识别器（纯规则）
#[derive(Debug, Default, Clone)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn classify(&self, text: &str, ctx: &ContextPayload) -> Intent {
        let lower = normalize(text);
        let entities = EntityExtractor::extract(text);
        let hit = |words: &[&str]| words.iter().any(|w| starts_word(&lower, w));

        let mut signals = BTreeSet::new();
        let trouble = hit(TROUBLE_WORDS);
        let resolution = hit(RESOLUTION_WORDS);

        if trouble {
            signals.insert(IntentSignal::Troubleshooting);
        }
        if resolution {
            signals.insert(IntentSignal::Resolution);
        }
        if hit(ORDER_WORDS) || entities.has(EntityKind::OrderNumber) {
            signals.insert(IntentSignal::Order);
        }
        // 之前聊过的订单：故障或售后诉求默认与它相关
        if ctx.order_number().is_some() && (trouble || resolution) {
            signals.insert(IntentSignal::Order);
        }
        if hit(PRODUCT_WORDS) || (entities.has(EntityKind::Product) && !trouble && !resolution) {
            signals.insert(IntentSignal::Product);
        }

        tracing::debug!(?signals, "intent classified");
        Intent {
            text: text.to_string(),
            signals,
            entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Intent {
        IntentClassifier.classify(text, &ContextPayload::default())
    }

    #[test]
    fn test_order_and_trouble() {
        let intent = classify("My laptop order #12345 won't turn on");
        assert!(intent.has(IntentSignal::Order));
        assert!(intent.has(IntentSignal::Troubleshooting));
        assert!(!intent.has(IntentSignal::Product));
        assert!(intent.entities.contains(EntityKind::OrderNumber, "12345"));
    }

    #[test]
    fn test_product_only() {
        let intent = classify("Can you compare the Air 13 and the Pro 15?");
        assert_eq!(intent.signals.iter().copied().collect::<Vec<_>>(), vec![IntentSignal::Product]);
    }

    #[test]
    fn test_context_order_boosts_trouble() {
        let mut ctx = ContextPayload::default();
        ctx.entities.insert(EntityKind::OrderNumber, "12345");
        let intent = IntentClassifier.classify("it is overheating now", &ctx);
        assert!(intent.has(IntentSignal::Order));
        assert!(intent.has(IntentSignal::Troubleshooting));
    }

    #[test]
    fn test_greeting_has_no_signals() {
        assert!(classify("hello!").is_empty());
    }

    #[test]
    fn test_keywords_match_from_word_start() {
        for text in ["Is the border of the screen aluminium?", "my recorder app", "a sleep disorder"] {
            assert!(!classify(text).has(IntentSignal::Order), "{}", text);
        }
        assert!(classify("where are my orders?").has(IntentSignal::Order));
        assert!(classify("It keeps freezing").has(IntentSignal::Troubleshooting));
        assert!(classify("Air 13 vs Pro 15").has(IntentSignal::Product));
        assert!(!classify("the prefix is wrong").has(IntentSignal::Troubleshooting));
    }
}

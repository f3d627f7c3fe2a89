//! 实体抽取：订单号（正则）、产品名与故障描述（词典匹配）
//!
//! 纯函数、确定性：同一段文本永远得到同一组实体，合并走集合并集，重复抽取不会漂移。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 实体类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    OrderNumber,
    Product,
    Issue,
}

/// 实体表：类型 -> 值集合
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityMap(BTreeMap<EntityKind, BTreeSet<String>>);

impl EntityMap {
    pub fn insert(&mut self, kind: EntityKind, value: impl Into<String>) {
        self.0.entry(kind).or_default().insert(value.into());
    }

    /// 并集合并：新值加入，已有值保留
    pub fn merge(&mut self, other: &EntityMap) {
        for (kind, values) in &other.0 {
            self.0
                .entry(*kind)
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    pub fn values(&self, kind: EntityKind) -> impl Iterator<Item = &str> {
        self.0
            .get(&kind)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn first(&self, kind: EntityKind) -> Option<&str> {
        self.values(kind).next()
    }

    pub fn has(&self, kind: EntityKind) -> bool {
        self.0.get(&kind).is_some_and(|s| !s.is_empty())
    }

    pub fn contains(&self, kind: EntityKind, value: &str) -> bool {
        self.0.get(&kind).is_some_and(|s| s.contains(value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }

    /// 仅保留指定类型（用于给单个步骤裁剪相关实体）
    pub fn subset(&self, kinds: &[EntityKind]) -> EntityMap {
        EntityMap(
            self.0
                .iter()
                .filter(|(k, _)| kinds.contains(k))
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        )
    }
}

/// 已知产品：别名 -> 规范名
const PRODUCT_ALIASES: &[(&str, &str)] = &[
    ("techbook pro 15", "TechBook Pro 15"),
    ("pro 15", "TechBook Pro 15"),
    ("techbook air 13", "TechBook Air 13"),
    ("air 13", "TechBook Air 13"),
    ("techbook gaming 17", "TechBook Gaming 17"),
    ("gaming 17", "TechBook Gaming 17"),
    ("techbook basic 14", "TechBook Basic 14"),
    ("basic 14", "TechBook Basic 14"),
];

/// 常见故障短语
const ISSUE_PHRASES: &[&str] = &[
    "won't turn on",
    "not turning on",
    "overheating",
    "slow",
    "wifi",
    "screen",
    "display",
    "battery",
    "charging",
    "keyboard",
    "trackpad",
];

static ORDER_RE: OnceLock<Regex> = OnceLock::new();

fn order_re() -> &'static Regex {
    ORDER_RE.get_or_init(|| Regex::new(r"(?i)(?:\border\s*(?:number\s*)?#?\s*|#)(\d{3,})").unwrap())
}

/// 基于规则的实体抽取器
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn extract(text: &str) -> EntityMap {
        let mut found = EntityMap::default();
        let lower = normalize(text);

        for cap in order_re().captures_iter(&lower) {
            if let Some(m) = cap.get(1) {
                found.insert(EntityKind::OrderNumber, m.as_str());
            }
        }

        for (alias, canonical) in PRODUCT_ALIASES {
            if lower.contains(alias) {
                found.insert(EntityKind::Product, *canonical);
            }
        }

        for phrase in ISSUE_PHRASES {
            if lower.contains(phrase) {
                found.insert(EntityKind::Issue, *phrase);
            }
        }

        found
    }
}

/// 小写并统一弯引号，便于短语匹配
pub(crate) fn normalize(text: &str) -> String {
    text.to_lowercase().replace('\u{2019}', "'")
}

//! 会话与消息
//!
//! Session 保存对话历史与抽取出的实体；last_active_at 单调不减，过期判断走单调时钟。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::entities::{EntityExtractor, EntityMap};

/// 会话 ID（不透明字符串）
pub type SessionId = String;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// 产生该消息的 agent（如 orchestrator）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// 生成该消息时用到的工具
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
            agent: None,
            tools: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// 单个会话
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub messages: Vec<Message>,
    pub entities: EntityMap,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    /// 过期判断用的单调时钟
    last_touch: Instant,
}

impl Session {
    pub fn new(id: impl Into<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            entities: EntityMap::default(),
            created_at: now,
            last_active_at: now,
            last_touch: Instant::now(),
        }
    }

    /// 更新活跃时间；墙钟回拨时保持原值
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_active_at {
            self.last_active_at = now;
        }
        self.last_touch = Instant::now();
    }

    /// 追加消息、抽取实体（并集合并）、按 max_history 剪枝
    pub fn push(&mut self, message: Message, max_history: usize) {
        let found = EntityExtractor::extract(&message.text);
        self.entities.merge(&found);
        self.messages.push(message);
        if self.messages.len() > max_history {
            let excess = self.messages.len() - max_history;
            self.messages.drain(..excess);
        }
        self.touch();
    }

    /// 清空历史与实体，保留 ID
    pub fn clear(&mut self) {
        self.messages.clear();
        self.entities = EntityMap::default();
        self.touch();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touch.elapsed()
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }
}

//! 上下文快照：交给 Planner 与专家的只读副本

use serde::{Deserialize, Serialize};

use super::entities::{EntityKind, EntityMap};
use super::session::{Message, Session, SessionId};

/// context_for 的返回值；拥有数据，不借用存储
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContextPayload {
    pub session_id: SessionId,
    /// 最近 N 条消息（旧 -> 新）
    pub recent_messages: Vec<Message>,
    pub entities: EntityMap,
    /// 会话中的消息总数
    pub conversation_length: usize,
}

impl ContextPayload {
    /// 未知或已过期会话的空快照
    pub fn empty(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub(crate) fn from_session(session: &Session, window: usize) -> Self {
        let start = session.messages.len().saturating_sub(window);
        Self {
            session_id: session.id.clone(),
            recent_messages: session.messages[start..].to_vec(),
            entities: session.entities.clone(),
            conversation_length: session.messages.len(),
        }
    }

    /// 叠加当前消息中的实体（仅影响快照本身）
    pub fn with_entities(mut self, extra: &EntityMap) -> Self {
        self.entities.merge(extra);
        self
    }

    /// 已知的订单号（取字典序最小者）
    pub fn order_number(&self) -> Option<&str> {
        self.entities.first(EntityKind::OrderNumber)
    }

    pub fn is_empty(&self) -> bool {
        self.conversation_length == 0 && self.entities.is_empty()
    }
}

//! 会话存储：进程内、易失，惰性过期驱逐 + 可选周期清理

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::context::ContextPayload;
use super::session::{Message, Session, SessionId};
use crate::config::SessionSection;

/// 会话存储
pub struct SessionMemory {
    sessions: RwLock<HashMap<SessionId, Session>>,
    /// 空闲超时
    idle_timeout: Duration,
    /// 每个会话保留的最大消息数
    max_history: usize,
    /// 快照中的最近消息数
    context_window: usize,
}

impl SessionMemory {
    pub fn new(idle_timeout: Duration, max_history: usize, context_window: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            max_history: max_history.max(1),
            context_window,
        }
    }

    pub fn from_config(cfg: &SessionSection) -> Self {
        Self::new(
            Duration::from_secs(cfg.idle_timeout_secs),
            cfg.max_history,
            cfg.context_window,
        )
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// 获取未过期会话或新建空会话；过期会话在此被驱逐。不刷新活跃时间
    pub async fn get_or_create(&self, session_id: &str) -> Session {
        let mut sessions = self.sessions.write().await;
        self.evict_if_expired(&mut sessions, session_id);
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, "session created");
                Session::new(session_id)
            })
            .clone()
    }

    /// 追加消息并合并实体；会话不存在或已过期时先新建
    pub async fn append_message(&self, session_id: &str, message: Message) {
        let mut sessions = self.sessions.write().await;
        self.evict_if_expired(&mut sessions, session_id);
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id))
            .push(message, self.max_history);
    }

    /// 最近消息 + 实体的拥有型快照；未知或过期会话返回空快照
    pub async fn context_for(&self, session_id: &str) -> ContextPayload {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(s) if !s.is_expired(self.idle_timeout) => {
                    return ContextPayload::from_session(s, self.context_window);
                }
                None => return ContextPayload::empty(session_id),
                Some(_) => {}
            }
        }
        let mut sessions = self.sessions.write().await;
        self.evict_if_expired(&mut sessions, session_id);
        ContextPayload::empty(session_id)
    }

    /// 清空历史与实体，保留会话 ID；会话不存在或已过期时返回 false
    pub async fn reset(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        self.evict_if_expired(&mut sessions, session_id);
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.clear();
                tracing::info!(session_id, "session reset");
                true
            }
            None => false,
        }
    }

    /// 最近 limit 条消息（旧 -> 新）；None 表示全部
    pub async fn history(&self, session_id: &str, limit: Option<usize>) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions
            .get(session_id)
            .filter(|s| !s.is_expired(self.idle_timeout))
        else {
            return Vec::new();
        };
        let n = limit.unwrap_or(session.messages.len());
        let start = session.messages.len().saturating_sub(n);
        session.messages[start..].to_vec()
    }

    /// 所有未过期会话 ID（顺带清理过期会话）
    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sweep_expired().await;
        let mut ids: Vec<_> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 会话存在且未过期
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .is_some_and(|s| !s.is_expired(self.idle_timeout))
    }

    /// 删除会话（连同 ID）
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "session removed");
        }
        removed
    }

    /// 删除全部会话，返回删除数量
    pub async fn clear_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let n = sessions.len();
        sessions.clear();
        tracing::info!(cleared = n, "all sessions cleared");
        n
    }

    /// 存储中的会话数（含尚未被驱逐的过期会话）
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 清理过期会话，返回清理数量
    pub async fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.idle_timeout));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "expired sessions swept");
        }
        removed
    }

    /// 后台周期清理，token 取消后退出
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let memory = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        memory.sweep_expired().await;
                    }
                }
            }
            tracing::debug!("session sweeper stopped");
        })
    }

    fn evict_if_expired(&self, sessions: &mut HashMap<SessionId, Session>, session_id: &str) {
        if sessions
            .get(session_id)
            .is_some_and(|s| s.is_expired(self.idle_timeout))
        {
            sessions.remove(session_id);
            tracing::debug!(session_id, "expired session evicted");
        }
    }
}

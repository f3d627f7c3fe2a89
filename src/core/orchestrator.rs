//! 编排器：主控流程
//!
//! 负责：会话门控、加载上下文、意图识别、生成并校验计划、按阶段执行、合成回复、写回会话。
//! 整条路径不向调用方返回错误；失败都体现为 degraded 与执行轨迹。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::executor::{deadline_after, PlanExecutor};
use super::message::SynthesizedResponse;
use super::synthesis::Synthesizer;
use crate::memory::{Message, SessionId, SessionMemory};
use crate::planning::Planner;

/// 回复写回会话时的 agent 标签
pub const ORCHESTRATOR_TAG: &str = "orchestrator";

/// 编排器
pub struct Orchestrator {
    memory: Arc<SessionMemory>,
    planner: Planner,
    executor: PlanExecutor,
    synthesizer: Synthesizer,
    /// 全局截止时间（从请求进入开始计）
    request_timeout: Duration,
    /// 每个会话一把锁：同一会话同一时刻只处理一个请求。会话消失且无人持有时移除
    gates: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        memory: Arc<SessionMemory>,
        planner: Planner,
        executor: PlanExecutor,
        synthesizer: Synthesizer,
        request_timeout: Duration,
    ) -> Self {
        Self {
            memory,
            planner,
            executor,
            synthesizer,
            request_timeout,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn memory(&self) -> &Arc<SessionMemory> {
        &self.memory
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn gate(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        Arc::clone(gates.entry(session_id.to_string()).or_default())
    }

    /// 归还门控；会话已不存在且没有其他请求在等时移除条目
    async fn release_gate(&self, session_id: &str, gate: Arc<Mutex<()>>) {
        drop(gate);
        if self.memory.contains(session_id).await {
            return;
        }
        let mut gates = self.gates.lock().await;
        if gates
            .get(session_id)
            .is_some_and(|g| Arc::strong_count(g) == 1)
        {
            gates.remove(session_id);
        }
    }

    /// 移除已过期 / 已删除会话的空闲门控，返回移除数量
    pub async fn prune_gates(&self) -> usize {
        let live = self.memory.session_ids().await;
        let mut gates = self.gates.lock().await;
        let before = gates.len();
        gates.retain(|id, g| Arc::strong_count(g) > 1 || live.binary_search(id).is_ok());
        let pruned = before - gates.len();
        if pruned > 0 {
            tracing::debug!(pruned, "idle session gates pruned");
        }
        pruned
    }

    /// 当前门控条目数
    pub async fn gate_count(&self) -> usize {
        self.gates.lock().await.len()
    }

    /// 清理过期会话及其门控，返回清理的会话数
    pub async fn sweep(&self) -> usize {
        let swept = self.memory.sweep_expired().await;
        self.prune_gates().await;
        swept
    }

    /// 后台周期清理会话与门控，token 取消后退出
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        orchestrator.sweep().await;
                    }
                }
            }
            tracing::debug!("orchestrator sweeper stopped");
        })
    }

    /// 处理一条用户消息
    pub async fn handle(&self, session_id: &str, user_message: &str) -> SynthesizedResponse {
        let started = Instant::now();
        let deadline = deadline_after(started, self.request_timeout);

        let gate = self.gate(session_id).await;
        let guard = gate.lock().await;

        self.memory.get_or_create(session_id).await;
        let snapshot = self.memory.context_for(session_id).await;
        let intent = self.planner.classify(user_message, &snapshot);
        // 仅作用于本次快照，写回时由会话自己抽取
        let ctx = snapshot.with_entities(&intent.entities);

        let mut plan = self.planner.build_plan(&intent, &ctx);
        if let Err(e) = self.planner.validate_plan(&plan) {
            tracing::warn!(session_id, plan_id = %plan.plan_id, error = %e, "plan rejected, using fallback");
            plan = self.planner.fallback_plan(user_message);
        }
        tracing::info!(
            session_id,
            plan_id = %plan.plan_id,
            agents = ?plan.agents(),
            fallback = plan.fallback,
            "plan ready"
        );

        let outcome = self.executor.execute(&plan, &ctx, deadline).await;
        let reply = self
            .synthesizer
            .synthesize(user_message, &outcome, deadline)
            .await;

        let degraded = plan.fallback || outcome.deadline_exceeded || outcome.any_degrading();
        let confidence = self.synthesizer.confidence(&outcome);
        let tools_used = outcome.tools_used();
        let agents_involved = outcome.agents_involved();

        self.memory
            .append_message(session_id, Message::user(user_message))
            .await;
        self.memory
            .append_message(
                session_id,
                Message::agent(reply.clone())
                    .with_agent(ORCHESTRATOR_TAG)
                    .with_tools(tools_used.iter().cloned()),
            )
            .await;
        drop(guard);
        self.release_gate(session_id, gate).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            session_id,
            plan_id = %plan.plan_id,
            degraded,
            deadline_exceeded = outcome.deadline_exceeded,
            confidence,
            elapsed_ms,
            "request handled"
        );

        SynthesizedResponse {
            reply,
            plan,
            results: outcome.results,
            plan_trace: outcome.trace,
            degraded,
            deadline_exceeded: outcome.deadline_exceeded,
            elapsed_ms,
            confidence,
            tools_used,
            agents_involved,
        }
    }

    /// 清空会话历史与实体（保留 id）
    pub async fn reset(&self, session_id: &str) -> bool {
        let gate = self.gate(session_id).await;
        let guard = gate.lock().await;
        let reset = self.memory.reset(session_id).await;
        drop(guard);
        self.release_gate(session_id, gate).await;
        reset
    }

    /// 删除会话（连同 ID）
    pub async fn remove(&self, session_id: &str) -> bool {
        let gate = self.gate(session_id).await;
        let guard = gate.lock().await;
        let removed = self.memory.remove(session_id).await;
        drop(guard);
        self.release_gate(session_id, gate).await;
        removed
    }

    /// 删除全部会话，返回删除数量
    pub async fn clear_all(&self) -> usize {
        let cleared = self.memory.clear_all().await;
        self.prune_gates().await;
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentKind, AgentRoster};
    use crate::core::retry::RetryPolicy;
    use crate::core::synthesis::{DEADLINE_QUALIFIER, FALLBACK_APOLOGY};
    use crate::memory::{EntityKind, Role};

    fn orchestrator(planner: Planner, timeout: Duration) -> Orchestrator {
        Orchestrator::new(
            Arc::new(SessionMemory::new(Duration::from_secs(3600), 20, 5)),
            planner,
            PlanExecutor::new(AgentRoster::default(), RetryPolicy::default(), Duration::from_secs(5)),
            Synthesizer::new(None),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_handle_writes_back_both_messages() {
        let orch = orchestrator(Planner::default(), Duration::from_secs(30));
        let resp = orch.handle("s1", "Where is my order #12346?").await;

        assert!(!resp.degraded);
        assert!(resp.reply.contains("12346"));

        let history = orch.memory().history("s1", None).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Agent);
        assert_eq!(history[1].agent.as_deref(), Some(ORCHESTRATOR_TAG));

        let ctx = orch.memory().context_for("s1").await;
        assert!(ctx.entities.contains(EntityKind::OrderNumber, "12346"));
    }

    #[tokio::test]
    async fn test_rejected_plan_falls_back_degraded() {
        // 上限 1 步，三步计划会被拒绝
        let orch = orchestrator(Planner::new(1, AgentKind::Solutions), Duration::from_secs(30));
        let resp = orch.handle("s2", "My laptop order #12345 won't turn on").await;

        assert!(resp.plan.fallback);
        assert!(resp.degraded);
        assert_eq!(resp.plan.agents(), vec![AgentKind::Solutions]);
        assert_ne!(resp.reply, FALLBACK_APOLOGY);
    }

    #[tokio::test]
    async fn test_zero_deadline() {
        let orch = orchestrator(Planner::default(), Duration::ZERO);
        let resp = orch.handle("s3", "Compare the Air 13 and the Pro 15").await;

        assert!(resp.degraded);
        assert!(resp.deadline_exceeded);
        assert!(resp.results.iter().all(|r| !r.result.is_success()));
        assert_eq!(resp.reply, format!("{}\n\n{}", FALLBACK_APOLOGY, DEADLINE_QUALIFIER));
    }

    #[tokio::test]
    async fn test_reset_keeps_session() {
        let orch = orchestrator(Planner::default(), Duration::from_secs(30));
        orch.handle("s4", "hello").await;
        assert!(orch.reset("s4").await);
        assert!(orch.memory().history("s4", None).await.is_empty());
        assert!(orch.memory().session_ids().await.contains(&"s4".to_string()));
    }

    #[tokio::test]
    async fn test_handle_reports_confidence_and_tools() {
        let orch = orchestrator(Planner::default(), Duration::from_secs(30));
        let resp = orch.handle("s5", "Where is my order #12346?").await;

        assert_eq!(resp.agents_involved, vec![AgentKind::Order]);
        assert!(!resp.tools_used.is_empty());
        assert!(resp.confidence > 0.0 && resp.confidence <= 0.7);

        let history = orch.memory().history("s5", None).await;
        assert_eq!(history[1].tools, resp.tools_used);
    }

    #[tokio::test]
    async fn test_huge_request_timeout_does_not_panic() {
        let orch = orchestrator(Planner::default(), Duration::from_secs(u64::MAX));
        let resp = orch.handle("s6", "hello").await;

        assert!(!resp.deadline_exceeded);
        assert!(!resp.reply.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gates_follow_session_lifetime() {
        let orch = Orchestrator::new(
            Arc::new(SessionMemory::new(Duration::from_secs(10), 20, 5)),
            Planner::default(),
            PlanExecutor::new(AgentRoster::default(), RetryPolicy::default(), Duration::from_secs(5)),
            Synthesizer::new(None),
            Duration::from_secs(30),
        );
        for i in 0..5 {
            orch.handle(&format!("live-{}", i), "hello").await;
        }
        for i in 0..3 {
            assert!(!orch.reset(&format!("ghost-{}", i)).await);
        }
        assert_eq!(orch.gate_count().await, 5);

        assert!(orch.remove("live-0").await);
        assert_eq!(orch.gate_count().await, 4);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(orch.sweep().await, 4);
        assert_eq!(orch.gate_count().await, 0);
    }

    #[tokio::test]
    async fn test_clear_all_drops_sessions_and_gates() {
        let orch = orchestrator(Planner::default(), Duration::from_secs(30));
        orch.handle("a", "hello").await;
        orch.handle("b", "hello").await;

        assert_eq!(orch.clear_all().await, 2);
        assert!(orch.memory().session_ids().await.is_empty());
        assert_eq!(orch.gate_count().await, 0);
    }
}

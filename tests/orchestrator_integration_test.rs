//! 编排器集成测试：通过公开 API 驱动完整请求路径

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use carecrew::agents::{
    AgentKind, AgentPayload, AgentResult, AgentRoster, SpecialistAgent, StepContext, TaskPayload,
};
use carecrew::config::AppConfig;
use carecrew::core::{
    ChatReply, Orchestrator, OrchestratorBuilder, StepState, DEADLINE_QUALIFIER, FALLBACK_APOLOGY,
};
use carecrew::memory::{EntityKind, SessionMemory};
use carecrew::planning::{Condition, ExecutionMode};

/// 行为可控的测试专家
struct Scripted {
    kind: AgentKind,
    delay: Duration,
    outcome: Outcome,
    calls: AtomicU32,
}

#[derive(Clone, Copy)]
enum Outcome {
    Ok,
    Fail { retryable: bool },
    Panic,
}

impl Scripted {
    fn new(kind: AgentKind, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            kind,
            delay: Duration::ZERO,
            outcome,
            calls: AtomicU32::new(0),
        })
    }

    fn slow(kind: AgentKind, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind,
            delay,
            outcome: Outcome::Ok,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpecialistAgent for Scripted {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn handle(&self, _task: &TaskPayload, _ctx: &StepContext, _deadline: Instant) -> AgentResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.outcome {
            Outcome::Ok => AgentResult::success(AgentPayload {
                agent: self.kind,
                text: format!("{} answer", self.kind),
                tools_used: vec![],
                confidence: 1.0,
            }),
            Outcome::Fail { retryable } => AgentResult::failure("service unavailable", retryable),
            Outcome::Panic => panic!("{} exploded", self.kind),
        }
    }
}

fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.orchestrator.request_timeout_secs = 30;
    cfg.orchestrator.step_timeout_secs = 10;
    cfg.orchestrator.retry_bound = 2;
    cfg
}

fn build(cfg: AppConfig, roster: AgentRoster) -> Orchestrator {
    OrchestratorBuilder::new(cfg).with_llm(None).with_roster(roster).build()
}

#[tokio::test]
async fn test_scenario_order_laptop_wont_turn_on() {
    let orch = build(config(), AgentRoster::default());
    let resp = orch.handle("sarah", "My laptop order #12345 won't turn on").await;

    let agents = resp.plan.agents();
    assert_eq!(
        agents,
        vec![AgentKind::Order, AgentKind::TechSupport, AgentKind::Solutions]
    );
    assert_eq!(resp.plan.steps[1].mode, ExecutionMode::Conditional);
    assert_eq!(resp.plan.steps[1].condition, Some(Condition::Succeeded(0)));
    assert_eq!(resp.plan.steps[2].depends_on, vec![0, 1]);

    assert!(!resp.degraded);
    assert!(resp.reply.contains("#12345"));
    assert!(resp.reply.contains("delivered"));
    assert!(resp.reply.contains("troubleshooting steps"));
    assert!(resp.reply.contains("1. "));
    assert!(resp.reply.contains("Full replacement"));
    assert!(resp
        .plan_trace
        .iter()
        .all(|t| t.status == StepState::Succeeded && t.attempts == 1));

    let ctx = orch.memory().context_for("sarah").await;
    assert!(ctx.entities.contains(EntityKind::OrderNumber, "12345"));
    assert_eq!(ctx.conversation_length, 2);
}

#[tokio::test]
async fn test_scenario_all_agents_fail() {
    let mut roster = AgentRoster::default();
    for kind in AgentKind::ALL {
        roster = roster.with(kind, Scripted::new(kind, Outcome::Fail { retryable: true }));
    }
    let orch = build(config(), roster);
    let resp = orch.handle("s", "My laptop order #12345 won't turn on").await;

    assert_eq!(resp.reply, FALLBACK_APOLOGY);
    assert!(resp.degraded);
    assert!(!resp.deadline_exceeded);
    // 订单失败 -> 技术支持条件不满足
    assert_eq!(resp.plan_trace[1].status, StepState::Skipped);
    assert_eq!(resp.plan_trace[0].attempts, 3);
}

#[tokio::test]
async fn test_scenario_zero_deadline() {
    let mut cfg = config();
    cfg.orchestrator.request_timeout_secs = 0;
    let orch = build(cfg, AgentRoster::default());

    let started = std::time::Instant::now();
    let resp = orch.handle("s", "Compare the Air 13 and the Pro 15").await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(resp.degraded);
    assert!(resp.deadline_exceeded);
    assert!(resp.results.iter().all(|r| !r.result.is_success()));
    assert!(resp.plan_trace.iter().all(|t| t.status == StepState::Cancelled));
    assert_eq!(resp.reply, format!("{}\n\n{}", FALLBACK_APOLOGY, DEADLINE_QUALIFIER));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_stage_elapsed_is_max() {
    let roster = AgentRoster::default()
        .with(AgentKind::Order, Scripted::slow(AgentKind::Order, Duration::from_millis(400)))
        .with(AgentKind::Product, Scripted::slow(AgentKind::Product, Duration::from_millis(600)));
    let orch = build(config(), roster);

    let started = Instant::now();
    let resp = orch
        .handle("p", "Where is my order #12346, and can you compare the Air 13 and Pro 15?")
        .await;
    let elapsed = started.elapsed();

    assert_eq!(resp.plan.agents(), vec![AgentKind::Order, AgentKind::Product]);
    assert!(resp.plan.steps.iter().all(|s| s.mode == ExecutionMode::Parallel));
    assert!(!resp.degraded);
    assert!(elapsed >= Duration::from_millis(600));
    assert!(elapsed < Duration::from_millis(1000), "elapsed {:?}", elapsed);
    assert!(resp.reply.starts_with("order answer\n\nproduct answer"));
}

#[tokio::test]
async fn test_retry_bound_n_gives_n_plus_one_attempts() {
    let product = Scripted::new(AgentKind::Product, Outcome::Fail { retryable: true });
    let mut cfg = config();
    cfg.orchestrator.retry_bound = 4;
    let orch = build(cfg, AgentRoster::default().with(AgentKind::Product, product.clone()));

    let resp = orch.handle("r", "Which laptop do you recommend for gaming?").await;

    assert_eq!(product.calls(), 5);
    assert_eq!(resp.plan_trace[0].attempts, 5);
    assert_eq!(resp.plan_trace[0].status, StepState::Failed { retryable: true });
    assert!(resp.degraded);
}

#[tokio::test]
async fn test_panicking_agent_is_contained() {
    let order = Scripted::new(AgentKind::Order, Outcome::Panic);
    let orch = build(config(), AgentRoster::default().with(AgentKind::Order, order.clone()));

    let resp = orch
        .handle("x", "Where is my order #12346, and can you compare the Air 13 and Pro 15?")
        .await;

    assert_eq!(order.calls(), 1);
    assert_eq!(resp.plan_trace[0].status, StepState::Failed { retryable: false });
    assert_eq!(resp.plan_trace[1].status, StepState::Succeeded);
    assert!(resp.degraded);
    assert!(resp.reply.contains("couldn't retrieve your order details"));
}

#[tokio::test]
async fn test_follow_up_uses_session_entities() {
    let orch = build(config(), AgentRoster::default());
    orch.handle("f", "Can you check order #12345?").await;
    let resp = orch.handle("f", "It's overheating now").await;

    // 订单号来自会话记忆
    assert_eq!(
        resp.plan.agents(),
        vec![AgentKind::Order, AgentKind::TechSupport, AgentKind::Solutions]
    );
    assert!(resp.reply.contains("#12345"));
}

#[tokio::test(start_paused = true)]
async fn test_session_expiry_starts_fresh() {
    let mut cfg = config();
    cfg.session.idle_timeout_secs = 60;
    let memory = Arc::new(SessionMemory::from_config(&cfg.session));
    let orch = OrchestratorBuilder::new(cfg)
        .with_llm(None)
        .with_memory(Arc::clone(&memory))
        .build();

    orch.handle("e", "Can you check order #12345?").await;
    assert_eq!(memory.history("e", None).await.len(), 2);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(memory.context_for("e").await.is_empty());
    assert!(memory.history("e", None).await.is_empty());

    orch.handle("e", "hello").await;
    let ctx = memory.context_for("e").await;
    assert_eq!(ctx.conversation_length, 2);
    assert!(!ctx.entities.has(EntityKind::OrderNumber));
}

#[tokio::test]
async fn test_chat_reply_serializes() {
    let orch = build(config(), AgentRoster::default());
    let reply: ChatReply = orch.handle("j", "Is the Gaming 17 in stock?").await.into();
    let json = serde_json::to_value(&reply).unwrap();

    assert!(json["reply"].as_str().is_some_and(|r| !r.is_empty()));
    assert_eq!(json["degraded"], false);
    assert_eq!(json["plan_trace"][0]["agent"], "product");
    assert_eq!(json["plan_trace"][0]["status"]["state"], "succeeded");
    assert_eq!(json["agents_involved"][0], "product");
    assert_eq!(json["estimated_time_secs"], 3);
    assert!(json["tools_used"].as_array().is_some_and(|t| !t.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_stage_one_times_out() {
    let roster = AgentRoster::default()
        .with(AgentKind::Order, Scripted::slow(AgentKind::Order, Duration::from_secs(60)))
        .with(AgentKind::Product, Scripted::slow(AgentKind::Product, Duration::from_secs(2)));
    let orch = build(config(), roster);

    let started = Instant::now();
    let resp = orch
        .handle("t", "Where is my order #12346, and can you compare the Air 13 and Pro 15?")
        .await;
    let elapsed = started.elapsed();

    let statuses: Vec<_> = resp.plan_trace.iter().map(|t| t.status).collect();
    assert_eq!(statuses, vec![StepState::TimedOut, StepState::Succeeded]);
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(11), "elapsed {:?}", elapsed);
    assert!(resp.degraded);
    assert!(!resp.deadline_exceeded);
    assert!(resp.reply.starts_with("product answer"));
    assert!(resp.reply.contains("couldn't retrieve your order details"));
    assert_eq!(resp.agents_involved, vec![AgentKind::Product]);
}

#[tokio::test]
async fn test_demo_scenario_reply_summary() {
    let orch = build(config(), AgentRoster::default());
    let reply: ChatReply = orch
        .handle("demo-session", "My laptop order #12345 won't turn on, I need help!")
        .await
        .into();

    assert_eq!(
        reply.agents_involved,
        vec![AgentKind::Order, AgentKind::TechSupport, AgentKind::Solutions]
    );
    assert_eq!(reply.estimated_time_secs, 9);
    assert!(reply.confidence > 0.3 && reply.confidence <= 0.7);
    assert!(reply.tools_used.contains(&"order_lookup".to_string()));
    assert!(reply.tools_used.contains(&"knowledge_base_search".to_string()));
    let unique: std::collections::BTreeSet<_> = reply.tools_used.iter().collect();
    assert_eq!(unique.len(), reply.tools_used.len());
}

#[tokio::test]
async fn test_huge_timeouts_from_config_are_safe() {
    let mut cfg = config();
    cfg.orchestrator.request_timeout_secs = u64::MAX;
    cfg.orchestrator.step_timeout_secs = u64::MAX;
    let orch = build(cfg, AgentRoster::default());

    let resp = orch.handle("big", "Is the Gaming 17 in stock?").await;

    assert!(!resp.degraded);
    assert!(!resp.deadline_exceeded);
}

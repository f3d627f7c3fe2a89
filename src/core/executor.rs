//! 计划执行器
//!
//! 按阶段执行计划：连续 Parallel 步骤一起 join_all，其余逐个执行。每次专家调用都在独立 task 中运行，
//! 超时取 min(now + step_timeout, 全局截止时间)；panic 转为不可重试失败；每次调用输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};

use super::retry::RetryPolicy;
use super::state::StepState;
use crate::agents::{AgentKind, AgentResult, AgentRoster, PriorOutput, StepContext};
use crate::memory::ContextPayload;
use crate::planning::{ExecutionMode, ExecutionPlan, Step, StepId};

/// 超时过大（配置可达 u64 秒）时约 30 年后到期，不会溢出
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

/// start + timeout，溢出时退回到远期时间点
pub fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// 单步执行轨迹（给 UI / 日志）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTrace {
    pub step: StepId,
    pub agent: AgentKind,
    pub mode: ExecutionMode,
    pub status: StepState,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// 已执行步骤的最终结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepId,
    pub agent: AgentKind,
    pub result: AgentResult,
}

/// 整个计划的执行结果
#[derive(Debug, Clone, Default)]
pub struct PlanOutcome {
    /// 按计划顺序，仅包含真正调用过专家的步骤
    pub results: Vec<StepResult>,
    /// 按计划顺序，每步一条
    pub trace: Vec<StepTrace>,
    pub deadline_exceeded: bool,
}

impl PlanOutcome {
    pub fn succeeded(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(|r| r.result.is_success())
    }

    pub fn any_degrading(&self) -> bool {
        self.trace.iter().any(|t| t.status.is_degrading())
    }

    /// 成功步骤中的最高置信度
    pub fn best_confidence(&self) -> Option<f32> {
        self.succeeded()
            .filter_map(|r| r.result.payload())
            .map(|p| p.confidence)
            .reduce(f32::max)
    }

    /// 成功步骤用到的工具，去重并保持首次出现的顺序
    pub fn tools_used(&self) -> Vec<String> {
        let mut tools: Vec<String> = Vec::new();
        for tool in self
            .succeeded()
            .filter_map(|r| r.result.payload())
            .flat_map(|p| p.tools_used.iter())
        {
            if !tools.contains(tool) {
                tools.push(tool.clone());
            }
        }
        tools
    }

    /// 给出了结果的专家（按计划顺序去重）
    pub fn agents_involved(&self) -> Vec<AgentKind> {
        let mut agents = Vec::new();
        for r in self.succeeded() {
            if !agents.contains(&r.agent) {
                agents.push(r.agent);
            }
        }
        agents
    }
}

/// 单步运行结果
struct StepRun {
    state: StepState,
    result: Option<AgentResult>,
    attempts: u32,
    elapsed: Duration,
    detail: Option<String>,
}

/// 计划执行器：持有专家名册、重试策略与单步超时
pub struct PlanExecutor {
    roster: AgentRoster,
    policy: RetryPolicy,
    step_timeout: Duration,
}

impl PlanExecutor {
    pub fn new(roster: AgentRoster, policy: RetryPolicy, step_timeout: Duration) -> Self {
        Self {
            roster,
            policy,
            step_timeout,
        }
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    /// 在全局截止时间内执行计划；从不返回错误，失败体现在状态与轨迹里
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        session: &ContextPayload,
        deadline: Instant,
    ) -> PlanOutcome {
        let mut states: Vec<StepState> = vec![StepState::Pending; plan.steps.len()];
        let mut runs: Vec<Option<StepRun>> = plan.steps.iter().map(|_| None).collect();
        let mut results: HashMap<StepId, AgentResult> = HashMap::new();
        let mut deadline_exceeded = false;

        for stage in plan.stages() {
            if Instant::now() >= deadline {
                deadline_exceeded = true;
                tracing::warn!(plan_id = %plan.plan_id, "global deadline reached before stage start");
                break;
            }

            let mut pending = Vec::new();
            for idx in stage {
                let step = &plan.steps[idx];
                if step.mode == ExecutionMode::Conditional {
                    let met = step
                        .condition
                        .as_ref()
                        .is_some_and(|c| c.evaluate(|id| results.get(&id)));
                    if !met {
                        tracing::info!(step = step.id, agent = %step.agent, "condition not met, skipping");
                        states[idx] = StepState::Skipped;
                        runs[idx] = Some(StepRun {
                            state: StepState::Skipped,
                            result: None,
                            attempts: 0,
                            elapsed: Duration::ZERO,
                            detail: Some("condition not met".to_string()),
                        });
                        continue;
                    }
                }
                let ctx = step_context(step, session, &results);
                pending.push((idx, self.run_step(step, ctx, deadline)));
            }

            let (indices, futures): (Vec<usize>, Vec<_>) = pending.into_iter().unzip();
            let finished = join_all(futures).await;

            for (idx, run) in indices.into_iter().zip(finished) {
                if run.state == StepState::Cancelled {
                    deadline_exceeded = true;
                }
                if let Some(result) = &run.result {
                    results.insert(plan.steps[idx].id, result.clone());
                }
                states[idx] = run.state;
                runs[idx] = Some(run);
            }
        }

        // 截止时间到达后仍未开始的步骤
        for (idx, state) in states.iter_mut().enumerate() {
            if *state == StepState::Pending {
                *state = StepState::Cancelled;
                deadline_exceeded = true;
                runs[idx] = Some(StepRun {
                    state: StepState::Cancelled,
                    result: None,
                    attempts: 0,
                    elapsed: Duration::ZERO,
                    detail: Some("not started before the global deadline".to_string()),
                });
            }
        }

        let mut outcome = PlanOutcome {
            deadline_exceeded,
            ..Default::default()
        };
        for (step, run) in plan.steps.iter().zip(runs) {
            let Some(run) = run else { continue };
            if let Some(result) = run.result {
                outcome.results.push(StepResult {
                    step: step.id,
                    agent: step.agent,
                    result,
                });
            }
            outcome.trace.push(StepTrace {
                step: step.id,
                agent: step.agent,
                mode: step.mode,
                status: run.state,
                attempts: run.attempts,
                elapsed_ms: run.elapsed.as_millis() as u64,
                detail: run.detail,
            });
        }
        outcome
    }

    /// 运行单步：有界重试，直到成功 / 不可重试失败 / 超时 / 全局截止
    async fn run_step(&self, step: &Step, ctx: StepContext, deadline: Instant) -> StepRun {
        let agent = self.roster.get(step.agent);
        let task = Arc::new(step.task.clone());
        let ctx = Arc::new(ctx);
        let started = Instant::now();
        let mut state = StepState::Pending;
        let mut attempt: u32 = 0;

        loop {
            if Instant::now() >= deadline {
                return StepRun {
                    state: StepState::Cancelled,
                    result: None,
                    attempts: attempt,
                    elapsed: started.elapsed(),
                    detail: Some("global deadline reached".to_string()),
                };
            }

            attempt += 1;
            let next = StepState::Running { attempt };
            debug_assert!(state.can_transition_to(&next));
            state = next;

            let step_deadline = deadline_after(Instant::now(), self.step_timeout).min(deadline);
            let attempt_started = Instant::now();
            let mut handle = {
                let agent = Arc::clone(&agent);
                let task = Arc::clone(&task);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move { agent.handle(&task, &ctx, step_deadline).await })
            };

            let result = match timeout_at(step_deadline, &mut handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => {
                    let reason = if join_err.is_panic() {
                        format!("{} agent panicked", step.agent)
                    } else {
                        format!("{} agent task was cancelled", step.agent)
                    };
                    AgentResult::failure(reason, false)
                }
                Err(_) => {
                    handle.abort();
                    if step_deadline >= deadline {
                        audit(step, attempt, "cancelled", attempt_started.elapsed());
                        tracing::warn!(step = step.id, agent = %step.agent, attempt, "global deadline reached, step cancelled");
                        return StepRun {
                            state: StepState::Cancelled,
                            result: Some(AgentResult::Timeout),
                            attempts: attempt,
                            elapsed: started.elapsed(),
                            detail: Some("global deadline reached".to_string()),
                        };
                    }
                    AgentResult::Timeout
                }
            };
            audit(step, attempt, result.outcome(), attempt_started.elapsed());

            let (next, detail) = match &result {
                AgentResult::Success { .. } => (StepState::Succeeded, None),
                AgentResult::Timeout => (
                    StepState::TimedOut,
                    Some(format!("timed out after {:?}", self.step_timeout)),
                ),
                AgentResult::Failure { reason, retryable } => {
                    if self.policy.should_retry(&result, attempt) {
                        if let Some(delay) = self.policy.delay_before_next(attempt, deadline) {
                            tracing::info!(
                                step = step.id,
                                agent = %step.agent,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                reason = %reason,
                                "retrying step"
                            );
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            continue;
                        }
                    }
                    (
                        StepState::Failed {
                            retryable: *retryable,
                        },
                        Some(reason.clone()),
                    )
                }
            };

            debug_assert!(state.can_transition_to(&next));
            match next {
                StepState::Succeeded => {
                    tracing::info!(step = step.id, agent = %step.agent, attempt, "step succeeded")
                }
                _ => tracing::warn!(
                    step = step.id,
                    agent = %step.agent,
                    attempt,
                    status = next.label(),
                    detail = detail.as_deref().unwrap_or(""),
                    "step did not succeed"
                ),
            }
            return StepRun {
                state: next,
                result: Some(result),
                attempts: attempt,
                elapsed: started.elapsed(),
                detail,
            };
        }
    }
}

/// 构造步骤上下文：会话快照 + 依赖步骤中成功的输出
fn step_context(step: &Step, session: &ContextPayload, results: &HashMap<StepId, AgentResult>) -> StepContext {
    let mut ctx = StepContext::new(session.clone());
    for dep in &step.depends_on {
        if let Some(payload) = results.get(dep).and_then(AgentResult::payload) {
            ctx.prior.push(PriorOutput {
                step: *dep,
                payload: payload.clone(),
            });
        }
    }
    ctx
}

fn audit(step: &Step, attempt: u32, outcome: &str, duration: Duration) {
    let audit = serde_json::json!({
        "event": "agent_audit",
        "step": step.id,
        "agent": step.agent.as_str(),
        "attempt": attempt,
        "outcome": outcome,
        "duration_ms": duration.as_millis() as u64,
    });
    tracing::info!(audit = %audit.to_string(), "agent");
}

//! 执行计划类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::{AgentKind, AgentResult, TaskPayload};

/// 步骤 ID（计划内唯一）
pub type StepId = usize;

/// 步骤相对兄弟步骤的执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    /// 相邻的 Parallel 步骤组成同一并发阶段
    Parallel,
    /// 条件成立才执行，否则 Skipped
    Conditional,
}

/// 条件步骤的判定：基于前序步骤的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Succeeded(StepId),
    AllSucceeded(Vec<StepId>),
    ResultContains { step: StepId, needle: String },
}

impl Condition {
    /// 条件引用的步骤
    pub fn references(&self) -> Vec<StepId> {
        match self {
            Condition::Succeeded(id) => vec![*id],
            Condition::AllSucceeded(ids) => ids.clone(),
            Condition::ResultContains { step, .. } => vec![*step],
        }
    }

    /// result_of 返回某步骤的最终结果（未执行为 None）
    pub fn evaluate<'a, F>(&self, result_of: F) -> bool
    where
        F: Fn(StepId) -> Option<&'a AgentResult>,
    {
        let succeeded = |id: StepId| result_of(id).is_some_and(AgentResult::is_success);
        match self {
            Condition::Succeeded(id) => succeeded(*id),
            Condition::AllSucceeded(ids) => ids.iter().all(|id| succeeded(*id)),
            Condition::ResultContains { step, needle } => result_of(*step)
                .and_then(AgentResult::payload)
                .is_some_and(|p| p.text.to_lowercase().contains(&needle.to_lowercase())),
        }
    }
}

/// 计划中的一步
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub agent: AgentKind,
    pub task: TaskPayload,
    pub mode: ExecutionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// 需要其输出的前序步骤
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<StepId>,
    /// 同一专家出现多次时必须说明理由
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

impl Step {
    pub fn new(id: StepId, agent: AgentKind, task: TaskPayload) -> Self {
        Self {
            id,
            agent,
            task,
            mode: ExecutionMode::Sequential,
            condition: None,
            depends_on: Vec::new(),
            justification: None,
        }
    }

    /// depends_on 与条件引用的并集
    pub fn references(&self) -> Vec<StepId> {
        let mut refs = self.depends_on.clone();
        if let Some(cond) = &self.condition {
            refs.extend(cond.references());
        }
        refs.sort_unstable();
        refs.dedup();
        refs
    }
}

const SECS_PER_STEP: u64 = 3;
const MAX_ESTIMATE_SECS: u64 = 30;

/// 执行计划
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: String,
    pub steps: Vec<Step>,
    /// 是否为兜底计划
    pub fallback: bool,
}

impl ExecutionPlan {
    pub fn new(steps: Vec<Step>) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self {
            plan_id: format!("plan-{}", &uuid[..8]),
            steps,
            fallback: false,
        }
    }

    pub fn agents(&self) -> Vec<AgentKind> {
        self.steps.iter().map(|s| s.agent).collect()
    }

    /// 预估耗时：每步 3 秒，封顶 30 秒
    pub fn estimated_secs(&self) -> u64 {
        (self.steps.len() as u64).saturating_mul(SECS_PER_STEP).min(MAX_ESTIMATE_SECS)
    }

    /// 阶段划分：连续的 Parallel 步骤为一个阶段，其余每步单独成阶段。返回步骤下标
    pub fn stages(&self) -> Vec<Vec<usize>> {
        let mut stages: Vec<Vec<usize>> = Vec::new();
        let mut in_parallel_run = false;
        for (idx, step) in self.steps.iter().enumerate() {
            let parallel = step.mode == ExecutionMode::Parallel;
            match stages.last_mut() {
                Some(stage) if parallel && in_parallel_run => stage.push(idx),
                _ => stages.push(vec![idx]),
            }
            in_parallel_run = parallel;
        }
        stages
    }
}

/// 计划校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan has no steps")]
    Empty,
    #[error("plan has {count} steps, exceeding the limit of {max}")]
    TooManySteps { count: usize, max: usize },
    #[error("step id {0} appears more than once")]
    DuplicateStepId(StepId),
    #[error("step {step} references unknown step {reference}")]
    UnknownStep { step: StepId, reference: StepId },
    #[error("plan contains a dependency cycle")]
    Cycle,
    #[error("step {step} references step {reference}, which does not come earlier")]
    ForwardReference { step: StepId, reference: StepId },
    #[error("parallel step {step} depends on step {reference} in the same stage")]
    SameStageDependency { step: StepId, reference: StepId },
    #[error("conditional step {0} has no condition")]
    MissingCondition(StepId),
    #[error("agent {agent} is invoked again at step {step} without justification")]
    DuplicateAgent { agent: AgentKind, step: StepId },
}

//! 入站请求 / 出站回复 DTO

use serde::{Deserialize, Serialize};

use super::executor::{StepResult, StepTrace};
use crate::agents::AgentKind;
use crate::planning::ExecutionPlan;

/// 入站聊天请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

/// 返回给调用方的回复
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub plan_trace: Vec<StepTrace>,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub confidence: f32,
    /// 成功专家用到的工具（去重）
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub agents_involved: Vec<AgentKind>,
    /// 计划预估耗时（秒）
    #[serde(default)]
    pub estimated_time_secs: u64,
}

/// 编排器的完整输出
#[derive(Debug, Clone)]
pub struct SynthesizedResponse {
    pub reply: String,
    pub plan: ExecutionPlan,
    /// 每个真正执行过的步骤一条
    pub results: Vec<StepResult>,
    pub plan_trace: Vec<StepTrace>,
    pub degraded: bool,
    pub deadline_exceeded: bool,
    pub elapsed_ms: u64,
    pub confidence: f32,
    pub tools_used: Vec<String>,
    pub agents_involved: Vec<AgentKind>,
}

impl From<SynthesizedResponse> for ChatReply {
    fn from(resp: SynthesizedResponse) -> Self {
        Self {
            reply: resp.reply,
            plan_trace: resp.plan_trace,
            degraded: resp.degraded,
            estimated_time_secs: resp.plan.estimated_secs(),
            plan_id: Some(resp.plan.plan_id),
            elapsed_ms: resp.elapsed_ms,
            confidence: resp.confidence,
            tools_used: resp.tools_used,
            agents_involved: resp.agents_involved,
        }
    }
}

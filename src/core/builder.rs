//! 编排器构建器：统一的初始化逻辑（REPL 与 HTTP 接入共用）

use std::sync::Arc;

use crate::agents::AgentRoster;
use crate::config::AppConfig;
use crate::core::executor::PlanExecutor;
use crate::core::retry::RetryPolicy;
use crate::core::synthesis::Synthesizer;
use crate::core::Orchestrator;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::SessionMemory;
use crate::planning::Planner;

/// 编排器构建器
pub struct OrchestratorBuilder {
    config: AppConfig,
    memory: Option<Arc<SessionMemory>>,
    roster: Option<AgentRoster>,
    llm: Option<Option<Arc<dyn LlmClient>>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            memory: None,
            roster: None,
            llm: None,
        }
    }

    /// 共享已有的会话存储（例如后台清理任务也持有它）
    pub fn with_memory(mut self, memory: Arc<SessionMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// 替换专家名册（测试注入）
    pub fn with_roster(mut self, roster: AgentRoster) -> Self {
        self.roster = Some(roster);
        self
    }

    /// 显式指定 LLM；None 表示强制 mock 模式。不调用时按配置创建
    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmClient>>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn build(self) -> Orchestrator {
        let cfg = &self.config;
        let llm = self
            .llm
            .unwrap_or_else(|| create_llm_from_config(&cfg.llm));
        let live = llm.is_some();

        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(SessionMemory::from_config(&cfg.session)));
        let roster = self
            .roster
            .unwrap_or_else(|| AgentRoster::builtin(llm.clone()));
        let policy = RetryPolicy::from_config(&cfg.orchestrator, live);

        tracing::info!(
            app = cfg.app.name.as_deref().unwrap_or("carecrew"),
            live,
            retry_bound = policy.retry_bound,
            request_timeout_secs = cfg.orchestrator.request_timeout_secs,
            "orchestrator ready"
        );

        Orchestrator::new(
            memory,
            Planner::from_config(&cfg.planner),
            PlanExecutor::new(roster, policy, cfg.orchestrator.step_timeout()),
            Synthesizer::new(llm),
            cfg.orchestrator.request_timeout(),
        )
    }
}

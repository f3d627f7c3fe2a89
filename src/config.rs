//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CARECREW__*` 覆盖（双下划线表示嵌套，如 `CARECREW__ORCHESTRATOR__RETRY_BOUND=3`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::agents::AgentKind;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub planner: PlannerSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub llm: LlmSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// Web 监听端口（carecrew-web）
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

/// [session] 段：会话过期、历史上限、上下文窗口
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// 空闲超时（秒），超过即视为过期并被驱逐
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// 每个会话保留的最大消息条数
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// context_for 快照中携带的最近消息条数
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// 周期清理间隔（秒）；未设置则只做访问时的惰性驱逐
    pub sweep_interval_secs: Option<u64>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            max_history: default_max_history(),
            context_window: default_context_window(),
            sweep_interval_secs: None,
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

fn default_max_history() -> usize {
    20
}

fn default_context_window() -> usize {
    5
}

/// [planner] 段：步骤上限与默认专家
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    #[serde(default = "default_max_plan_steps")]
    pub max_plan_steps: usize,
    /// 无信号或计划校验失败时兜底的专家
    #[serde(default = "default_agent")]
    pub default_agent: AgentKind,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_plan_steps: default_max_plan_steps(),
            default_agent: default_agent(),
        }
    }
}

fn default_max_plan_steps() -> usize {
    6
}

fn default_agent() -> AgentKind {
    AgentKind::TechSupport
}

/// [orchestrator] 段：全局截止时间、单步超时、重试与退避
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// 单次 handle 的全局截止时间（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 单个专家调用超时（秒），同时受全局截止时间约束
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// 可重试失败的最大重试次数（总尝试次数 = retry_bound + 1）
    #[serde(default = "default_retry_bound")]
    pub retry_bound: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            step_timeout_secs: default_step_timeout_secs(),
            retry_bound: default_retry_bound(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl OrchestratorSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_step_timeout_secs() -> u64 {
    30
}

fn default_retry_bound() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// [llm] 段：mock 或 OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// mock / openai；openai 还需要环境变量 OPENAI_API_KEY
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
        }
    }
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// 从 config 目录加载配置，环境变量 CARECREW__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CARECREW__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CARECREW")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

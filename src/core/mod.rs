//! 核心编排层：计划执行、重试、状态机、回复合成、主控流程

pub mod builder;
pub mod executor;
pub mod message;
pub mod orchestrator;
pub mod retry;
pub mod shutdown;
pub mod state;
pub mod synthesis;

pub use builder::OrchestratorBuilder;
pub use executor::{PlanExecutor, PlanOutcome, StepResult, StepTrace};
pub use message::{ChatReply, ChatRequest, SynthesizedResponse};
pub use orchestrator::{Orchestrator, ORCHESTRATOR_TAG};
pub use retry::{Backoff, RetryPolicy};
pub use shutdown::{Shutdown, ShutdownReason};
pub use state::StepState;
pub use synthesis::{Synthesizer, DEADLINE_QUALIFIER, FALLBACK_APOLOGY};

//! Planner：意图识别、执行计划与校验

pub mod graph;
pub mod intent;
pub mod plan;
pub mod planner;

pub use graph::PlanGraph;
pub use intent::{Intent, IntentClassifier, IntentSignal};
pub use plan::{Condition, ExecutionMode, ExecutionPlan, PlanError, Step, StepId};
pub use planner::Planner;

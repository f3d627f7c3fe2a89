//! Planner：意图 + 会话上下文 -> 执行计划，并按策略校验
//!
//! 规则确定：相同输入总是得到相同的步骤序列（plan_id 除外）。

use std::collections::{HashMap, HashSet};

use super::graph::PlanGraph;
use super::intent::{Intent, IntentClassifier, IntentSignal};
use super::plan::{Condition, ExecutionMode, ExecutionPlan, PlanError, Step, StepId};
use crate::agents::{AgentKind, TaskPayload};
use crate::config::PlannerSection;
use crate::memory::{ContextPayload, EntityKind, EntityMap};

/// 计划生成与校验
#[derive(Debug, Clone)]
pub struct Planner {
    classifier: IntentClassifier,
    max_plan_steps: usize,
    default_agent: AgentKind,
}

impl Default for Planner {
    fn default() -> Self {
        Self::from_config(&PlannerSection::default())
    }
}

impl Planner {
    pub fn new(max_plan_steps: usize, default_agent: AgentKind) -> Self {
        Self {
            classifier: IntentClassifier,
            max_plan_steps,
            default_agent,
        }
    }

    pub fn from_config(cfg: &PlannerSection) -> Self {
        Self::new(cfg.max_plan_steps, cfg.default_agent)
    }

    pub fn max_plan_steps(&self) -> usize {
        self.max_plan_steps
    }

    pub fn classify(&self, text: &str, ctx: &ContextPayload) -> Intent {
        self.classifier.classify(text, ctx)
    }

    /// 按意图信号生成计划
    ///
    /// - 订单 + 故障且订单号已知：技术支持以"订单查询成功"为条件，全部串行
    /// - 否则两个及以上信息类步骤（订单 / 技术支持 / 产品）并行
    /// - 售后诉求或已知订单上的故障：追加解决方案步骤，依赖前面所有步骤
    pub fn build_plan(&self, intent: &Intent, ctx: &ContextPayload) -> ExecutionPlan {
        let mut entities = ctx.entities.clone();
        entities.merge(&intent.entities);
        let known_order = entities.has(EntityKind::OrderNumber);

        let mut steps: Vec<Step> = Vec::new();
        let push = |steps: &mut Vec<Step>, agent: AgentKind, instruction: &str| -> StepId {
            let id = steps.len();
            steps.push(Step::new(id, agent, task_for(agent, instruction, &intent.text, &entities)));
            id
        };

        let mut order = None;
        let mut tech = None;
        if intent.has(IntentSignal::Order) {
            order = Some(push(&mut steps, AgentKind::Order, "Retrieve order information"));
        }
        if intent.has(IntentSignal::Troubleshooting) {
            tech = Some(push(&mut steps, AgentKind::TechSupport, "Provide technical assistance"));
        }
        if intent.has(IntentSignal::Product) {
            push(&mut steps, AgentKind::Product, "Answer product questions");
        }
        let wants_solutions = intent.has(IntentSignal::Resolution)
            || (intent.has(IntentSignal::Troubleshooting) && known_order);
        if wants_solutions {
            push(&mut steps, AgentKind::Solutions, "Provide resolution options");
        }
        if steps.is_empty() {
            push(&mut steps, self.default_agent, "Handle the customer request");
        }

        let info_count = steps.iter().filter(|s| s.agent != AgentKind::Solutions).count();
        match (order, tech) {
            (Some(order_id), Some(tech_id)) if known_order => {
                let tech_step = &mut steps[tech_id];
                tech_step.mode = ExecutionMode::Conditional;
                tech_step.condition = Some(Condition::Succeeded(order_id));
                tech_step.depends_on = vec![order_id];
            }
            _ if info_count >= 2 => {
                for step in steps.iter_mut().filter(|s| s.agent != AgentKind::Solutions) {
                    step.mode = ExecutionMode::Parallel;
                }
            }
            _ => {}
        }

        if wants_solutions {
            if let Some(last) = steps.last_mut() {
                last.depends_on = (0..last.id).collect();
            }
        }

        let plan = ExecutionPlan::new(steps);
        tracing::info!(
            plan_id = %plan.plan_id,
            agents = ?plan.agents(),
            "plan created"
        );
        plan
    }

    /// 校验计划：非空、步数上限、引用合法、无环、只引用更早的步骤、条件完整、专家不重复
    pub fn validate_plan(&self, plan: &ExecutionPlan) -> Result<(), PlanError> {
        if plan.steps.is_empty() {
            return Err(PlanError::Empty);
        }
        if plan.steps.len() > self.max_plan_steps {
            return Err(PlanError::TooManySteps {
                count: plan.steps.len(),
                max: self.max_plan_steps,
            });
        }

        let mut positions: HashMap<StepId, usize> = HashMap::new();
        for (idx, step) in plan.steps.iter().enumerate() {
            if positions.insert(step.id, idx).is_some() {
                return Err(PlanError::DuplicateStepId(step.id));
            }
        }

        for step in &plan.steps {
            if let Some(reference) = step.references().into_iter().find(|r| !positions.contains_key(r)) {
                return Err(PlanError::UnknownStep {
                    step: step.id,
                    reference,
                });
            }
        }

        if PlanGraph::new(plan).has_cycle() {
            return Err(PlanError::Cycle);
        }

        let mut stage_of: HashMap<usize, usize> = HashMap::new();
        for (stage_idx, stage) in plan.stages().iter().enumerate() {
            for idx in stage {
                stage_of.insert(*idx, stage_idx);
            }
        }

        let mut seen_agents: HashSet<AgentKind> = HashSet::new();
        for (idx, step) in plan.steps.iter().enumerate() {
            for reference in step.references() {
                let ref_idx = positions[&reference];
                if ref_idx >= idx {
                    return Err(PlanError::ForwardReference {
                        step: step.id,
                        reference,
                    });
                }
                if stage_of.get(&ref_idx) == stage_of.get(&idx) {
                    return Err(PlanError::SameStageDependency {
                        step: step.id,
                        reference,
                    });
                }
            }
            if step.mode == ExecutionMode::Conditional && step.condition.is_none() {
                return Err(PlanError::MissingCondition(step.id));
            }
            if !seen_agents.insert(step.agent) && step.justification.is_none() {
                return Err(PlanError::DuplicateAgent {
                    agent: step.agent,
                    step: step.id,
                });
            }
        }

        Ok(())
    }

    /// 兜底计划：单步交给默认专家
    pub fn fallback_plan(&self, request: &str) -> ExecutionPlan {
        let task = TaskPayload {
            instruction: "Handle the customer request".to_string(),
            request: request.to_string(),
            entities: EntityMap::default(),
        };
        let mut plan = ExecutionPlan::new(vec![Step::new(0, self.default_agent, task)]);
        plan.fallback = true;
        tracing::warn!(plan_id = %plan.plan_id, agent = %self.default_agent, "using fallback plan");
        plan
    }
}

fn task_for(agent: AgentKind, instruction: &str, request: &str, entities: &EntityMap) -> TaskPayload {
    TaskPayload {
        instruction: instruction.to_string(),
        request: request.to_string(),
        entities: entities.subset(agent.relevant_entities()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_for(planner: &Planner, text: &str, ctx: &ContextPayload) -> ExecutionPlan {
        let intent = planner.classify(text, ctx);
        planner.build_plan(&intent, ctx)
    }

    fn shape(plan: &ExecutionPlan) -> Vec<(AgentKind, ExecutionMode, Option<Condition>, Vec<StepId>)> {
        plan.steps
            .iter()
            .map(|s| (s.agent, s.mode, s.condition.clone(), s.depends_on.clone()))
            .collect()
    }

    #[test]
    fn test_order_trouble_plan_shape() {
        let planner = Planner::default();
        let plan = plan_for(&planner, "My laptop order #12345 won't turn on", &ContextPayload::default());
        assert_eq!(
            shape(&plan),
            vec![
                (AgentKind::Order, ExecutionMode::Sequential, None, vec![]),
                (
                    AgentKind::TechSupport,
                    ExecutionMode::Conditional,
                    Some(Condition::Succeeded(0)),
                    vec![0]
                ),
                (AgentKind::Solutions, ExecutionMode::Sequential, None, vec![0, 1]),
            ]
        );
        assert!(planner.validate_plan(&plan).is_ok());
        assert!(plan.steps[0].task.entities.contains(EntityKind::OrderNumber, "12345"));
    }

    #[test]
    fn test_independent_info_steps_run_parallel() {
        let planner = Planner::default();
        let plan = plan_for(
            &planner,
            "My screen keeps flickering, and can you compare the Air 13 with the Pro 15?",
            &ContextPayload::default(),
        );
        assert_eq!(plan.agents(), vec![AgentKind::TechSupport, AgentKind::Product]);
        assert!(plan.steps.iter().all(|s| s.mode == ExecutionMode::Parallel));
        assert_eq!(plan.stages(), vec![vec![0, 1]]);
        assert!(planner.validate_plan(&plan).is_ok());
    }

    #[test]
    fn test_no_signal_goes_to_default_agent() {
        let planner = Planner::new(6, AgentKind::Product);
        let plan = plan_for(&planner, "hello there", &ContextPayload::default());
        assert_eq!(plan.agents(), vec![AgentKind::Product]);
        assert!(!plan.fallback);
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        let planner = Planner::default();
        let ctx = ContextPayload::default();
        let text = "I want a refund for order 12346, also which laptop is best for gaming?";
        let first = plan_for(&planner, text, &ctx);
        for _ in 0..10 {
            let again = plan_for(&planner, text, &ctx);
            assert_eq!(shape(&again), shape(&first));
        }
        assert_eq!(
            first.agents(),
            vec![AgentKind::Order, AgentKind::Product, AgentKind::Solutions]
        );
    }

    fn raw_step(id: StepId, agent: AgentKind) -> Step {
        Step::new(id, agent, TaskPayload::default())
    }

    #[test]
    fn test_validate_rejections() {
        let planner = Planner::new(3, AgentKind::TechSupport);

        assert_eq!(
            planner.validate_plan(&ExecutionPlan::new(vec![])),
            Err(PlanError::Empty)
        );

        let too_many = ExecutionPlan::new(
            (0..4).map(|i| raw_step(i, AgentKind::ALL[i])).collect(),
        );
        assert_eq!(
            planner.validate_plan(&too_many),
            Err(PlanError::TooManySteps { count: 4, max: 3 })
        );

        let mut unknown = raw_step(0, AgentKind::Order);
        unknown.depends_on = vec![9];
        assert_eq!(
            planner.validate_plan(&ExecutionPlan::new(vec![unknown])),
            Err(PlanError::UnknownStep { step: 0, reference: 9 })
        );

        let mut a = raw_step(0, AgentKind::Order);
        a.depends_on = vec![1];
        let mut b = raw_step(1, AgentKind::TechSupport);
        b.depends_on = vec![0];
        assert_eq!(
            planner.validate_plan(&ExecutionPlan::new(vec![a, b])),
            Err(PlanError::Cycle)
        );

        let mut early = raw_step(0, AgentKind::Order);
        early.condition = Some(Condition::Succeeded(1));
        early.mode = ExecutionMode::Conditional;
        assert_eq!(
            planner.validate_plan(&ExecutionPlan::new(vec![early, raw_step(1, AgentKind::Product)])),
            Err(PlanError::ForwardReference { step: 0, reference: 1 })
        );

        let mut cond = raw_step(0, AgentKind::Order);
        cond.mode = ExecutionMode::Conditional;
        assert_eq!(
            planner.validate_plan(&ExecutionPlan::new(vec![cond])),
            Err(PlanError::MissingCondition(0))
        );

        let twice = ExecutionPlan::new(vec![raw_step(0, AgentKind::Product), raw_step(1, AgentKind::Product)]);
        assert_eq!(
            planner.validate_plan(&twice),
            Err(PlanError::DuplicateAgent { agent: AgentKind::Product, step: 1 })
        );

        let mut justified = raw_step(1, AgentKind::Product);
        justified.justification = Some("find alternatives after comparison".to_string());
        justified.depends_on = vec![0];
        assert!(planner
            .validate_plan(&ExecutionPlan::new(vec![raw_step(0, AgentKind::Product), justified]))
            .is_ok());
    }

    #[test]
    fn test_parallel_sibling_dependency_rejected() {
        let planner = Planner::default();
        let mut a = raw_step(0, AgentKind::Order);
        a.mode = ExecutionMode::Parallel;
        let mut b = raw_step(1, AgentKind::Product);
        b.mode = ExecutionMode::Parallel;
        b.depends_on = vec![0];
        assert_eq!(
            planner.validate_plan(&ExecutionPlan::new(vec![a, b])),
            Err(PlanError::SameStageDependency { step: 1, reference: 0 })
        );
    }

    #[test]
    fn test_fallback_plan() {
        let plan = Planner::default().fallback_plan("???");
        assert!(plan.fallback);
        assert_eq!(plan.agents(), vec![AgentKind::TechSupport]);
        assert!(Planner::default().validate_plan(&plan).is_ok());
    }
}

//! 计划依赖图
//!
//! 使用邻接表和入度表做拓扑排序（Kahn），用于环检测

use std::collections::{HashMap, VecDeque};

use super::plan::{ExecutionPlan, StepId};

/// 计划依赖图
pub struct PlanGraph {
    /// 邻接表：步骤 ID -> 依赖该步骤的步骤列表
    adjacency: HashMap<StepId, Vec<StepId>>,
    /// 入度表：步骤 ID -> 依赖数
    in_degree: HashMap<StepId, usize>,
}

impl PlanGraph {
    /// 创建依赖图；未知引用应在此之前被拒绝，这里直接忽略
    pub fn new(plan: &ExecutionPlan) -> Self {
        let mut adjacency: HashMap<StepId, Vec<StepId>> = HashMap::new();
        let mut in_degree: HashMap<StepId, usize> = HashMap::new();

        for step in &plan.steps {
            in_degree.entry(step.id).or_insert(0);
            adjacency.entry(step.id).or_default();
        }

        for step in &plan.steps {
            for dep in step.references() {
                if !in_degree.contains_key(&dep) {
                    continue;
                }
                adjacency.entry(dep).or_default().push(step.id);
                *in_degree.entry(step.id).or_insert(0) += 1;
            }
        }

        Self { adjacency, in_degree }
    }

    /// 拓扑序；存在环时返回 None
    pub fn topological_order(&self) -> Option<Vec<StepId>> {
        let mut in_degree = self.in_degree.clone();
        let mut ready: Vec<StepId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort_unstable();
        let mut queue: VecDeque<StepId> = ready.into();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(dependents) = self.adjacency.get(&id) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        (order.len() == in_degree.len()).then_some(order)
    }

    pub fn has_cycle(&self) -> bool {
        self.topological_order().is_none()
    }
}

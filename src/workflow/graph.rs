//! 步骤依赖图
//!
//! 使用邻接表和入度表实现 DAG 拓扑排序；构建时即检测重复 id、悬空依赖与环路。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::PlanError;
use crate::plan::{PlanStep, StepId};

/// 计划步骤的依赖图
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// 邻接表：步骤 ID -> 依赖该步骤的步骤列表
    adjacency: HashMap<StepId, Vec<StepId>>,
    /// 入度表：步骤 ID -> 尚无结果的依赖数
    in_degree: HashMap<StepId, usize>,
    /// 声明顺序，用于稳定输出
    position: HashMap<StepId, usize>,
}

impl DependencyGraph {
    /// 构建依赖图；重复 id、未知依赖、环路均为致命错误
    pub fn new(steps: &[PlanStep]) -> Result<Self, PlanError> {
        let mut adjacency: HashMap<StepId, Vec<StepId>> = HashMap::new();
        let mut in_degree: HashMap<StepId, usize> = HashMap::new();
        let mut position = HashMap::new();

        for (index, step) in steps.iter().enumerate() {
            if position.insert(step.id.clone(), index).is_some() {
                return Err(PlanError::DuplicateStep(step.id.clone()));
            }
            in_degree.insert(step.id.clone(), 0);
            adjacency.insert(step.id.clone(), Vec::new());
        }

        for step in steps {
            let mut seen = HashSet::new();
            for dep_id in &step.depends_on {
                if !seen.insert(dep_id) {
                    continue;
                }
                if !position.contains_key(dep_id) {
                    return Err(PlanError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep_id.clone(),
                    });
                }
                adjacency.entry(dep_id.clone()).or_default().push(step.id.clone());
                *in_degree.entry(step.id.clone()).or_insert(0) += 1;
            }
        }

        let graph = Self {
            adjacency,
            in_degree,
            position,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Kahn 算法：排不完的步骤即位于环上或环的下游
    fn check_acyclic(&self) -> Result<(), PlanError> {
        let mut degree = self.in_degree.clone();
        let mut queue: VecDeque<&StepId> = self
            .in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id)
            .collect();

        let mut visited = 0;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for dependent in self.adjacency.get(id).into_iter().flatten() {
                if let Some(d) = degree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if visited == self.position.len() {
            return Ok(());
        }
        let mut offending: Vec<StepId> = degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(id, _)| id)
            .collect();
        self.sort_by_position(&mut offending);
        Err(PlanError::CyclicDependency { steps: offending })
    }

    fn sort_by_position(&self, ids: &mut [StepId]) {
        ids.sort_by_key(|id| self.position.get(id).copied().unwrap_or(usize::MAX));
    }

    /// 初始可执行步骤（无依赖），按声明顺序
    pub fn initial_ready(&self) -> Vec<StepId> {
        let mut ready: Vec<StepId> = self
            .in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| id.clone())
            .collect();
        self.sort_by_position(&mut ready);
        ready
    }

    /// 记录某步骤已有结果（成败均可），返回新变为可执行的步骤
    pub fn mark_completed(&mut self, completed: &StepId) -> Vec<StepId> {
        let mut newly_ready = Vec::new();
        if let Some(dependents) = self.adjacency.get(completed) {
            for dependent in dependents {
                if let Some(degree) = self.in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        newly_ready.push(dependent.clone());
                    }
                }
            }
        }
        self.sort_by_position(&mut newly_ready);
        newly_ready
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }
}

// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::dag::task::{TaskId, TaskReference};
use crate::dag::validate::validate_tasks;
use crate::errors::Result;
use crate::types::Phase;

/// Internal node structure: stores immediate blockers and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Same-phase blockers: tasks that must succeed before this one can run.
    deps: Vec<TaskId>,
    /// Blockers living in an earlier phase.
    external: Vec<TaskId>,
    /// Same-phase dependents: tasks that list this one as a blocker.
    dependents: Vec<TaskId>,
}

/// Adjacency of the tasks belonging to a single phase.
#[derive(Debug, Clone)]
pub struct PhaseGraph {
    phase: Phase,
    nodes: HashMap<TaskId, DagNode>,
    /// Topological order computed at build time.
    order: Vec<TaskId>,
}

impl PhaseGraph {
    fn new(phase: Phase, order: Vec<TaskId>) -> Self {
        let nodes = order
            .iter()
            .map(|id| (id.clone(), DagNode::default()))
            .collect();
        Self { phase, nodes, order }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Task ids in a valid execution order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Blockers of `id` within this phase.
    pub fn dependencies_of(&self, id: &TaskId) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Blockers of `id` that live in an earlier phase.
    pub fn external_dependencies_of(&self, id: &TaskId) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.external.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks of this phase that list `id` as a blocker.
    pub fn dependents_of(&self, id: &TaskId) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

/// Validated, immutable task graph grouped by phase.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: HashMap<TaskId, Arc<TaskReference>>,
    phases: BTreeMap<Phase, PhaseGraph>,
}

impl TaskGraph {
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::new()
    }

    /// Non-empty phases in barrier order.
    pub fn phases(&self) -> impl Iterator<Item = &PhaseGraph> {
        self.phases.values()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseGraph> {
        self.phases.get(&phase)
    }

    /// Tasks of `phase` in topological order.
    pub fn tasks_in(&self, phase: Phase) -> Vec<&TaskReference> {
        self.phases
            .get(&phase)
            .map(|pg| pg.tasks().filter_map(|id| self.task(id)).collect())
            .unwrap_or_default()
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskReference> {
        self.tasks.get(id).map(|t| t.as_ref())
    }

    pub(crate) fn shared_task(&self, id: &TaskId) -> Option<Arc<TaskReference>> {
        self.tasks.get(id).cloned()
    }

    pub fn blockers_of(&self, id: &TaskId) -> Vec<&TaskId> {
        self.task(id)
            .map(|t| t.blockers().iter().collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, id: &TaskId) -> &[TaskId] {
        self.task(id)
            .and_then(|t| self.phases.get(&t.phase()))
            .map(|pg| pg.dependents_of(id))
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Accumulates tasks; [`TaskGraphBuilder::build`] validates and freezes them.
#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    tasks: Vec<TaskReference>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, task: TaskReference) -> &mut Self {
        self.tasks.push(task);
        self
    }

    pub fn with_task(mut self, task: TaskReference) -> Self {
        self.tasks.push(task);
        self
    }

    /// Validate blockers and acyclicity, then compute per-phase adjacency.
    pub fn build(self) -> Result<TaskGraph> {
        let mut orders = validate_tasks(&self.tasks)?;

        let mut phases: BTreeMap<Phase, PhaseGraph> = BTreeMap::new();
        for (phase, order) in orders.drain() {
            phases.insert(phase, PhaseGraph::new(phase, order));
        }

        let phase_of: HashMap<TaskId, Phase> = self
            .tasks
            .iter()
            .map(|t| (t.id().clone(), t.phase()))
            .collect();

        for task in &self.tasks {
            let Some(pg) = phases.get_mut(&task.phase()) else {
                continue;
            };
            for blocker in task.blockers() {
                if phase_of.get(blocker) == Some(&task.phase()) {
                    if let Some(node) = pg.nodes.get_mut(task.id()) {
                        node.deps.push(blocker.clone());
                    }
                    if let Some(node) = pg.nodes.get_mut(blocker) {
                        node.dependents.push(task.id().clone());
                    }
                } else if let Some(node) = pg.nodes.get_mut(task.id()) {
                    node.external.push(blocker.clone());
                }
            }
        }

        let tasks = self
            .tasks
            .into_iter()
            .map(|t| (t.id().clone(), Arc::new(t)))
            .collect();

        Ok(TaskGraph { tasks, phases })
    }
}

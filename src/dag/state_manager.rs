// src/dag/state_manager.rs

//! State transitions for the tasks of a single phase.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::dag::graph::PhaseGraph;
use crate::dag::state::TaskState;
use crate::dag::task::TaskId;

/// Applies transitions to a phase's state table.
pub struct StateManager<'a> {
    graph: &'a PhaseGraph,
    states: &'a mut HashMap<TaskId, TaskState>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a PhaseGraph, states: &'a mut HashMap<TaskId, TaskState>) -> Self {
        Self { graph, states }
    }

    /// Move every `Pending` task whose blockers all succeeded to `Eligible`.
    ///
    /// Returns the newly eligible tasks in topological order.
    pub fn promote_eligible(&mut self) -> Vec<TaskId> {
        // Decide first, then mutate to avoid borrowing issues.
        let candidates: Vec<TaskId> = {
            let ro = ReadOnlyStateManager::new(self.graph, self.states);
            self.graph
                .tasks()
                .filter(|id| self.states.get(*id) == Some(&TaskState::Pending))
                .filter(|id| ro.deps_satisfied(id))
                .cloned()
                .collect()
        };

        for id in &candidates {
            debug!(task = %id, phase = %self.graph.phase(), "blockers satisfied; marking Eligible");
            self.states.insert(id.clone(), TaskState::Eligible);
        }

        candidates
    }

    /// Mark every not-yet-started transitive dependent of `root` as `Skipped`.
    ///
    /// Returns the newly skipped tasks (excluding `root`).
    pub fn mark_dependents_skipped(&mut self, root: &TaskId) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = self.graph.dependents_of(root).to_vec();
        let mut newly_skipped = Vec::new();

        while let Some(id) = stack.pop() {
            match self.states.get(&id).copied() {
                Some(TaskState::Pending) | Some(TaskState::Eligible) => {
                    self.states.insert(id.clone(), TaskState::Skipped);
                    debug!(
                        task = %id,
                        blocker = %root,
                        "marking dependent as Skipped due to upstream failure"
                    );
                    stack.extend(self.graph.dependents_of(&id).iter().cloned());
                    newly_skipped.push(id);
                }
                Some(TaskState::Running) => {
                    // Cannot happen for a dependent: it needs `root` to succeed first.
                    warn!(task = %id, blocker = %root, "dependent already running while blocker failed");
                }
                Some(_) => {
                    // Already terminal.
                }
                None => {
                    warn!(task = %id, "dependent missing from phase state table");
                }
            }
        }

        newly_skipped
    }

    /// Skip every task that has not started yet.
    pub fn skip_unstarted(&mut self) -> Vec<TaskId> {
        let mut skipped = Vec::new();
        for id in self.graph.tasks() {
            if let Some(state) = self.states.get_mut(id) {
                if matches!(state, TaskState::Pending | TaskState::Eligible) {
                    *state = TaskState::Skipped;
                    skipped.push(id.clone());
                }
            }
        }
        skipped
    }
}

/// A read-only view of a phase's state table.
pub struct ReadOnlyStateManager<'a> {
    graph: &'a PhaseGraph,
    states: &'a HashMap<TaskId, TaskState>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(graph: &'a PhaseGraph, states: &'a HashMap<TaskId, TaskState>) -> Self {
        Self { graph, states }
    }

    /// Whether every same-phase blocker of `id` has succeeded.
    ///
    /// Blockers from earlier phases are settled when the phase starts.
    pub fn deps_satisfied(&self, id: &TaskId) -> bool {
        self.graph.dependencies_of(id).iter().all(|dep| {
            match self.states.get(dep) {
                Some(TaskState::Succeeded) => true,
                Some(_) => false,
                None => {
                    warn!(task = %id, dep = %dep, "blocker missing from phase state table");
                    false
                }
            }
        })
    }
}

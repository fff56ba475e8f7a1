use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::PhaseGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state::TaskState;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task::TaskId;
use crate::engine::TaskOutcome;
use crate::types::Phase;

/// Synchronous state machine for the tasks of one phase.
///
/// It is responsible for:
/// - settling blockers from earlier phases when the phase starts
/// - deciding when a task becomes eligible (all blockers succeeded)
/// - recording running / succeeded / failed transitions
/// - skipping dependents of a failed task, transitively
///
/// It performs no IO; the async runtime feeds it completions one at a time.
#[derive(Debug)]
pub struct PhaseScheduler<'g> {
    graph: &'g PhaseGraph,
    states: HashMap<TaskId, TaskState>,
    started: bool,
}

impl<'g> PhaseScheduler<'g> {
    pub fn new(graph: &'g PhaseGraph) -> Self {
        let states = graph
            .tasks()
            .map(|id| (id.clone(), TaskState::Pending))
            .collect();
        Self {
            graph,
            states,
            started: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.graph.phase()
    }

    /// Start the phase.
    ///
    /// `prior` holds the final states of tasks from earlier phases; a task
    /// whose cross-phase blocker did not succeed is skipped immediately.
    pub fn start(&mut self, prior: &HashMap<TaskId, TaskState>) -> SchedulerStep {
        if self.started {
            warn!(phase = %self.phase(), "phase already started; ignoring");
            return SchedulerStep {
                phase_finished: self.is_finished(),
                ..SchedulerStep::default()
            };
        }
        self.started = true;

        let mut newly_skipped = Vec::new();
        for id in self.graph.tasks() {
            let blocked = self
                .graph
                .external_dependencies_of(id)
                .iter()
                .find(|dep| prior.get(*dep) != Some(&TaskState::Succeeded));
            if let Some(dep) = blocked {
                debug!(
                    task = %id,
                    blocker = %dep,
                    "earlier-phase blocker did not succeed; marking Skipped"
                );
                self.states.insert(id.clone(), TaskState::Skipped);
                newly_skipped.push(id.clone());
            }
        }

        let mut manager = StateManager::new(self.graph, &mut self.states);
        for id in newly_skipped.clone() {
            newly_skipped.extend(manager.mark_dependents_skipped(&id));
        }
        let newly_eligible = manager.promote_eligible();

        info!(
            phase = %self.phase(),
            tasks = self.graph.len(),
            eligible = newly_eligible.len(),
            "scheduler: starting phase"
        );

        SchedulerStep {
            newly_eligible,
            newly_skipped,
            phase_finished: self.is_finished(),
        }
    }

    /// `Eligible -> Running`. Returns `false` if the task was not eligible.
    pub fn mark_running(&mut self, task: &TaskId) -> bool {
        match self.states.get_mut(task) {
            Some(state) if *state == TaskState::Eligible => {
                *state = TaskState::Running;
                debug!(task = %task, phase = %self.graph.phase(), "task Running");
                true
            }
            Some(other) => {
                warn!(task = %task, state = %other, "cannot start task that is not Eligible");
                false
            }
            None => {
                warn!(task = %task, "start requested for task outside this phase; ignoring");
                false
            }
        }
    }

    /// Record the outcome of a running task and release newly eligible
    /// dependents (or skip them on failure).
    pub fn step_completion(&mut self, task: &TaskId, outcome: TaskOutcome) -> SchedulerStep {
        match self.states.get(task).copied() {
            Some(TaskState::Running) => {}
            Some(other) => {
                warn!(task = %task, state = %other, "completion for task that is not Running; ignoring");
                return SchedulerStep {
                    phase_finished: self.is_finished(),
                    ..SchedulerStep::default()
                };
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
                return SchedulerStep {
                    phase_finished: self.is_finished(),
                    ..SchedulerStep::default()
                };
            }
        }

        let mut step = SchedulerStep::default();
        match outcome {
            TaskOutcome::Success => {
                self.states.insert(task.clone(), TaskState::Succeeded);
                debug!(task = %task, "task completed successfully");
                let mut manager = StateManager::new(self.graph, &mut self.states);
                step.newly_eligible = manager.promote_eligible();
            }
            TaskOutcome::Failed => {
                self.states.insert(task.clone(), TaskState::Failed);
                warn!(task = %task, phase = %self.graph.phase(), "task failed; skipping dependents");
                let mut manager = StateManager::new(self.graph, &mut self.states);
                step.newly_skipped = manager.mark_dependents_skipped(task);
            }
        }

        step.phase_finished = self.is_finished();
        if step.phase_finished {
            info!(phase = %self.phase(), "scheduler: all tasks terminal; phase finished");
        }
        step
    }

    /// `Eligible -> Failed` for a task no executor could run. Its dependents
    /// are skipped as for any other failure.
    pub fn step_rejected(&mut self, task: &TaskId) -> SchedulerStep {
        if self.states.get(task) != Some(&TaskState::Eligible) {
            warn!(task = %task, "rejection for task that is not Eligible; ignoring");
            return SchedulerStep {
                phase_finished: self.is_finished(),
                ..SchedulerStep::default()
            };
        }

        self.states.insert(task.clone(), TaskState::Failed);
        warn!(task = %task, phase = %self.graph.phase(), "task rejected; skipping dependents");
        let mut manager = StateManager::new(self.graph, &mut self.states);
        let newly_skipped = manager.mark_dependents_skipped(task);

        SchedulerStep {
            newly_eligible: Vec::new(),
            newly_skipped,
            phase_finished: self.is_finished(),
        }
    }

    /// Stop releasing work: every task that has not started becomes `Skipped`.
    pub fn cancel(&mut self) -> SchedulerStep {
        let mut manager = StateManager::new(self.graph, &mut self.states);
        let newly_skipped = manager.skip_unstarted();
        if !newly_skipped.is_empty() {
            info!(
                phase = %self.graph.phase(),
                skipped = newly_skipped.len(),
                "scheduler: cancellation skipped unstarted tasks"
            );
        }
        SchedulerStep {
            newly_eligible: Vec::new(),
            newly_skipped,
            phase_finished: self.is_finished(),
        }
    }

    /// Eligible tasks in topological order.
    pub fn eligible(&self) -> Vec<TaskId> {
        self.graph
            .tasks()
            .filter(|id| self.states.get(*id) == Some(&TaskState::Eligible))
            .cloned()
            .collect()
    }

    pub fn state_of(&self, task: &TaskId) -> Option<TaskState> {
        self.states.get(task).copied()
    }

    /// Whether all same-phase blockers of `task` have succeeded.
    ///
    /// Returns `None` if the task is not part of this phase.
    pub fn deps_satisfied(&self, task: &TaskId) -> Option<bool> {
        if !self.states.contains_key(task) {
            return None;
        }
        let ro = ReadOnlyStateManager::new(self.graph, &self.states);
        Some(ro.deps_satisfied(task))
    }

    pub fn is_finished(&self) -> bool {
        self.states.values().all(|s| s.is_terminal())
    }

    /// Whether any task ended `Failed` or `Skipped`.
    pub fn has_failures(&self) -> bool {
        self.states.values().any(|s| s.is_unsuccessful())
    }

    pub fn states(&self) -> &HashMap<TaskId, TaskState> {
        &self.states
    }

    pub fn into_states(self) -> HashMap<TaskId, TaskState> {
        self.states
    }
}

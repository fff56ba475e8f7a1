// src/dag/validate.rs

//! Structural checks run before a [`super::TaskGraph`] is frozen.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::task::{TaskId, TaskReference};
use crate::errors::{PhasedagError, Result};
use crate::types::Phase;

/// Check ids and blocker references, then return a topological order of
/// each phase's tasks.
pub fn validate_tasks(tasks: &[TaskReference]) -> Result<HashMap<Phase, Vec<TaskId>>> {
    let phases = index_by_id(tasks)?;
    validate_blockers(tasks, &phases)?;

    let mut orders = HashMap::new();
    for phase in Phase::ALL {
        let members: Vec<&TaskReference> =
            tasks.iter().filter(|t| t.phase() == phase).collect();
        if members.is_empty() {
            continue;
        }
        orders.insert(phase, phase_order(phase, &members)?);
    }
    Ok(orders)
}

fn index_by_id(tasks: &[TaskReference]) -> Result<HashMap<&TaskId, Phase>> {
    let mut phases = HashMap::with_capacity(tasks.len());
    for task in tasks {
        if phases.insert(task.id(), task.phase()).is_some() {
            return Err(PhasedagError::DuplicateTask(task.id().clone()));
        }
    }
    Ok(phases)
}

fn validate_blockers(tasks: &[TaskReference], phases: &HashMap<&TaskId, Phase>) -> Result<()> {
    for task in tasks {
        for blocker in task.blockers() {
            if blocker == task.id() {
                return Err(PhasedagError::SelfBlocker(task.id().clone()));
            }
            let blocker_phase = match phases.get(blocker) {
                Some(p) => *p,
                None => {
                    return Err(PhasedagError::UnknownBlocker {
                        task: task.id().clone(),
                        blocker: blocker.clone(),
                    });
                }
            };
            if blocker_phase > task.phase() {
                return Err(PhasedagError::BlockerInLaterPhase {
                    task: task.id().clone(),
                    phase: task.phase(),
                    blocker: blocker.clone(),
                    blocker_phase,
                });
            }
        }
    }
    Ok(())
}

/// Topologically sort one phase, considering only same-phase blockers.
///
/// Edge direction: blocker -> task.
fn phase_order(phase: Phase, members: &[&TaskReference]) -> Result<Vec<TaskId>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for task in members {
        graph.add_node(task.id().as_str());
    }

    for task in members {
        for blocker in task.blockers() {
            if graph.contains_node(blocker.as_str()) {
                graph.add_edge(blocker.as_str(), task.id().as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(TaskId::from).collect()),
        Err(cycle) => Err(PhasedagError::DagCycle {
            phase,
            task: TaskId::from(cycle.node_id()),
        }),
    }
}

// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::{BTreeMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::dag::Graph;
use crate::dag::scheduler_step::SkippedTask;
use crate::dag::task_info::TaskInfo;
use crate::engine::TaskName;
use crate::types::TaskState;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a Graph,
    tasks: &'a mut BTreeMap<TaskName, TaskInfo>,
    /// `Pending` tasks whose dependencies are met, in the order they became
    /// ready.
    ready: &'a mut VecDeque<TaskName>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a Graph,
        tasks: &'a mut BTreeMap<TaskName, TaskInfo>,
        ready: &'a mut VecDeque<TaskName>,
    ) -> Self {
        Self {
            graph,
            tasks,
            ready,
        }
    }

    /// Mark every still-`Pending` task downstream of `failed` as `Skipped`.
    ///
    /// Returns the newly skipped tasks; `failed` itself is not included.
    pub fn mark_dependents_skipped(&mut self, failed: &str) -> Vec<SkippedTask> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed).to_vec();
        let mut visited: HashSet<TaskName> = HashSet::new();
        let mut newly_skipped = Vec::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let Some(info) = self.tasks.get_mut(&name) else {
                warn!(task = %name, "node in DAG not present in tasks map");
                continue;
            };

            if info.state == TaskState::Pending {
                info.state = TaskState::Skipped;
                info.skipped_because = Some(failed.to_string());
                debug!(task = %info.name, upstream = %failed, "skipping dependent of failed task");
                newly_skipped.push(SkippedTask {
                    task: info.name.clone(),
                    cause: Some(failed.to_string()),
                });
            }

            stack.extend(self.graph.dependents_of(&name).iter().cloned());
        }

        newly_skipped.sort_by(|a, b| a.task.cmp(&b.task));
        newly_skipped
    }

    /// Mark every `Pending` task as `Skipped` (run cancelled).
    pub fn mark_all_pending_skipped(&mut self) -> Vec<SkippedTask> {
        let mut newly_skipped = Vec::new();
        for info in self.tasks.values_mut() {
            if info.state == TaskState::Pending {
                info.state = TaskState::Skipped;
                newly_skipped.push(SkippedTask {
                    task: info.name.clone(),
                    cause: None,
                });
            }
        }
        newly_skipped
    }

    /// Queue newly ready tasks, then dispatch up to `slots` of them in the
    /// order they became ready. Dispatched tasks are marked `Running`.
    ///
    /// Tasks that become ready in the same step are queued by name.
    pub fn collect_new_ready_tasks(&mut self, slots: usize) -> Vec<TaskName> {
        let tasks = &*self.tasks;
        let newly_ready: Vec<TaskName> = tasks
            .values()
            .filter(|info| info.state == TaskState::Pending && deps_satisfied(tasks, info))
            .filter(|info| !self.ready.contains(&info.name))
            .map(|info| info.name.clone())
            .collect();
        self.ready.extend(newly_ready);

        let mut dispatched = Vec::new();
        while dispatched.len() < slots {
            let Some(name) = self.ready.pop_front() else {
                break;
            };
            // Skipped while waiting in the queue.
            let Some(info) = self.tasks.get_mut(&name) else {
                continue;
            };
            if info.state != TaskState::Pending {
                continue;
            }
            info!(task = %info.name, "dependencies satisfied; dispatching task");
            info.state = TaskState::Running;
            dispatched.push(name);
        }

        if !self.ready.is_empty() {
            debug!(waiting = ?self.ready, "ready tasks waiting for a free slot");
        }
        dispatched
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.values().all(|info| info.state.is_terminal())
    }
}

/// Whether every dependency of `info` has succeeded.
///
/// This is the canonical implementation of dependency satisfaction.
pub fn deps_satisfied(tasks: &BTreeMap<TaskName, TaskInfo>, info: &TaskInfo) -> bool {
    info.deps.iter().all(|dep_name| match tasks.get(dep_name) {
        Some(dep) => dep.state == TaskState::Succeeded,
        None => {
            warn!(task = %info.name, dep = %dep_name, "dependency missing from tasks map");
            false
        }
    })
}

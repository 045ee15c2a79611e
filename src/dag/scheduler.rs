// src/dag/scheduler.rs

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::Graph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{StateManager, deps_satisfied};
use crate::dag::task_info::TaskInfo;
use crate::engine::TaskName;
use crate::types::{RunStatus, TaskState};

/// Scheduler holds the immutable graph plus the mutable state of one run.
///
/// It is a pure state machine (no IO, no async) responsible for:
/// - deciding which `Pending` tasks are ready (all deps `Succeeded`)
/// - keeping at most `concurrency` tasks `Running`
/// - skipping everything downstream of a failed task
/// - deciding when the run is finished and with which status
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<Graph>,
    tasks: BTreeMap<TaskName, TaskInfo>,
    /// Ready tasks waiting for a free slot, oldest first.
    ready: VecDeque<TaskName>,
    concurrency: usize,
    started: bool,
}

impl Scheduler {
    /// Fresh run: every task `Pending`.
    pub fn new(graph: Arc<Graph>, concurrency: usize) -> Self {
        Self::with_states(graph, concurrency, &BTreeMap::new())
    }

    /// Run seeded from earlier task states (resume).
    ///
    /// Tasks listed as `Succeeded` stay satisfied and are never dispatched;
    /// every other task, listed or not, starts `Pending`.
    pub fn with_states(
        graph: Arc<Graph>,
        concurrency: usize,
        prior: &BTreeMap<TaskName, TaskState>,
    ) -> Self {
        let mut tasks = BTreeMap::new();

        for name in graph.tasks() {
            let required = graph.task(name).map(|t| t.required).unwrap_or(true);
            let state = match prior.get(name) {
                Some(TaskState::Succeeded) => TaskState::Succeeded,
                _ => TaskState::Pending,
            };
            let deps = graph.dependencies_of(name).to_vec();
            tasks.insert(
                name.to_string(),
                TaskInfo::new(name.to_string(), deps, required, state),
            );
        }

        Self {
            graph,
            tasks,
            ready: VecDeque::new(),
            concurrency: concurrency.max(1),
            started: false,
        }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Read-only view of the given task's state.
    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|info| info.state)
    }

    /// For skipped tasks, the upstream task whose failure caused the skip.
    pub fn skipped_because(&self, task: &str) -> Option<&str> {
        self.tasks.get(task)?.skipped_because.as_deref()
    }

    /// Whether all dependencies of `task` have succeeded.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        Some(deps_satisfied(&self.tasks, info))
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|info| info.state == TaskState::Running)
            .count()
    }

    /// Every task is `Succeeded`, `Failed` or `Skipped`.
    pub fn is_finished(&self) -> bool {
        self.tasks.values().all(|info| info.state.is_terminal())
    }

    /// Begin the run: dispatch the initial ready set.
    pub fn step_start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("step_start called twice; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;

        let slots = self.free_slots();
        let mut manager = StateManager::new(&self.graph, &mut self.tasks, &mut self.ready);
        let newly_scheduled = manager.collect_new_ready_tasks(slots);
        let run_just_finished = manager.all_tasks_terminal();

        info!(
            ready = ?newly_scheduled,
            concurrency = self.concurrency,
            "scheduler: starting run"
        );

        SchedulerStep {
            newly_scheduled,
            newly_skipped: Vec::new(),
            run_just_finished,
        }
    }

    /// A dispatched task reached its terminal state.
    pub fn step_completion(&mut self, task: &str, succeeded: bool) -> SchedulerStep {
        match self.tasks.get_mut(task) {
            Some(info) if info.state == TaskState::Running => {
                info.state = if succeeded {
                    TaskState::Succeeded
                } else {
                    TaskState::Failed
                };
            }
            Some(info) => {
                warn!(task = %task, state = %info.state, "completion for task that is not running; ignoring");
                return SchedulerStep::default();
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
                return SchedulerStep::default();
            }
        }

        let mut newly_skipped = Vec::new();
        if succeeded {
            debug!(task = %task, "task succeeded");
        } else {
            warn!(task = %task, "task failed; skipping dependents in this run");
            let mut manager = StateManager::new(&self.graph, &mut self.tasks, &mut self.ready);
            newly_skipped = manager.mark_dependents_skipped(task);
        }

        let slots = self.free_slots();
        let mut manager = StateManager::new(&self.graph, &mut self.tasks, &mut self.ready);
        let newly_scheduled = manager.collect_new_ready_tasks(slots);
        let run_just_finished = manager.all_tasks_terminal();

        if run_just_finished {
            info!(status = %self.run_status(), "scheduler: all tasks terminal; run finished");
        }

        SchedulerStep {
            newly_scheduled,
            newly_skipped,
            run_just_finished,
        }
    }

    /// Run cancelled: nothing new is dispatched and every `Pending` task is
    /// skipped. Tasks already `Running` still report their completion.
    pub fn step_cancel(&mut self) -> SchedulerStep {
        let mut manager = StateManager::new(&self.graph, &mut self.tasks, &mut self.ready);
        let newly_skipped = manager.mark_all_pending_skipped();
        let run_just_finished = manager.all_tasks_terminal();

        info!(
            skipped = newly_skipped.len(),
            "scheduler: run cancelled; pending tasks skipped"
        );

        SchedulerStep {
            newly_scheduled: Vec::new(),
            newly_skipped,
            run_just_finished,
        }
    }

    /// Overall status derived from task states.
    ///
    /// - `Succeeded` iff every required task succeeded.
    /// - `PartiallyFailed` iff some weakly connected component has all its
    ///   required tasks succeeded while another does not.
    /// - `Failed` otherwise.
    pub fn run_status(&self) -> RunStatus {
        if !self.started {
            return RunStatus::Pending;
        }
        if !self.is_finished() {
            return RunStatus::Running;
        }

        let satisfied = |name: &TaskName| {
            self.tasks
                .get(name)
                .map(|info| info.is_satisfied_for_run())
                .unwrap_or(true)
        };

        if self.tasks.keys().all(satisfied) {
            return RunStatus::Succeeded;
        }

        let any_component_ok = self
            .graph
            .components()
            .iter()
            .any(|component| component.iter().all(satisfied));

        if any_component_ok {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Failed
        }
    }

    fn free_slots(&self) -> usize {
        self.concurrency.saturating_sub(self.running_count())
    }
}

// tests/property/scheduler.rs

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;
use stagegate::dag::{Graph, GraphBuilder, Scheduler, Task};
use stagegate::types::{RunStatus, TaskState};

// Strategy to generate a valid DAG.
// We ensure acyclicity by only allowing task N to depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Arc<Graph>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            let mut b = GraphBuilder::new();
            for i in 0..raw_deps.len() {
                b.add_task(Task::barrier(format!("task_{i}"))).unwrap();
            }
            for (i, potential) in raw_deps.into_iter().enumerate() {
                if i == 0 {
                    continue;
                }
                for dep in potential {
                    b.add_dependency(&format!("task_{i}"), &format!("task_{}", dep % i))
                        .unwrap();
                }
            }
            Arc::new(b.validate().unwrap())
        })
    })
}

proptest! {
    #[test]
    fn test_scheduler_eventual_termination(
        graph in dag_strategy(10),
        concurrency in 1..4usize,
        failing_indices in proptest::collection::vec(0..10usize, 0..4),
    ) {
        let failing: BTreeSet<String> = failing_indices
            .iter()
            .map(|i| format!("task_{i}"))
            .collect();

        let mut scheduler = Scheduler::new(graph.clone(), concurrency);
        let mut executing: VecDeque<String> = VecDeque::new();

        let step = scheduler.step_start();
        for name in &step.newly_scheduled {
            for dep in graph.dependencies_of(name) {
                prop_assert_eq!(scheduler.state_of(dep), Some(TaskState::Succeeded));
            }
        }
        executing.extend(step.newly_scheduled);

        let mut steps = 0;
        while let Some(task) = executing.pop_front() {
            steps += 1;
            prop_assert!(steps <= 1000, "simulation did not terminate");
            prop_assert!(scheduler.running_count() <= concurrency);

            let step = scheduler.step_completion(&task, !failing.contains(&task));

            for skipped in &step.newly_skipped {
                let cause = skipped.cause.clone().unwrap();
                prop_assert!(graph.descendants_of(&cause).contains(&skipped.task));
                prop_assert_eq!(scheduler.state_of(&cause), Some(TaskState::Failed));
            }
            for name in &step.newly_scheduled {
                for dep in graph.dependencies_of(name) {
                    prop_assert_eq!(scheduler.state_of(dep), Some(TaskState::Succeeded));
                }
            }
            executing.extend(step.newly_scheduled);
        }

        prop_assert!(scheduler.is_finished());
        for name in graph.tasks() {
            let state = scheduler.state_of(name).unwrap();
            prop_assert!(state.is_terminal(), "{} left in {:?}", name, state);
            if failing.contains(name) {
                prop_assert_ne!(state, TaskState::Succeeded);
            }
        }

        let status = scheduler.run_status();
        if graph.tasks().all(|t| !failing.contains(t)) {
            prop_assert_eq!(status, RunStatus::Succeeded);
        } else {
            prop_assert_ne!(status, RunStatus::Succeeded);
        }
    }
}

// tests/property/graph.rs

use std::collections::BTreeSet;

use proptest::prelude::*;
use stagegate::dag::{GraphBuilder, Task};
use stagegate::errors::StagegateError;

// Edges only point from task i to tasks 0..i, so the result is acyclic.
fn acyclic_edges(max_tasks: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2..=max_tasks).prop_flat_map(|n| {
        let edges = proptest::collection::vec((1..n, any::<usize>()), 0..n * 2)
            .prop_map(|raw| raw.into_iter().map(|(i, d)| (i, d % i)).collect());
        (Just(n), edges)
    })
}

fn builder(n: usize, edges: &[(usize, usize)]) -> GraphBuilder {
    let mut b = GraphBuilder::new();
    for i in 0..n {
        b.add_task(Task::barrier(format!("task_{i}"))).unwrap();
    }
    for (task, dep) in edges {
        b.add_dependency(&format!("task_{task}"), &format!("task_{dep}"))
            .unwrap();
    }
    b
}

proptest! {
    #[test]
    fn test_acyclic_graphs_validate((n, edges) in acyclic_edges(12)) {
        let graph = builder(n, &edges).validate().unwrap();
        prop_assert_eq!(graph.len(), n);

        let order = graph.topological_order();
        prop_assert_eq!(order.len(), n);
        for (task, dep) in &edges {
            let t = order.iter().position(|x| *x == format!("task_{task}")).unwrap();
            let d = order.iter().position(|x| *x == format!("task_{dep}")).unwrap();
            prop_assert!(d < t);
        }
    }

    #[test]
    fn test_back_edge_produces_cycle_naming_a_member(
        (n, edges) in acyclic_edges(12),
        pick in any::<usize>(),
    ) {
        // Close a chain task_{k} -> ... -> task_0 by making task_0 depend on task_{k}.
        let k = 1 + pick % (n - 1);
        let mut edges = edges;
        for i in 1..=k {
            edges.push((i, i - 1));
        }
        edges.push((0, k));

        let members: BTreeSet<String> = (0..=k).map(|i| format!("task_{i}")).collect();
        // Every other edge points downwards, so any cycle runs through 0..=k.
        match builder(n, &edges).validate() {
            Err(StagegateError::Cycle(task)) => {
                prop_assert!(members.contains(&task), "{} is not on the cycle", task);
            }
            other => prop_assert!(false, "expected cycle, got {:?}", other.map(|g| g.len())),
        }
    }
}

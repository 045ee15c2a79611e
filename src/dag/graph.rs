// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::task::Task;
use crate::engine::TaskName;
use crate::errors::{Result, StagegateError};

/// Mutable graph under construction.
///
/// Tasks and edges are added here; [`GraphBuilder::validate`] checks
/// acyclicity and freezes the result into a [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    tasks: BTreeMap<TaskName, Task>,
    /// task -> the tasks it depends on.
    deps: BTreeMap<TaskName, BTreeSet<TaskName>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. Fails with `DuplicateTask` if the name already exists.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.name) {
            return Err(StagegateError::DuplicateTask(task.name));
        }
        self.deps.insert(task.name.clone(), BTreeSet::new());
        self.tasks.insert(task.name.clone(), task);
        Ok(())
    }

    /// Declare that `task` may only start after `depends_on` succeeded.
    ///
    /// Both tasks must already exist. Adding an edge twice is a no-op.
    pub fn add_dependency(&mut self, task: &str, depends_on: &str) -> Result<()> {
        for name in [task, depends_on] {
            if !self.tasks.contains_key(name) {
                return Err(StagegateError::UnknownTask {
                    task: task.to_string(),
                    dependency: name.to_string(),
                });
            }
        }

        let inserted = self
            .deps
            .entry(task.to_string())
            .or_default()
            .insert(depends_on.to_string());
        if !inserted {
            debug!(task, depends_on, "duplicate dependency edge ignored");
        }
        Ok(())
    }

    /// Check that the dependency relation is a DAG and freeze it.
    ///
    /// On a cycle, the error names one task that lies on it.
    pub fn validate(self) -> Result<Graph> {
        // Edge direction: dependency -> dependent.
        {
            let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
            for name in self.tasks.keys() {
                g.add_node(name.as_str());
            }
            for (task, deps) in &self.deps {
                for dep in deps {
                    g.add_edge(dep.as_str(), task.as_str(), ());
                }
            }

            // A topological sort will fail if there is a cycle.
            if let Err(cycle) = toposort(&g, None) {
                return Err(StagegateError::Cycle(cycle.node_id().to_string()));
            }
        }

        let mut nodes: BTreeMap<TaskName, DagNode> = self
            .deps
            .iter()
            .map(|(name, deps)| {
                (
                    name.clone(),
                    DagNode {
                        deps: deps.iter().cloned().collect(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        for (task, deps) in &self.deps {
            for dep in deps {
                if let Some(node) = nodes.get_mut(dep) {
                    node.dependents.push(task.clone());
                }
            }
        }

        let tasks = self
            .tasks
            .into_iter()
            .map(|(name, task)| (name, Arc::new(task)))
            .collect();

        Ok(Graph { tasks, nodes })
    }
}

/// Immediate deps and dependents of one task, both sorted by name.
#[derive(Debug, Clone)]
struct DagNode {
    deps: Vec<TaskName>,
    dependents: Vec<TaskName>,
}

/// Validated, immutable task graph.
#[derive(Debug, Clone)]
pub struct Graph {
    tasks: BTreeMap<TaskName, Arc<Task>>,
    nodes: BTreeMap<TaskName, DagNode>,
}

impl Graph {
    /// All task names, ascending.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }

    pub fn task(&self, name: &str) -> Option<&Arc<Task>> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every task reachable downstream of `name` (excluding `name`).
    pub fn descendants_of(&self, name: &str) -> BTreeSet<TaskName> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = self.dependents_of(name).iter().map(|s| s.as_str()).collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next.to_string()) {
                stack.extend(self.dependents_of(next).iter().map(|s| s.as_str()));
            }
        }
        seen
    }

    /// Tasks without dependencies.
    pub fn roots(&self) -> Vec<TaskName> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Deterministic linearisation with ties broken by ascending name.
    ///
    /// For display and logging; execution order is driven by dependencies.
    pub fn topological_order(&self) -> Vec<TaskName> {
        let mut remaining: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(name, node)| (name.as_str(), node.deps.len()))
            .collect();
        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            for dependent in self.dependents_of(name) {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }
        order
    }

    /// Weakly connected components, each sorted, ordered by first member.
    pub fn components(&self) -> Vec<BTreeSet<TaskName>> {
        let mut assigned: BTreeSet<&str> = BTreeSet::new();
        let mut components = Vec::new();

        for start in self.nodes.keys() {
            if assigned.contains(start.as_str()) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut queue = VecDeque::from([start.as_str()]);
            while let Some(name) = queue.pop_front() {
                if !assigned.insert(name) {
                    continue;
                }
                component.insert(name.to_string());
                queue.extend(self.dependencies_of(name).iter().map(|s| s.as_str()));
                queue.extend(self.dependents_of(name).iter().map(|s| s.as_str()));
            }
            components.push(component);
        }

        components
    }

    /// Stable hash over task names and edges.
    ///
    /// Stored with each run so a resume can notice that the graph changed.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (name, node) in &self.nodes {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
            for dep in &node.deps {
                hasher.update(b"<-");
                hasher.update(dep.as_bytes());
                hasher.update(b"\n");
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(names: &[&str]) -> GraphBuilder {
        let mut b = GraphBuilder::new();
        for name in names {
            b.add_task(Task::barrier(*name)).unwrap();
        }
        b
    }

    #[test]
    fn duplicate_task_is_rejected() {
        let mut b = builder(&["a"]);
        let err = b.add_task(Task::barrier("a")).unwrap_err();
        assert!(matches!(err, StagegateError::DuplicateTask(name) if name == "a"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut b = builder(&["a"]);
        let err = b.add_dependency("a", "missing").unwrap_err();
        assert!(
            matches!(err, StagegateError::UnknownTask { ref dependency, .. } if dependency == "missing")
        );
        let err = b.add_dependency("ghost", "a").unwrap_err();
        assert!(matches!(err, StagegateError::UnknownTask { .. }));
    }

    #[test]
    fn duplicate_edge_is_noop() {
        let mut b = builder(&["a", "b"]);
        b.add_dependency("b", "a").unwrap();
        b.add_dependency("b", "a").unwrap();
        let g = b.validate().unwrap();
        assert_eq!(g.dependencies_of("b"), &["a".to_string()]);
        assert_eq!(g.dependents_of("a"), &["b".to_string()]);
    }

    #[test]
    fn cycle_names_a_member() {
        let mut b = builder(&["a", "b", "c", "d"]);
        b.add_dependency("b", "a").unwrap();
        b.add_dependency("c", "b").unwrap();
        b.add_dependency("b", "c").unwrap();
        b.add_dependency("d", "c").unwrap();
        match b.validate() {
            Err(StagegateError::Cycle(name)) => assert!(name == "b" || name == "c", "got {name}"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut b = builder(&["a"]);
        b.add_dependency("a", "a").unwrap();
        assert!(matches!(b.validate(), Err(StagegateError::Cycle(name)) if name == "a"));
    }

    #[test]
    fn topological_order_breaks_ties_by_name() {
        let mut b = builder(&["load_b", "load_a", "create", "insert", "end"]);
        b.add_dependency("load_a", "create").unwrap();
        b.add_dependency("load_b", "create").unwrap();
        b.add_dependency("insert", "load_a").unwrap();
        b.add_dependency("insert", "load_b").unwrap();
        b.add_dependency("end", "insert").unwrap();
        let g = b.validate().unwrap();
        assert_eq!(
            g.topological_order(),
            vec!["create", "load_a", "load_b", "insert", "end"]
        );
    }

    #[test]
    fn descendants_and_components() {
        let mut b = builder(&["a", "b", "c", "x", "y"]);
        b.add_dependency("b", "a").unwrap();
        b.add_dependency("c", "b").unwrap();
        b.add_dependency("y", "x").unwrap();
        let g = b.validate().unwrap();

        assert_eq!(
            g.descendants_of("a").into_iter().collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        assert!(g.descendants_of("c").is_empty());
        assert_eq!(g.roots(), vec!["a", "x"]);

        let comps = g.components();
        assert_eq!(comps.len(), 2);
        assert!(comps[0].contains("c"));
        assert!(comps[1].contains("y"));
    }

    #[test]
    fn fingerprint_tracks_edges() {
        let mut b1 = builder(&["a", "b"]);
        b1.add_dependency("b", "a").unwrap();
        let g1 = b1.validate().unwrap();

        let g2 = builder(&["a", "b"]).validate().unwrap();
        assert_ne!(g1.fingerprint(), g2.fingerprint());
        assert_eq!(g2.fingerprint(), builder(&["b", "a"]).validate().unwrap().fingerprint());
    }
}

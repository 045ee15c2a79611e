// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::Arc;

pub use stagegate_test_utils::builders;
pub use stagegate_test_utils::{CallLog, ScriptedOperation, Step, init_tracing, with_timeout};

use stagegate::dag::{Graph, GraphBuilder, Task};
use stagegate::engine::{Executor, ExecutorOptions};
use stagegate::ledger::MemoryLedgerStore;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Build and validate a graph from tasks and `(task, depends_on)` edges.
pub fn graph(tasks: Vec<Task>, edges: &[(&str, &str)]) -> Arc<Graph> {
    let mut builder = GraphBuilder::new();
    for task in tasks {
        builder.add_task(task).expect("unique task names");
    }
    for (task, dep) in edges {
        builder.add_dependency(task, dep).expect("known tasks");
    }
    Arc::new(builder.validate().expect("acyclic graph"))
}

/// Executor over a shared in-memory ledger.
pub fn executor(store: &MemoryLedgerStore, concurrency: usize) -> Executor {
    Executor::new(Arc::new(store.clone()), ExecutorOptions { concurrency })
}

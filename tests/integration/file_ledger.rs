// tests/integration/file_ledger.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use stagegate::dag::{Graph, GraphBuilder, Task};
use stagegate::engine::{Executor, ExecutorOptions, RunContext};
use stagegate::gate::RowCountGate;
use stagegate::ledger::{FileLedgerStore, LedgerStore, Transition};
use stagegate::types::{RunStatus, TaskKind, TaskState};
use stagegate_test_utils::{CallLog, ScriptedOperation, init_tracing};

fn pipeline(calls: &Arc<CallLog>, transform_rows: i64) -> Arc<Graph> {
    let mut b = GraphBuilder::new();
    b.add_task(Task::new(
        "extract",
        TaskKind::Load,
        ScriptedOperation::rows(&[4]).with_call_log(calls.clone()).shared(),
    ))
    .unwrap();
    b.add_task(
        Task::new(
            "transform",
            TaskKind::Transform,
            ScriptedOperation::rows(&[transform_rows])
                .with_call_log(calls.clone())
                .shared(),
        )
        .with_gate(Arc::new(RowCountGate::non_empty())),
    )
    .unwrap();
    b.add_dependency("transform", "extract").unwrap();
    Arc::new(b.validate().unwrap())
}

fn file_executor(root: &std::path::Path) -> Executor {
    let store: Arc<dyn LedgerStore> = Arc::new(FileLedgerStore::new(root));
    Executor::new(store, ExecutorOptions { concurrency: 2 })
}

#[tokio::test]
async fn test_file_ledger_writes_log_and_snapshot() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let calls = CallLog::new();

    let run = file_executor(dir.path())
        .execute(pipeline(&calls, 3), RunContext::new())
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);

    let run_dir = dir.path().join(&run.run_id);
    assert!(run_dir.join("run.json").exists());

    let log = std::fs::read_to_string(run_dir.join("transitions.jsonl")).unwrap();
    let transitions: Vec<Transition> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    // Pending -> Running -> Succeeded for both tasks.
    assert_eq!(transitions.len(), 4);
    let seqs: Vec<u64> = transitions.iter().map(|t| t.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);

    let reloaded = FileLedgerStore::new(dir.path()).load(&run.run_id).unwrap();
    assert_eq!(reloaded.status, RunStatus::Succeeded);
    assert_eq!(reloaded.tasks["transform"].metrics.get("rows"), Some(&3));
}

#[tokio::test]
async fn test_resume_from_file_ledger_after_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let calls = CallLog::new();

    let failed = file_executor(dir.path())
        .execute(pipeline(&calls, 0), RunContext::new())
        .await
        .unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.state_of("transform"), Some(TaskState::Failed));

    // A fresh store over the same directory stands in for a new process.
    let resumed = file_executor(dir.path())
        .resume(pipeline(&calls, 9), &failed.run_id, &BTreeSet::new(), RunContext::new())
        .await
        .unwrap();

    assert_eq!(resumed.run_id, failed.run_id);
    assert_eq!(resumed.status, RunStatus::Succeeded);
    assert_eq!(calls.calls_for("extract"), 1);
    assert_eq!(calls.calls_for("transform"), 2);
    assert!(resumed.finished_at.is_some());
}

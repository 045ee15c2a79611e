// tests/integration/shell_pipeline.rs

use std::sync::Arc;

use stagegate::engine::{Executor, RunContext, RunReport};
use stagegate::ledger::MemoryLedgerStore;
use stagegate::types::{RunStatus, TaskKind, TaskState};
use stagegate_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use stagegate_test_utils::init_tracing;

#[tokio::test]
async fn test_shell_commands_report_rows_to_gates() {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .memory_ledger()
        .var("greeting", "hello")
        .with_task(
            "extract",
            TaskConfigBuilder::new("echo {greeting}; echo rows=3")
                .kind(TaskKind::Load)
                .row_count_gate(1)
                .build(),
        )
        .with_task(
            "transform",
            TaskConfigBuilder::new("echo rows=0")
                .after("extract")
                .row_count_gate(1)
                .build(),
        )
        .with_task(
            "check_extract",
            TaskConfigBuilder::check()
                .after("extract")
                .command_gate("echo {count}", 2)
                .param("count", "5")
                .build(),
        )
        .build();

    let graph = Arc::new(cfg.build_graph().unwrap());
    let executor = Executor::new(Arc::new(MemoryLedgerStore::new()), cfg.executor_options());
    let run = executor
        .execute(graph.clone(), RunContext::new().with_vars(cfg.vars.clone()))
        .await
        .unwrap();

    assert_eq!(run.state_of("extract"), Some(TaskState::Succeeded));
    assert_eq!(run.tasks["extract"].observed, Some(3));
    assert_eq!(run.state_of("check_extract"), Some(TaskState::Succeeded));
    assert_eq!(run.tasks["check_extract"].observed, Some(5));
    assert_eq!(run.state_of("transform"), Some(TaskState::Failed));
    assert_eq!(run.status, RunStatus::Failed);

    let report = RunReport::new(&run, &graph).to_string();
    assert!(report.contains("transform: 0 rows found, expected at least 1"), "{report}");
}

#[tokio::test]
async fn test_failing_command_fails_task() {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .memory_ledger()
        .with_task("broken", TaskConfigBuilder::new("exit 3").build())
        .build();

    let graph = Arc::new(cfg.build_graph().unwrap());
    let executor = Executor::new(Arc::new(MemoryLedgerStore::new()), cfg.executor_options());
    let run = executor.execute(graph, RunContext::new()).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    let error = run.tasks["broken"].last_error.clone().unwrap_or_default();
    assert!(error.contains('3'), "{error}");
}

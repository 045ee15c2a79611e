// tests/integration/demo_config.rs

use stagegate::config::load_and_validate;
use stagegate::types::TaskKind;

const DEMO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/Stagegate.toml");

#[test]
fn test_warehouse_demo_validates() {
    let cfg = load_and_validate(DEMO).unwrap();
    let graph = cfg.build_graph().unwrap();

    assert_eq!(graph.len(), 23);

    let order = graph.topological_order();
    assert_eq!(order.first().map(String::as_str), Some("create_tables"));
    assert_eq!(order.last().map(String::as_str), Some("end"));

    let position = |name: &str| order.iter().position(|t| t == name).unwrap();
    assert!(position("load_liquor_data") < position("check_load_liquor"));
    assert!(position("load_to_insert") < position("insert_time_dim_table"));
}

#[test]
fn test_warehouse_demo_checks_are_gate_only() {
    let cfg = load_and_validate(DEMO).unwrap();

    let checks: Vec<_> = cfg
        .task
        .iter()
        .filter(|(_, t)| t.kind == TaskKind::Check)
        .collect();
    assert_eq!(checks.len(), 10);
    for (name, task) in checks {
        assert!(task.cmd.is_none(), "{name} should not run a command");
        assert_eq!(task.gate.len(), 1, "{name} should carry one gate");
    }
}

#[test]
fn test_warehouse_demo_ships_its_sql() {
    let cfg = load_and_validate(DEMO).unwrap();
    let sql_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(&cfg.vars["sql_dir"]);

    assert!(sql_dir.join("create_tables.sql").is_file());

    let mut inserts = 0;
    for (name, task) in &cfg.task {
        let Some(cmd) = &task.cmd else { continue };
        if !cmd.contains("insert_{table}.sql") {
            continue;
        }
        let table = &task.params["table"];
        let script = sql_dir.join(format!("insert_{table}.sql"));
        assert!(script.is_file(), "{name} runs missing script {}", script.display());
        inserts += 1;
    }
    assert_eq!(inserts, 6);
}

// src/ledger/store.rs

//! Durable storage behind the run ledger.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::errors::{Result, StagegateError};
use crate::ledger::model::{Run, Transition};

const TRANSITIONS_FILE: &str = "transitions.jsonl";
const SNAPSHOT_FILE: &str = "run.json";

/// Abstract storage for run records.
///
/// `append` must be atomic per transition: after it returns, the transition
/// survives a crash of this process.
pub trait LedgerStore: Send + Sync {
    /// Append one transition to the run's log.
    fn append(&self, transition: &Transition) -> Result<()>;

    /// Store a snapshot of the run's materialised state.
    fn persist(&self, run: &Run) -> Result<()>;

    /// Rebuild a run from its latest snapshot plus any later transitions.
    fn load(&self, run_id: &str) -> Result<Run>;
}

/// Stores runs as files under `<root>/<run_id>/`:
///
/// - `transitions.jsonl`: one JSON transition per line, appended and flushed
/// - `run.json`: latest snapshot, replaced atomically via rename
///
/// Writes are blocking `std::fs` calls made from the runtime thread that
/// records the transition; each is one short append plus `sync_data`.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    root: PathBuf,
}

impl FileLedgerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn ensure_run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating ledger directory {:?}", dir))?;
        Ok(dir)
    }

    fn read_transitions(&self, run_id: &str) -> Result<Vec<Transition>> {
        let path = self.run_dir(run_id).join(TRANSITIONS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).with_context(|| format!("opening {:?}", path))?;
        let lines = BufReader::new(file)
            .lines()
            .collect::<std::io::Result<Vec<_>>>()?;
        let last = lines.iter().rposition(|line| !line.trim().is_empty());

        let mut transitions = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(t) => transitions.push(t),
                // A crash mid-append leaves a torn final line; everything
                // before it is intact.
                Err(e) if Some(idx) == last => {
                    warn!(run_id, path = ?path, error = %e, "ignoring torn last line of transition log");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(transitions)
    }
}

impl LedgerStore for FileLedgerStore {
    fn append(&self, transition: &Transition) -> Result<()> {
        let dir = self.ensure_run_dir(&transition.run_id)?;
        let path = dir.join(TRANSITIONS_FILE);

        // One line per write so a crash leaves at most a torn last line.
        let mut line = serde_json::to_string(transition)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {:?} for append", path))?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        debug!(
            run_id = %transition.run_id,
            task = %transition.task,
            seq = transition.seq,
            "appended transition"
        );
        Ok(())
    }

    fn persist(&self, run: &Run) -> Result<()> {
        let dir = self.ensure_run_dir(&run.run_id)?;
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        let path = dir.join(SNAPSHOT_FILE);

        {
            let file = File::create(&tmp).with_context(|| format!("creating {:?}", tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, run)?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        fs::rename(&tmp, &path).with_context(|| format!("replacing {:?}", path))?;

        info!(run_id = %run.run_id, status = %run.status, path = ?path, "persisted run snapshot");
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Run> {
        let path = self.run_dir(run_id).join(SNAPSHOT_FILE);
        if !path.exists() {
            return Err(StagegateError::RunNotFound(run_id.to_string()));
        }

        let contents = fs::read_to_string(&path)?;
        let mut run: Run = serde_json::from_str(&contents)?;

        // Transitions logged after the snapshot was taken.
        for t in self.read_transitions(run_id)? {
            if t.seq > run.last_seq {
                run.apply(&t);
            }
        }

        Ok(run)
    }
}

#[derive(Debug, Default)]
struct MemoryRecord {
    snapshot: Option<Run>,
    transitions: Vec<Transition>,
}

/// Keeps runs in memory (lost on restart).
///
/// Cloning yields a handle to the same storage, so a test can execute a run
/// and later resume it through another executor.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    runs: Arc<Mutex<HashMap<String, MemoryRecord>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full transition log of a run, in append order.
    pub fn transitions(&self, run_id: &str) -> Vec<Transition> {
        self.lock()
            .get(run_id)
            .map(|r| r.transitions.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryRecord>> {
        // A poisoned lock only means another thread panicked mid-update of
        // plain data; the records themselves are still usable.
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn append(&self, transition: &Transition) -> Result<()> {
        self.lock()
            .entry(transition.run_id.clone())
            .or_default()
            .transitions
            .push(transition.clone());
        Ok(())
    }

    fn persist(&self, run: &Run) -> Result<()> {
        self.lock().entry(run.run_id.clone()).or_default().snapshot = Some(run.clone());
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Run> {
        let runs = self.lock();
        let record = runs
            .get(run_id)
            .ok_or_else(|| StagegateError::RunNotFound(run_id.to_string()))?;
        let mut run = record
            .snapshot
            .clone()
            .ok_or_else(|| StagegateError::RunNotFound(run_id.to_string()))?;

        for t in &record.transitions {
            if t.seq > run.last_seq {
                run.apply(t);
            }
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ledger::model::TransitionMetadata;
    use crate::types::{RunStatus, TaskState};

    fn run(run_id: &str) -> Run {
        let mut tasks = std::collections::BTreeMap::new();
        tasks.insert(
            "extract".to_string(),
            crate::ledger::model::TaskRun::new("extract".into(), run_id.into()),
        );
        Run {
            run_id: run_id.into(),
            graph_fingerprint: "fp".into(),
            status: RunStatus::Running,
            created_at: Utc::now(),
            finished_at: None,
            tasks,
            last_seq: 0,
        }
    }

    fn transition(run_id: &str, seq: u64, from: TaskState, to: TaskState) -> Transition {
        Transition {
            seq,
            run_id: run_id.into(),
            task: "extract".into(),
            from,
            to,
            at: Utc::now(),
            metadata: TransitionMetadata::attempt(1),
        }
    }

    #[test]
    fn file_store_replays_transitions_after_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());

        store.persist(&run("r1")).unwrap();
        store
            .append(&transition("r1", 1, TaskState::Pending, TaskState::Running))
            .unwrap();

        // Crash before the next snapshot: load must still see RUNNING.
        let loaded = store.load("r1").unwrap();
        assert_eq!(loaded.state_of("extract"), Some(TaskState::Running));
        assert_eq!(loaded.last_seq, 1);
        assert!(dir.path().join("r1").join(TRANSITIONS_FILE).exists());
    }

    #[test]
    fn torn_last_line_is_ignored_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());

        store.persist(&run("r1")).unwrap();
        store
            .append(&transition("r1", 1, TaskState::Pending, TaskState::Running))
            .unwrap();

        // Process died halfway through writing seq 2.
        let log = dir.path().join("r1").join(TRANSITIONS_FILE);
        let mut file = OpenOptions::new().append(true).open(&log).unwrap();
        file.write_all(br#"{"seq":2,"run_id":"r1","ta"#).unwrap();
        drop(file);

        let loaded = store.load("r1").unwrap();
        assert_eq!(loaded.state_of("extract"), Some(TaskState::Running));
        assert_eq!(loaded.last_seq, 1);
    }

    #[test]
    fn corrupt_line_before_the_end_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());

        store.persist(&run("r1")).unwrap();
        let log = dir.path().join("r1").join(TRANSITIONS_FILE);
        fs::write(&log, "{\"seq\":1,\"ru\n").unwrap();
        store
            .append(&transition("r1", 2, TaskState::Pending, TaskState::Running))
            .unwrap();

        assert!(matches!(store.load("r1"), Err(StagegateError::JsonError(_))));
    }

    #[test]
    fn missing_run_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path());
        assert!(matches!(store.load("nope"), Err(StagegateError::RunNotFound(id)) if id == "nope"));
        assert!(matches!(
            MemoryLedgerStore::new().load("nope"),
            Err(StagegateError::RunNotFound(_))
        ));
    }

    #[test]
    fn memory_store_clones_share_state() {
        let store = MemoryLedgerStore::new();
        let handle = store.clone();
        store.persist(&run("r2")).unwrap();
        store
            .append(&transition("r2", 1, TaskState::Pending, TaskState::Running))
            .unwrap();

        assert_eq!(handle.transitions("r2").len(), 1);
        assert_eq!(handle.load("r2").unwrap().state_of("extract"), Some(TaskState::Running));
    }
}

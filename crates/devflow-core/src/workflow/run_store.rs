//! In-memory run state store.
//!
//! Each run lives in its own slot: the `WorkflowRun` record behind a
//! `tokio::sync::RwLock`, plus the control handles the orchestrator uses for
//! stop and pause/resume. Slots are cloned out of the `DashMap` so no shard
//! lock is held across an await.

use std::sync::Arc;

use dashmap::DashMap;
use devflow_types::workflow::{WorkflowRun, WorkflowRunStatus};
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Control handles shared between a run's driver task and its callers.
#[derive(Debug, Default)]
pub struct RunControl {
    /// Cancelled when a stop is requested.
    pub cancel: CancellationToken,
    /// Signalled when a paused run is resumed.
    pub resume: Notify,
    /// Cancelled when the driver task has returned and the run record is final.
    pub finished: CancellationToken,
}

impl RunControl {
    pub fn stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }
}

/// One run's state plus its control handles.
#[derive(Debug, Clone)]
pub struct RunSlot {
    pub id: Uuid,
    pub run: Arc<RwLock<WorkflowRun>>,
    pub control: Arc<RunControl>,
}

impl RunSlot {
    fn new(run: WorkflowRun) -> Self {
        Self {
            id: run.id,
            run: Arc::new(RwLock::new(run)),
            control: Arc::new(RunControl::default()),
        }
    }

    /// Clone of the current run record.
    pub async fn snapshot(&self) -> WorkflowRun {
        self.run.read().await.clone()
    }

    pub async fn status(&self) -> WorkflowRunStatus {
        self.run.read().await.status
    }
}

/// Concurrent map of run ID to run slot.
#[derive(Debug, Default)]
pub struct RunStore {
    runs: DashMap<Uuid, RunSlot>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new run and return its slot.
    pub fn insert(&self, run: WorkflowRun) -> RunSlot {
        let id = run.id;
        let slot = RunSlot::new(run);
        self.runs.insert(id, slot.clone());
        slot
    }

    pub fn get(&self, run_id: &Uuid) -> Option<RunSlot> {
        self.runs.get(run_id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, run_id: &Uuid) -> Option<RunSlot> {
        self.runs.remove(run_id).map(|(_, slot)| slot)
    }

    pub fn contains(&self, run_id: &Uuid) -> bool {
        self.runs.contains_key(run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Snapshots of every stored run, oldest first.
    pub async fn snapshots(&self) -> Vec<WorkflowRun> {
        // UUIDv7 IDs sort by creation time.
        let mut slots: Vec<(Uuid, RunSlot)> = self
            .runs
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        slots.sort_by_key(|(id, _)| *id);

        let mut runs = Vec::with_capacity(slots.len());
        for (_, slot) in slots {
            runs.push(slot.snapshot().await);
        }
        runs
    }
}

//! Tokio-backed one-shot job timer
//!
//! Each tag owns at most one sleeping task. When a task wakes it sends its
//! tag on the fired channel; the engine turns recheck tags into forced
//! window events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use warden_core::{Clock, Error, JobScheduler};

struct Job {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct JobTable {
    next_id: u64,
    jobs: HashMap<String, Job>,
}

/// [`JobScheduler`] running each job as a sleeping tokio task
pub struct TokioJobScheduler {
    runtime: Handle,
    clock: Arc<dyn Clock>,
    fired: mpsc::UnboundedSender<String>,
    table: Arc<Mutex<JobTable>>,
}

impl TokioJobScheduler {
    /// Scheduler spawning on `runtime`; due tags are sent on `fired`
    pub fn new(
        runtime: Handle,
        clock: Arc<dyn Clock>,
        fired: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            runtime,
            clock,
            fired,
            table: Arc::new(Mutex::new(JobTable::default())),
        }
    }

    /// Tags of jobs that have not fired yet
    pub fn pending(&self) -> Vec<String> {
        self.table
            .lock()
            .map(|t| t.jobs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl JobScheduler for TokioJobScheduler {
    fn schedule(&self, tag: &str, at_epoch_millis: u64) -> warden_core::Result<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| Error::Scheduler("job table lock poisoned".to_string()))?;

        table.next_id += 1;
        let id = table.next_id;
        let delay = Duration::from_millis(at_epoch_millis.saturating_sub(self.clock.now_millis()));

        let owned_tag = tag.to_string();
        let fired = self.fired.clone();
        let shared = Arc::clone(&self.table);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Ok(mut table) = shared.lock() else {
                return;
            };
            // A replacement scheduled after this task woke owns the tag now
            if table.jobs.get(&owned_tag).map(|j| j.id) != Some(id) {
                return;
            }
            table.jobs.remove(&owned_tag);
            drop(table);
            debug!("Job {} fired", owned_tag);
            let _ = fired.send(owned_tag);
        });

        if let Some(previous) = table.jobs.insert(tag.to_string(), Job { id, handle }) {
            previous.handle.abort();
        }
        Ok(())
    }

    fn cancel(&self, tag: &str) {
        if let Ok(mut table) = self.table.lock() {
            if let Some(job) = table.jobs.remove(tag) {
                job.handle.abort();
                debug!("Job {} cancelled", tag);
            }
        }
    }
}

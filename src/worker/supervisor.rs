//! Fan-out of independent workers, one per market

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::runner::{WorkerHandle, WorkerLoop, WorkerReport, WorkerState};
use crate::error::{Error, Result};

pub struct WorkerSupervisor {
    workers: DashMap<String, WorkerHandle>,
    /// Parent of every worker token
    root: CancellationToken,
}

impl WorkerSupervisor {
    pub fn new() -> Self {
        Self {
            workers: DashMap::new(),
            root: CancellationToken::new(),
        }
    }

    /// Start a worker; at most one per market id
    pub fn spawn(&self, worker: WorkerLoop) -> Result<()> {
        match self.workers.entry(worker.market_id().to_string()) {
            Entry::Occupied(entry) => Err(Error::DuplicateWorker(entry.key().clone())),
            Entry::Vacant(entry) => {
                info!(market = %entry.key(), "Spawning worker");
                let handle = worker.spawn(self.root.child_token());
                entry.insert(handle);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn stop(&self, market_id: &str) -> Result<()> {
        let handle = self
            .workers
            .get(market_id)
            .ok_or_else(|| Error::WorkerNotFound(market_id.to_string()))?;
        handle.stop();
        Ok(())
    }

    pub fn stop_all(&self) {
        for handle in self.workers.iter() {
            handle.stop();
        }
        self.root.cancel();
    }

    /// Current state per market, sorted by market id
    pub fn states(&self) -> Vec<(String, WorkerState)> {
        let mut states: Vec<_> = self
            .workers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Wait for one worker to exit and forget it
    pub async fn join(&self, market_id: &str) -> Result<WorkerReport> {
        let (_, handle) = self
            .workers
            .remove(market_id)
            .ok_or_else(|| Error::WorkerNotFound(market_id.to_string()))?;
        handle.join().await
    }

    /// Wait for every worker to exit.
    ///
    /// Workers that terminated abnormally are logged and left out of the
    /// returned reports.
    pub async fn join_all(&self) -> Vec<WorkerReport> {
        let mut ids: Vec<String> = self.workers.iter().map(|e| e.key().clone()).collect();
        ids.sort();

        let handles: Vec<WorkerHandle> = ids
            .iter()
            .filter_map(|id| self.workers.remove(id).map(|(_, h)| h))
            .collect();

        let results = futures::future::join_all(handles.into_iter().map(|h| h.join())).await;

        let mut reports = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!("{}", e),
            }
        }
        reports
    }

    /// Stop everything and collect the reports
    pub async fn shutdown(&self) -> Vec<WorkerReport> {
        info!("Stopping {} workers", self.workers.len());
        self.stop_all();
        self.join_all().await
    }
}

impl Default for WorkerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

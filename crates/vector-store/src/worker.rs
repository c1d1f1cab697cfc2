use crate::error::{Result, VectorStoreError};
use crate::indexer::EmbeddingIndexer;
use crate::types::IndexPassReport;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStatus {
    pub passes: u64,
    pub running: bool,
    pub last_report: Option<IndexPassReport>,
    pub last_error: Option<String>,
}

enum WorkerCommand {
    Pass,
    Flush(oneshot::Sender<Result<IndexPassReport>>),
    Shutdown,
}

/// Background task that runs embedding passes on request.
///
/// Queries keep going against the index while a pass runs; results are
/// eventually consistent with the graph.
#[derive(Clone)]
pub struct EmbeddingWorker {
    inner: Arc<EmbeddingWorkerInner>,
}

struct EmbeddingWorkerInner {
    command_tx: mpsc::Sender<WorkerCommand>,
    status_tx: watch::Sender<WorkerStatus>,
}

impl EmbeddingWorker {
    /// Spawn the worker loop; must be called inside a tokio runtime
    pub fn start(indexer: Arc<EmbeddingIndexer>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (status_tx, _) = watch::channel(WorkerStatus::default());
        spawn_worker_loop(indexer, command_rx, status_tx.clone());
        Self {
            inner: Arc::new(EmbeddingWorkerInner {
                command_tx,
                status_tx,
            }),
        }
    }

    /// Queue a pass without waiting for it
    pub fn request_pass(&self) {
        match self.inner.command_tx.try_send(WorkerCommand::Pass) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Embedding worker stopped; pass request dropped");
            }
        }
    }

    /// Run a pass after everything already queued and wait for its report
    pub async fn flush(&self) -> Result<IndexPassReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(WorkerCommand::Flush(reply_tx))
            .await
            .map_err(|e| VectorStoreError::Other(format!("failed to send flush: {e}")))?;
        reply_rx
            .await
            .map_err(|_| VectorStoreError::Other("embedding worker stopped".to_string()))?
    }

    pub fn status(&self) -> WorkerStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub async fn shutdown(&self) {
        let _ = self.inner.command_tx.send(WorkerCommand::Shutdown).await;
    }
}

impl Drop for EmbeddingWorker {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(WorkerCommand::Shutdown);
        }
    }
}

fn spawn_worker_loop(
    indexer: Arc<EmbeddingIndexer>,
    mut command_rx: mpsc::Receiver<WorkerCommand>,
    status_tx: watch::Sender<WorkerStatus>,
) {
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let mut next = Some(command);
            while let Some(command) = next.take() {
                match command {
                    WorkerCommand::Pass => {
                        // coalesce queued pass requests into this one
                        loop {
                            match command_rx.try_recv() {
                                Ok(WorkerCommand::Pass) => continue,
                                Ok(other) => {
                                    next = Some(other);
                                    break;
                                }
                                Err(_) => break,
                            }
                        }
                        let _ = run_pass(&indexer, &status_tx).await;
                    }
                    WorkerCommand::Flush(reply) => {
                        let result = run_pass(&indexer, &status_tx).await;
                        let _ = reply.send(result);
                    }
                    WorkerCommand::Shutdown => {
                        info!("Embedding worker shutting down");
                        return;
                    }
                }
            }
        }
    });
}

async fn run_pass(
    indexer: &EmbeddingIndexer,
    status_tx: &watch::Sender<WorkerStatus>,
) -> Result<IndexPassReport> {
    status_tx.send_modify(|status| status.running = true);
    let result = indexer.index_pending().await;
    status_tx.send_modify(|status| {
        status.running = false;
        status.passes += 1;
        match &result {
            Ok(report) => {
                status.last_report = Some(report.clone());
                status.last_error = None;
            }
            Err(err) => status.last_error = Some(err.to_string()),
        }
    });
    if let Err(err) = &result {
        error!("Embedding pass failed: {err}");
    }
    result
}

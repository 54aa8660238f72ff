use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::worker::{panic_message, Worker, WorkerError, WorkerSettings};

/// Starts and stops a fixed set of independent workers.
pub struct WorkerPool;

impl WorkerPool {
    /// Spawn `size` workers on the current tokio runtime.
    ///
    /// Workers share only `state`, which is read-only. A worker that fails to
    /// initialize or panics takes only itself down.
    pub fn start(size: usize, state: AppState, settings: WorkerSettings) -> PoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (live_tx, live_rx) = watch::channel(0usize);
        let live_tx = Arc::new(live_tx);

        let workers = (0..size)
            .map(|id| {
                let worker = Worker::new(id, state.clone(), settings, shutdown_rx.clone());
                let guard = LiveGuard::new(Arc::clone(&live_tx));
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    worker.run().await
                });
                (id, handle)
            })
            .collect();

        info!(workers = size, backoff_ms = settings.backoff.as_millis() as u64, "Worker pool started");

        PoolHandle {
            shutdown: shutdown_tx,
            workers,
            monitor: PoolMonitor {
                configured: size,
                live: live_rx,
            },
            _live: live_tx,
        }
    }
}

pub struct PoolHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<(usize, JoinHandle<Result<(), WorkerError>>)>,
    monitor: PoolMonitor,
    _live: Arc<watch::Sender<usize>>,
}

impl PoolHandle {
    pub fn monitor(&self) -> PoolMonitor {
        self.monitor.clone()
    }

    /// Ask every worker to exit at its next idle checkpoint and wait for all of them.
    ///
    /// Jobs already in flight run to completion.
    pub async fn stop(self) -> PoolReport {
        info!("Stopping worker pool");
        self.shutdown.send_replace(true);

        let mut workers = Vec::with_capacity(self.workers.len());
        for (id, handle) in self.workers {
            let exit = match handle.await {
                Ok(Ok(())) => WorkerExit::Stopped,
                Ok(Err(WorkerError::Init(e))) => WorkerExit::InitFailed(e.to_string()),
                Err(e) if e.is_panic() => WorkerExit::Crashed(panic_message(e.into_panic())),
                Err(e) => WorkerExit::Crashed(e.to_string()),
            };
            if exit != WorkerExit::Stopped {
                warn!(worker = id, exit = ?exit, "Worker did not stop cleanly");
            }
            workers.push(WorkerReport { id, exit });
        }

        info!("Worker pool stopped");
        PoolReport { workers }
    }
}

/// Read-only view of how many workers are still running.
#[derive(Clone)]
pub struct PoolMonitor {
    configured: usize,
    live: watch::Receiver<usize>,
}

impl PoolMonitor {
    pub fn configured(&self) -> usize {
        self.configured
    }

    pub fn live(&self) -> usize {
        *self.live.borrow()
    }

    /// Resolves once no worker is running.
    pub async fn drained(&self) {
        let mut live = self.live.clone();
        let _ = live.wait_for(|n| *n == 0).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Stopped,
    /// Capabilities were unavailable at startup; the worker never polled.
    InitFailed(String),
    /// The worker task panicked.
    Crashed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub exit: WorkerExit,
}

#[derive(Debug, Clone)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
}

impl PoolReport {
    pub fn init_failures(&self) -> usize {
        self.count(|e| matches!(e, WorkerExit::InitFailed(_)))
    }

    pub fn crashes(&self) -> usize {
        self.count(|e| matches!(e, WorkerExit::Crashed(_)))
    }

    pub fn is_clean(&self) -> bool {
        self.workers.iter().all(|w| w.exit == WorkerExit::Stopped)
    }

    fn count(&self, pred: impl Fn(&WorkerExit) -> bool) -> usize {
        self.workers.iter().filter(|w| pred(&w.exit)).count()
    }
}

/// Counts a worker as live until dropped, including on panic.
struct LiveGuard {
    live: Arc<watch::Sender<usize>>,
}

impl LiveGuard {
    fn new(live: Arc<watch::Sender<usize>>) -> Self {
        live.send_modify(|n| *n += 1);
        metrics::gauge!("worker_pool_live_workers").increment(1.0);
        Self { live }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.send_modify(|n| *n = n.saturating_sub(1));
        metrics::gauge!("worker_pool_live_workers").decrement(1.0);
    }
}

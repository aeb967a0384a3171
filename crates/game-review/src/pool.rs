//! Fixed-size pool of engine handles.
//!
//! A run drains a shared queue of [`WorkItem`]s: one task per handle pulls
//! the next item as soon as its previous one finishes, so faster handles take
//! more work. Outcomes come back on a channel in completion order. A handle
//! that errors or overruns its timeout is dropped and replaced from the
//! factory. A worker that cannot get a replacement retires, leaving the queue
//! to the workers that still have an engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineError, EngineFactory, EngineHandle, EngineLine};
use crate::error::ReviewError;

/// How long a cancelled engine gets to acknowledge `stop` before it is killed
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// One position to evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub index: usize,
    pub fen: String,
    pub depth: u32,
    pub multi_pv: u32,
}

/// Result of one work item.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    Completed { index: usize, lines: Vec<EngineLine> },
    Failed { index: usize, reason: String },
    Cancelled { index: usize },
}

impl WorkOutcome {
    pub fn index(&self) -> usize {
        match self {
            WorkOutcome::Completed { index, .. }
            | WorkOutcome::Failed { index, .. }
            | WorkOutcome::Cancelled { index } => *index,
        }
    }
}

pub struct WorkerPool<F: EngineFactory> {
    factory: Arc<F>,
    handles: Vec<F::Handle>,
    target_size: usize,
    eval_timeout: Duration,
}

impl<F: EngineFactory> WorkerPool<F> {
    /// Spawn `workers_nb` handles. Fails only when none could be initialized.
    pub async fn new(factory: F, workers_nb: usize, eval_timeout: Duration) -> Result<Self, ReviewError> {
        let mut pool = Self {
            factory: Arc::new(factory),
            handles: Vec::new(),
            target_size: 0,
            eval_timeout,
        };
        pool.resize(workers_nb).await?;
        Ok(pool)
    }

    /// Handles currently idle in the pool.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Number of workers a run will use.
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Grow or shrink to `workers_nb` handles (at least one).
    pub async fn resize(&mut self, workers_nb: usize) -> Result<(), ReviewError> {
        let target = workers_nb.max(1);
        self.target_size = target;

        while self.handles.len() > target {
            if let Some(handle) = self.handles.pop() {
                handle.quit().await;
            }
        }

        let mut last_error = None;
        while self.handles.len() < target {
            let engine_id = self.handles.len();
            match spawn_handle(self.factory.as_ref(), self.eval_timeout).await {
                Ok(handle) => {
                    debug!(engine_id, "Engine ready");
                    self.handles.push(handle);
                }
                Err(e) => {
                    warn!(engine_id, error = %e, "Engine failed to initialize");
                    last_error = Some(e);
                    break;
                }
            }
        }

        if self.handles.is_empty() {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no engine spawned".to_string());
            return Err(ReviewError::EngineUnavailable(reason));
        }
        if self.handles.len() < target {
            warn!(
                ready = self.handles.len(),
                requested = target,
                "Running with fewer engines than requested"
            );
        }
        info!(engines = self.handles.len(), "Engine pool ready");
        Ok(())
    }

    /// Start evaluating `items` with one worker per idle handle.
    pub fn dispatch(&mut self, items: Vec<WorkItem>) -> PoolRun<'_, F> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        for item in items {
            // Receiver is alive in `queue_rx`
            let _ = queue_tx.send(item);
        }

        let handles: Vec<F::Handle> = self.handles.drain(..).collect();
        let live = Arc::new(AtomicUsize::new(handles.len()));

        let mut workers = JoinSet::new();
        for (worker_id, handle) in handles.into_iter().enumerate() {
            let worker = Worker {
                id: worker_id,
                handle: Some(handle),
                factory: Arc::clone(&self.factory),
                queue: Arc::clone(&queue_rx),
                outcomes: outcome_tx.clone(),
                cancel: cancel_rx.clone(),
                live: Arc::clone(&live),
                eval_timeout: self.eval_timeout,
            };
            workers.spawn(worker.run());
        }

        PoolRun {
            pool: self,
            queue: queue_tx,
            pending: queue_rx,
            outcomes: outcome_rx,
            cancel: cancel_tx,
            live,
            workers,
        }
    }

    /// Quit every idle handle.
    pub async fn shutdown(self) {
        for handle in self.handles {
            handle.quit().await;
        }
    }
}

/// A run in progress. Dropping it without [`PoolRun::shutdown`] kills the
/// workers' engines instead of returning them to the pool.
pub struct PoolRun<'a, F: EngineFactory> {
    pool: &'a mut WorkerPool<F>,
    queue: mpsc::UnboundedSender<WorkItem>,
    pending: Arc<Mutex<mpsc::UnboundedReceiver<WorkItem>>>,
    outcomes: mpsc::UnboundedReceiver<WorkOutcome>,
    cancel: watch::Sender<bool>,
    /// Workers still holding an engine
    live: Arc<AtomicUsize>,
    workers: JoinSet<Option<F::Handle>>,
}

impl<F: EngineFactory> PoolRun<'_, F> {
    /// Next outcome in completion order. `None` once every worker has exited.
    pub async fn next_outcome(&mut self) -> Option<WorkOutcome> {
        self.outcomes.recv().await
    }

    /// Queue one more item, e.g. a retry. Refused once no worker has an
    /// engine left to run it.
    pub fn submit(&self, item: WorkItem) -> bool {
        self.live_workers() > 0 && self.queue.send(item).is_ok()
    }

    /// Workers that still hold an engine.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop workers: in-flight searches are aborted and reported cancelled,
    /// queued items are never started.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Close the queue, wait for every worker and return surviving handles to
    /// the pool. Returns outcomes nobody received plus a `Cancelled` outcome
    /// for every item that never started.
    pub async fn shutdown(self) -> Vec<WorkOutcome> {
        let PoolRun {
            pool,
            queue,
            pending,
            mut outcomes,
            cancel: _cancel,
            live: _,
            mut workers,
        } = self;
        drop(queue);

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Some(handle)) => pool.handles.push(handle),
                Ok(None) => {}
                Err(e) => error!(error = %e, "Engine worker panicked"),
            }
        }

        let mut leftovers = Vec::new();
        while let Ok(outcome) = outcomes.try_recv() {
            leftovers.push(outcome);
        }
        let mut pending = pending.lock().await;
        while let Ok(item) = pending.try_recv() {
            leftovers.push(WorkOutcome::Cancelled { index: item.index });
        }
        leftovers
    }
}

struct Worker<F: EngineFactory> {
    id: usize,
    handle: Option<F::Handle>,
    factory: Arc<F>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<WorkItem>>>,
    outcomes: mpsc::UnboundedSender<WorkOutcome>,
    cancel: watch::Receiver<bool>,
    live: Arc<AtomicUsize>,
    eval_timeout: Duration,
}

impl<F: EngineFactory> Worker<F> {
    async fn run(mut self) -> Option<F::Handle> {
        while self.handle.is_some() {
            let Some(item) = self.next_item().await else {
                break;
            };
            let outcome = self.process(item).await;
            if self.outcomes.send(outcome).is_err() {
                break;
            }
        }

        let last = self.live.fetch_sub(1, Ordering::SeqCst) == 1;
        if self.handle.is_none() && !*self.cancel.borrow() {
            warn!(worker = self.id, "Worker retired without an engine");
            if last {
                self.fail_pending().await;
            }
        }
        self.handle
    }

    /// Nobody is left to run the queued items: report each one failed.
    async fn fail_pending(&mut self) {
        let mut queue = self.queue.lock().await;
        while let Ok(item) = queue.try_recv() {
            let outcome = WorkOutcome::Failed {
                index: item.index,
                reason: "no engine left in the pool".to_string(),
            };
            if self.outcomes.send(outcome).is_err() {
                break;
            }
        }
    }

    async fn next_item(&mut self) -> Option<WorkItem> {
        if *self.cancel.borrow() {
            return None;
        }
        let queue = Arc::clone(&self.queue);
        tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => None,
            item = async move { queue.lock().await.recv().await } => item,
        }
    }

    async fn process(&mut self, item: WorkItem) -> WorkOutcome {
        let index = item.index;

        let Some(handle) = self.handle.as_mut() else {
            return WorkOutcome::Failed {
                index,
                reason: "no engine available".to_string(),
            };
        };

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => None,
            res = tokio::time::timeout(
                self.eval_timeout,
                handle.evaluate(&item.fen, item.depth, item.multi_pv),
            ) => Some(res),
        };

        match result {
            None => {
                self.stop_engine().await;
                WorkOutcome::Cancelled { index }
            }
            Some(Ok(Ok(lines))) if !lines.is_empty() => {
                debug!(
                    worker = self.id,
                    index,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Position evaluated"
                );
                WorkOutcome::Completed { index, lines }
            }
            Some(Ok(Ok(_))) => {
                self.replace_engine("empty result").await;
                WorkOutcome::Failed {
                    index,
                    reason: "engine returned no lines".to_string(),
                }
            }
            Some(Ok(Err(e))) => {
                let reason = e.to_string();
                self.replace_engine(&reason).await;
                WorkOutcome::Failed { index, reason }
            }
            Some(Err(_)) => {
                let reason = EngineError::Timeout(self.eval_timeout.as_millis() as u64).to_string();
                self.replace_engine(&reason).await;
                WorkOutcome::Failed { index, reason }
            }
        }
    }

    /// Ask the engine to abandon its search; kill it if it does not comply.
    async fn stop_engine(&mut self) {
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        match tokio::time::timeout(CANCEL_GRACE, handle.cancel()).await {
            Ok(Ok(())) => debug!(worker = self.id, "Engine stopped"),
            Ok(Err(e)) => {
                warn!(worker = self.id, error = %e, "Engine failed to stop, killing it");
                self.handle = None;
            }
            Err(_) => {
                warn!(worker = self.id, "Engine ignored stop, killing it");
                self.handle = None;
            }
        }
    }

    /// Drop the faulted engine and spawn a fresh one. On failure the worker is
    /// left without an engine and retires after reporting the current item.
    async fn replace_engine(&mut self, reason: &str) {
        warn!(worker = self.id, reason, "Replacing engine");
        self.handle = None;
        self.handle = self.respawn().await;
    }

    async fn respawn(&mut self) -> Option<F::Handle> {
        match spawn_handle(self.factory.as_ref(), self.eval_timeout).await {
            Ok(handle) => {
                info!(worker = self.id, "Engine spawned");
                Some(handle)
            }
            Err(e) => {
                error!(worker = self.id, error = %e, "Failed to spawn engine");
                None
            }
        }
    }
}

/// Resolves once the run is cancelled or the run itself is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|c| *c).await;
}

async fn spawn_handle<F: EngineFactory>(factory: &F, limit: Duration) -> Result<F::Handle, EngineError> {
    match tokio::time::timeout(limit, factory.spawn()).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(limit.as_millis() as u64)),
    }
}

//! Order-preserving parallel execution of a single transform.
//!
//! The pipeline fans submitted items out to a pool of workers and hands the
//! results to a consumer strictly in submission order:
//!
//! ```text
//! add() ──▶ work queue ──▶ worker 1..W ──▶ result window ──▶ emitter ──▶ consumer
//!              (FIFO)      (transform)      (bounded 2W)     (reorders)
//! ```
//!
//! Workers publish `(seq, outcome)` pairs into a bounded channel; the single
//! emitter task keeps a reorder buffer and only releases the result whose
//! sequence number matches its cursor. The bounded window means a slow
//! consumer backpressures the workers instead of growing memory without
//! limit.
//!
//! Per-item faults are contained: a panicking transform drops that item from
//! the output stream, a panicking consumer drops that item's result, and in
//! both cases every other item is processed normally.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Misuse of the pipeline API.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The requested worker count cannot drive a pipeline.
    #[error("worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    /// An item was added after `end()` was signalled.
    #[error("no items can be added after end() has been signalled")]
    Ended,
}

/// One submitted input together with its position in the stream.
struct WorkItem<I> {
    seq: u64,
    input: I,
}

/// What became of one item's transform.
enum Outcome<O> {
    Done(O),
    Failed,
}

#[derive(Default)]
struct Counters {
    emitted: AtomicU64,
    transform_failures: AtomicU64,
    consumer_failures: AtomicU64,
}

/// Counters from a completed pipeline run, returned by [`OrderedPipeline::join`].
///
/// The failure counts are telemetry; dropped items are not surfaced as
/// errors anywhere else.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    /// Items accepted by `add()`.
    pub submitted: u64,

    /// Items delivered to the consumer.
    pub emitted: u64,

    /// Items dropped because the transform panicked.
    pub transform_failures: u64,

    /// Items dropped because the consumer panicked.
    pub consumer_failures: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Emitted: {}, Transform failures: {}, Consumer failures: {}, Total: {}",
            self.emitted, self.transform_failures, self.consumer_failures, self.submitted
        )
    }
}

/// A worker pool that applies a transform to a stream of inputs in parallel
/// while delivering the results to a consumer in submission order.
///
/// The emitter is its own task, so even with a single worker a slow consumer
/// never stalls the transform.
pub struct OrderedPipeline<I> {
    work_tx: async_channel::Sender<WorkItem<I>>,
    next_seq: AtomicU64,
    ended: AtomicBool,
    workers: Vec<JoinHandle<()>>,
    emitter: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl<I> OrderedPipeline<I>
where
    I: Send + 'static,
{
    /// Creates the pipeline and spawns its workers and emitter.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`PipelineError::InvalidWorkerCount`] if `workers` is zero.
    pub fn new<O, F, C>(transform: F, consumer: C, workers: usize) -> Result<Self, PipelineError>
    where
        O: Send + 'static,
        F: Fn(I) -> O + Send + Sync + 'static,
        C: Fn(O) + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(PipelineError::InvalidWorkerCount(workers));
        }

        let (work_tx, work_rx) = async_channel::unbounded::<WorkItem<I>>();
        // Result window bounded at 2W: workers block on publication once the
        // emitter falls this far behind the cursor.
        let (result_tx, result_rx) = mpsc::channel::<(u64, Outcome<O>)>(2 * workers);

        let transform = Arc::new(transform);
        let counters = Arc::new(Counters::default());

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let transform = Arc::clone(&transform);
            let counters = Arc::clone(&counters);

            handles.push(tokio::spawn(async move {
                while let Ok(WorkItem { seq, input }) = work_rx.recv().await {
                    let f = Arc::clone(&transform);
                    // The transform runs on the blocking pool; a panic
                    // surfaces as a JoinError and only fails this item.
                    let outcome = match tokio::task::spawn_blocking(move || (*f)(input)).await {
                        Ok(output) => Outcome::Done(output),
                        Err(e) => {
                            tracing::warn!("transform failed on item {}: {}", seq, e);
                            counters.transform_failures.fetch_add(1, Ordering::Relaxed);
                            Outcome::Failed
                        }
                    };
                    if result_tx.send((seq, outcome)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let emitter = tokio::spawn(emit(result_rx, Arc::new(consumer), Arc::clone(&counters)));

        Ok(Self {
            work_tx,
            next_seq: AtomicU64::new(0),
            ended: AtomicBool::new(false),
            workers: handles,
            emitter,
            counters,
        })
    }

    /// Appends an item to the input stream.
    ///
    /// Fails with [`PipelineError::Ended`] once [`end`](Self::end) has been
    /// signalled.
    pub async fn add(&self, input: I) -> Result<(), PipelineError> {
        if self.ended.load(Ordering::Acquire) {
            return Err(PipelineError::Ended);
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.work_tx
            .send(WorkItem { seq, input })
            .await
            .map_err(|_| PipelineError::Ended)
    }

    /// Signals that no further items will be added. Idempotent.
    pub fn end(&self) {
        self.ended.store(true, Ordering::Release);
        self.work_tx.close();
    }

    /// Waits until every submitted item has been processed and consumed.
    ///
    /// Signals [`end`](Self::end) itself (which is idempotent), so the
    /// pipeline quiesces even when the caller forgot to. After this returns
    /// the consumer is never called again.
    pub async fn join(self) -> PipelineStats {
        self.end();
        let OrderedPipeline {
            workers,
            emitter,
            next_seq,
            counters,
            ..
        } = self;

        futures::future::join_all(workers).await;
        let _ = emitter.await;

        PipelineStats {
            submitted: next_seq.load(Ordering::Relaxed),
            emitted: counters.emitted.load(Ordering::Relaxed),
            transform_failures: counters.transform_failures.load(Ordering::Relaxed),
            consumer_failures: counters.consumer_failures.load(Ordering::Relaxed),
        }
    }
}

/// Receives `(seq, outcome)` pairs in completion order and releases them to
/// the consumer in sequence order.
async fn emit<O, C>(
    mut result_rx: mpsc::Receiver<(u64, Outcome<O>)>,
    consumer: Arc<C>,
    counters: Arc<Counters>,
) where
    O: Send + 'static,
    C: Fn(O) + Send + Sync + 'static,
{
    let mut pending: BTreeMap<u64, Outcome<O>> = BTreeMap::new();
    let mut next_to_emit: u64 = 0;

    while let Some((seq, outcome)) = result_rx.recv().await {
        pending.insert(seq, outcome);
        while let Some(ready) = pending.remove(&next_to_emit) {
            let seq = next_to_emit;
            next_to_emit += 1;
            if let Outcome::Done(output) = ready {
                let c = Arc::clone(&consumer);
                match tokio::task::spawn_blocking(move || (*c)(output)).await {
                    Ok(()) => {
                        counters.emitted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::warn!("consumer failed on item {}: {}", seq, e);
                        counters.consumer_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
    // The channel only closes after every worker has published its last
    // result, so the cursor has caught up with all of them by now.
    debug_assert!(pending.is_empty());
}

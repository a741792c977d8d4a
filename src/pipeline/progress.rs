//! Periodic progress reporting for long-running tasks.
//!
//! A [`ProgressReporter`] runs one background tick task for the whole
//! process. Callers register a [`ProgressTracker`] per task and bump its
//! counter from any thread; on every tick the reporter logs one line per
//! live tracker. A closed tracker gets a final "and is done" line on the
//! next tick and is forgotten afterwards.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Default tick interval of the reporter.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to the background reporter. Cheap to clone; the tick task winds
/// down once every handle is dropped.
#[derive(Clone)]
pub struct ProgressReporter {
    shared: Arc<ReporterShared>,
}

struct ReporterShared {
    /// Live trackers in registration order.
    trackers: Mutex<Vec<Arc<TrackerState>>>,
}

struct TrackerState {
    task: String,
    /// Estimated item count; `None` when no estimate exists.
    total: Option<u64>,
    done: AtomicU64,
    finished: AtomicBool,
}

/// Per-task progress counter registered with a [`ProgressReporter`].
#[derive(Clone)]
pub struct ProgressTracker {
    state: Arc<TrackerState>,
}

impl ProgressReporter {
    /// Creates the reporter and spawns its tick task.
    ///
    /// Must be called from within a Tokio runtime. The task never blocks
    /// process exit and stops once the last reporter handle is gone.
    pub fn spawn(interval: Duration) -> Self {
        let shared = Arc::new(ReporterShared {
            trackers: Mutex::new(Vec::new()),
        });
        let weak = Arc::downgrade(&shared);
        tokio::spawn(report_loop(weak, interval));
        Self { shared }
    }

    /// Registers a tracker for a task without an item estimate.
    pub fn track(&self, task: impl Into<String>) -> ProgressTracker {
        self.register(task.into(), None)
    }

    /// Registers a tracker for a task with an estimated item count.
    pub fn track_sized(&self, task: impl Into<String>, total: u64) -> ProgressTracker {
        self.register(task.into(), Some(total))
    }

    fn register(&self, task: String, total: Option<u64>) -> ProgressTracker {
        let state = Arc::new(TrackerState {
            task,
            total,
            done: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        });
        self.shared
            .trackers
            .lock()
            .unwrap()
            .push(Arc::clone(&state));
        ProgressTracker { state }
    }
}

impl ProgressTracker {
    /// Signals that one item is done.
    pub fn one_done(&self) {
        self.state.done.fetch_add(1, Ordering::Relaxed);
    }

    /// Signals that `count` more items are done.
    pub fn done(&self, count: u64) {
        self.state.done.fetch_add(count, Ordering::Relaxed);
    }

    /// Marks the task finished. Idempotent; the reporter logs one final
    /// line for this tracker and then forgets it.
    pub fn close(&self) {
        self.state.finished.store(true, Ordering::Relaxed);
    }
}

async fn report_loop(shared: Weak<ReporterShared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        for line in shared.tick() {
            tracing::info!("{}", line);
        }
    }
}

impl ReporterShared {
    /// Produces one status line per live tracker (in registration order) and
    /// drops every tracker whose terminal line was just produced.
    fn tick(&self) -> Vec<String> {
        let mut trackers = self.trackers.lock().unwrap();
        let mut lines = Vec::with_capacity(trackers.len());
        trackers.retain(|state| {
            let done = state.done.load(Ordering::Relaxed);
            let finished = state.finished.load(Ordering::Relaxed);
            let suffix = if finished { " and is done" } else { "" };
            let line = match state.total {
                Some(total) => {
                    let pct = done.saturating_mul(100).checked_div(total).unwrap_or(100);
                    format!(
                        "{} finished {} of {} ({}%) items{}",
                        state.task, done, total, pct, suffix
                    )
                }
                None => format!("{} finished {} items{}", state.task, done, suffix),
            };
            lines.push(line);
            !finished
        });
        lines
    }
}

//! Concurrency core: order-preserving parallel execution and progress
//! reporting.

mod ordered;
mod progress;

pub use ordered::{OrderedPipeline, PipelineError, PipelineStats};
pub use progress::{ProgressReporter, ProgressTracker, DEFAULT_INTERVAL};

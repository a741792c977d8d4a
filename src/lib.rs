//! varan: incremental product-line analysis infrastructure.
//!
//! The infrastructure runs either as a one-shot batch tool or as a
//! long-lived server that analyzes commit diffs sent by clients.
//!
//! # Architecture
//!
//! - **Pipeline**: order-preserving parallel classification
//!   ([`pipeline::OrderedPipeline`]) and periodic progress reporting
//!   ([`pipeline::ProgressReporter`])
//! - **Net**: framed TCP request/response server and one-shot client
//!   ([`net`])
//! - **Analysis**: commit and source-tree classification plugged into both
//!   entry modes ([`analysis`])
//!
//! # Usage
//!
//! ```no_run
//! use varan::{build_runtime, run_batch, Config};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"config.yaml".into())?;
//!     let runtime = build_runtime(None)?;
//!     let summary = runtime.block_on(run_batch(config, false))?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod net;
pub mod pipeline;

pub use analysis::{CommitAnalysisTask, CommitAnalyzer};
pub use config::Config;
pub use net::{Client, Server};
pub use pipeline::{OrderedPipeline, ProgressReporter, ProgressTracker};

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

/// Runs one full analysis of the configured source tree and returns the
/// textual summary. With `archive` set, the summary is also written into
/// the configured archive directory.
pub async fn run_batch(config: Config, archive: bool) -> Result<String> {
    config.validate()?;

    let reporter = ProgressReporter::spawn(Duration::from_secs(config.progress.interval_secs));
    let analyzer = CommitAnalyzer::load(&config, reporter)?;

    tracing::info!(
        "analyzing source tree {}",
        config.analysis.source_tree.display()
    );
    let result = analyzer.analyze_tree(&config.analysis.source_tree).await?;
    let summary = result.to_string();
    tracing::info!("{}", summary);

    if archive {
        let dir = config
            .analysis
            .archive_dir
            .as_deref()
            .context("archiving requested but analysis.archive_dir is not configured")?;
        archive_summary(dir, &summary)?;
    }
    Ok(summary)
}

fn archive_summary(dir: &Path, summary: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("analysis-summary.txt");
    std::fs::write(&path, summary)?;
    tracing::info!("summary archived to {}", path.display());
    Ok(())
}

/// Starts the analysis server and blocks until a client sends the shutdown
/// sentinel. A CLI `address` takes precedence over the configured one.
pub async fn run_server(config: Config, address: Option<String>) -> Result<()> {
    config.validate()?;

    let address = address.or_else(|| config.server.address.clone());
    let reporter = ProgressReporter::spawn(Duration::from_secs(config.progress.interval_secs));
    let analyzer = CommitAnalyzer::load(&config, reporter)?;
    let task = CommitAnalysisTask::new(analyzer);

    let server = Server::start(address.as_deref(), task).await?;
    server.join().await;
    Ok(())
}

/// Sends one payload to a running server and returns its reply.
pub async fn run_client(address: &str, payload: &str) -> Result<String> {
    let mut client = Client::connect(address).await?;
    tracing::info!("client sends: {}", payload);
    let reply = client.send(payload).await?.unwrap_or_default();
    tracing::info!("client receives: {}", reply);
    client.close().await?;
    Ok(reply)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;

    #[tokio::test]
    async fn test_run_batch_summarizes_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Kconfig"), "config FOO\n").unwrap();
        std::fs::write(dir.path().join("main.c"), "int main;\n").unwrap();

        let config = Config {
            analysis: AnalysisConfig {
                source_tree: dir.path().to_path_buf(),
                workers: 2,
                archive_dir: None,
            },
            ..Default::default()
        };

        let summary = run_batch(config, false).await.unwrap();
        assert_eq!(
            summary,
            "Analyzed 2 file(s): 1 variability model, 0 build, 1 code, 0 other"
        );
    }

    #[tokio::test]
    async fn test_run_batch_archives_summary() {
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("main.c"), "int main;\n").unwrap();
        let archive = tempfile::tempdir().unwrap();

        let config = Config {
            analysis: AnalysisConfig {
                source_tree: tree.path().to_path_buf(),
                workers: 1,
                archive_dir: Some(archive.path().join("results")),
            },
            ..Default::default()
        };

        let summary = run_batch(config, true).await.unwrap();

        let archived =
            std::fs::read_to_string(archive.path().join("results/analysis-summary.txt")).unwrap();
        assert_eq!(archived, summary);
    }

    #[tokio::test]
    async fn test_run_batch_archive_without_dir_fails() {
        let tree = tempfile::tempdir().unwrap();
        let config = Config {
            analysis: AnalysisConfig {
                source_tree: tree.path().to_path_buf(),
                workers: 1,
                archive_dir: None,
            },
            ..Default::default()
        };

        assert!(run_batch(config, true).await.is_err());
    }

    #[tokio::test]
    async fn test_run_batch_rejects_invalid_config() {
        let mut config = Config::default();
        config.analysis.workers = 0;
        assert!(run_batch(config, false).await.is_err());
    }
}

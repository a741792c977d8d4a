//! Commit and source-tree analysis.
//!
//! The analyzer interprets a client message as a commit: an optional
//! `commit <id>` header followed by diff content. Every changed file is
//! classified by its product-line role (variability model, build, code)
//! through the ordered pipeline, so the summary lists artifacts in the
//! order the commit touches them. Batch mode classifies a whole source
//! tree the same way.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::Config;
use crate::net::ServerTask;
use crate::pipeline::{OrderedPipeline, PipelineError, ProgressReporter};

/// Errors raised while analyzing a commit or a source tree.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The received payload holds no content.
    #[error("the commit payload is empty")]
    EmptyCommit,

    /// The payload parsed, but no file change was found in it.
    #[error("the commit payload contains no file changes")]
    NoChanges,

    /// Batch analysis was pointed at a path that is not a directory.
    #[error("source tree {0} does not exist or is not a directory")]
    MissingSourceTree(PathBuf),

    /// The classification pipeline could not be driven.
    #[error("pipeline failure: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Product-line artifact categories relevant to the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Variability model files (Kconfig).
    VariabilityModel,

    /// Build model files (Makefile, Kbuild, *.mk).
    Build,

    /// Code files (*.c, *.h, *.S).
    Code,

    /// Anything else; counted but not analyzed further.
    Other,
}

impl ArtifactKind {
    /// Classifies a path by its product-line role.
    pub fn of(path: &str) -> Self {
        let file_name = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path);
        if file_name == "Kconfig" || file_name.starts_with("Kconfig.") {
            ArtifactKind::VariabilityModel
        } else if file_name == "Makefile" || file_name == "Kbuild" || file_name.ends_with(".mk") {
            ArtifactKind::Build
        } else if file_name.ends_with(".c") || file_name.ends_with(".h") || file_name.ends_with(".S")
        {
            ArtifactKind::Code
        } else {
            ArtifactKind::Other
        }
    }
}

/// One changed file as parsed out of the commit payload.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileChange {
    path: String,
    added: usize,
    removed: usize,
}

/// A classified file change.
#[derive(Debug, Clone)]
struct ArtifactChange {
    path: String,
    kind: ArtifactKind,
    added: usize,
    removed: usize,
}

/// Result of analyzing one commit. Artifact lists keep the order in which
/// the commit touches the files.
#[derive(Debug, Clone, Default)]
pub struct CommitAnalysisResult {
    /// Identifier from the `commit <id>` header, if present.
    pub commit_id: Option<String>,

    /// Changed code artifacts.
    pub changed_code: Vec<String>,

    /// Changed build artifacts.
    pub changed_build: Vec<String>,

    /// Changed variability model artifacts.
    pub changed_variability_model: Vec<String>,

    /// Changed files outside the three analyzed categories.
    pub changed_other: Vec<String>,

    /// Lines added across all changes.
    pub lines_added: usize,

    /// Lines removed across all changes.
    pub lines_removed: usize,
}

impl fmt::Display for CommitAnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.commit_id {
            Some(id) => writeln!(f, "Analysis result for commit {}:", id)?,
            None => writeln!(f, "Analysis result:")?,
        }
        writeln!(f, "Changed code artifact(s):")?;
        for path in &self.changed_code {
            writeln!(f, "  {}", path)?;
        }
        writeln!(
            f,
            "Changed build artifact(s): {}",
            !self.changed_build.is_empty()
        )?;
        writeln!(
            f,
            "Changed variability model artifact(s): {}",
            !self.changed_variability_model.is_empty()
        )?;
        write!(
            f,
            "Lines added: {}, removed: {}",
            self.lines_added, self.lines_removed
        )
    }
}

/// Result of classifying a whole source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeAnalysisResult {
    /// Files visited.
    pub files_total: usize,

    /// Variability model files.
    pub variability_model: usize,

    /// Build model files.
    pub build: usize,

    /// Code files.
    pub code: usize,

    /// Everything else.
    pub other: usize,
}

impl fmt::Display for TreeAnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Analyzed {} file(s): {} variability model, {} build, {} code, {} other",
            self.files_total, self.variability_model, self.build, self.code, self.other
        )
    }
}

/// Commit analysis backend.
///
/// Constructing one is the loaded state: the worker count and the progress
/// reporter are bound at load time, so analysis can never run against
/// missing resources.
pub struct CommitAnalyzer {
    workers: usize,
    reporter: ProgressReporter,
}

impl CommitAnalyzer {
    /// Binds the analyzer to the configured worker count and a reporter.
    pub fn load(config: &Config, reporter: ProgressReporter) -> Result<Self, AnalysisError> {
        if config.analysis.workers == 0 {
            return Err(PipelineError::InvalidWorkerCount(0).into());
        }
        Ok(Self {
            workers: config.analysis.workers,
            reporter,
        })
    }

    /// Parses and classifies one commit payload.
    pub async fn analyze(&self, payload: &str) -> Result<CommitAnalysisResult, AnalysisError> {
        if payload.trim().is_empty() {
            return Err(AnalysisError::EmptyCommit);
        }
        let (commit_id, changes) = parse_commit(payload);
        if changes.is_empty() {
            return Err(AnalysisError::NoChanges);
        }

        let tracker = self
            .reporter
            .track_sized("commit analysis", changes.len() as u64);
        let collected: Arc<Mutex<Vec<ArtifactChange>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let progress = tracker.clone();
        let pipeline = OrderedPipeline::new(
            classify_change,
            move |change: ArtifactChange| {
                sink.lock().unwrap().push(change);
                progress.one_done();
            },
            self.workers,
        )?;

        for change in changes {
            pipeline.add(change).await?;
        }
        let stats = pipeline.join().await;
        tracker.close();
        tracing::debug!("commit classification finished: {}", stats);

        let mut result = CommitAnalysisResult {
            commit_id,
            ..Default::default()
        };
        for change in collected.lock().unwrap().drain(..) {
            result.lines_added += change.added;
            result.lines_removed += change.removed;
            match change.kind {
                ArtifactKind::VariabilityModel => {
                    result.changed_variability_model.push(change.path)
                }
                ArtifactKind::Build => result.changed_build.push(change.path),
                ArtifactKind::Code => result.changed_code.push(change.path),
                ArtifactKind::Other => result.changed_other.push(change.path),
            }
        }
        Ok(result)
    }

    /// Classifies every file under `root` (batch mode).
    pub async fn analyze_tree(&self, root: &Path) -> Result<TreeAnalysisResult, AnalysisError> {
        if !root.is_dir() {
            return Err(AnalysisError::MissingSourceTree(root.to_path_buf()));
        }

        let mut files: Vec<String> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        files.sort();

        let tracker = self
            .reporter
            .track_sized("source tree analysis", files.len() as u64);
        let kinds: Arc<Mutex<Vec<ArtifactKind>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        let progress = tracker.clone();
        let pipeline = OrderedPipeline::new(
            |path: String| ArtifactKind::of(&path),
            move |kind: ArtifactKind| {
                sink.lock().unwrap().push(kind);
                progress.one_done();
            },
            self.workers,
        )?;

        for file in files {
            pipeline.add(file).await?;
        }
        let stats = pipeline.join().await;
        tracker.close();
        tracing::debug!("tree classification finished: {}", stats);

        let mut result = TreeAnalysisResult::default();
        for kind in kinds.lock().unwrap().drain(..) {
            result.files_total += 1;
            match kind {
                ArtifactKind::VariabilityModel => result.variability_model += 1,
                ArtifactKind::Build => result.build += 1,
                ArtifactKind::Code => result.code += 1,
                ArtifactKind::Other => result.other += 1,
            }
        }
        Ok(result)
    }
}

fn classify_change(change: FileChange) -> ArtifactChange {
    ArtifactChange {
        kind: ArtifactKind::of(&change.path),
        path: change.path,
        added: change.added,
        removed: change.removed,
    }
}

/// Extracts the commit identifier and the per-file changes from a payload.
///
/// Recognizes `diff --git a/<old> b/<new>` file headers; `+`/`-` lines
/// below a header count as added/removed content (`+++`/`---` headers are
/// skipped). Lines before the first file header are ignored.
fn parse_commit(payload: &str) -> (Option<String>, Vec<FileChange>) {
    let mut commit_id = None;
    let mut changes: Vec<FileChange> = Vec::new();

    for (index, line) in payload.lines().enumerate() {
        if index == 0 {
            if let Some(rest) = line.strip_prefix("commit ") {
                let id = rest.split_whitespace().next().unwrap_or("");
                if !id.is_empty() {
                    commit_id = Some(id.to_string());
                }
                continue;
            }
        }
        if let Some(rest) = line.strip_prefix("diff --git ") {
            // The post-image name identifies the artifact.
            let path = rest.split_whitespace().last().unwrap_or(rest);
            let path = path.strip_prefix("b/").unwrap_or(path);
            changes.push(FileChange {
                path: path.to_string(),
                added: 0,
                removed: 0,
            });
        } else if let Some(current) = changes.last_mut() {
            if line.starts_with("+++") || line.starts_with("---") {
                continue;
            } else if line.starts_with('+') {
                current.added += 1;
            } else if line.starts_with('-') {
                current.removed += 1;
            }
        }
    }
    (commit_id, changes)
}

/// Adapts the analyzer to the server's task seam.
///
/// Failures never escape `execute`; they are encoded into the summary so
/// the client learns about them in the reply.
pub struct CommitAnalysisTask {
    analyzer: CommitAnalyzer,
    last: Option<Result<CommitAnalysisResult, String>>,
}

impl CommitAnalysisTask {
    /// Wraps a loaded analyzer.
    pub fn new(analyzer: CommitAnalyzer) -> Self {
        Self {
            analyzer,
            last: None,
        }
    }
}

#[async_trait]
impl ServerTask for CommitAnalysisTask {
    async fn execute(&mut self, input: &str) {
        match self.analyzer.analyze(input).await {
            Ok(result) => {
                tracing::info!("commit analysis succeeded");
                self.last = Some(Ok(result));
            }
            Err(e) => {
                tracing::error!("commit analysis failed: {}", e);
                self.last = Some(Err(e.to_string()));
            }
        }
    }

    fn execution_summary(&self) -> String {
        match &self.last {
            Some(Ok(result)) => result.to_string(),
            Some(Err(message)) => format!("Analysis failed: {}", message),
            None => "No analysis has been executed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DEFAULT_INTERVAL;

    const SAMPLE_COMMIT: &str = "\
commit 4f2a910
diff --git a/drivers/net/veth.c b/drivers/net/veth.c
--- a/drivers/net/veth.c
+++ b/drivers/net/veth.c
+static int veth_open(struct net_device *dev)
+{
-static int veth_up(struct net_device *dev)
diff --git a/drivers/net/Makefile b/drivers/net/Makefile
--- a/drivers/net/Makefile
+++ b/drivers/net/Makefile
+obj-$(CONFIG_VETH) += veth.o
diff --git a/drivers/net/Kconfig b/drivers/net/Kconfig
--- a/drivers/net/Kconfig
+++ b/drivers/net/Kconfig
+config VETH
+\ttristate \"Virtual ethernet pair device\"
diff --git a/drivers/net/wan/slic_ds26522.h b/drivers/net/wan/slic_ds26522.h
+++ b/drivers/net/wan/slic_ds26522.h
+#define SLIC_BASE 0x00
";

    fn analyzer(workers: usize) -> CommitAnalyzer {
        let config = Config {
            analysis: crate::config::AnalysisConfig {
                workers,
                ..Default::default()
            },
            ..Default::default()
        };
        CommitAnalyzer::load(&config, ProgressReporter::spawn(DEFAULT_INTERVAL)).unwrap()
    }

    #[test]
    fn test_artifact_kind_classification() {
        assert_eq!(ArtifactKind::of("Kconfig"), ArtifactKind::VariabilityModel);
        assert_eq!(
            ArtifactKind::of("arch/x86/Kconfig.debug"),
            ArtifactKind::VariabilityModel
        );
        assert_eq!(ArtifactKind::of("Makefile"), ArtifactKind::Build);
        assert_eq!(ArtifactKind::of("drivers/Kbuild"), ArtifactKind::Build);
        assert_eq!(ArtifactKind::of("scripts/rules.mk"), ArtifactKind::Build);
        assert_eq!(ArtifactKind::of("kernel/fork.c"), ArtifactKind::Code);
        assert_eq!(ArtifactKind::of("include/linux/sched.h"), ArtifactKind::Code);
        assert_eq!(ArtifactKind::of("arch/x86/entry.S"), ArtifactKind::Code);
        assert_eq!(ArtifactKind::of("README"), ArtifactKind::Other);
        assert_eq!(ArtifactKind::of("docs/config.yaml"), ArtifactKind::Other);
    }

    #[test]
    fn test_parse_commit_header_and_counts() {
        let (commit_id, changes) = parse_commit(SAMPLE_COMMIT);
        assert_eq!(commit_id.as_deref(), Some("4f2a910"));
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0].path, "drivers/net/veth.c");
        assert_eq!(changes[0].added, 2);
        assert_eq!(changes[0].removed, 1);
        assert_eq!(changes[1].path, "drivers/net/Makefile");
        assert_eq!(changes[1].added, 1);
        assert_eq!(changes[3].path, "drivers/net/wan/slic_ds26522.h");
    }

    #[test]
    fn test_parse_commit_without_header() {
        let payload = "diff --git a/lib/sort.c b/lib/sort.c\n+int cmp;\n";
        let (commit_id, changes) = parse_commit(payload);
        assert_eq!(commit_id, None);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].added, 1);
    }

    #[tokio::test]
    async fn test_analyze_classifies_and_keeps_order() {
        let result = analyzer(4).analyze(SAMPLE_COMMIT).await.unwrap();

        assert_eq!(result.commit_id.as_deref(), Some("4f2a910"));
        assert_eq!(
            result.changed_code,
            vec!["drivers/net/veth.c", "drivers/net/wan/slic_ds26522.h"]
        );
        assert_eq!(result.changed_build, vec!["drivers/net/Makefile"]);
        assert_eq!(result.changed_variability_model, vec!["drivers/net/Kconfig"]);
        assert!(result.changed_other.is_empty());
        assert_eq!(result.lines_added, 6);
        assert_eq!(result.lines_removed, 1);
    }

    #[tokio::test]
    async fn test_analyze_empty_payload() {
        let result = analyzer(1).analyze("  \n ").await;
        assert!(matches!(result, Err(AnalysisError::EmptyCommit)));
    }

    #[tokio::test]
    async fn test_analyze_payload_without_changes() {
        let result = analyzer(1).analyze("just some text").await;
        assert!(matches!(result, Err(AnalysisError::NoChanges)));
    }

    #[test]
    fn test_summary_wording() {
        let result = CommitAnalysisResult {
            commit_id: Some("abc123".to_string()),
            changed_code: vec!["kernel/fork.c".to_string()],
            changed_build: vec![],
            changed_variability_model: vec!["Kconfig".to_string()],
            changed_other: vec![],
            lines_added: 3,
            lines_removed: 1,
        };

        let summary = result.to_string();
        assert!(summary.starts_with("Analysis result for commit abc123:"));
        assert!(summary.contains("  kernel/fork.c"));
        assert!(summary.contains("Changed build artifact(s): false"));
        assert!(summary.contains("Changed variability model artifact(s): true"));
        assert!(summary.contains("Lines added: 3, removed: 1"));
    }

    #[tokio::test]
    async fn test_task_encodes_failure_into_summary() {
        let mut task = CommitAnalysisTask::new(analyzer(1));

        task.execute("").await;

        let summary = task.execution_summary();
        assert!(summary.starts_with("Analysis failed:"));
    }

    #[tokio::test]
    async fn test_task_summary_before_any_execution() {
        let task = CommitAnalysisTask::new(analyzer(1));
        assert_eq!(task.execution_summary(), "No analysis has been executed");
    }

    #[tokio::test]
    async fn test_task_round_trip_summary() {
        let mut task = CommitAnalysisTask::new(analyzer(2));

        task.execute(SAMPLE_COMMIT).await;

        let summary = task.execution_summary();
        assert!(summary.contains("drivers/net/veth.c"));
        assert!(summary.contains("Changed build artifact(s): true"));
    }

    #[tokio::test]
    async fn test_analyze_tree_counts_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("drivers")).unwrap();
        std::fs::write(root.join("Kconfig"), "config FOO\n").unwrap();
        std::fs::write(root.join("Makefile"), "obj-y += drivers/\n").unwrap();
        std::fs::write(root.join("drivers/foo.c"), "int foo;\n").unwrap();
        std::fs::write(root.join("drivers/foo.h"), "extern int foo;\n").unwrap();
        std::fs::write(root.join("README"), "docs\n").unwrap();

        let result = analyzer(2).analyze_tree(root).await.unwrap();

        assert_eq!(
            result,
            TreeAnalysisResult {
                files_total: 5,
                variability_model: 1,
                build: 1,
                code: 2,
                other: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_analyze_tree_missing_root() {
        let result = analyzer(1)
            .analyze_tree(Path::new("/nonexistent/source/tree"))
            .await;
        assert!(matches!(result, Err(AnalysisError::MissingSourceTree(_))));
    }
}

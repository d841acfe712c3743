//! Reporter writing results to the local filesystem.
//!
//! # Layout
//!
//! ```text
//! <report.path>/
//! ├── run.json                 - run summary, rewritten on every publish
//! ├── results/<id>.json        - one file per result
//! └── attachments/<id>-<name>  - inline attachment content
//! ```
//!
//! Inline attachments are written out and the result JSON refers to them by
//! path, so the output can be imported later without the original process.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::Reporter;
use crate::buffer::ResultBuffer;
use crate::config::{Config, Mode};
use crate::model::{Attachment, AttachmentSource, Step, TestResult};
use crate::publisher::PublishSummary;

/// Summary written to `run.json`.
#[derive(Debug, Default, Serialize)]
struct RunReport {
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    labels: HashMap<String, String>,
    /// Result count per status.
    stats: BTreeMap<String, usize>,
    duration_ms: u64,
    results: Vec<ResultRef>,
}

#[derive(Debug, Serialize)]
struct ResultRef {
    id: String,
    title: String,
    status: String,
}

/// Writes results as JSON files under a directory.
pub struct FileReporter {
    root: PathBuf,
    buffer: ResultBuffer,
    report: Mutex<RunReport>,
}

impl FileReporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            buffer: ResultBuffer::new(),
            report: Mutex::new(RunReport::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.report.resolved_path(),
            buffer: ResultBuffer::new(),
            report: Mutex::new(RunReport {
                environment: config.environment.clone(),
                labels: config.report.labels.clone(),
                ..RunReport::default()
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn write_result(&self, mut result: TestResult) -> std::io::Result<ResultRef> {
        let attachments_dir = self.root.join("attachments");
        for attachment in inline_attachments(&mut result) {
            let AttachmentSource::Content { data } = &attachment.source else {
                continue;
            };
            let path = attachments_dir.join(format!(
                "{}-{}",
                uuid::Uuid::new_v4(),
                sanitize(&attachment.file_name)
            ));
            tokio::fs::write(&path, data).await?;
            attachment.source = AttachmentSource::File { path };
        }

        let path = self.root.join("results").join(format!("{}.json", result.id));
        let json = serde_json::to_vec_pretty(&result).map_err(std::io::Error::other)?;
        tokio::fs::write(&path, json).await?;
        debug!(path = %path.display(), "wrote result");

        Ok(ResultRef {
            id: result.id,
            title: result.title,
            status: result.status.as_str().to_string(),
        })
    }

    async fn write_run(&self, report: &RunReport) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(report).map_err(std::io::Error::other)?;
        tokio::fs::write(self.root.join("run.json"), json).await
    }
}

#[async_trait]
impl Reporter for FileReporter {
    fn mode(&self) -> Mode {
        Mode::Report
    }

    async fn start(&self) -> bool {
        for dir in ["results", "attachments"] {
            if let Err(e) = tokio::fs::create_dir_all(self.root.join(dir)).await {
                warn!(path = %self.root.display(), error = %e, "cannot create report directory");
                return false;
            }
        }
        let mut report = self.report.lock().await;
        report.started_at.get_or_insert_with(Utc::now);
        info!(path = %self.root.display(), "writing report files");
        true
    }

    fn add_result(&self, result: TestResult) {
        self.buffer.add(result);
    }

    async fn publish(&self) -> PublishSummary {
        let results = self.buffer.drain();
        let mut summary = PublishSummary {
            attempted: results.len(),
            ..PublishSummary::default()
        };
        if results.is_empty() {
            info!("no test cases matched, nothing to write");
            return summary;
        }

        let mut report = self.report.lock().await;
        for result in results {
            let duration = result.duration;
            match self.write_result(result).await {
                Ok(written) => {
                    *report.stats.entry(written.status.clone()).or_default() += 1;
                    report.duration_ms += duration;
                    report.results.push(written);
                    summary.published += 1;
                }
                Err(e) => {
                    warn!(path = %self.root.display(), error = %e, "failed to write result");
                    summary.dropped += 1;
                }
            }
        }

        if let Err(e) = self.write_run(&report).await {
            warn!(error = %e, "failed to write run summary");
        }
        summary
    }

    async fn complete(&self) {
        let mut report = self.report.lock().await;
        report.finished_at = Some(Utc::now());
        if let Err(e) = self.write_run(&report).await {
            warn!(error = %e, "failed to write run summary");
        }
    }
}

/// Inline attachments of a result and its steps.
fn inline_attachments(result: &mut TestResult) -> Vec<&mut Attachment> {
    fn from_steps<'a>(steps: &'a mut [Step], out: &mut Vec<&'a mut Attachment>) {
        for step in steps {
            let Step {
                attachments, steps, ..
            } = step;
            out.extend(
                attachments
                    .iter_mut()
                    .filter(|a| matches!(a.source, AttachmentSource::Content { .. })),
            );
            from_steps(steps, out);
        }
    }

    let TestResult {
        attachments, steps, ..
    } = result;
    let mut out: Vec<&mut Attachment> = attachments
        .iter_mut()
        .filter(|a| matches!(a.source, AttachmentSource::Content { .. }))
        .collect();
    from_steps(steps, &mut out);
    out
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestStatus;

    #[tokio::test]
    async fn test_writes_results_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FileReporter::new(dir.path());
        assert_eq!(reporter.root(), dir.path());
        assert!(reporter.start().await);

        let mut step = Step::new("capture");
        step.attachments
            .push(Attachment::from_content("a/b.txt", "text/plain", "nested"));
        let mut failed = TestResult::new("broken", TestStatus::Failed)
            .with_duration(30)
            .with_attachment(Attachment::from_content("log.txt", "text/plain", "boom"));
        failed.steps.push(step);
        let failed_id = failed.id.clone();

        reporter.add_result(failed);
        reporter.add_result(TestResult::new("fine", TestStatus::Passed).with_duration(12));
        let summary = reporter.publish().await;
        reporter.complete().await;

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.published, 2);

        let result_json = std::fs::read_to_string(
            dir.path().join("results").join(format!("{failed_id}.json")),
        )
        .unwrap();
        let written: TestResult = serde_json::from_str(&result_json).unwrap();
        assert!(matches!(
            written.attachments[0].source,
            AttachmentSource::File { .. }
        ));
        assert!(matches!(
            written.steps[0].attachments[0].source,
            AttachmentSource::File { .. }
        ));
        assert_eq!(std::fs::read_dir(dir.path().join("attachments")).unwrap().count(), 2);

        let run: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("run.json")).unwrap())
                .unwrap();
        assert_eq!(run["stats"]["failed"], 1);
        assert_eq!(run["stats"]["passed"], 1);
        assert_eq!(run["duration_ms"], 42);
        assert!(run["finished_at"].is_string());
    }

    #[tokio::test]
    async fn test_unwritable_root_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let reporter = FileReporter::new(blocker.join("report"));
        assert!(!reporter.start().await);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b\\c:d.txt"), "a_b_c_d.txt");
    }
}

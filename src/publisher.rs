//! Batch publishing of buffered results.
//!
//! # Flow
//!
//! ```text
//! drain buffer ─▶ collapse retries ─▶ await run id ─┬─▶ chunk 1: upload attachments ─▶ bulk create
//!                                                   ├─▶ chunk 2: ...
//!                                                   └─▶ chunk n: ...
//! ```
//!
//! Chunks are sent one after another. A chunk that still fails after the
//! retry policy gives up is logged once and dropped; the remaining chunks
//! are still sent. Nothing here returns an error: the outcome is a
//! [`PublishSummary`].

pub mod attachments;
pub mod payload;

use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::api::{ResultCreate, TestOpsApi};
use crate::buffer::ResultBuffer;
use crate::config::TestOpsConfig;
use crate::model::TestResult;
use crate::retry::{RetryPolicy, with_retry};
use crate::run::RunController;

pub use attachments::{AttachmentUploader, UploadedHashes};

/// Outcome of one or more publishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Results that were up for publishing after retry collapsing.
    pub attempted: usize,
    pub published: usize,
    /// Results lost to failed chunks or a disabled run.
    pub dropped: usize,
    pub failed_chunks: usize,
    /// Earlier attempts replaced by a later attempt of the same test.
    pub superseded: usize,
}

impl PublishSummary {
    /// True when everything attempted was published.
    pub fn is_complete(&self) -> bool {
        self.published == self.attempted
    }
}

impl AddAssign for PublishSummary {
    fn add_assign(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.published += other.published;
        self.dropped += other.dropped;
        self.failed_chunks += other.failed_chunks;
        self.superseded += other.superseded;
    }
}

/// Sends buffered results to the run owned by a [`RunController`].
pub struct BatchPublisher {
    api: Arc<dyn TestOpsApi>,
    run: Arc<RunController>,
    buffer: Arc<ResultBuffer>,
    uploader: Option<AttachmentUploader>,
    retry: RetryPolicy,
    chunk_size: usize,
}

impl BatchPublisher {
    pub fn new(
        api: Arc<dyn TestOpsApi>,
        run: Arc<RunController>,
        buffer: Arc<ResultBuffer>,
        config: &TestOpsConfig,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        let uploader = config.upload_attachments.then(|| {
            AttachmentUploader::new(
                api.clone(),
                run.project(),
                retry,
                config.batch.effective_concurrency(),
            )
        });

        Self {
            api,
            run,
            buffer,
            uploader,
            retry,
            chunk_size: config.batch.effective_size(),
        }
    }

    /// Replaces the retry policy derived from the configuration.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        if let Some(uploader) = self.uploader.take() {
            self.uploader = Some(AttachmentUploader::new(
                self.api.clone(),
                self.run.project(),
                retry,
                uploader.concurrency(),
            ));
        }
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Publishes everything buffered, then completes the run if configured.
    pub async fn publish(&self) -> PublishSummary {
        let summary = self.send(self.buffer.drain()).await;
        self.run.complete().await;
        summary
    }

    /// Publishes at most one chunk without completing the run.
    pub async fn publish_chunk(&self) -> PublishSummary {
        self.send(self.buffer.drain_up_to(self.chunk_size)).await
    }

    async fn send(&self, results: Vec<TestResult>) -> PublishSummary {
        if results.is_empty() {
            info!("no test cases matched, nothing to publish");
            return PublishSummary::default();
        }

        let (results, superseded) = collapse_retries(results);
        let mut summary = PublishSummary {
            attempted: results.len(),
            superseded,
            ..PublishSummary::default()
        };

        let Some(run_id) = self.run.run_id().await else {
            warn!(
                results = results.len(),
                "TestOps reporting is disabled, results were not published"
            );
            summary.dropped = results.len();
            return summary;
        };

        let project = self.run.project();
        let total_chunks = results.len().div_ceil(self.chunk_size);

        for (index, chunk) in results.chunks(self.chunk_size).enumerate() {
            let hashes = match &self.uploader {
                Some(uploader) => uploader.upload(chunk).await,
                None => UploadedHashes::new(),
            };
            let entries: Vec<ResultCreate> = chunk
                .iter()
                .flat_map(|result| payload::entries(result, &hashes))
                .collect();

            debug!(
                chunk = index + 1,
                of = total_chunks,
                results = chunk.len(),
                entries = entries.len(),
                "sending chunk"
            );

            let sent = with_retry(&self.retry, "bulk create results", || {
                self.api.create_results_bulk(project, run_id, &entries)
            })
            .await;

            match sent {
                Ok(()) => summary.published += chunk.len(),
                Err(e) => {
                    error!(
                        run_id,
                        chunk = index + 1,
                        of = total_chunks,
                        results = chunk.len(),
                        error = %e,
                        "failed to publish chunk, dropping it"
                    );
                    summary.failed_chunks += 1;
                    summary.dropped += chunk.len();
                }
            }
        }

        info!(
            run_id,
            published = summary.published,
            attempted = summary.attempted,
            "published results"
        );
        summary
    }
}

/// Keeps only the latest attempt per signature.
///
/// "Latest" means the later end time; ties and missing end times fall back to
/// drain order. Results without a signature are never collapsed. Returns the
/// survivors in first-seen order and how many were replaced.
pub fn collapse_retries(results: Vec<TestResult>) -> (Vec<TestResult>, usize) {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<TestResult> = Vec::with_capacity(results.len());
    let mut superseded = 0;

    for result in results {
        if result.signature.is_empty() {
            kept.push(result);
            continue;
        }
        match positions.get(&result.signature) {
            Some(&at) => {
                superseded += 1;
                let later = match (result.end_time, kept[at].end_time) {
                    (Some(new), Some(old)) => new >= old,
                    _ => true,
                };
                if later {
                    kept[at] = result;
                }
            }
            None => {
                positions.insert(result.signature.clone(), kept.len());
                kept.push(result);
            }
        }
    }

    (kept, superseded)
}

//! Attachment upload ahead of bulk result creation.
//!
//! Every attachment referenced by a chunk (on results and on steps, at any
//! depth) is read, hashed with SHA-256 and uploaded once per distinct
//! content. Reads and uploads each run with bounded concurrency. An
//! attachment that cannot be read or uploaded is left out of the payload;
//! its result is still sent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::api::{AttachmentUpload, TestOpsApi};
use crate::model::{Attachment, AttachmentSource, Step, TestResult};
use crate::retry::{RetryPolicy, with_retry};

/// Remote hashes keyed by [`attachment_key`].
pub type UploadedHashes = HashMap<String, String>;

/// Identifies an attachment within one publish.
///
/// Files are keyed by path, inline content by its digest.
pub fn attachment_key(attachment: &Attachment) -> String {
    match &attachment.source {
        AttachmentSource::File { path } => format!("file:{}", path.display()),
        AttachmentSource::Content { data } => format!("sha256:{}", sha256_hex(data)),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Uploads the attachments of a chunk.
pub struct AttachmentUploader {
    api: Arc<dyn TestOpsApi>,
    project: String,
    retry: RetryPolicy,
    concurrency: usize,
}

impl AttachmentUploader {
    pub fn new(
        api: Arc<dyn TestOpsApi>,
        project: impl Into<String>,
        retry: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            api,
            project: project.into(),
            retry,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Uploads everything `results` reference and returns the remote hashes.
    ///
    /// Returns only after every upload has settled.
    pub async fn upload(&self, results: &[TestResult]) -> UploadedHashes {
        let pending = collect(results);
        if pending.is_empty() {
            return UploadedHashes::new();
        }

        let loaded: Vec<_> = stream::iter(pending)
            .map(|(key, attachment)| async move {
                match attachment.read().await {
                    Ok(content) => Some((key, attachment, content)),
                    Err(e) => {
                        warn!(file = %attachment.file_name, error = %e, "cannot read attachment, skipping it");
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // Identical bytes behind different keys go up once.
        let mut by_digest: HashMap<String, (AttachmentUpload, Vec<String>)> = HashMap::new();
        for (key, attachment, content) in loaded.into_iter().flatten() {
            let digest = sha256_hex(&content);
            by_digest
                .entry(digest)
                .or_insert_with(|| {
                    (
                        AttachmentUpload {
                            file_name: attachment.file_name,
                            mime_type: attachment.mime_type,
                            content,
                        },
                        Vec::new(),
                    )
                })
                .1
                .push(key);
        }

        let uploaded: Vec<Vec<(String, String)>> = stream::iter(by_digest.into_values())
            .map(|(file, keys)| async move {
                let result = with_retry(&self.retry, "upload attachment", || {
                    self.api.upload_attachment(&self.project, &file)
                })
                .await;
                match result {
                    Ok(hash) => {
                        debug!(file = %file.file_name, hash = %hash, "attachment uploaded");
                        keys.into_iter().map(|key| (key, hash.clone())).collect()
                    }
                    Err(e) => {
                        warn!(file = %file.file_name, error = %e, "attachment upload failed, dropping it");
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        uploaded.into_iter().flatten().collect()
    }
}

/// Distinct attachments of `results`, in first-seen order.
///
/// Attachments are cloned so the upload futures own their inputs and stay
/// `Send + 'static` when a publish is spawned.
fn collect(results: &[TestResult]) -> Vec<(String, Attachment)> {
    fn walk_steps(steps: &[Step], seen: &mut HashSet<String>, out: &mut Vec<(String, Attachment)>) {
        for step in steps {
            push(&step.attachments, seen, out);
            walk_steps(&step.steps, seen, out);
        }
    }

    fn push(
        attachments: &[Attachment],
        seen: &mut HashSet<String>,
        out: &mut Vec<(String, Attachment)>,
    ) {
        for attachment in attachments {
            let key = attachment_key(attachment);
            if seen.insert(key.clone()) {
                out.push((key, attachment.clone()));
            }
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for result in results {
        push(&result.attachments, &mut seen, &mut out);
        walk_steps(&result.steps, &mut seen, &mut out);
    }
    out
}

//! In-memory [`TestOpsApi`] for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{
    ApiError, ApiResult, AttachmentUpload, Project, ResultCreate, Run, RunCreate, TestOpsApi,
};
use crate::retry::RetryPolicy;

/// Id handed out by the first `create_run` call.
pub const CREATED_RUN_ID: u64 = 1000;

/// Everything the mock was asked to do.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub get_project: usize,
    pub get_run: Vec<u64>,
    pub create_run: Vec<RunCreate>,
    pub complete_run: Vec<u64>,
    /// File names of successful uploads.
    pub uploads: Vec<String>,
    pub upload_attempts: usize,
    /// Successful bulk calls.
    pub bulk: Vec<(u64, Vec<ResultCreate>)>,
    pub bulk_attempts: usize,
}

/// Scriptable mock API with call recording.
#[derive(Debug, Default)]
pub struct MockApi {
    missing_project: bool,
    existing_runs: HashSet<u64>,
    fail_everything: bool,
    failing_bulk_calls: HashSet<usize>,
    transient_bulk_failures: AtomicUsize,
    failing_uploads: HashSet<String>,
    latency: Option<Duration>,
    calls: Mutex<Calls>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing_project(mut self) -> Self {
        self.missing_project = true;
        self
    }

    pub fn with_run(mut self, run_id: u64) -> Self {
        self.existing_runs.insert(run_id);
        self
    }

    /// Every call fails with a 500.
    pub fn failing_everything(mut self) -> Self {
        self.fail_everything = true;
        self
    }

    /// The bulk call with this 0-based attempt index fails permanently.
    pub fn failing_bulk_call(mut self, index: usize) -> Self {
        self.failing_bulk_calls.insert(index);
        self
    }

    /// The first `n` bulk calls fail with a retryable error.
    pub fn with_transient_bulk_failures(self, n: usize) -> Self {
        self.transient_bulk_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_upload(mut self, file_name: &str) -> Self {
        self.failing_uploads.insert(file_name.to_string());
        self
    }

    /// Every call sleeps this long first.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self) -> ApiResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_everything {
            return Err(ApiError::Server {
                status: 500,
                message: "mock outage".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TestOpsApi for MockApi {
    async fn get_project(&self, code: &str) -> ApiResult<Project> {
        self.calls.lock().unwrap().get_project += 1;
        self.enter().await?;
        if self.missing_project {
            return Err(ApiError::NotFound {
                resource: format!("project/{}", code),
            });
        }
        Ok(Project {
            code: code.to_string(),
            title: "Demo".into(),
        })
    }

    async fn get_run(&self, code: &str, run_id: u64) -> ApiResult<Run> {
        self.calls.lock().unwrap().get_run.push(run_id);
        self.enter().await?;
        if !self.existing_runs.contains(&run_id) {
            return Err(ApiError::NotFound {
                resource: format!("run/{}/{}", code, run_id),
            });
        }
        Ok(Run {
            id: run_id,
            title: None,
            status: None,
        })
    }

    async fn create_run(&self, _code: &str, run: &RunCreate) -> ApiResult<u64> {
        self.enter().await?;
        let mut calls = self.calls.lock().unwrap();
        calls.create_run.push(run.clone());
        Ok(CREATED_RUN_ID + calls.create_run.len() as u64 - 1)
    }

    async fn complete_run(&self, _code: &str, run_id: u64) -> ApiResult<()> {
        self.enter().await?;
        self.calls.lock().unwrap().complete_run.push(run_id);
        Ok(())
    }

    async fn upload_attachment(&self, _code: &str, file: &AttachmentUpload) -> ApiResult<String> {
        self.calls.lock().unwrap().upload_attempts += 1;
        self.enter().await?;
        if self.failing_uploads.contains(&file.file_name) {
            return Err(ApiError::BadRequest {
                status: 413,
                message: "too large".into(),
            });
        }
        let mut calls = self.calls.lock().unwrap();
        calls.uploads.push(file.file_name.clone());
        Ok(format!("hash-{}", calls.uploads.len()))
    }

    async fn create_results_bulk(
        &self,
        _code: &str,
        run_id: u64,
        results: &[ResultCreate],
    ) -> ApiResult<()> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.bulk_attempts += 1;
            calls.bulk_attempts - 1
        };
        self.enter().await?;

        let transient = self
            .transient_bulk_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(ApiError::Timeout {
                message: "mock timeout".into(),
            });
        }
        if self.failing_bulk_calls.contains(&index) {
            return Err(ApiError::BadRequest {
                status: 422,
                message: "mock rejected chunk".into(),
            });
        }

        self.calls
            .lock()
            .unwrap()
            .bulk
            .push((run_id, results.to_vec()));
        Ok(())
    }
}

/// Retry policy with millisecond delays.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

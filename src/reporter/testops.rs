//! Reporter publishing to the remote TestOps API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Reporter;
use crate::api::TestOpsApi;
use crate::buffer::ResultBuffer;
use crate::config::{Mode, TestOpsConfig};
use crate::model::TestResult;
use crate::publisher::{BatchPublisher, PublishSummary};
use crate::retry::RetryPolicy;
use crate::run::{RunController, RunState};

/// Buffers results and publishes them to one remote run.
///
/// With `batch.incremental` set, a full chunk is published in the background
/// as soon as it is buffered. [`publish`](Reporter::publish) waits for those
/// background publishes for at most `shutdown_timeout_secs`, then sends the
/// rest.
pub struct TestOpsReporter {
    run: Arc<RunController>,
    buffer: Arc<ResultBuffer>,
    publisher: Arc<BatchPublisher>,
    incremental: bool,
    shutdown_timeout: Duration,
    /// Set while a background publish is in flight.
    flushing: Arc<AtomicBool>,
    background: Mutex<Vec<JoinHandle<PublishSummary>>>,
}

impl TestOpsReporter {
    pub fn new(api: Arc<dyn TestOpsApi>, config: &TestOpsConfig) -> Self {
        let run = Arc::new(RunController::new(
            api.clone(),
            config.project.clone().unwrap_or_default(),
            config.run.clone(),
            RetryPolicy::from(&config.retry),
        ));
        let buffer = Arc::new(ResultBuffer::new());
        let publisher = Arc::new(BatchPublisher::new(
            api,
            run.clone(),
            buffer.clone(),
            config,
        ));

        Self {
            run,
            buffer,
            publisher,
            incremental: config.batch.incremental,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            flushing: Arc::new(AtomicBool::new(false)),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Spawns a background publish when a full chunk is buffered.
    ///
    /// Needs a resolved run and a tokio runtime on the calling thread;
    /// otherwise the results simply wait for the final publish. At most one
    /// background publish runs at a time; it keeps going while full chunks
    /// remain, since adds seen while it ran did not start another.
    fn maybe_flush(&self) {
        if !self.incremental || self.buffer.count() < self.publisher.chunk_size() {
            return;
        }
        if !matches!(self.run.state(), RunState::Resolved(_)) {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            return;
        };

        if self.flushing.swap(true, Ordering::SeqCst) {
            return;
        }

        let publisher = self.publisher.clone();
        let buffer = self.buffer.clone();
        let flushing = self.flushing.clone();
        let task = handle.spawn(async move {
            let mut summary = PublishSummary::default();
            loop {
                summary += publisher.publish_chunk().await;
                if buffer.count() < publisher.chunk_size() {
                    break;
                }
            }
            flushing.store(false, Ordering::SeqCst);
            summary
        });
        debug!("spawned incremental publish");

        self.background
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(task);
    }

    async fn await_background(&self) -> PublishSummary {
        let tasks = std::mem::take(&mut *self.background.lock().unwrap_or_else(|p| p.into_inner()));
        let mut summary = PublishSummary::default();
        if tasks.is_empty() {
            return summary;
        }

        let count = tasks.len();
        match tokio::time::timeout(self.shutdown_timeout, futures::future::join_all(tasks)).await {
            Ok(done) => {
                for outcome in done {
                    match outcome {
                        Ok(partial) => summary += partial,
                        Err(e) => warn!(error = %e, "background publish task failed"),
                    }
                }
            }
            Err(_) => warn!(
                tasks = count,
                timeout_secs = self.shutdown_timeout.as_secs(),
                "background publishes still running, not waiting any longer"
            ),
        }
        summary
    }
}

#[async_trait]
impl Reporter for TestOpsReporter {
    fn mode(&self) -> Mode {
        Mode::TestOps
    }

    async fn start(&self) -> bool {
        !self.run.start_test_run().await.is_disabled()
    }

    fn add_result(&self, result: TestResult) {
        self.buffer.add(result);
        self.maybe_flush();
    }

    async fn publish(&self) -> PublishSummary {
        let mut summary = self.await_background().await;
        summary += self.publisher.publish().await;
        summary
    }

    async fn complete(&self) {
        self.run.complete().await;
    }

    fn run_state(&self) -> Option<RunState> {
        Some(self.run.state())
    }

    fn take_pending(&self) -> Vec<TestResult> {
        self.buffer.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestStatus;
    use crate::testing::MockApi;

    fn config(incremental: bool) -> TestOpsConfig {
        let mut config = TestOpsConfig::default();
        config.project = Some("DEMO".into());
        config.batch.size = 2;
        config.batch.incremental = incremental;
        config.retry.max_retries = 0;
        config
    }

    #[tokio::test]
    async fn test_incremental_flush_after_start() {
        let api = Arc::new(MockApi::new());
        let reporter = TestOpsReporter::new(api.clone(), &config(true));
        assert!(reporter.start().await);

        for i in 0..5 {
            reporter.add_result(TestResult::new(format!("t{i}"), TestStatus::Passed).signed());
        }
        let summary = reporter.publish().await;

        assert_eq!(summary.published, 5);
        let calls = api.calls();
        let sent: usize = calls.bulk.iter().map(|(_, entries)| entries.len()).sum();
        assert_eq!(sent, 5);
        assert!(calls.bulk.len() >= 2);
    }

    #[tokio::test]
    async fn test_no_flush_before_run_is_resolved() {
        let api = Arc::new(MockApi::new());
        let reporter = TestOpsReporter::new(api.clone(), &config(true));

        for i in 0..4 {
            reporter.add_result(TestResult::new(format!("t{i}"), TestStatus::Passed).signed());
        }
        assert_eq!(reporter.buffer.count(), 4);
        assert!(reporter.background.lock().unwrap().is_empty());

        let summary = reporter.publish().await;
        assert_eq!(summary.published, 4);
    }

    #[tokio::test]
    async fn test_background_publish_drains_full_chunks_left_behind() {
        let api = Arc::new(MockApi::new());
        let reporter = TestOpsReporter::new(api.clone(), &config(true));
        assert!(reporter.start().await);

        // Buffered while a flush was already marked in flight.
        reporter.flushing.store(true, Ordering::SeqCst);
        for i in 0..5 {
            reporter.add_result(TestResult::new(format!("t{i}"), TestStatus::Passed).signed());
        }
        assert!(reporter.background.lock().unwrap().is_empty());
        reporter.flushing.store(false, Ordering::SeqCst);

        reporter.add_result(TestResult::new("t5", TestStatus::Passed).signed());
        let summary = reporter.await_background().await;

        assert_eq!(summary.published, 6);
        assert_eq!(reporter.buffer.count(), 0);
        assert_eq!(api.calls().bulk.len(), 3);
        assert!(!reporter.flushing.load(Ordering::SeqCst));
    }

    #[test]
    fn test_adds_outside_a_runtime_wait_for_publish() {
        let api = Arc::new(MockApi::new());
        let reporter = TestOpsReporter::new(api.clone(), &config(true));
        assert!(tokio_test::block_on(reporter.start()));

        for i in 0..3 {
            reporter.add_result(TestResult::new(format!("t{i}"), TestStatus::Passed).signed());
        }
        assert!(reporter.background.lock().unwrap().is_empty());
        assert_eq!(reporter.buffer.count(), 3);

        let summary = tokio_test::block_on(reporter.publish());
        assert_eq!(summary.published, 3);
        assert_eq!(api.calls().bulk.len(), 2);
    }

    #[tokio::test]
    async fn test_take_pending_empties_buffer() {
        let api = Arc::new(MockApi::new());
        let reporter = TestOpsReporter::new(api, &config(false));
        reporter.add_result(TestResult::new("t", TestStatus::Passed));

        assert_eq!(reporter.take_pending().len(), 1);
        assert_eq!(reporter.buffer.count(), 0);
    }

    #[tokio::test]
    async fn test_bounded_shutdown_wait() {
        let api = Arc::new(MockApi::new());
        let mut cfg = config(true);
        cfg.shutdown_timeout_secs = 0;
        let reporter = TestOpsReporter::new(api.clone(), &cfg);
        assert!(reporter.start().await);

        let slow = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            PublishSummary::default()
        });
        reporter.background.lock().unwrap().push(slow);

        let summary = tokio::time::timeout(Duration::from_secs(5), reporter.publish())
            .await
            .expect("publish must not wait for the slow task");
        assert_eq!(summary.attempted, 0);
    }
}

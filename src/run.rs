//! Run lifecycle: resolve or create the remote run, then complete it once.
//!
//! ```text
//!  Unresolved ──start──▶ Resolving ──ok──▶ Resolved(id) ──complete──▶ Completing ──▶ Complete
//!                            │                                            │
//!                            └──────── error ──▶ Disabled ◀── disable() ──┘ (from any state)
//! ```
//!
//! Resolution happens at most once per controller. Concurrent callers of
//! [`RunController::start_test_run`] or [`RunController::run_id`] share the
//! same in-flight resolution instead of racing to create duplicate runs.
//!
//! Across processes there is no coordination: parallel workers should share
//! a run through `QASE_RUN_ID` (see the `start-run` CLI command).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::api::{ApiResult, RunCreate, TestOpsApi};
use crate::config::{RunConfig, render_template};
use crate::retry::{RetryPolicy, with_retry};

/// Where the run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Unresolved,
    Resolving,
    Resolved(u64),
    Completing,
    Complete,
    /// Reporting is off for the rest of the process.
    Disabled,
}

impl RunState {
    pub fn is_disabled(&self) -> bool {
        matches!(self, RunState::Disabled)
    }
}

/// Owns the one remote run a process reports into.
pub struct RunController {
    api: Arc<dyn TestOpsApi>,
    project: String,
    run: RunConfig,
    retry: RetryPolicy,
    resolution: OnceCell<Option<u64>>,
    state: Mutex<RunState>,
    /// Set when the run was created here rather than reused.
    created: AtomicBool,
}

impl RunController {
    pub fn new(
        api: Arc<dyn TestOpsApi>,
        project: impl Into<String>,
        run: RunConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            project: project.into(),
            run,
            retry,
            resolution: OnceCell::new(),
            state: Mutex::new(RunState::Unresolved),
            created: AtomicBool::new(false),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn state(&self) -> RunState {
        *self.lock()
    }

    /// Whether the run was created by this controller.
    pub fn created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    /// Verifies the configured run, or creates one.
    ///
    /// Only the first call talks to the API; later calls return the state
    /// the first one produced. Never fails: errors move the controller to
    /// [`RunState::Disabled`].
    pub async fn start_test_run(&self) -> RunState {
        self.resolve().await;
        self.state()
    }

    /// The run id, waiting for resolution if it is still pending.
    ///
    /// Starts resolution if nobody has yet. `None` once disabled.
    pub async fn run_id(&self) -> Option<u64> {
        let resolved = self.resolve().await;
        if self.state().is_disabled() {
            return None;
        }
        resolved
    }

    /// Turns reporting off for the rest of the process.
    pub fn disable(&self, reason: &str) {
        let mut state = self.lock();
        if !state.is_disabled() {
            warn!(project = %self.project, reason, "disabling TestOps reporting");
            *state = RunState::Disabled;
        }
    }

    /// Completes the run if the configuration asks for it.
    ///
    /// A no-op unless the run is resolved and not yet complete, so calling it
    /// repeatedly or concurrently completes the run at most once. A failed
    /// completion leaves the run resolved.
    pub async fn complete(&self) -> RunState {
        let run_id = {
            let mut state = self.lock();
            match *state {
                RunState::Resolved(id) if self.should_complete() => {
                    *state = RunState::Completing;
                    id
                }
                RunState::Resolved(id) => {
                    debug!(run_id = id, "leaving run open");
                    return *state;
                }
                other => {
                    debug!(state = ?other, "no run to complete");
                    return other;
                }
            }
        };

        let result = with_retry(&self.retry, "complete run", || {
            self.api.complete_run(&self.project, run_id)
        })
        .await;

        let mut state = self.lock();
        match result {
            Ok(()) => {
                info!(project = %self.project, run_id, "run completed");
                if *state == RunState::Completing {
                    *state = RunState::Complete;
                }
            }
            Err(e) => {
                error!(project = %self.project, run_id, error = %e, "failed to complete run");
                if *state == RunState::Completing {
                    *state = RunState::Resolved(run_id);
                }
            }
        }
        *state
    }

    fn should_complete(&self) -> bool {
        self.run.complete.unwrap_or_else(|| self.created())
    }

    async fn resolve(&self) -> Option<u64> {
        *self
            .resolution
            .get_or_init(|| async {
                self.transition(RunState::Resolving);
                match self.verify_or_create().await {
                    Ok(run_id) => {
                        self.transition(RunState::Resolved(run_id));
                        Some(run_id)
                    }
                    Err(e) => {
                        error!(project = %self.project, error = %e, "failed to resolve test run");
                        self.disable("run could not be resolved");
                        None
                    }
                }
            })
            .await
    }

    async fn verify_or_create(&self) -> ApiResult<u64> {
        let code = self.project.as_str();

        with_retry(&self.retry, "check project", || self.api.get_project(code)).await?;

        if let Some(run_id) = self.run.id {
            with_retry(&self.retry, "check run", || self.api.get_run(code, run_id)).await?;
            info!(project = code, run_id, "reporting into existing run");
            return Ok(run_id);
        }

        let now = Utc::now();
        let body = RunCreate {
            title: render_template(&self.run.title, now),
            description: self
                .run
                .description
                .as_deref()
                .map(|d| render_template(d, now)),
            environment_id: self.run.environment_id,
            is_autotest: true,
        };
        let run_id =
            with_retry(&self.retry, "create run", || self.api.create_run(code, &body)).await?;

        self.created.store(true, Ordering::SeqCst);
        info!(project = code, run_id, title = %body.title, "created test run");
        Ok(run_id)
    }

    /// Moves to `next` unless reporting was disabled meanwhile.
    fn transition(&self, next: RunState) {
        let mut state = self.lock();
        if !state.is_disabled() {
            *state = next;
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{CREATED_RUN_ID, MockApi, fast_retry};

    fn controller(api: &Arc<MockApi>, run: RunConfig) -> RunController {
        RunController::new(api.clone(), "DEMO", run, fast_retry())
    }

    fn reuse(id: u64) -> RunConfig {
        RunConfig {
            id: Some(id),
            ..RunConfig::default()
        }
    }

    #[tokio::test]
    async fn test_creates_run_once() {
        let api = Arc::new(MockApi::new());
        let run = controller(&api, RunConfig::default());

        assert_eq!(run.state(), RunState::Unresolved);
        assert_eq!(run.start_test_run().await, RunState::Resolved(CREATED_RUN_ID));
        assert_eq!(run.start_test_run().await, RunState::Resolved(CREATED_RUN_ID));
        assert_eq!(run.run_id().await, Some(CREATED_RUN_ID));

        let calls = api.calls();
        assert_eq!(calls.get_project, 1);
        assert_eq!(calls.create_run.len(), 1);
        assert!(calls.create_run[0].title.starts_with("Automated run 2"));
        assert!(calls.create_run[0].is_autotest);
        assert!(run.created());
    }

    #[tokio::test]
    async fn test_concurrent_start_resolves_once() {
        let api = Arc::new(MockApi::new().with_latency(Duration::from_millis(20)));
        let run = Arc::new(controller(&api, RunConfig::default()));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let run = run.clone();
                tokio::spawn(async move { run.run_id().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(CREATED_RUN_ID));
        }

        assert_eq!(api.calls().create_run.len(), 1);
    }

    #[tokio::test]
    async fn test_reuses_existing_run() {
        let api = Arc::new(MockApi::new().with_run(7));
        let run = controller(&api, reuse(7));

        assert_eq!(run.start_test_run().await, RunState::Resolved(7));
        let calls = api.calls();
        assert_eq!(calls.get_run, vec![7]);
        assert!(calls.create_run.is_empty());
        assert!(!run.created());
    }

    #[tokio::test]
    async fn test_missing_run_disables() {
        let api = Arc::new(MockApi::new());
        let run = controller(&api, reuse(99));

        assert_eq!(run.start_test_run().await, RunState::Disabled);
        assert_eq!(run.run_id().await, None);
        assert_eq!(api.calls().get_run, vec![99]);
    }

    #[tokio::test]
    async fn test_missing_project_disables() {
        let api = Arc::new(MockApi::new().with_missing_project());
        let run = controller(&api, RunConfig::default());

        assert_eq!(run.start_test_run().await, RunState::Disabled);
        assert!(api.calls().create_run.is_empty());
    }

    #[tokio::test]
    async fn test_outage_disables_after_retries() {
        let api = Arc::new(MockApi::new().failing_everything());
        let run = controller(&api, RunConfig::default());

        assert_eq!(run.start_test_run().await, RunState::Disabled);
        assert_eq!(api.calls().get_project, 3);
    }

    #[tokio::test]
    async fn test_complete_created_run_once() {
        let api = Arc::new(MockApi::new());
        let run = controller(&api, RunConfig::default());
        run.start_test_run().await;

        assert_eq!(run.complete().await, RunState::Complete);
        assert_eq!(run.complete().await, RunState::Complete);
        assert_eq!(api.calls().complete_run, vec![CREATED_RUN_ID]);
    }

    #[tokio::test]
    async fn test_reused_run_left_open_by_default() {
        let api = Arc::new(MockApi::new().with_run(7));
        let run = controller(&api, reuse(7));
        run.start_test_run().await;

        assert_eq!(run.complete().await, RunState::Resolved(7));
        assert!(api.calls().complete_run.is_empty());
    }

    #[tokio::test]
    async fn test_complete_flag_overrides() {
        let api = Arc::new(MockApi::new().with_run(7));
        let run = controller(
            &api,
            RunConfig {
                complete: Some(true),
                ..reuse(7)
            },
        );
        run.start_test_run().await;
        assert_eq!(run.complete().await, RunState::Complete);
        assert_eq!(api.calls().complete_run, vec![7]);

        let api = Arc::new(MockApi::new());
        let run = controller(
            &api,
            RunConfig {
                complete: Some(false),
                ..RunConfig::default()
            },
        );
        run.start_test_run().await;
        assert_eq!(run.complete().await, RunState::Resolved(CREATED_RUN_ID));
        assert!(api.calls().complete_run.is_empty());
    }

    #[tokio::test]
    async fn test_complete_without_run_is_noop() {
        let api = Arc::new(MockApi::new());
        let run = controller(&api, RunConfig::default());

        assert_eq!(run.complete().await, RunState::Unresolved);

        run.disable("test");
        assert_eq!(run.complete().await, RunState::Disabled);
        assert!(api.calls().complete_run.is_empty());
    }

    #[tokio::test]
    async fn test_disable_after_resolution() {
        let api = Arc::new(MockApi::new());
        let run = controller(&api, RunConfig::default());
        run.start_test_run().await;

        run.disable("shutting down");
        assert_eq!(run.state(), RunState::Disabled);
        assert_eq!(run.run_id().await, None);
    }

    #[tokio::test]
    async fn test_title_and_description_templates() {
        let api = Arc::new(MockApi::new());
        let run = controller(
            &api,
            RunConfig {
                title: "Nightly".into(),
                description: Some("built %DATE%".into()),
                environment_id: Some(5),
                ..RunConfig::default()
            },
        );
        run.start_test_run().await;

        let created = &api.calls().create_run[0];
        assert_eq!(created.title, "Nightly");
        assert!(!created.description.as_deref().unwrap().contains("%DATE%"));
        assert_eq!(created.environment_id, Some(5));
    }
}

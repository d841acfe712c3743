//! Reporter boundary used by framework adapters.
//!
//! Adapters talk to a [`QaseReporter`] through four calls and never see the
//! pipeline behind it:
//!
//! | Call | When |
//! |------|------|
//! | [`start_test_run`](QaseReporter::start_test_run) | before the first test, optional |
//! | [`add_test_result`](QaseReporter::add_test_result) | after each test, synchronous |
//! | [`publish`](QaseReporter::publish) | once the runner is done |
//! | [`complete`](QaseReporter::complete) | after publishing, optional |
//!
//! None of them return errors. Whatever goes wrong is logged and turns
//! reporting into a no-op, so the host test run is never failed by its
//! reporter.
//!
//! # Modes
//!
//! The configured [`Mode`] picks a [`Reporter`]:
//!
//! - `testops`: [`TestOpsReporter`], publishes to the remote API
//! - `report`: [`FileReporter`], writes JSON files
//! - `off`: [`NullReporter`]
//!
//! If the primary reporter cannot start (invalid configuration, project or
//! run not found), the fallback mode takes over and receives whatever was
//! buffered so far.

pub mod file;
pub mod summary;
pub mod testops;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::api::{QaseClient, TestOpsApi};
use crate::config::{Config, Mode};
use crate::model::TestResult;
use crate::publisher::PublishSummary;
use crate::run::RunState;

pub use file::FileReporter;
pub use summary::print_summary;
pub use testops::TestOpsReporter;

/// A destination for test results.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// The mode this reporter implements.
    fn mode(&self) -> Mode;

    /// Prepares the destination. `false` means it cannot be used.
    async fn start(&self) -> bool;

    /// Accepts a finished result. Must not block.
    fn add_result(&self, result: TestResult);

    /// Sends everything accepted so far.
    async fn publish(&self) -> PublishSummary;

    /// Finalizes the destination.
    async fn complete(&self);

    /// Remote run state, for reporters that have one.
    fn run_state(&self) -> Option<RunState> {
        None
    }

    /// Hands back results accepted but not yet published.
    fn take_pending(&self) -> Vec<TestResult> {
        Vec::new()
    }
}

/// A reporter that discards everything.
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    fn mode(&self) -> Mode {
        Mode::Off
    }

    async fn start(&self) -> bool {
        true
    }

    fn add_result(&self, result: TestResult) {
        debug!(title = %result.title, "reporting is off, discarding result");
    }

    async fn publish(&self) -> PublishSummary {
        PublishSummary::default()
    }

    async fn complete(&self) {}
}

/// Entry point for adapters: mode selection, fallback and the four
/// lifecycle calls.
pub struct QaseReporter {
    active: RwLock<Arc<dyn Reporter>>,
    fallback: Option<Arc<dyn Reporter>>,
    started: OnceCell<Mode>,
}

impl QaseReporter {
    /// Builds the reporter for `config`.
    ///
    /// An invalid configuration is logged and replaced by the fallback mode.
    pub fn from_config(config: &Config) -> Self {
        Self::build(config, None)
    }

    /// Like [`from_config`](Self::from_config) but publishing through `api`
    /// instead of an HTTP client.
    pub fn with_api(config: &Config, api: Arc<dyn TestOpsApi>) -> Self {
        Self::build(config, Some(api))
    }

    fn build(config: &Config, api: Option<Arc<dyn TestOpsApi>>) -> Self {
        let fallback = match config.fallback {
            Mode::Off | Mode::TestOps => None,
            mode => Some(secondary(config, mode)),
        };

        let primary: Arc<dyn Reporter> = match config.validate() {
            Ok(()) if config.mode == Mode::TestOps => match testops(config, api) {
                Ok(reporter) => reporter,
                Err(reason) => {
                    warn!(reason = %reason, fallback = %config.fallback, "cannot report to TestOps");
                    fallback.clone().unwrap_or_else(|| Arc::new(NullReporter) as Arc<dyn Reporter>)
                }
            },
            Ok(()) => secondary(config, config.mode),
            Err(e) => {
                warn!(error = %e, fallback = %config.fallback, "invalid reporter configuration");
                fallback.clone().unwrap_or_else(|| Arc::new(NullReporter) as Arc<dyn Reporter>)
            }
        };

        let fallback = fallback.filter(|f| f.mode() != primary.mode());

        debug!(mode = %primary.mode(), "reporter ready");
        Self {
            active: RwLock::new(primary),
            fallback,
            started: OnceCell::new(),
        }
    }

    /// Mode results currently go to.
    pub fn mode(&self) -> Mode {
        self.active().mode()
    }

    /// Remote run state when reporting to TestOps.
    pub fn run_state(&self) -> Option<RunState> {
        self.active().run_state()
    }

    /// Starts the active reporter, switching to the fallback if it cannot
    /// start. Only the first call does anything.
    pub async fn start_test_run(&self) -> Mode {
        *self
            .started
            .get_or_init(|| async {
                let primary = self.active();
                if primary.start().await {
                    info!(mode = %primary.mode(), "reporting started");
                    return primary.mode();
                }

                let Some(fallback) = &self.fallback else {
                    warn!(mode = %primary.mode(), "reporter could not start, results will not be sent");
                    return primary.mode();
                };
                if !fallback.start().await {
                    warn!(mode = %fallback.mode(), "fallback reporter could not start either");
                    return primary.mode();
                }
                warn!(from = %primary.mode(), to = %fallback.mode(), "switching to fallback reporter");

                // Swap before draining so concurrent adds land in the fallback.
                *self.active.write().unwrap_or_else(|p| p.into_inner()) = fallback.clone();
                for result in primary.take_pending() {
                    fallback.add_result(result);
                }
                fallback.mode()
            })
            .await
    }

    /// Accepts a finished result.
    ///
    /// Results without a signature get one here.
    pub fn add_test_result(&self, mut result: TestResult) {
        if result.signature.is_empty() {
            result.refresh_signature();
        }
        // Held across the add so a fallback switch waits for it.
        self.active
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .add_result(result);
    }

    /// Publishes everything accepted so far.
    ///
    /// Starts the run first if nobody did.
    pub async fn publish(&self) -> PublishSummary {
        self.start_test_run().await;
        self.active().publish().await
    }

    /// Finalizes the active reporter; for TestOps this completes the run
    /// when the configuration asks for it.
    pub async fn complete(&self) {
        self.active().complete().await;
    }

    fn active(&self) -> Arc<dyn Reporter> {
        self.active
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

fn testops(
    config: &Config,
    api: Option<Arc<dyn TestOpsApi>>,
) -> Result<Arc<dyn Reporter>, String> {
    let api: Arc<dyn TestOpsApi> = match api {
        Some(api) => api,
        None => Arc::new(QaseClient::from_config(&config.testops).map_err(|e| e.to_string())?),
    };
    Ok(Arc::new(TestOpsReporter::new(api, &config.testops)))
}

/// Reporter for a mode that needs no remote API.
fn secondary(config: &Config, mode: Mode) -> Arc<dyn Reporter> {
    match mode {
        Mode::Report => Arc::new(FileReporter::from_config(config)),
        Mode::TestOps | Mode::Off => Arc::new(NullReporter),
    }
}

//! qase-reporter: test result aggregation and publishing for Qase TestOps.
//!
//! Framework adapters turn native test results into a common model and hand
//! them to a [`QaseReporter`], which buffers them and publishes them in
//! batches to a remote test run, or writes them to local files.
//!
//! # Architecture
//!
//! ```text
//!  adapter ──► MetadataStore::apply ──► QaseReporter::add_test_result
//!                                              │
//!                               ┌──────────────┴──────────────┐
//!                               ▼                             ▼
//!                        TestOpsReporter                 FileReporter
//!                     ResultBuffer ─► BatchPublisher      results/*.json
//!                          RunController │
//!                                        ▼
//!                               TestOpsApi (REST /v1)
//! ```
//!
//! - **Model**: [`TestResult`], steps, attachments and statuses
//! - **Signature**: stable identity of a test across runs
//! - **Run**: resolves or creates the remote run exactly once
//! - **Publisher**: chunked bulk uploads with retry and backoff
//! - **Reporter**: mode selection and fallback
//!
//! Reporting never fails the host: every call logs its problems and
//! degrades to a no-op.
//!
//! # Example
//!
//! ```no_run
//! use qase_reporter::{QaseReporter, TestResult, TestStatus, load_with_env};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_with_env(Some(std::path::Path::new("qase.toml")))?;
//!     let reporter = QaseReporter::from_config(&config);
//!
//!     reporter.start_test_run().await;
//!     reporter.add_test_result(
//!         TestResult::new("logs in", TestStatus::Passed)
//!             .with_suite("auth")
//!             .with_testops_id(12u64),
//!     );
//!     let summary = reporter.publish().await;
//!     reporter.complete().await;
//!
//!     println!("published {}/{}", summary.published, summary.attempted);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod api;
pub mod buffer;
pub mod config;
pub mod logging;
pub mod metadata;
pub mod model;
pub mod publisher;
pub mod reporter;
pub mod retry;
pub mod run;
pub mod signature;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use api::{ApiError, QaseClient, TestOpsApi};
pub use config::{Config, Mode, load_config, load_with_env};
pub use metadata::MetadataStore;
pub use model::{Attachment, Step, TestOpsId, TestResult, TestStatus};
pub use publisher::PublishSummary;
pub use reporter::{QaseReporter, Reporter};
pub use run::RunState;
pub use signature::generate_signature;

//! Remote TestOps API seam.
//!
//! The run controller and the batch publisher talk to the remote system only
//! through [`TestOpsApi`]. [`QaseClient`] is the HTTP implementation; tests
//! substitute an in-memory one.
//!
//! # Endpoints
//!
//! | Method | Endpoint |
//! |--------|----------|
//! | [`get_project`](TestOpsApi::get_project) | `GET /project/{code}` |
//! | [`get_run`](TestOpsApi::get_run) | `GET /run/{code}/{id}` |
//! | [`create_run`](TestOpsApi::create_run) | `POST /run/{code}` |
//! | [`complete_run`](TestOpsApi::complete_run) | `POST /run/{code}/{id}/complete` |
//! | [`upload_attachment`](TestOpsApi::upload_attachment) | `POST /attachment/{code}` (multipart) |
//! | [`create_results_bulk`](TestOpsApi::create_results_bulk) | `POST /result/{code}/{run_id}/bulk` |
//!
//! Calls are single attempts. Retrying is the caller's decision, see
//! [`crate::retry`].

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::QaseClient;
pub use error::{ApiError, ApiResult};
pub use types::{AttachmentUpload, CaseCreate, Project, ResultCreate, Run, RunCreate, StepCreate};

/// Operations the reporter needs from the remote system.
#[async_trait]
pub trait TestOpsApi: Send + Sync {
    /// Fetches a project; `NotFound` if it does not exist.
    async fn get_project(&self, code: &str) -> ApiResult<Project>;

    /// Fetches a run; `NotFound` if it does not exist.
    async fn get_run(&self, code: &str, run_id: u64) -> ApiResult<Run>;

    /// Creates a run and returns its id.
    async fn create_run(&self, code: &str, run: &RunCreate) -> ApiResult<u64>;

    /// Marks a run complete.
    async fn complete_run(&self, code: &str, run_id: u64) -> ApiResult<()>;

    /// Uploads one file and returns the remote hash referencing it.
    async fn upload_attachment(&self, code: &str, file: &AttachmentUpload) -> ApiResult<String>;

    /// Creates results in a run in one request.
    async fn create_results_bulk(
        &self,
        code: &str,
        run_id: u64,
        results: &[ResultCreate],
    ) -> ApiResult<()>;
}

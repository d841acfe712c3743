//! HTTP implementation of [`TestOpsApi`] on top of `reqwest`.
//!
//! This is the only place that interprets HTTP status codes. Callers see
//! [`ApiError`] variants and decide about retries from
//! [`ApiError::is_retryable`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::{ApiError, ApiResult};
use super::types::{
    AttachmentUpload, BulkCreate, Created, Envelope, Project, ResultCreate, Run, RunCreate,
    UploadedAttachment,
};
use super::TestOpsApi;
use crate::config::TestOpsConfig;

const USER_AGENT_VALUE: &str = concat!("qase-reporter/", env!("CARGO_PKG_VERSION"));

/// Authentication header expected by the API.
const TOKEN_HEADER: &str = "Token";

/// TestOps API client.
#[derive(Debug, Clone)]
pub struct QaseClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl QaseClient {
    /// Creates a client for `base_url` authenticating with `token`.
    ///
    /// `timeout` applies to each request individually.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> ApiResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| ApiError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Creates a client from the TestOps section of the configuration.
    pub fn from_config(config: &TestOpsConfig) -> ApiResult<Self> {
        Self::new(
            &config.api_base_url(),
            config.api_token.as_deref().unwrap_or_default(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(TOKEN_HEADER, &self.token)
    }

    /// Sends a request and maps non-2xx statuses to errors.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        resource: &str,
    ) -> ApiResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized {
                message: error_message(response).await,
            }),

            StatusCode::NOT_FOUND => Err(ApiError::NotFound {
                resource: resource.to_string(),
            }),

            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(ApiError::RateLimited { retry_after })
            }

            s if s.is_server_error() => Err(ApiError::Server {
                status: s.as_u16(),
                message: error_message(response).await,
            }),

            s => Err(ApiError::BadRequest {
                status: s.as_u16(),
                message: error_message(response).await,
            }),
        }
    }

    /// Decodes the `{status, result}` envelope.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
        let envelope: Envelope<T> =
            response
                .json()
                .await
                .map_err(|e| ApiError::InvalidResponse {
                    message: format!("failed to parse response: {}", e),
                })?;

        if !envelope.status {
            return Err(ApiError::Rejected {
                message: envelope
                    .error_message
                    .unwrap_or_else(|| "no error message".to_string()),
            });
        }

        envelope.result.ok_or_else(|| ApiError::InvalidResponse {
            message: "response has no result".to_string(),
        })
    }

    /// Checks the envelope of a response whose result is not needed.
    async fn check(response: reqwest::Response) -> ApiResult<()> {
        let envelope: Envelope<serde_json::Value> =
            response
                .json()
                .await
                .map_err(|e| ApiError::InvalidResponse {
                    message: format!("failed to parse response: {}", e),
                })?;

        if envelope.status {
            Ok(())
        } else {
            Err(ApiError::Rejected {
                message: envelope
                    .error_message
                    .unwrap_or_else(|| "no error message".to_string()),
            })
        }
    }
}

/// Pulls a readable message out of an error response.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.is_empty() => {
            match serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
                Ok(Envelope {
                    error_message: Some(message),
                    ..
                }) => message,
                _ => body.chars().take(200).collect(),
            }
        }
        _ => status.to_string(),
    }
}

#[async_trait]
impl TestOpsApi for QaseClient {
    async fn get_project(&self, code: &str) -> ApiResult<Project> {
        debug!(project = code, "checking project");
        let path = format!("project/{}", code);
        let response = self
            .send(self.request(reqwest::Method::GET, &path), &path)
            .await?;
        Self::decode(response).await
    }

    async fn get_run(&self, code: &str, run_id: u64) -> ApiResult<Run> {
        debug!(project = code, run_id, "checking run");
        let path = format!("run/{}/{}", code, run_id);
        let response = self
            .send(self.request(reqwest::Method::GET, &path), &path)
            .await?;
        Self::decode(response).await
    }

    async fn create_run(&self, code: &str, run: &RunCreate) -> ApiResult<u64> {
        debug!(project = code, title = %run.title, "creating run");
        let path = format!("run/{}", code);
        let response = self
            .send(self.request(reqwest::Method::POST, &path).json(run), &path)
            .await?;
        let created: Created = Self::decode(response).await?;
        Ok(created.id)
    }

    async fn complete_run(&self, code: &str, run_id: u64) -> ApiResult<()> {
        debug!(project = code, run_id, "completing run");
        let path = format!("run/{}/{}/complete", code, run_id);
        let response = self
            .send(self.request(reqwest::Method::POST, &path), &path)
            .await?;
        Self::check(response).await
    }

    async fn upload_attachment(&self, code: &str, file: &AttachmentUpload) -> ApiResult<String> {
        debug!(project = code, file = %file.file_name, "uploading attachment");
        let path = format!("attachment/{}", code);

        let part = match Part::bytes(file.content.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
        {
            Ok(part) => part,
            Err(e) => {
                debug!(mime = %file.mime_type, error = %e, "unusable mime type, sending without one");
                Part::bytes(file.content.clone()).file_name(file.file_name.clone())
            }
        };
        let form = Form::new().part("file", part);

        let response = self
            .send(
                self.request(reqwest::Method::POST, &path).multipart(form),
                &path,
            )
            .await?;
        let uploaded: Vec<UploadedAttachment> = Self::decode(response).await?;

        uploaded
            .into_iter()
            .next()
            .map(|a| a.hash)
            .ok_or_else(|| ApiError::InvalidResponse {
                message: "upload returned no attachment".to_string(),
            })
    }

    async fn create_results_bulk(
        &self,
        code: &str,
        run_id: u64,
        results: &[ResultCreate],
    ) -> ApiResult<()> {
        debug!(project = code, run_id, count = results.len(), "sending results");
        let path = format!("result/{}/{}/bulk", code, run_id);
        let body = BulkCreate { results };
        let response = self
            .send(self.request(reqwest::Method::POST, &path).json(&body), &path)
            .await?;
        Self::check(response).await
    }
}

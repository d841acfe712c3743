//! Configuration schema definitions.
//!
//! This module defines all configuration types that can be deserialized from
//! a `qase.toml` file. Every field has a default, so an empty file (or no file
//! at all) is a valid configuration that reports nowhere.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── mode / fallback        - Where results go (testops, report, off)
//! ├── TestOpsConfig          - Remote API settings
//! │   ├── RunConfig          - Run to reuse or create
//! │   ├── BatchConfig        - Chunking and upload concurrency
//! │   └── RetryConfig        - Backoff for transient failures
//! └── ReportConfig           - Local file report output
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Largest chunk the bulk endpoint accepts.
pub const MAX_BATCH_SIZE: usize = 2000;

/// Root configuration structure.
///
/// # TOML Structure
///
/// ```toml
/// mode = "testops"
/// fallback = "report"
///
/// [testops]
/// project = "DEMO"
/// api_token = "..."
///
/// [testops.run]
/// title = "Nightly %DATE%"
///
/// [testops.batch]
/// size = 100
///
/// [report]
/// path = "build/qase-report"
/// ```
///
/// # Example
///
/// ```
/// use qase_reporter::config::{Config, Mode};
///
/// let config: Config = toml::from_str(r#"
///     mode = "testops"
///
///     [testops]
///     project = "DEMO"
///     api_token = "secret"
/// "#).unwrap();
///
/// assert_eq!(config.mode, Mode::TestOps);
/// assert_eq!(config.testops.batch.size, 200);
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    /// Primary reporting mode.
    ///
    /// Default: `off`
    #[serde(default)]
    pub mode: Mode,

    /// Mode to switch to when the primary mode cannot start.
    ///
    /// Default: `off`
    #[serde(default)]
    pub fallback: Mode,

    /// Enables debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Free-form environment label attached to the file report.
    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub testops: TestOpsConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Where results are sent.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Publish to the remote TestOps API.
    TestOps,
    /// Write JSON files locally.
    Report,
    /// Discard everything.
    #[default]
    Off,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::TestOps => "testops",
            Mode::Report => "report",
            Mode::Off => "off",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "testops" => Ok(Mode::TestOps),
            "report" => Ok(Mode::Report),
            "off" | "" => Ok(Mode::Off),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Remote TestOps API settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `base_url` | `https://api.qase.io/v1` |
/// | `upload_attachments` | `true` |
/// | `timeout_secs` | 30 |
/// | `shutdown_timeout_secs` | 30 |
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TestOpsConfig {
    /// Project code, e.g. `DEMO`.
    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub api_token: Option<String>,

    /// Explicit API root. Takes precedence over `host`.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Installation host, e.g. `qase.example.com`. Builds
    /// `https://api.<host>/v1`.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_true")]
    pub upload_attachments: bool,

    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on waiting for background publishes at shutdown.
    #[serde(default = "default_timeout")]
    pub shutdown_timeout_secs: u64,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for TestOpsConfig {
    fn default() -> Self {
        Self {
            project: None,
            api_token: None,
            base_url: None,
            host: None,
            upload_attachments: true,
            timeout_secs: default_timeout(),
            shutdown_timeout_secs: default_timeout(),
            run: RunConfig::default(),
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl TestOpsConfig {
    /// The API root every endpoint path is joined to.
    pub fn api_base_url(&self) -> String {
        if let Some(url) = self.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.trim_end_matches('/').to_string();
        }
        match self.host.as_deref().filter(|h| !h.trim().is_empty()) {
            Some(host) => format!("https://api.{}/v1", host.trim()),
            None => DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.qase.io/v1";

/// Run to reuse or create.
///
/// Titles and descriptions may contain `%DATE%`, replaced with the current
/// UTC time when the run is created.
///
/// ```toml
/// [testops.run]
/// id = 42            # reuse run 42 instead of creating one
/// title = "Nightly %DATE%"
/// complete = true    # complete the run on finish, even a reused one
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RunConfig {
    /// Existing run to report into.
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(default = "default_run_title")]
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Complete-on-finish.
    ///
    /// Unset completes only runs this process created; `true` also completes
    /// reused runs; `false` never completes.
    #[serde(default)]
    pub complete: Option<bool>,

    #[serde(default)]
    pub environment_id: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            id: None,
            title: default_run_title(),
            description: None,
            complete: None,
            environment_id: None,
        }
    }
}

/// Chunking of bulk result submissions.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `size` | 200 (clamped to 1..=2000) |
/// | `concurrency` | 4 |
/// | `incremental` | false |
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BatchConfig {
    /// Results per bulk request.
    #[serde(default = "default_batch_size")]
    pub size: usize,

    /// Attachment uploads in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Publish a chunk in the background as soon as one is buffered.
    #[serde(default)]
    pub incremental: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            concurrency: default_concurrency(),
            incremental: false,
        }
    }
}

impl BatchConfig {
    /// Chunk size limited to what the API accepts.
    pub fn effective_size(&self) -> usize {
        self.size.clamp(1, MAX_BATCH_SIZE)
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Backoff for transient API failures.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Local file report output.
///
/// ```toml
/// [report]
/// path = "~/reports/qase"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ReportConfig {
    /// Output directory. `~` and `$VAR` are expanded.
    ///
    /// Default: `"build/qase-report"`
    #[serde(default = "default_report_path")]
    pub path: String,

    /// Extra key/value pairs written into `run.json`.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: default_report_path(),
            labels: HashMap::new(),
        }
    }
}

impl ReportConfig {
    /// Output directory with `~` and environment variables expanded.
    ///
    /// Falls back to the literal path when expansion fails.
    pub fn resolved_path(&self) -> PathBuf {
        match shellexpand::full(&self.path) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(_) => PathBuf::from(&self.path),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_run_title() -> String {
    "Automated run %DATE%".to_string()
}

fn default_batch_size() -> usize {
    200
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_report_path() -> String {
    "build/qase-report".to_string()
}

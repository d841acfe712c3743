//! Configuration loading, environment overlay and validation.
//!
//! Configuration comes from an optional `qase.toml` file with `QASE_*`
//! environment variables applied on top (see [`env`]). Loading is strict:
//! unreadable or malformed files are errors. Validation is lenient: an
//! invalid configuration never aborts the host, the reporter downgrades to
//! the fallback mode instead.

pub mod env;
pub mod schema;

pub use env::{apply_env, apply_env_with};
pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// Placeholder replaced with the current time in run titles and descriptions.
pub const DATE_PLACEHOLDER: &str = "%DATE%";

/// Problems that make a mode unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("testops mode requires an API token (testops.api_token or QASE_API_TOKEN)")]
    MissingToken,

    #[error("testops mode requires a project code (testops.project or QASE_PROJECT_CODE)")]
    MissingProject,

    #[error("batch size {0} is outside 1..={max}", max = MAX_BATCH_SIZE)]
    BatchSize(usize),

    #[error("fallback mode cannot be testops")]
    TestOpsFallback,
}

impl Config {
    /// Checks that the selected mode has what it needs.
    ///
    /// Only the first problem found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback == Mode::TestOps {
            return Err(ConfigError::TestOpsFallback);
        }
        if self.mode != Mode::TestOps {
            return Ok(());
        }

        let testops = &self.testops;
        if testops.api_token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(ConfigError::MissingToken);
        }
        if testops.project.as_deref().is_none_or(|p| p.trim().is_empty()) {
            return Err(ConfigError::MissingProject);
        }
        if testops.batch.size == 0 || testops.batch.size > MAX_BATCH_SIZE {
            return Err(ConfigError::BatchSize(testops.batch.size));
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use qase_reporter::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("qase.toml"))?;
/// println!("Mode: {}", config.mode);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads configuration from a TOML string.
///
/// # Example
///
/// ```
/// use qase_reporter::config::{load_config_str, Mode};
///
/// let config = load_config_str(r#"
///     mode = "report"
///
///     [report]
///     path = "out"
/// "#)?;
///
/// assert_eq!(config.mode, Mode::Report);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

/// Loads `path` if it exists, otherwise starts from defaults, then applies
/// the process environment.
pub fn load_with_env(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) if path.exists() => load_config(path)?,
        _ => Config::default(),
    };
    apply_env(&mut config);
    Ok(config)
}

/// Substitutes [`DATE_PLACEHOLDER`] with `now` as `YYYY-MM-DD HH:MM:SS`.
pub fn render_template(template: &str, now: DateTime<Utc>) -> String {
    if !template.contains(DATE_PLACEHOLDER) {
        return template.to_string();
    }
    template.replace(
        DATE_PLACEHOLDER,
        &now.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn testops() -> Config {
        let mut config = Config::default();
        config.mode = Mode::TestOps;
        config.testops.api_token = Some("token".into());
        config.testops.project = Some("DEMO".into());
        config
    }

    #[test]
    fn test_validate_ok() {
        assert_eq!(testops().validate(), Ok(()));
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_missing_token() {
        let mut config = testops();
        config.testops.api_token = Some("".into());
        assert_eq!(config.validate(), Err(ConfigError::MissingToken));
    }

    #[test]
    fn test_validate_missing_project() {
        let mut config = testops();
        config.testops.project = None;
        assert_eq!(config.validate(), Err(ConfigError::MissingProject));
    }

    #[test]
    fn test_validate_batch_size() {
        let mut config = testops();
        config.testops.batch.size = 5000;
        assert_eq!(config.validate(), Err(ConfigError::BatchSize(5000)));
    }

    #[test]
    fn test_validate_fallback() {
        let mut config = Config::default();
        config.fallback = Mode::TestOps;
        assert_eq!(config.validate(), Err(ConfigError::TestOpsFallback));
    }

    #[test]
    fn test_render_template() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(
            render_template("Automated run %DATE%", now),
            "Automated run 2024-03-05 07:08:09"
        );
        assert_eq!(render_template("plain", now), "plain");
    }

    #[test]
    fn test_load_config_str_rejects_unknown_mode() {
        assert!(load_config_str(r#"mode = "cloud""#).is_err());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qase.toml");
        std::fs::write(&path, "mode = \"report\"\n").unwrap();
        assert_eq!(load_config(&path).unwrap().mode, Mode::Report);

        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}

//! Environment variable overlay.
//!
//! Variables are applied once, on top of whatever the file provided. The
//! lookup is injected so that callers other than the CLI never depend on the
//! process environment.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `QASE_REPORT` | `mode` (`1`/`true` → testops, `0`/`false` → off) |
//! | `QASE_MODE` | `mode` |
//! | `QASE_FALLBACK` | `fallback` |
//! | `QASE_API_TOKEN` | `testops.api_token` |
//! | `QASE_API_BASE_URL` | `testops.base_url` |
//! | `QASE_PROJECT_CODE` | `testops.project` |
//! | `QASE_RUN_ID` | `testops.run.id` |
//! | `QASE_RUN_NAME` | `testops.run.title` |
//! | `QASE_RUN_DESCRIPTION` | `testops.run.description` |
//! | `QASE_RUN_COMPLETE` | `testops.run.complete` |
//! | `QASE_ENVIRONMENT_ID` | `testops.run.environment_id` |
//! | `QASE_LOGGING` | `debug` |
//! | `QASE_BATCH_SIZE` | `testops.batch.size` |
//!
//! `QASE_MODE` wins over `QASE_REPORT` when both are set. Unparseable values
//! are ignored with a warning.

use std::str::FromStr;

use tracing::warn;

use super::schema::{Config, Mode};

/// Overlays variables returned by `lookup` onto `config`.
pub fn apply_env_with<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(value) = get("QASE_REPORT") {
        match parse_bool(&value) {
            Some(true) => config.mode = Mode::TestOps,
            Some(false) => config.mode = Mode::Off,
            None => ignored("QASE_REPORT", &value),
        }
    }
    if let Some(value) = get("QASE_MODE") {
        parse_into(&mut config.mode, "QASE_MODE", &value);
    }
    if let Some(value) = get("QASE_FALLBACK") {
        parse_into(&mut config.fallback, "QASE_FALLBACK", &value);
    }
    if let Some(value) = get("QASE_LOGGING") {
        match parse_bool(&value) {
            Some(flag) => config.debug = flag,
            None => ignored("QASE_LOGGING", &value),
        }
    }

    let testops = &mut config.testops;
    if let Some(value) = get("QASE_API_TOKEN") {
        testops.api_token = Some(value);
    }
    if let Some(value) = get("QASE_API_BASE_URL") {
        testops.base_url = Some(value);
    }
    if let Some(value) = get("QASE_PROJECT_CODE") {
        testops.project = Some(value);
    }
    if let Some(value) = get("QASE_BATCH_SIZE") {
        let mut size = testops.batch.size;
        parse_into(&mut size, "QASE_BATCH_SIZE", &value);
        testops.batch.size = size;
    }

    let run = &mut testops.run;
    if let Some(value) = get("QASE_RUN_ID") {
        let mut id = 0u64;
        if parse_into(&mut id, "QASE_RUN_ID", &value) {
            run.id = Some(id);
        }
    }
    if let Some(value) = get("QASE_RUN_NAME") {
        run.title = value;
    }
    if let Some(value) = get("QASE_RUN_DESCRIPTION") {
        run.description = Some(value);
    }
    if let Some(value) = get("QASE_RUN_COMPLETE") {
        match parse_bool(&value) {
            Some(flag) => run.complete = Some(flag),
            None => ignored("QASE_RUN_COMPLETE", &value),
        }
    }
    if let Some(value) = get("QASE_ENVIRONMENT_ID") {
        let mut id = 0u64;
        if parse_into(&mut id, "QASE_ENVIRONMENT_ID", &value) {
            run.environment_id = Some(id);
        }
    }
}

/// Overlays the process environment onto `config`.
pub fn apply_env(config: &mut Config) {
    apply_env_with(config, |name| std::env::var(name).ok());
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses `value` into `slot`, leaving it untouched on failure.
fn parse_into<T: FromStr>(slot: &mut T, name: &str, value: &str) -> bool {
    match value.trim().parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => {
            ignored(name, value);
            false
        }
    }
}

fn ignored(name: &str, value: &str) {
    warn!(variable = name, value, "ignoring unparseable environment variable");
}

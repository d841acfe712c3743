//! Helpers shared by framework adapters.
//!
//! Adapters translate a runner's native results into [`TestResult`]s. Two
//! pieces are the same for every runner and live here:
//!
//! - **Case ids in titles.** A title may carry `(Qase ID: 12)` or
//!   `(Qase ID: 12, 34)`, matched case-insensitively. The marker is removed
//!   from the title.
//! - **Native statuses.** Each adapter owns a table from its runner's status
//!   strings to [`TestStatus`]. Strings missing from the adapter table are
//!   looked up in [`COMMON_STATUSES`], and anything still unknown becomes
//!   [`TestStatus::Invalid`].
//!
//! [`TestResult`]: crate::model::TestResult

pub mod junit;

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{TestOpsId, TestStatus};

pub use junit::{JunitAdapter, parse_junit_file, parse_junit_str};

/// Status strings shared by most runners.
pub const COMMON_STATUSES: &[(&str, TestStatus)] = &[
    ("passed", TestStatus::Passed),
    ("pass", TestStatus::Passed),
    ("success", TestStatus::Passed),
    ("ok", TestStatus::Passed),
    ("failed", TestStatus::Failed),
    ("fail", TestStatus::Failed),
    ("failure", TestStatus::Failed),
    ("skipped", TestStatus::Skipped),
    ("skip", TestStatus::Skipped),
    ("pending", TestStatus::Skipped),
    ("todo", TestStatus::Skipped),
    ("disabled", TestStatus::Skipped),
    ("ignored", TestStatus::Skipped),
    ("blocked", TestStatus::Blocked),
    ("broken", TestStatus::Invalid),
    ("error", TestStatus::Invalid),
    ("timedout", TestStatus::Invalid),
    ("interrupted", TestStatus::Invalid),
    ("invalid", TestStatus::Invalid),
    ("running", TestStatus::InProgress),
    ("in_progress", TestStatus::InProgress),
];

static CASE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\(\s*qase\s+ids?\s*:\s*(\d+(?:\s*,\s*\d+)*)\s*\)")
        .expect("case id pattern is valid")
});

/// Maps a native status string through `table`, then [`COMMON_STATUSES`].
///
/// Matching ignores ASCII case, surrounding whitespace, `-` and `_`.
pub fn map_status(table: &[(&str, TestStatus)], native: &str) -> TestStatus {
    let key = normalize(native);
    table
        .iter()
        .chain(COMMON_STATUSES)
        .find(|(name, _)| normalize(name) == key)
        .map(|(_, status)| *status)
        .unwrap_or(TestStatus::Invalid)
}

fn normalize(status: &str) -> String {
    status
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Pulls case ids out of a title.
///
/// Returns the ids of every marker found, in order and without duplicates,
/// and the title with the markers removed.
///
/// ```
/// use qase_reporter::adapter::extract_case_ids;
/// use qase_reporter::model::TestOpsId;
///
/// let (ids, title) = extract_case_ids("logs in (Qase ID: 12, 34)");
/// assert_eq!(ids, Some(TestOpsId::Multiple(vec![12, 34])));
/// assert_eq!(title, "logs in");
/// ```
pub fn extract_case_ids(title: &str) -> (Option<TestOpsId>, String) {
    let mut ids: Vec<u64> = Vec::new();
    for caps in CASE_ID_PATTERN.captures_iter(title) {
        for id in parse_id_list(&caps[1]) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    if ids.is_empty() {
        return (None, title.to_string());
    }

    let cleaned = CASE_ID_PATTERN.replace_all(title, "").trim().to_string();
    (Some(TestOpsId::from(ids)), cleaned)
}

/// Parses `12, 34` style id lists, skipping anything that is not a number.
pub fn parse_id_list(list: &str) -> Vec<u64> {
    list.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

//! Closed status enumeration shared by every adapter.

use serde::{Deserialize, Serialize};

/// The outcome status of a test execution.
///
/// Every runner-native status string is mapped onto one of these variants
/// by an adapter's status table before it reaches the core.
///
/// | Status | Description | Counts as defect? |
/// |--------|-------------|-------------------|
/// | Passed | Assertions succeeded | No |
/// | Failed | An assertion failed | Yes |
/// | Skipped | Intentionally not run | No |
/// | Blocked | Could not run because of a dependency | No |
/// | Invalid | Crashed or errored outside assertions | No |
/// | InProgress | Still running when the result was captured | No |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Test passed successfully.
    #[default]
    Passed,

    /// Test failed due to an assertion.
    Failed,

    /// Test was skipped and not executed.
    Skipped,

    /// Test was blocked by an unmet precondition.
    Blocked,

    /// Test errored during setup, execution, or teardown.
    ///
    /// Unlike `Failed`, this is not an assertion failure.
    Invalid,

    /// Test had not finished when the result was recorded.
    InProgress,
}

impl TestStatus {
    /// Returns `true` if this status denotes a failure.
    ///
    /// Only `Failed` counts. The `defect` flag sent to the remote API is
    /// derived from this.
    ///
    /// ```
    /// use qase_reporter::model::TestStatus;
    ///
    /// assert!(TestStatus::Failed.is_failure());
    /// assert!(!TestStatus::Invalid.is_failure());
    /// assert!(!TestStatus::Passed.is_failure());
    /// ```
    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Failed)
    }

    /// Wire name as accepted by the remote API.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
            TestStatus::Blocked => "blocked",
            TestStatus::Invalid => "invalid",
            TestStatus::InProgress => "in_progress",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_names_match_wire_names() {
        for status in [
            TestStatus::Passed,
            TestStatus::Failed,
            TestStatus::Skipped,
            TestStatus::Blocked,
            TestStatus::Invalid,
            TestStatus::InProgress,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_only_failed_is_failure() {
        assert!(TestStatus::Failed.is_failure());
        assert!(!TestStatus::Blocked.is_failure());
        assert!(!TestStatus::Skipped.is_failure());
        assert!(!TestStatus::InProgress.is_failure());
    }
}

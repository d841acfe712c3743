//! Conversion of results into bulk-create entries.
//!
//! | Result | Entries |
//! |--------|---------|
//! | one case id | one entry with `case_id` |
//! | several case ids | one entry per id, otherwise identical |
//! | no case id | one entry with `case: {title, suite_title}` |
//!
//! `defect` is set exactly when the status is `failed`.

use crate::api::{CaseCreate, ResultCreate, StepCreate};
use crate::metadata::SUITE_SEPARATOR;
use crate::model::{Attachment, Step, TestResult};

use super::attachments::{UploadedHashes, attachment_key};

/// Builds the bulk entries for one result.
///
/// Attachments missing from `hashes` are left out.
pub fn entries(result: &TestResult, hashes: &UploadedHashes) -> Vec<ResultCreate> {
    let mut param_groups = Vec::new();
    if !result.group_params.is_empty() {
        let mut keys: Vec<String> = result.group_params.keys().cloned().collect();
        keys.sort();
        param_groups.push(keys);
    }

    let base = ResultCreate {
        case_id: None,
        case: None,
        status: result.status.as_str().to_string(),
        time_ms: result.duration,
        defect: result.status.is_failure(),
        signature: Some(result.signature.clone()).filter(|s| !s.is_empty()),
        stacktrace: result.stacktrace.clone(),
        comment: result.message.clone(),
        attachments: resolve(&result.attachments, hashes),
        param: result.params.clone(),
        param_groups,
        steps: steps(&result.steps, hashes),
    };

    let ids = result.testops_id().map(|id| id.ids()).unwrap_or_default();
    if ids.is_empty() {
        let suite_title = result
            .relations
            .iter()
            .map(|r| r.title.as_str())
            .collect::<Vec<_>>()
            .join(&SUITE_SEPARATOR.to_string());
        return vec![ResultCreate {
            case: Some(CaseCreate {
                title: result.title.clone(),
                suite_title,
            }),
            ..base
        }];
    }

    ids.into_iter()
        .map(|id| ResultCreate {
            case_id: Some(id),
            ..base.clone()
        })
        .collect()
}

fn resolve(attachments: &[Attachment], hashes: &UploadedHashes) -> Vec<String> {
    attachments
        .iter()
        .filter_map(|a| hashes.get(&attachment_key(a)).cloned())
        .collect()
}

fn steps(steps: &[Step], hashes: &UploadedHashes) -> Vec<StepCreate> {
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| StepCreate {
            position: index as u32 + 1,
            status: step.execution.status.as_str().to_string(),
            action: step.action.clone(),
            expected_result: step.expected_result.clone(),
            data: step.data.clone(),
            attachments: resolve(&step.attachments, hashes),
            steps: self::steps(&step.steps, hashes),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Relation, TestStatus};

    #[test]
    fn test_multi_id_expands() {
        let result = TestResult::new("login", TestStatus::Failed)
            .with_testops_id(vec![123u64, 456])
            .with_message("boom")
            .with_duration(40)
            .signed();

        let out = entries(&result, &UploadedHashes::new());

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].case_id, Some(123));
        assert_eq!(out[1].case_id, Some(456));
        for entry in &out {
            assert!(entry.defect);
            assert!(entry.case.is_none());
            assert_eq!(entry.status, "failed");
            assert_eq!(entry.comment.as_deref(), Some("boom"));
            assert_eq!(entry.time_ms, 40);
            assert_eq!(entry.signature.as_deref(), Some(result.signature.as_str()));
        }
    }

    #[test]
    fn test_unmatched_result_gets_case() {
        let mut result = TestResult::new("logout", TestStatus::Passed);
        result.relations = vec![Relation::new("Auth"), Relation::new("Session")];

        let out = entries(&result, &UploadedHashes::new());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].case_id, None);
        assert!(!out[0].defect);
        assert_eq!(
            out[0].case,
            Some(CaseCreate {
                title: "logout".into(),
                suite_title: "Auth\tSession".into(),
            })
        );
    }

    #[test]
    fn test_only_failed_is_defect() {
        for status in [
            TestStatus::Passed,
            TestStatus::Skipped,
            TestStatus::Blocked,
            TestStatus::Invalid,
            TestStatus::InProgress,
        ] {
            let out = entries(&TestResult::new("t", status), &UploadedHashes::new());
            assert!(!out[0].defect, "{status} must not be a defect");
        }
    }

    #[test]
    fn test_steps_and_attachments() {
        let shot = Attachment::from_content("shot.png", "image/png", vec![0u8; 4]);
        let lost = Attachment::from_content("lost.txt", "text/plain", "x");
        let mut hashes = UploadedHashes::new();
        hashes.insert(attachment_key(&shot), "h1".into());

        let mut parent = Step::new("checkout").with_status(TestStatus::Failed);
        parent.steps.push(Step::new("pay").with_expected_result("receipt"));
        parent.attachments.push(shot.clone());

        let mut result = TestResult::new("buy", TestStatus::Failed)
            .with_attachment(shot)
            .with_attachment(lost)
            .with_param("browser", "firefox");
        result.group_params.insert("region".into(), "eu".into());
        result.params.insert("region".into(), "eu".into());
        result.steps = vec![Step::new("login"), parent];

        let out = entries(&result, &hashes).remove(0);

        assert_eq!(out.attachments, vec!["h1".to_string()]);
        assert_eq!(out.param.len(), 2);
        assert_eq!(out.param_groups, vec![vec!["region".to_string()]]);
        assert_eq!(out.steps.len(), 2);
        assert_eq!(out.steps[0].position, 1);
        assert_eq!(out.steps[1].position, 2);
        assert_eq!(out.steps[1].status, "failed");
        assert_eq!(out.steps[1].attachments, vec!["h1".to_string()]);
        assert_eq!(out.steps[1].steps[0].position, 1);
        assert_eq!(out.steps[1].steps[0].expected_result.as_deref(), Some("receipt"));
    }
}

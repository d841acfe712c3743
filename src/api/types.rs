//! Wire types for the TestOps API.
//!
//! Every response is wrapped in an envelope:
//!
//! ```json
//! { "status": true, "result": { ... } }
//! { "status": false, "errorMessage": "Project not found" }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: bool,
    pub result: Option<T>,
    #[serde(default, alias = "errorMessage")]
    pub error_message: Option<String>,
}

/// A project, as returned by `GET /project/{code}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Project {
    pub code: String,
    #[serde(default)]
    pub title: String,
}

/// A run, as returned by `GET /run/{code}/{id}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Run {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
}

/// Body of `POST /run/{code}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<u64>,
    pub is_autotest: bool,
}

/// Result of any create call.
#[derive(Debug, Clone, Deserialize)]
pub struct Created {
    pub id: u64,
}

/// One uploaded file, as returned by `POST /attachment/{code}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedAttachment {
    pub hash: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// File to upload.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

/// Case description for results without a case id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseCreate {
    pub title: String,
    /// Suite path, nested suites separated by a tab.
    pub suite_title: String,
}

/// One step of a result, as sent to the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepCreate {
    pub position: u32,
    pub status: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepCreate>,
}

/// One entry of a bulk-create request.
///
/// Exactly one of `case_id` and `case` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<CaseCreate>,
    pub status: String,
    pub time_ms: u64,
    pub defect: bool,
    /// Stable identity correlating reruns of the same test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub param: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub param_groups: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepCreate>,
}

/// Body of `POST /result/{code}/{run_id}/bulk`.
#[derive(Debug, Serialize)]
pub struct BulkCreate<'a> {
    pub results: &'a [ResultCreate],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_error_message_alias() {
        let env: Envelope<Project> =
            serde_json::from_str(r#"{"status": false, "errorMessage": "nope"}"#).unwrap();
        assert!(!env.status);
        assert!(env.result.is_none());
        assert_eq!(env.error_message.as_deref(), Some("nope"));
    }

    #[test]
    fn test_result_create_omits_empty_optionals() {
        let entry = ResultCreate {
            case_id: Some(7),
            case: None,
            status: "passed".into(),
            time_ms: 12,
            defect: false,
            signature: None,
            stacktrace: None,
            comment: None,
            attachments: vec![],
            param: HashMap::new(),
            param_groups: vec![],
            steps: vec![],
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"case_id": 7, "status": "passed", "time_ms": 12, "defect": false})
        );
    }
}

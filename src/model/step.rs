//! Test steps.
//!
//! Steps form a tree: each [`Step`] may name a `parent_id`, and
//! [`Step::nest`] rebuilds the tree from the flat, call-ordered list the
//! metadata store accumulates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Attachment, TestStatus};

/// A single step recorded during a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Process-local identifier.
    pub id: String,

    /// Identifier of the enclosing step, if any.
    pub parent_id: Option<String>,

    /// Human-readable action text.
    pub action: String,

    /// Expected outcome, if the step states one.
    pub expected_result: Option<String>,

    /// Input data for the step.
    pub data: Option<String>,

    /// Execution record.
    pub execution: StepExecution,

    /// Attachments captured during this step.
    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Child steps. Empty in the flat form.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Execution sub-record of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub status: TestStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Duration in milliseconds.
    pub duration: u64,
}

impl Default for StepExecution {
    fn default() -> Self {
        Self {
            status: TestStatus::Passed,
            start_time: None,
            end_time: None,
            duration: 0,
        }
    }
}

impl Step {
    /// Creates a passed step with the given action text.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: None,
            action: action.into(),
            expected_result: None,
            data: None,
            execution: StepExecution::default(),
            attachments: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Sets the parent step.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: TestStatus) -> Self {
        self.execution.status = status;
        self
    }

    /// Sets the expected result.
    pub fn with_expected_result(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = Some(expected.into());
        self
    }

    /// Sets the step data.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Records start and end times; the duration is derived from them.
    pub fn with_times(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.execution.start_time = Some(start);
        self.execution.end_time = Some(end);
        self.execution.duration = (end - start).num_milliseconds().max(0) as u64;
        self
    }

    /// Rebuilds a step tree from a flat list.
    ///
    /// Order among siblings follows the order in `flat`. Steps whose parent
    /// is unknown, or whose parents form a cycle, are attached at the root
    /// rather than dropped.
    pub fn nest(flat: Vec<Step>) -> Vec<Step> {
        let known: std::collections::HashSet<String> =
            flat.iter().map(|s| s.id.clone()).collect();
        let order: Vec<String> = flat.iter().map(|s| s.id.clone()).collect();

        let mut roots = Vec::new();
        let mut children: std::collections::HashMap<String, Vec<Step>> =
            std::collections::HashMap::new();

        for step in flat {
            match &step.parent_id {
                Some(parent) if known.contains(parent) && parent != &step.id => {
                    children.entry(parent.clone()).or_default().push(step);
                }
                _ => roots.push(step),
            }
        }

        fn attach(step: &mut Step, children: &mut std::collections::HashMap<String, Vec<Step>>) {
            if let Some(mut kids) = children.remove(&step.id) {
                for kid in &mut kids {
                    attach(kid, children);
                }
                step.steps.extend(kids);
            }
        }

        for root in &mut roots {
            attach(root, &mut children);
        }

        // Unreachable from any root: parent chains that loop.
        let mut stranded: std::collections::HashMap<String, Step> = children
            .into_values()
            .flatten()
            .map(|step| (step.id.clone(), step))
            .collect();
        roots.extend(order.iter().filter_map(|id| stranded.remove(id)));

        roots
    }
}

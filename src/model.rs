//! Normalized test result model.
//!
//! Every adapter produces [`TestResult`]s in this shape, whatever the
//! native runner reports. The publisher consumes nothing else.
//!
//! # Lifecycle
//!
//! ```text
//! adapter builds TestResult ──► metadata applied ──► ResultBuffer::add
//!                                                        │ (immutable from here)
//!                                                        ▼
//!                                        BatchPublisher drains and uploads
//! ```

pub mod attachment;
pub mod status;
pub mod step;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signature::generate_signature;

pub use attachment::{Attachment, AttachmentSource};
pub use status::TestStatus;
pub use step::{Step, StepExecution};

/// Remote test-case identifier(s) a result is attributed to.
///
/// A single result may cover several remote cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestOpsId {
    Single(u64),
    Multiple(Vec<u64>),
}

impl TestOpsId {
    /// Returns the ids as a list.
    pub fn ids(&self) -> Vec<u64> {
        match self {
            TestOpsId::Single(id) => vec![*id],
            TestOpsId::Multiple(ids) => ids.clone(),
        }
    }
}

impl From<u64> for TestOpsId {
    fn from(id: u64) -> Self {
        TestOpsId::Single(id)
    }
}

impl From<Vec<u64>> for TestOpsId {
    fn from(ids: Vec<u64>) -> Self {
        if ids.len() == 1 {
            TestOpsId::Single(ids[0])
        } else {
            TestOpsId::Multiple(ids)
        }
    }
}

/// One entry of a result's suite path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub title: String,
    pub public_id: Option<u64>,
}

impl Relation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            public_id: None,
        }
    }
}

/// One execution record.
///
/// Built by an adapter with the `with_*` methods. Once handed to the
/// [`ResultBuffer`](crate::buffer::ResultBuffer) it is not mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Process-local unique identifier; the buffer key.
    pub id: String,

    /// Remote case id(s), or `None` for an ad-hoc test.
    testops_id: Option<TestOpsId>,

    /// Display name.
    pub title: String,

    /// Stable identity, see [`crate::signature`].
    pub signature: String,

    pub status: TestStatus,

    /// Duration in milliseconds.
    pub duration: u64,

    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Failure detail or user comment.
    pub message: Option<String>,

    pub stacktrace: Option<String>,

    /// Suite path, outermost first.
    #[serde(default)]
    pub relations: Vec<Relation>,

    #[serde(default)]
    pub fields: HashMap<String, String>,

    #[serde(default)]
    pub params: HashMap<String, String>,

    #[serde(default)]
    pub group_params: HashMap<String, String>,

    /// Steps, as a tree.
    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl TestResult {
    /// Creates a result with a fresh id and the given title.
    pub fn new(title: impl Into<String>, status: TestStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            testops_id: None,
            title: title.into(),
            signature: String::new(),
            status,
            duration: 0,
            start_time: None,
            end_time: None,
            message: None,
            stacktrace: None,
            relations: Vec::new(),
            fields: HashMap::new(),
            params: HashMap::new(),
            group_params: HashMap::new(),
            steps: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Remote case id(s), if any.
    pub fn testops_id(&self) -> Option<&TestOpsId> {
        self.testops_id.as_ref()
    }

    /// Sets the remote case id(s).
    ///
    /// The id is set-once: a result that already carries an id keeps it.
    pub fn with_testops_id(mut self, id: impl Into<TestOpsId>) -> Self {
        if self.testops_id.is_none() {
            self.testops_id = Some(id.into());
        }
        self
    }

    /// Sets the duration in milliseconds.
    pub fn with_duration(mut self, millis: u64) -> Self {
        self.duration = millis;
        self
    }

    /// Sets start and end times and derives the duration from them.
    pub fn with_times(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self.duration = (end - start).num_milliseconds().max(0) as u64;
        self
    }

    /// Sets the failure message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the stack trace.
    pub fn with_stacktrace(mut self, trace: impl Into<String>) -> Self {
        self.stacktrace = Some(trace.into());
        self
    }

    /// Appends a suite to the path (call outermost first).
    pub fn with_suite(mut self, title: impl Into<String>) -> Self {
        self.relations.push(Relation::new(title));
        self
    }

    /// Adds a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds a custom field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Adds an attachment.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Suite titles, outermost first.
    pub fn suite_path(&self) -> Vec<&str> {
        self.relations.iter().map(|r| r.title.as_str()).collect()
    }

    /// Recomputes the signature from ids, suite path, title and parameters.
    pub fn refresh_signature(&mut self) {
        let ids = self.testops_id.as_ref().map(TestOpsId::ids);
        let mut path = self.suite_path();
        path.push(&self.title);
        self.signature = generate_signature(ids.as_deref(), &path, &self.params);
    }

    /// Builder form of [`refresh_signature`](Self::refresh_signature).
    pub fn signed(mut self) -> Self {
        self.refresh_signature();
        self
    }
}

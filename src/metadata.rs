//! Per-test annotation scratchpad.
//!
//! In-test annotation calls (`title`, `fields`, `step`, ...) land in a
//! [`MetadataStore`] owned by the running test. When the adapter finalizes
//! the test, [`MetadataStore::apply`] folds the annotations into the
//! [`TestResult`] and clears the store.
//!
//! # Merge Rules
//!
//! | Annotation | Rule |
//! |------------|------|
//! | title, comment, suite | last write wins |
//! | fields, parameters, group parameters | merged, later keys overwrite |
//! | steps, attachments | appended in call order |
//! | ignore | sticky once set |
//!
//! One store per concurrently running test. Stores are plain values and are
//! never shared between tests.

use std::collections::HashMap;

use crate::model::{Attachment, Relation, Step, TestResult};

/// Separator between nested suite titles in a suite override.
pub const SUITE_SEPARATOR: char = '\t';

/// Annotations collected for one test.
///
/// Empty values (empty string, map or list) mean "not set".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: String,
    pub comment: String,
    pub suite: String,
    pub fields: HashMap<String, String>,
    pub parameters: HashMap<String, String>,
    pub group_params: HashMap<String, String>,
    pub ignore: bool,
    pub steps: Vec<Step>,
    pub attachments: Vec<Attachment>,
}

/// Mutable annotation store for a single in-flight test.
#[derive(Debug, Default)]
pub struct MetadataStore {
    metadata: Metadata,
}

impl MetadataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the annotations collected so far.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.metadata == Metadata::default()
    }

    /// Overrides the result title.
    pub fn add_title(&mut self, title: impl Into<String>) {
        self.metadata.title = title.into();
    }

    /// Sets a comment, reported ahead of any failure message.
    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.metadata.comment = comment.into();
    }

    /// Overrides the suite path. Nested suites are separated by a tab.
    pub fn add_suite(&mut self, suite: impl Into<String>) {
        self.metadata.suite = suite.into();
    }

    /// Merges custom fields.
    pub fn add_fields<I, K, V>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        merge(&mut self.metadata.fields, fields);
    }

    /// Merges parameters.
    pub fn add_parameters<I, K, V>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        merge(&mut self.metadata.parameters, params);
    }

    /// Merges group parameters.
    pub fn add_group_params<I, K, V>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        merge(&mut self.metadata.group_params, params);
    }

    /// Marks the test as ignored; it will not be reported.
    pub fn add_ignore(&mut self) {
        self.metadata.ignore = true;
    }

    /// Appends a step. Nesting is expressed through `parent_id`.
    pub fn add_step(&mut self, step: Step) {
        self.metadata.steps.push(step);
    }

    /// Appends an attachment.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.metadata.attachments.push(attachment);
    }

    /// Resets every annotation to its empty default.
    pub fn clear(&mut self) {
        self.metadata = Metadata::default();
    }

    /// Takes the annotations, leaving the store empty.
    pub fn take(&mut self) -> Metadata {
        std::mem::take(&mut self.metadata)
    }

    /// Folds the annotations into `result` and clears the store.
    ///
    /// Returns `None` when the test was marked ignored. The signature is
    /// recomputed since title, suite and parameters may have changed.
    pub fn apply(&mut self, mut result: TestResult) -> Option<TestResult> {
        let metadata = self.take();

        if metadata.ignore {
            return None;
        }

        if !metadata.title.is_empty() {
            result.title = metadata.title;
        }

        if !metadata.comment.is_empty() {
            result.message = Some(match result.message.take() {
                Some(message) => format!("{}\n\n{}", metadata.comment, message),
                None => metadata.comment,
            });
        }

        if !metadata.suite.is_empty() {
            result.relations = metadata
                .suite
                .split(SUITE_SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(Relation::new)
                .collect();
        }

        result.fields.extend(metadata.fields);
        result.params.extend(metadata.parameters);
        for (key, value) in metadata.group_params {
            result.params.insert(key.clone(), value.clone());
            result.group_params.insert(key, value);
        }

        result.steps.extend(Step::nest(metadata.steps));
        result.attachments.extend(metadata.attachments);

        result.refresh_signature();
        Some(result)
    }
}

fn merge<I, K, V>(target: &mut HashMap<String, String>, entries: I)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    for (key, value) in entries {
        target.insert(key.into(), value.into());
    }
}

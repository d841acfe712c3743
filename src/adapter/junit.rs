//! JUnit XML adapter.
//!
//! Turns JUnit XML, the lowest common denominator of test runner output,
//! into [`TestResult`]s.
//!
//! # Mapping
//!
//! | JUnit | Result |
//! |-------|--------|
//! | nested `<testsuite name>` | relations, outermost first |
//! | `<testcase classname>` | innermost relation (unless it repeats the suite) |
//! | `<testcase name>` | title, with `(Qase ID: n)` markers extracted |
//! | `<testcase time>` | duration (seconds → milliseconds) |
//! | `<failure>` / `<error>` / `<skipped>` | failed / invalid / skipped |
//! | `<property name="qase_id" value="1,2">` | case ids (wins over the title) |
//! | other `<property>` | custom fields |
//! | `[[ATTACHMENT\|path]]` in `<system-out>` | file attachment |
//!
//! ```xml
//! <testsuites>
//!   <testsuite name="checkout">
//!     <testcase classname="cart" name="adds item (Qase ID: 12)" time="0.25">
//!       <failure message="expected 1 item">stack...</failure>
//!       <system-out>[[ATTACHMENT|screenshots/cart.png]]</system-out>
//!     </testcase>
//!   </testsuite>
//! </testsuites>
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::debug;

use super::{extract_case_ids, map_status, parse_id_list};
use crate::model::{Attachment, Relation, TestOpsId, TestResult, TestStatus};

/// JUnit outcome names, as recorded while parsing.
pub const JUNIT_STATUSES: &[(&str, TestStatus)] = &[
    ("passed", TestStatus::Passed),
    ("failure", TestStatus::Failed),
    ("error", TestStatus::Invalid),
    ("skipped", TestStatus::Skipped),
];

/// Property names that carry case ids.
const CASE_ID_PROPERTIES: &[&str] = &["qase_id", "qase-id", "qaseid"];

static ATTACHMENT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[ATTACHMENT\|([^\]]+)\]\]").expect("attachment marker pattern is valid")
});

/// Errors from reading JUnit XML.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JUnit XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Parses JUnit XML into results.
///
/// Attachment paths found in `<system-out>` are resolved against `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct JunitAdapter {
    base_dir: PathBuf,
}

impl JunitAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Parses a JUnit XML document.
    pub fn parse(&self, xml: &str) -> AdapterResult<Vec<TestResult>> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut parser = Parser::default();
        loop {
            let event = reader.read_event().map_err(|source| AdapterError::Xml {
                position: reader.buffer_position(),
                source,
            })?;
            let step = match event {
                Event::Start(e) => parser.open(&e, false, self),
                Event::Empty(e) => parser.open(&e, true, self),
                Event::End(e) => {
                    parser.close(e.name().as_ref(), self);
                    Ok(())
                }
                Event::Text(t) => t.unescape().map(|text| parser.text(&text)),
                Event::CData(c) => {
                    parser.text(&String::from_utf8_lossy(&c.into_inner()));
                    Ok(())
                }
                Event::Eof => break,
                _ => Ok(()),
            };
            step.map_err(|source| AdapterError::Xml {
                position: reader.buffer_position(),
                source,
            })?;
        }

        debug!(results = parser.results.len(), "parsed JUnit XML");
        Ok(parser.results)
    }

    /// Parses a JUnit XML file. Attachments resolve against its directory
    /// unless a base directory was set.
    pub fn parse_file(&self, path: &Path) -> AdapterResult<Vec<TestResult>> {
        let xml = std::fs::read_to_string(path).map_err(|source| AdapterError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if self.base_dir.as_os_str().is_empty() {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            return self.clone().with_base_dir(dir).parse(&xml);
        }
        self.parse(&xml)
    }

    fn finish(&self, case: Case, suites: &[String]) -> TestResult {
        let (title_ids, title) = extract_case_ids(&case.name);
        let status = map_status(JUNIT_STATUSES, case.outcome);

        let mut result = TestResult::new(title, status);
        if let Some(ids) = case.property_ids.or(title_ids) {
            result = result.with_testops_id(ids);
        }

        result.relations = suites.iter().map(Relation::new).collect();
        if !case.classname.is_empty()
            && suites.last().is_none_or(|last| *last != case.classname)
        {
            result.relations.push(Relation::new(case.classname));
        }

        if let Some(secs) = case.time {
            result.duration = (secs.max(0.0) * 1000.0).round() as u64;
        }
        result.message = case.message.filter(|m| !m.is_empty());
        result.stacktrace = Some(case.detail.trim().to_string()).filter(|d| !d.is_empty());
        if status == TestStatus::Skipped && result.message.is_none() {
            result.message = result.stacktrace.take();
        }
        result.fields.extend(case.properties);

        for caps in ATTACHMENT_MARKER.captures_iter(&case.system_out) {
            let path = Path::new(caps[1].trim());
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.base_dir.join(path)
            };
            result.attachments.push(Attachment::from_path(path));
        }

        result.signed()
    }
}

/// Parses a JUnit XML string with default settings.
pub fn parse_junit_str(xml: &str) -> AdapterResult<Vec<TestResult>> {
    JunitAdapter::new().parse(xml)
}

/// Parses a JUnit XML file with default settings.
pub fn parse_junit_file(path: &Path) -> AdapterResult<Vec<TestResult>> {
    JunitAdapter::new().parse_file(path)
}

/// A `<testcase>` being read.
#[derive(Debug, Default)]
struct Case {
    name: String,
    classname: String,
    time: Option<f64>,
    outcome: &'static str,
    message: Option<String>,
    detail: String,
    system_out: String,
    property_ids: Option<TestOpsId>,
    properties: Vec<(String, String)>,
}

/// What text content currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Capture {
    #[default]
    Nothing,
    Detail,
    SystemOut,
}

#[derive(Debug, Default)]
struct Parser {
    suites: Vec<String>,
    case: Option<Case>,
    capture: Capture,
    results: Vec<TestResult>,
}

impl Parser {
    fn open(
        &mut self,
        e: &BytesStart<'_>,
        empty: bool,
        adapter: &JunitAdapter,
    ) -> Result<(), quick_xml::Error> {
        match e.name().as_ref() {
            b"testsuite" => {
                if !empty {
                    self.suites.push(attr(e, "name")?.unwrap_or_default());
                }
            }
            b"testcase" => {
                let case = Case {
                    name: attr(e, "name")?.unwrap_or_default(),
                    classname: attr(e, "classname")?.unwrap_or_default(),
                    time: attr(e, "time")?.and_then(|t| t.trim().parse().ok()),
                    outcome: "passed",
                    ..Case::default()
                };
                if empty {
                    self.results.push(adapter.finish(case, &self.suites));
                } else {
                    self.case = Some(case);
                }
            }
            outcome @ (b"failure" | b"error" | b"skipped") => {
                let message = attr(e, "message")?;
                if let Some(case) = self.case.as_mut() {
                    case.outcome = match outcome {
                        b"failure" => "failure",
                        b"error" => "error",
                        _ => "skipped",
                    };
                    case.message = message;
                    if !empty {
                        self.capture = Capture::Detail;
                    }
                }
            }
            b"system-out" if self.case.is_some() && !empty => {
                self.capture = Capture::SystemOut;
            }
            b"property" => {
                let name = attr(e, "name")?.unwrap_or_default();
                let value = attr(e, "value")?.unwrap_or_default();
                if let Some(case) = self.case.as_mut() {
                    if CASE_ID_PROPERTIES.contains(&name.to_ascii_lowercase().as_str()) {
                        let ids = parse_id_list(&value);
                        if !ids.is_empty() {
                            case.property_ids = Some(TestOpsId::from(ids));
                        }
                    } else if !name.is_empty() {
                        case.properties.push((name, value));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8], adapter: &JunitAdapter) {
        match name {
            b"testsuite" => {
                self.suites.pop();
            }
            b"testcase" => {
                if let Some(case) = self.case.take() {
                    self.results.push(adapter.finish(case, &self.suites));
                }
                self.capture = Capture::Nothing;
            }
            b"failure" | b"error" | b"skipped" | b"system-out" => {
                self.capture = Capture::Nothing;
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        let Some(case) = self.case.as_mut() else {
            return;
        };
        let target = match self.capture {
            Capture::Nothing => return,
            Capture::Detail => &mut case.detail,
            Capture::SystemOut => &mut case.system_out,
        };
        if !target.is_empty() {
            target.push('\n');
        }
        target.push_str(text);
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, quick_xml::Error> {
    match e.try_get_attribute(name)? {
        Some(a) => Ok(Some(a.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

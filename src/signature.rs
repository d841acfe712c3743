//! Stable test identity.
//!
//! A signature correlates executions of the same logical test across
//! retries and reruns. It is a pure function of the case ids, the suite
//! path and the parameters:
//!
//! ```text
//! suite::nested_suite::test_title::#12-34::{browser:chrome}::{os:linux}
//! └────────── path ─────────────┘ └ ids ┘ └────── params, by key ──────┘
//! ```
//!
//! Path segments are lower-cased and whitespace becomes `_`. Characters that
//! carry structure (`:`, `#`, `{`, `}`, `<`, `>`, `%`) are percent-escaped
//! inside segments, keys and values, so distinct inputs cannot render to the
//! same string.

use std::collections::{BTreeMap, HashMap};

const SEPARATOR: &str = "::";

/// Signature for a test with no path, ids or parameters.
pub const UNNAMED_SIGNATURE: &str = "<unnamed>";

/// Generates the signature for a test.
///
/// Neither parameter order nor id order matters: parameters are rendered
/// sorted by key, ids sorted ascending with duplicates removed.
///
/// ```
/// use std::collections::HashMap;
/// use qase_reporter::signature::generate_signature;
///
/// let params = HashMap::from([("browser".to_string(), "chrome".to_string())]);
/// let sig = generate_signature(Some(&[12]), &["Login Suite", "accepts valid user"], &params);
/// assert_eq!(sig, "login_suite::accepts_valid_user::#12::{browser:chrome}");
/// ```
pub fn generate_signature<S: AsRef<str>>(
    ids: Option<&[u64]>,
    path_segments: &[S],
    params: &HashMap<String, String>,
) -> String {
    let mut parts: Vec<String> = path_segments
        .iter()
        .map(|segment| escape(&normalize_segment(segment.as_ref())))
        .collect();

    if let Some(ids) = ids
        && !ids.is_empty()
    {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-");
        parts.push(format!("#{}", joined));
    }

    let sorted: BTreeMap<&String, &String> = params.iter().collect();
    for (key, value) in sorted {
        parts.push(format!("{{{}:{}}}", escape(key), escape(value)));
    }

    if parts.is_empty() {
        return UNNAMED_SIGNATURE.to_string();
    }

    parts.join(SEPARATOR)
}

fn normalize_segment(segment: &str) -> String {
    segment
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '#' => out.push_str("%23"),
            '{' => out.push_str("%7B"),
            '}' => out.push_str("%7D"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            _ => out.push(c),
        }
    }
    out
}

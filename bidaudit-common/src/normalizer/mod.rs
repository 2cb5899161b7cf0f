//! Agent response normalization
//!
//! Agent answers arrive as fenced JSON, bare JSON, JSON embedded in prose, or
//! plain text. [`normalize`] coerces any of them into a single scalar value,
//! a found/missing status and an optional evidence reference.
//!
//! Resolution order:
//! 1. Strip Markdown code fences
//! 2. Strict JSON parse (then the outermost `{...}` span inside prose)
//! 3. Objects: canonical value key, else the single non-metadata key, else the
//!    serialized object
//! 4. Object values are unwrapped one more level the same way
//! 5. Unparseable text: `"key": "value"` pattern, else the trimmed text
//! 6. Surrounding quotes stripped
//! 7. "Not found" phrases become `None` / [`NormalizedStatus::Missing`]
//!
//! Normalization never fails; the worst case is the raw text as the value.

mod aliases;
#[cfg(test)]
mod tests;

pub use aliases::AliasTable;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Separator used when an answer is an array of scalars
const ARRAY_JOINER: &str = "、";

static KEY_VALUE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"\\]+)"\s*[:：]\s*"((?:[^"\\]|\\.)*)""#).expect("valid key/value pattern")
});

static PAGE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digit pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizedStatus {
    Found,
    Missing,
}

/// Where in the source document a value came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.page.is_none() && self.snippet.is_none() && self.bbox.is_none()
    }
}

/// Result of normalizing one agent answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalized {
    pub value: Option<String>,
    pub status: NormalizedStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl Normalized {
    fn missing(evidence: Option<Evidence>) -> Self {
        Self {
            value: None,
            status: NormalizedStatus::Missing,
            evidence,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.status == NormalizedStatus::Missing
    }
}

/// Normalize a raw agent answer with the given alias table.
pub fn normalize(raw: &str, aliases: &AliasTable) -> Normalized {
    let body = strip_code_fences(raw);

    let (candidate, evidence) = match parse_json(body) {
        Some(parsed) => from_json(parsed, aliases),
        None => (Some(from_text(body, aliases)), None),
    };

    let evidence = evidence.filter(|e| !e.is_empty());
    let Some(candidate) = candidate else {
        return Normalized::missing(evidence);
    };

    let value = strip_quotes(&candidate);
    if aliases.is_not_found(value) {
        return Normalized::missing(evidence);
    }

    Normalized {
        value: Some(value.to_string()),
        status: NormalizedStatus::Found,
        evidence,
    }
}

/// Return the body of the first fenced code block, or the trimmed input when
/// there is none. An info string (`json`, `text`, ...) on the opening line is
/// skipped; an unterminated fence runs to the end of the input.
pub fn strip_code_fences(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw.trim();
    };

    let after_open = &raw[open + 3..];
    let body = match after_open.find('\n') {
        Some(line_end) if is_info_string(&after_open[..line_end]) => &after_open[line_end + 1..],
        _ => after_open,
    };

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn is_info_string(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '+')
}

/// Parse a raw answer as a JSON object (fences stripped, prose tolerated).
/// Used by consumers that need more than the single value, e.g. audit verdicts.
pub fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    match parse_json(strip_code_fences(raw))? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Strict parse first; then the outermost object span for JSON wrapped in prose.
fn parse_json(body: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&body[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Pick the value out of parsed JSON, recursing one level into objects.
fn from_json(parsed: Value, aliases: &AliasTable) -> (Option<String>, Option<Evidence>) {
    let outer = match parsed {
        Value::Object(map) => map,
        other => return (scalar_text(&other), None),
    };

    let mut evidence = evidence_from(&outer, aliases);
    let picked = match pick_from_object(&outer, aliases) {
        Pick::Value(value) => value,
        Pick::Nothing => return (None, evidence),
        Pick::Whole => return (Some(object_text(&outer)), evidence),
    };

    let Value::Object(inner) = picked else {
        return (scalar_text(picked), evidence);
    };

    if evidence.as_ref().map_or(true, Evidence::is_empty) {
        evidence = evidence_from(&inner, aliases);
    }

    let text = match pick_from_object(&inner, aliases) {
        Pick::Value(Value::Object(deeper)) => Some(object_text(deeper)),
        Pick::Value(value) => scalar_text(value),
        Pick::Nothing => None,
        Pick::Whole => Some(object_text(inner)),
    };
    (text, evidence)
}

fn object_text(map: &Map<String, Value>) -> String {
    serde_json::to_string(map).unwrap_or_default()
}

enum Pick<'a> {
    Value(&'a Value),
    /// Only metadata (or nothing) in the object
    Nothing,
    /// Several candidate keys: keep the whole object
    Whole,
}

fn pick_from_object<'a>(map: &'a Map<String, Value>, aliases: &AliasTable) -> Pick<'a> {
    for alias in &aliases.value_keys {
        if let Some((_, value)) = map.iter().find(|(k, _)| k.eq_ignore_ascii_case(alias)) {
            return Pick::Value(value);
        }
    }

    let mut remaining = map.iter().filter(|(k, _)| !aliases.is_metadata_key(k));
    match (remaining.next(), remaining.next()) {
        (None, _) => Pick::Nothing,
        (Some((_, value)), None) => Pick::Value(value),
        (Some(_), Some(_)) => Pick::Whole,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => {
            let scalars: Option<Vec<String>> = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect();
            Some(scalars.map_or_else(|| value.to_string(), |s| s.join(ARRAY_JOINER)))
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Fallback for non-JSON answers: a quoted `"key": "value"` pair (preferring
/// value keys, then non-metadata keys), else the whole trimmed text.
fn from_text(body: &str, aliases: &AliasTable) -> String {
    let pairs: Vec<(&str, &str)> = KEY_VALUE_PATTERN
        .captures_iter(body)
        .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .collect();

    let chosen = pairs
        .iter()
        .find(|(k, _)| aliases.is_value_key(k))
        .or_else(|| pairs.iter().find(|(k, _)| !aliases.is_metadata_key(k)));

    match chosen {
        Some((_, value)) => value.replace("\\\"", "\"").replace("\\n", "\n"),
        None => body.trim().to_string(),
    }
}

const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('“', '”'),
    ('‘', '’'),
    ('「', '」'),
    ('『', '』'),
    ('`', '`'),
];

/// Remove matching surrounding quotes, repeatedly (`"'x'"` → `x`).
pub fn strip_quotes(text: &str) -> &str {
    let mut current = text.trim();
    loop {
        let mut chars = current.chars();
        let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
            return current;
        };
        if !QUOTE_PAIRS.iter().any(|&(open, close)| first == open && last == close) {
            return current;
        }
        current = current[first.len_utf8()..current.len() - last.len_utf8()].trim();
    }
}

fn evidence_from(map: &Map<String, Value>, aliases: &AliasTable) -> Option<Evidence> {
    let mut evidence = Evidence::default();

    for (key, value) in map.iter().filter(|(k, _)| aliases.is_metadata_key(k)) {
        match key.to_ascii_lowercase().as_str() {
            "page" | "page_no" | "pageno" | "pagenumber" | "页码" | "页" => {
                evidence.page = evidence.page.or_else(|| page_number(value));
            }
            "snippet" | "原文" | "片段" => {
                evidence.snippet = evidence.snippet.take().or_else(|| non_empty_string(value));
            }
            "bbox" | "box" | "坐标" => {
                evidence.bbox = evidence.bbox.take().or_else(|| bbox(value));
            }
            "evidence" | "出处" | "来源" => match value {
                Value::Object(nested) => {
                    if let Some(inner) = evidence_from(nested, aliases) {
                        evidence.page = evidence.page.or(inner.page);
                        evidence.snippet = evidence.snippet.take().or(inner.snippet);
                        evidence.bbox = evidence.bbox.take().or(inner.bbox);
                    }
                }
                other => {
                    evidence.snippet = evidence.snippet.take().or_else(|| non_empty_string(other));
                }
            },
            _ => {}
        }
    }

    (!evidence.is_empty()).then_some(evidence)
}

fn page_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => PAGE_DIGITS.find(s).and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

fn non_empty_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn bbox(value: &Value) -> Option<Vec<f64>> {
    let items = value.as_array()?;
    let coords: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
    coords.filter(|c| !c.is_empty())
}

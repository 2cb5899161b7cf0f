//! Audit answer → structured verdict
//!
//! Outcome detection is a substring heuristic over the conclusion text and is
//! knowingly lossy. Phrase lists are checked in order; negated-problem
//! phrases come first so that "no problem" never reads as a failure, and
//! negated compliance phrases ("不符合") precede their positive forms.

use bidaudit_common::db::RiskSeverity;
use bidaudit_common::normalizer::{normalize, parse_object, AliasTable};
use serde_json::{Map, Value};

use crate::models::{AuditVerdict, VerdictOutcome};

const NEGATED_PROBLEM_PHRASES: &[&str] = &[
    "不存在问题", "未发现问题", "未发现明显问题", "无问题", "没有问题", "无风险", "未发现风险",
    "no problem", "no issue", "not existing problem", "no risk", "without issue",
];

const FAIL_PHRASES: &[&str] = &[
    "不符合", "不通过", "未通过", "存在问题", "存在风险", "违规", "不合规", "不满足",
    "fail", "problem", "issue", "risk", "non-compliant", "noncompliant",
];

const REVIEW_PHRASES: &[&str] = &[
    "需复核", "人工复核", "待确认", "无法判断", "不确定", "review", "uncertain",
];

const MISSING_PHRASES: &[&str] = &["缺失", "未提供", "缺少", "未找到", "missing", "not provided"];

const PASS_PHRASES: &[&str] = &["符合", "通过", "合规", "满足", "pass", "compliant"];

/// Checked in order; first hit wins
const OUTCOME_RULES: &[(&[&str], VerdictOutcome)] = &[
    (NEGATED_PROBLEM_PHRASES, VerdictOutcome::Pass),
    (FAIL_PHRASES, VerdictOutcome::Fail),
    (REVIEW_PHRASES, VerdictOutcome::Review),
    (MISSING_PHRASES, VerdictOutcome::Missing),
    (PASS_PHRASES, VerdictOutcome::Pass),
];

const SEVERITY_LABELS: &[(&[&str], RiskSeverity)] = &[
    (&["critical", "严重", "致命"], RiskSeverity::Critical),
    (&["high", "高"], RiskSeverity::High),
    (&["medium", "moderate", "中", "一般"], RiskSeverity::Medium),
    (&["low", "低", "轻微"], RiskSeverity::Low),
    (&["info", "提示"], RiskSeverity::Info),
];

const SEVERITY_KEYS: &[&str] = &["severity", "level", "riskLevel", "risk_level", "风险等级", "严重程度"];
const DESCRIPTION_KEYS: &[&str] = &["description", "problemDesc", "problem", "desc", "问题描述", "描述", "说明", "reason", "原因"];
const SUGGESTION_KEYS: &[&str] = &["suggestion", "advice", "recommendation", "建议", "整改建议", "修改建议"];
const EVIDENCE_KEYS: &[&str] = &["evidence", "依据", "证据", "出处"];
const LAW_KEYS: &[&str] = &["lawReference", "law_reference", "law", "legalBasis", "法律依据", "法规依据", "法规"];

/// Classify a conclusion text. Unrecognised text defaults to `Review`.
pub fn detect_outcome(text: &str) -> VerdictOutcome {
    let lowered = text.to_lowercase();
    OUTCOME_RULES
        .iter()
        .find(|(phrases, _)| phrases.iter().any(|p| lowered.contains(p)))
        .map(|(_, outcome)| *outcome)
        .unwrap_or(VerdictOutcome::Review)
}

/// Parse an English or Chinese severity label
pub fn parse_severity(label: &str) -> Option<RiskSeverity> {
    if let Ok(severity) = label.parse::<RiskSeverity>() {
        return Some(severity);
    }
    let lowered = label.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    SEVERITY_LABELS
        .iter()
        .find(|(labels, _)| labels.iter().any(|l| lowered.contains(l)))
        .map(|(_, severity)| *severity)
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    })
}

/// String values of an object, joined; keys never take part in matching
fn string_values(object: &Map<String, Value>) -> String {
    object
        .values()
        .filter_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
        .collect::<Vec<_>>()
        .join("；")
}

/// Text the outcome is detected from: the conclusion value, else for a
/// structured answer its description, else its other string values.
fn conclusion_text(raw: &str, object: Option<&Map<String, Value>>) -> String {
    let normalized = normalize(raw, &AliasTable::audit());
    // A whole-object fallback from the normalizer is not a conclusion
    if let Some(value) = normalized.value.filter(|v| parse_object(v).is_none()) {
        return value;
    }
    match object {
        Some(object) => text_field(object, DESCRIPTION_KEYS).unwrap_or_else(|| string_values(object)),
        None => raw.trim().to_string(),
    }
}

/// Build a verdict from a raw agent answer
pub fn parse_verdict(rule_code: &str, rule_name: &str, raw: &str) -> AuditVerdict {
    let object = parse_object(raw);
    let conclusion = conclusion_text(raw, object.as_ref());
    let outcome = detect_outcome(&conclusion);

    let (severity, description, suggestion, evidence, law_reference) = match &object {
        Some(object) => (
            text_field(object, SEVERITY_KEYS).and_then(|s| parse_severity(&s)),
            text_field(object, DESCRIPTION_KEYS),
            text_field(object, SUGGESTION_KEYS),
            EVIDENCE_KEYS
                .iter()
                .find_map(|key| object.get(*key).filter(|v| !v.is_null()).cloned()),
            text_field(object, LAW_KEYS),
        ),
        None => (None, Some(conclusion.clone()).filter(|c| !c.is_empty()), None, None, None),
    };

    AuditVerdict {
        rule_code: rule_code.to_string(),
        rule_name: rule_name.to_string(),
        outcome,
        severity: severity.unwrap_or_else(|| outcome.default_severity()),
        description,
        suggestion,
        evidence,
        law_reference,
        raw: raw.to_string(),
        error: None,
    }
}

/// Verdict for a rule whose agent call failed
pub fn failed_verdict(rule_code: &str, rule_name: &str, error: &str) -> AuditVerdict {
    AuditVerdict {
        rule_code: rule_code.to_string(),
        rule_name: rule_name.to_string(),
        outcome: VerdictOutcome::Review,
        severity: VerdictOutcome::Review.default_severity(),
        description: Some(format!("审核调用失败，需人工复核：{}", error)),
        suggestion: None,
        evidence: None,
        law_reference: None,
        raw: String::new(),
        error: Some(error.to_string()),
    }
}

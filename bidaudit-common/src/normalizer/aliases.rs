//! Alias tables: which object keys carry the value, which carry evidence
//! metadata, and which answers mean "nothing found".

/// Keys recognised as the canonical value in every consumer
const COMMON_VALUE_KEYS: &[&str] = &[
    "value", "result", "answer", "data", "content", "text", "output",
    "值", "结果", "答案", "内容", "数据", "提取结果", "字段值",
];

/// Keys holding evidence rather than the value
const METADATA_KEYS: &[&str] = &[
    "page", "page_no", "pageNo", "pageNumber", "snippet", "bbox", "box", "evidence",
    "source", "confidence", "reason",
    "页码", "页", "原文", "片段", "出处", "来源", "依据", "置信度", "坐标",
];

/// Answers that mean the agent found nothing
const NOT_FOUND_PHRASES: &[&str] = &[
    "", "null", "none", "nil", "undefined", "n/a", "na", "-", "--", "---", "—", "——", "/",
    "not found", "not mentioned", "not provided", "unknown",
    "无", "暂无", "空", "未找到", "未提及", "未提供", "未说明", "未明确", "未知", "不详",
    "没有", "无相关信息", "未找到相关信息", "文中未提及", "文件中未提及", "未找到相关内容",
];

const CLASSIFICATION_VALUE_KEYS: &[&str] = &[
    "docType", "doc_type", "docTypeName", "type", "category", "class",
    "文档类型", "文件类型", "类型", "分类",
];

const AUDIT_VALUE_KEYS: &[&str] = &[
    "conclusion", "status", "verdict", "审核结果", "审查结果", "结论",
];

/// Lookup tables driving [`super::normalize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTable {
    /// Canonical value keys, in priority order
    pub value_keys: Vec<String>,
    /// Keys excluded when looking for a single remaining key
    pub metadata_keys: Vec<String>,
    /// Phrases coerced to "missing"
    pub not_found: Vec<String>,
}

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

impl AliasTable {
    pub fn new(value_keys: &[&str], metadata_keys: &[&str], not_found: &[&str]) -> Self {
        Self {
            value_keys: owned(value_keys),
            metadata_keys: owned(metadata_keys),
            not_found: owned(not_found),
        }
    }

    /// Table for field extraction answers
    pub fn extraction() -> Self {
        Self::new(COMMON_VALUE_KEYS, METADATA_KEYS, NOT_FOUND_PHRASES)
    }

    /// Table for document classification answers
    pub fn classification() -> Self {
        let mut table = Self::new(CLASSIFICATION_VALUE_KEYS, METADATA_KEYS, NOT_FOUND_PHRASES);
        table.value_keys.extend(owned(COMMON_VALUE_KEYS));
        table
    }

    /// Table for audit answers that do not carry a structured verdict
    pub fn audit() -> Self {
        let mut table = Self::new(AUDIT_VALUE_KEYS, METADATA_KEYS, NOT_FOUND_PHRASES);
        table.value_keys.extend(owned(COMMON_VALUE_KEYS));
        table
    }

    /// Add a value key with the lowest priority (e.g. the field's display name)
    pub fn with_value_key(mut self, key: &str) -> Self {
        if !key.trim().is_empty() && !self.is_value_key(key) {
            self.value_keys.push(key.to_string());
        }
        self
    }

    pub fn is_value_key(&self, key: &str) -> bool {
        self.value_keys.iter().any(|k| k.eq_ignore_ascii_case(key))
    }

    pub fn is_metadata_key(&self, key: &str) -> bool {
        self.metadata_keys.iter().any(|k| k.eq_ignore_ascii_case(key))
    }

    /// True when the (already quote-stripped) answer is a "not found" phrase.
    /// ASCII letters compare case-insensitively; trailing punctuation is ignored.
    pub fn is_not_found(&self, value: &str) -> bool {
        let trimmed = value
            .trim()
            .trim_end_matches(['。', '.', '！', '!', '；', ';', '，', ','])
            .trim();
        self.not_found.iter().any(|p| p.eq_ignore_ascii_case(trimmed))
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::extraction()
    }
}

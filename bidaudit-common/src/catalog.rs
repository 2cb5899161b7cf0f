//! Field catalog: which fields to extract from tender documents and from
//! each supporting document type.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Document type code assigned when classification matches nothing
pub const OTHER_DOC_TYPE: &str = "other";

/// A field to extract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub code: String,
    pub name: String,
    /// Extra instruction passed to the agent alongside the field name
    #[serde(default)]
    pub hint: Option<String>,
}

impl FieldSpec {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }
}

/// A classifiable supporting document type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTypeSpec {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldCatalog {
    pub tender_fields: Vec<FieldSpec>,
    pub doc_types: Vec<DocTypeSpec>,
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self {
            tender_fields: default_tender_fields(),
            doc_types: default_doc_types(),
        }
    }
}

impl FieldCatalog {
    pub fn doc_type(&self, code: &str) -> Option<&DocTypeSpec> {
        self.doc_types.iter().find(|t| t.code == code)
    }

    /// Match a free-form classification answer against the catalog:
    /// code, then exact name, then substring in either direction.
    pub fn match_doc_type(&self, answer: &str) -> Option<&DocTypeSpec> {
        let answer = answer.trim();
        if answer.is_empty() {
            return None;
        }
        let lowered = answer.to_ascii_lowercase();

        self.doc_types
            .iter()
            .find(|t| t.code.eq_ignore_ascii_case(&lowered))
            .or_else(|| self.doc_types.iter().find(|t| t.name == answer))
            .or_else(|| {
                self.doc_types
                    .iter()
                    .filter(|t| t.code != OTHER_DOC_TYPE)
                    .find(|t| answer.contains(t.name.as_str()) || t.name.contains(answer))
            })
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.tender_fields {
            if field.code.trim().is_empty() {
                return Err(Error::Config("tender field with empty code".to_string()));
            }
            if !seen.insert(field.code.as_str()) {
                return Err(Error::Config(format!("duplicate tender field code: {}", field.code)));
            }
        }

        let mut seen = HashSet::new();
        for doc_type in &self.doc_types {
            if !seen.insert(doc_type.code.as_str()) {
                return Err(Error::Config(format!("duplicate doc type code: {}", doc_type.code)));
            }
            let mut fields = HashSet::new();
            for field in &doc_type.fields {
                if !fields.insert(field.code.as_str()) {
                    return Err(Error::Config(format!(
                        "duplicate field code {} in doc type {}",
                        field.code, doc_type.code
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_tender_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("project_name", "项目名称"),
        FieldSpec::new("project_code", "项目编号").with_hint("招标编号或采购编号"),
        FieldSpec::new("tenderer", "招标人"),
        FieldSpec::new("agency", "招标代理机构"),
        FieldSpec::new("budget_amount", "预算金额").with_hint("保留原文单位"),
        FieldSpec::new("max_price", "最高投标限价"),
        FieldSpec::new("bid_deadline", "投标截止时间"),
        FieldSpec::new("opening_time", "开标时间"),
        FieldSpec::new("opening_place", "开标地点"),
        FieldSpec::new("bid_bond", "投标保证金"),
        FieldSpec::new("qualification", "投标人资格要求"),
        FieldSpec::new("evaluation_method", "评标办法"),
        FieldSpec::new("service_period", "工期或服务期"),
    ]
}

fn default_doc_types() -> Vec<DocTypeSpec> {
    vec![
        DocTypeSpec {
            code: "business_license".to_string(),
            name: "营业执照".to_string(),
            fields: vec![
                FieldSpec::new("company_name", "企业名称"),
                FieldSpec::new("credit_code", "统一社会信用代码"),
                FieldSpec::new("legal_representative", "法定代表人"),
                FieldSpec::new("valid_until", "营业期限"),
            ],
        },
        DocTypeSpec {
            code: "qualification_certificate".to_string(),
            name: "资质证书".to_string(),
            fields: vec![
                FieldSpec::new("certificate_no", "证书编号"),
                FieldSpec::new("qualification_level", "资质等级"),
                FieldSpec::new("valid_until", "有效期"),
            ],
        },
        DocTypeSpec {
            code: "bid_letter".to_string(),
            name: "投标函".to_string(),
            fields: vec![
                FieldSpec::new("bidder_name", "投标人名称"),
                FieldSpec::new("bid_price", "投标报价"),
                FieldSpec::new("service_period", "工期或服务期"),
                FieldSpec::new("bid_validity", "投标有效期"),
            ],
        },
        DocTypeSpec {
            code: "power_of_attorney".to_string(),
            name: "授权委托书".to_string(),
            fields: vec![
                FieldSpec::new("principal", "委托人"),
                FieldSpec::new("agent_name", "被授权人"),
                FieldSpec::new("valid_until", "授权期限"),
            ],
        },
        DocTypeSpec {
            code: "bid_bond_receipt".to_string(),
            name: "保证金凭证".to_string(),
            fields: vec![
                FieldSpec::new("payer", "缴纳单位"),
                FieldSpec::new("amount", "金额"),
                FieldSpec::new("paid_at", "缴纳时间"),
            ],
        },
        DocTypeSpec {
            code: "financial_report".to_string(),
            name: "财务报告".to_string(),
            fields: vec![
                FieldSpec::new("report_year", "报告年度"),
                FieldSpec::new("auditor", "审计机构"),
            ],
        },
        DocTypeSpec {
            code: "performance_proof".to_string(),
            name: "业绩证明".to_string(),
            fields: vec![
                FieldSpec::new("contract_name", "合同名称"),
                FieldSpec::new("contract_amount", "合同金额"),
                FieldSpec::new("signed_at", "签订时间"),
            ],
        },
        DocTypeSpec {
            code: OTHER_DOC_TYPE.to_string(),
            name: "其他".to_string(),
            fields: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = FieldCatalog::default();
        assert!(catalog.validate().is_ok());
        assert!(catalog.doc_type(OTHER_DOC_TYPE).is_some());
    }

    #[test]
    fn test_match_doc_type_by_code_name_and_substring() {
        let catalog = FieldCatalog::default();
        assert_eq!(catalog.match_doc_type("BID_LETTER").unwrap().code, "bid_letter");
        assert_eq!(catalog.match_doc_type("营业执照").unwrap().code, "business_license");
        assert_eq!(
            catalog.match_doc_type("该文件为法人授权委托书").unwrap().code,
            "power_of_attorney"
        );
        assert!(catalog.match_doc_type("会议纪要").is_none());
        assert!(catalog.match_doc_type("  ").is_none());
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let mut catalog = FieldCatalog::default();
        catalog.tender_fields.push(FieldSpec::new("project_name", "重复"));
        assert!(matches!(catalog.validate(), Err(Error::Config(_))));
    }
}

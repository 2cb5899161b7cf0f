//! Database models
//!
//! Row types for the six tables plus the string-backed status enums stored in
//! them. Serialized with camelCase keys for the HTTP API.

use crate::normalizer::{Evidence, NormalizedStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Define a lowercase string-backed enum with `as_str`, `Display` and `FromStr`
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> crate::Result<Self> {
                let lowered = s.trim().to_ascii_lowercase();
                match lowered.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(crate::Error::InvalidInput(format!(
                        "invalid {}: {}",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Project pipeline stage. `Draft`, `Parsing`, `Confirming` and `Ready`
    /// are legacy values still found in older rows.
    ProjectStatus {
        Uploading => "uploading",
        Extracting => "extracting",
        Auditing => "auditing",
        Completed => "completed",
        Draft => "draft",
        Parsing => "parsing",
        Confirming => "confirming",
        Ready => "ready",
    }
}

impl ProjectStatus {
    pub fn is_legacy(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Draft
                | ProjectStatus::Parsing
                | ProjectStatus::Confirming
                | ProjectStatus::Ready
        )
    }

    /// Map legacy values onto the current lifecycle
    pub fn canonical(self) -> Self {
        match self {
            ProjectStatus::Draft => ProjectStatus::Uploading,
            ProjectStatus::Parsing | ProjectStatus::Confirming => ProjectStatus::Extracting,
            ProjectStatus::Ready => ProjectStatus::Completed,
            other => other,
        }
    }
}

string_enum! {
    FieldStatus {
        Auto => "auto",
        Confirmed => "confirmed",
        Modified => "modified",
        Missing => "missing",
    }
}

impl From<NormalizedStatus> for FieldStatus {
    fn from(status: NormalizedStatus) -> Self {
        match status {
            NormalizedStatus::Found => FieldStatus::Auto,
            NormalizedStatus::Missing => FieldStatus::Missing,
        }
    }
}

string_enum! {
    /// Classification confirmation state of an uploaded file
    FileStatus {
        Pending => "pending",
        Classified => "classified",
        Confirmed => "confirmed",
    }
}

string_enum! {
    ExtractionStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
}

string_enum! {
    RiskSeverity {
        Critical => "critical",
        High => "high",
        Medium => "medium",
        Low => "low",
        Info => "info",
    }
}

string_enum! {
    RiskStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Ignored => "ignored",
        Resolved => "resolved",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub tender_file_id: Option<String>,
    pub tender_dataset_id: Option<String>,
    pub tender_preview_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Extracted key/value on the project (from the tender document)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectField {
    pub id: i64,
    pub project_id: String,
    pub field_code: String,
    pub field_name: String,
    pub field_value: Option<String>,
    pub status: FieldStatus,
    pub evidence: Option<Evidence>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    /// Opaque file id on the agent platform
    pub agent_file_id: Option<String>,
    pub dataset_id: Option<String>,
    pub preview_url: Option<String>,
    pub is_tender: bool,
    pub doc_type_code: Option<String>,
    pub doc_type_name: Option<String>,
    pub status: FileStatus,
    pub extraction_status: ExtractionStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Extracted key/value scoped to one file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileField {
    pub id: i64,
    pub file_id: String,
    pub project_id: String,
    pub field_code: String,
    pub field_name: String,
    pub field_value: Option<String>,
    pub status: FieldStatus,
    pub evidence: Option<Evidence>,
    pub updated_at: DateTime<Utc>,
}

/// Confirmed audit finding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRisk {
    pub id: i64,
    pub project_id: String,
    pub rule_code: String,
    pub rule_name: String,
    pub severity: RiskSeverity,
    pub description: Option<String>,
    pub suggestion: Option<String>,
    pub evidence: Option<Value>,
    pub status: RiskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Named check, synced from the data hub (`source_id` set) or local
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRule {
    pub id: i64,
    pub source_id: Option<String>,
    pub rule_code: String,
    pub rule_name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub stage: Option<String>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditRule {
    pub fn is_local(&self) -> bool {
        self.source_id.is_none()
    }
}

/// Insert/upsert payload shared by project and file fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValueInput {
    pub field_code: String,
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub field_value: Option<String>,
    #[serde(default)]
    pub status: Option<FieldStatus>,
    #[serde(default)]
    pub evidence: Option<Evidence>,
}

/// Insert payload for audit rules (local creation and data hub sync)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditRule {
    #[serde(default)]
    pub source_id: Option<String>,
    pub rule_code: String,
    pub rule_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Insert payload for audit risks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditRisk {
    pub rule_code: String,
    pub rule_name: String,
    pub severity: RiskSeverity,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub evidence: Option<Value>,
    #[serde(default)]
    pub status: Option<RiskStatus>,
}

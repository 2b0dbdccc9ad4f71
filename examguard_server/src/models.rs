use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    PageRefresh,
    TabSwitch,
    TabClose,
    DevtoolsAccess,
    RightClick,
    ViewSource,
    KeyboardShortcut,
}

/// Body of `POST /attempts/{id}/cheating-violation`.
#[derive(Debug, Deserialize)]
pub struct ViolationReport {
    #[serde(rename = "type")]
    pub kind: ViolationType,
    pub description: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredViolation {
    #[serde(rename = "type")]
    pub kind: ViolationType,
    pub description: String,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl From<ViolationReport> for StoredViolation {
    fn from(report: ViolationReport) -> Self {
        Self {
            kind: report.kind,
            description: report.description,
            metadata: report.metadata,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningSummary {
    pub warning_count: u32,
    pub max_warnings: u32,
    pub remaining_warnings: u32,
    pub should_auto_submit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<StoredViolation>>,
}

impl WarningSummary {
    pub fn new(recorded: usize, max_warnings: u32, violations: Option<Vec<StoredViolation>>) -> Self {
        // violations past the limit are kept for review but do not raise the count
        let warning_count = u32::try_from(recorded).unwrap_or(u32::MAX).min(max_warnings);
        Self {
            warning_count,
            max_warnings,
            remaining_warnings: max_warnings - warning_count,
            should_auto_submit: warning_count >= max_warnings,
            violations,
        }
    }
}

#[derive(Serialize)]
pub struct GenericResponse {
    pub status: String,
    pub message: String,
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::services::tax_reports::TaxReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    SingleProperty,
    Batch,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleProperty => "single_property",
            Self::Batch => "batch",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "single_property" => Some(Self::SingleProperty),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFileType {
    Pdf,
    Zip,
}

impl ReportFileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Zip => "zip",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pdf" => Some(Self::Pdf),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Zip => "application/zip",
        }
    }
}

/// Metadata of a report about to be persisted together with its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGeneratedReport {
    pub account_id: Uuid,
    pub property_id: Option<Uuid>,
    pub property_name: String,
    pub report_type: ReportType,
    pub year: i32,
    pub file_type: ReportFileType,
    pub file_name: String,
    pub property_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedReport {
    pub id: Uuid,
    pub account_id: Uuid,
    pub property_id: Option<Uuid>,
    pub property_name: String,
    pub report_type: ReportType,
    pub year: i32,
    pub file_type: ReportFileType,
    pub file_name: String,
    pub file_size_bytes: i64,
    pub content_sha256: String,
    pub property_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub report: GeneratedReport,
    pub bytes: Vec<u8>,
}

/// Persistence of generated reports. Every call is scoped to one account;
/// rows of other accounts behave exactly like missing rows.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Writes metadata and bytes in one step and returns the stored row.
    async fn save(
        &self,
        report: NewGeneratedReport,
        bytes: &[u8],
    ) -> Result<GeneratedReport, TaxReportError>;

    /// Live reports, newest first.
    async fn list(&self, account_id: Uuid) -> Result<Vec<GeneratedReport>, TaxReportError>;

    async fn get(
        &self,
        account_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<StoredArtifact>, TaxReportError>;

    /// Like `get`, without loading the artifact bytes.
    async fn get_metadata(
        &self,
        account_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<GeneratedReport>, TaxReportError>;

    /// `false` when the report is missing, foreign or already deleted.
    async fn soft_delete(&self, account_id: Uuid, report_id: Uuid)
        -> Result<bool, TaxReportError>;
}

pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

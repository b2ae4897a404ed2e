use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    services::report_store::{GeneratedReport, ReportFileType, ReportType},
};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::BadRequest(format!("Validation failed: {errors}")))
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateScheduleEInput {
    pub property_id: Uuid,
    pub year: i32,
}

/// Upper bound on the payload itself; the configured batch limit is applied
/// by the report service.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateScheduleEBatchInput {
    #[validate(length(max = 1000))]
    pub property_ids: Vec<Uuid>,
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleEPreviewQuery {
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyPath {
    pub property_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportPath {
    pub report_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub id: Uuid,
    pub year: i32,
    pub property_id: Option<Uuid>,
    pub property_name: String,
    pub report_type: ReportType,
    pub file_type: ReportFileType,
    pub file_name: String,
    pub file_size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl From<GeneratedReport> for ReportSummary {
    fn from(report: GeneratedReport) -> Self {
        Self {
            id: report.id,
            year: report.year,
            property_id: report.property_id,
            property_name: report.property_name,
            report_type: report.report_type,
            file_type: report.file_type,
            file_name: report.file_name,
            file_size_bytes: report.file_size_bytes,
            created_at: report.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{validate_input, GenerateScheduleEBatchInput};
    use crate::error::AppError;

    #[test]
    fn oversized_batch_payload_is_rejected() {
        let input = GenerateScheduleEBatchInput {
            property_ids: (0..1001).map(|_| Uuid::new_v4()).collect(),
            year: 2025,
        };
        assert!(matches!(
            validate_input(&input),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn batch_payload_parses_from_json() {
        let input: GenerateScheduleEBatchInput = serde_json::from_str(
            r#"{"property_ids":["550e8400-e29b-41d4-a716-446655440000"],"year":2025}"#,
        )
        .unwrap();
        assert_eq!(input.property_ids.len(), 1);
        assert!(validate_input(&input).is_ok());
    }
}

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::services::{
    report_store::{
        content_digest, GeneratedReport, NewGeneratedReport, ReportFileType, ReportStore,
        ReportType, StoredArtifact,
    },
    tax_reports::TaxReportError,
};

const METADATA_COLUMNS: &str = "id, account_id, property_id, property_name, report_type, year, \
     file_type, file_name, file_size_bytes, content_sha256, property_ids, created_at, deleted_at";

const INSERT_REPORT: &str = "INSERT INTO generated_reports (
         id, account_id, property_id, property_name, report_type, year,
         file_type, file_name, file_size_bytes, content_sha256, property_ids, content
     )
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
     RETURNING ";

const LIST_REPORTS: &str = "FROM generated_reports
     WHERE account_id = $1 AND deleted_at IS NULL
     ORDER BY created_at DESC, id DESC";

const GET_REPORT: &str = "FROM generated_reports
     WHERE id = $1 AND account_id = $2 AND deleted_at IS NULL
     LIMIT 1";

const SOFT_DELETE_REPORT: &str = "UPDATE generated_reports
     SET deleted_at = now()
     WHERE id = $1 AND account_id = $2 AND deleted_at IS NULL
     RETURNING id";

/// Report rows with the artifact bytes stored inline, so a single INSERT
/// writes both or neither.
#[derive(Clone)]
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn save(
        &self,
        report: NewGeneratedReport,
        bytes: &[u8],
    ) -> Result<GeneratedReport, TaxReportError> {
        let row = sqlx::query(&format!("{INSERT_REPORT}{METADATA_COLUMNS}"))
            .bind(Uuid::new_v4())
            .bind(report.account_id)
            .bind(report.property_id)
            .bind(&report.property_name)
            .bind(report.report_type.as_str())
            .bind(report.year)
            .bind(report.file_type.as_str())
            .bind(&report.file_name)
            .bind(bytes.len() as i64)
            .bind(content_digest(bytes))
            .bind(&report.property_ids)
            .bind(bytes)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?;

        read_report(&row)
    }

    async fn list(&self, account_id: Uuid) -> Result<Vec<GeneratedReport>, TaxReportError> {
        let rows = sqlx::query(&format!("SELECT {METADATA_COLUMNS} {LIST_REPORTS}"))
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_read_error)?;

        rows.iter().map(read_report).collect()
    }

    async fn get(
        &self,
        account_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<StoredArtifact>, TaxReportError> {
        let row = sqlx::query(&format!("SELECT {METADATA_COLUMNS}, content {GET_REPORT}"))
            .bind(report_id)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_read_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let report = read_report(&row)?;
        let bytes: Vec<u8> = row.try_get("content").map_err(map_read_error)?;
        Ok(Some(StoredArtifact { report, bytes }))
    }

    async fn get_metadata(
        &self,
        account_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<GeneratedReport>, TaxReportError> {
        let row = sqlx::query(&format!("SELECT {METADATA_COLUMNS} {GET_REPORT}"))
            .bind(report_id)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_read_error)?;

        row.as_ref().map(read_report).transpose()
    }

    async fn soft_delete(&self, account_id: Uuid, report_id: Uuid) -> Result<bool, TaxReportError> {
        let row = sqlx::query(SOFT_DELETE_REPORT)
            .bind(report_id)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(row.is_some())
    }
}

fn read_report(row: &PgRow) -> Result<GeneratedReport, TaxReportError> {
    let report_type: String = row.try_get("report_type").map_err(map_read_error)?;
    let file_type: String = row.try_get("file_type").map_err(map_read_error)?;
    let report_type = ReportType::parse(&report_type)
        .ok_or_else(|| TaxReportError::Storage(format!("unknown report_type '{report_type}'")))?;
    let file_type = ReportFileType::parse(&file_type)
        .ok_or_else(|| TaxReportError::Storage(format!("unknown file_type '{file_type}'")))?;

    read_columns(row, report_type, file_type).map_err(map_read_error)
}

fn read_columns(
    row: &PgRow,
    report_type: ReportType,
    file_type: ReportFileType,
) -> Result<GeneratedReport, sqlx::Error> {
    Ok(GeneratedReport {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        property_id: row.try_get("property_id")?,
        property_name: row.try_get("property_name")?,
        report_type,
        year: row.try_get("year")?,
        file_type,
        file_name: row.try_get("file_name")?,
        file_size_bytes: row.try_get("file_size_bytes")?,
        content_sha256: row.try_get("content_sha256")?,
        property_ids: row.try_get("property_ids")?,
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn map_read_error(error: sqlx::Error) -> TaxReportError {
    tracing::error!(error = %error, "Generated report query failed");
    TaxReportError::Storage(format!("database request failed: {error}"))
}

fn map_write_error(error: sqlx::Error) -> TaxReportError {
    tracing::error!(error = %error, "Generated report write failed");
    TaxReportError::Storage(format!("could not persist report: {error}"))
}

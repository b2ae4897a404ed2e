use std::{collections::HashSet, sync::Arc};

use futures::{stream, StreamExt};
use uuid::Uuid;

use crate::services::{
    report_render::{render_batch, render_single, RenderedArtifact},
    report_store::{GeneratedReport, NewGeneratedReport, ReportStore, ReportType, StoredArtifact},
    tax_aggregation::{aggregate, FinancialDataProvider, PropertyYearAggregate, TaxYear},
};

const UNNAMED_PROPERTY: &str = "Unnamed property";
const DEFAULT_AGGREGATION_CONCURRENCY: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum TaxReportError {
    #[error("Tax year {year} is out of range; use a year between 2000 and {max}.")]
    InvalidYear { year: i32, max: i32 },
    #[error("At least one property id is required.")]
    EmptyPropertyList,
    #[error("A batch report accepts at most {max} properties; {requested} were requested.")]
    TooManyProperties { requested: usize, max: usize },
    #[error("Property {0} was not found.")]
    PropertyNotFound(Uuid),
    #[error("None of the requested properties could be found.")]
    NoPropertiesResolved,
    #[error("Report {0} was not found.")]
    ReportNotFound(Uuid),
    #[error("Could not render report: {0}")]
    Render(String),
    #[error("Report storage failed: {0}")]
    Storage(String),
    #[error("Financial data could not be loaded: {0}")]
    DataSource(String),
}

/// An artifact together with the report row it was persisted as.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub report: GeneratedReport,
    pub artifact: RenderedArtifact,
    /// Requested ids that were missing or belong to another account.
    pub skipped_property_ids: Vec<Uuid>,
}

pub struct TaxReportService {
    ledger: Arc<dyn FinancialDataProvider>,
    store: Arc<dyn ReportStore>,
    max_batch_properties: usize,
    aggregation_concurrency: usize,
}

impl TaxReportService {
    pub fn new(
        ledger: Arc<dyn FinancialDataProvider>,
        store: Arc<dyn ReportStore>,
        max_batch_properties: usize,
    ) -> Self {
        Self {
            ledger,
            store,
            max_batch_properties: max_batch_properties.max(1),
            aggregation_concurrency: DEFAULT_AGGREGATION_CONCURRENCY,
        }
    }

    /// Caps how many properties of one batch are aggregated at a time, so a
    /// large batch cannot drain the connection pool.
    pub fn with_aggregation_concurrency(mut self, limit: usize) -> Self {
        self.aggregation_concurrency = limit.max(1);
        self
    }

    pub async fn preview(
        &self,
        account_id: Uuid,
        property_id: Uuid,
        year: TaxYear,
    ) -> Result<PropertyYearAggregate, TaxReportError> {
        aggregate(self.ledger.as_ref(), account_id, property_id, year).await
    }

    pub async fn generate_single(
        &self,
        account_id: Uuid,
        property_id: Uuid,
        year: TaxYear,
    ) -> Result<GeneratedArtifact, TaxReportError> {
        let totals = aggregate(self.ledger.as_ref(), account_id, property_id, year).await?;
        let artifact = render_single(&totals)?;

        let report = self
            .store
            .save(
                NewGeneratedReport {
                    account_id,
                    property_id: Some(totals.property_id),
                    property_name: report_label(&totals.property_name).to_string(),
                    report_type: ReportType::SingleProperty,
                    year: year.value(),
                    file_type: artifact.file_type,
                    file_name: artifact.file_name.clone(),
                    property_ids: vec![totals.property_id],
                },
                &artifact.bytes,
            )
            .await?;

        tracing::info!(
            %account_id,
            %property_id,
            report_id = %report.id,
            year = year.value(),
            file_size_bytes = report.file_size_bytes,
            "Generated Schedule E report"
        );

        Ok(GeneratedArtifact {
            report,
            artifact,
            skipped_property_ids: Vec::new(),
        })
    }

    /// Generates one archive for several properties. Properties that cannot
    /// be resolved for this account are skipped; the request fails only when
    /// none of them resolve.
    pub async fn generate_batch(
        &self,
        account_id: Uuid,
        property_ids: &[Uuid],
        year: TaxYear,
    ) -> Result<GeneratedArtifact, TaxReportError> {
        let requested = dedupe_preserving_order(property_ids);
        if requested.is_empty() {
            return Err(TaxReportError::EmptyPropertyList);
        }
        if requested.len() > self.max_batch_properties {
            return Err(TaxReportError::TooManyProperties {
                requested: requested.len(),
                max: self.max_batch_properties,
            });
        }

        // buffered yields results in request order, whatever order they finish in.
        let results = stream::iter(
            requested
                .iter()
                .copied()
                .map(|property_id| aggregate(self.ledger.as_ref(), account_id, property_id, year)),
        )
        .buffered(self.aggregation_concurrency)
        .collect::<Vec<_>>()
        .await;

        let mut resolved = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for (property_id, result) in requested.iter().zip(results) {
            match result {
                Ok(totals) => resolved.push(totals),
                Err(TaxReportError::PropertyNotFound(_)) => skipped.push(*property_id),
                Err(error) => return Err(error),
            }
        }

        if resolved.is_empty() {
            tracing::info!(
                %account_id,
                year = year.value(),
                requested = requested.len(),
                "Batch Schedule E request matched no properties"
            );
            return Err(TaxReportError::NoPropertiesResolved);
        }

        let artifact = render_batch(&resolved)?;
        let property_id = match resolved.as_slice() {
            [only] => Some(only.property_id),
            _ => None,
        };

        let report = self
            .store
            .save(
                NewGeneratedReport {
                    account_id,
                    property_id,
                    property_name: portfolio_label(&resolved),
                    report_type: ReportType::Batch,
                    year: year.value(),
                    file_type: artifact.file_type,
                    file_name: artifact.file_name.clone(),
                    property_ids: resolved.iter().map(|totals| totals.property_id).collect(),
                },
                &artifact.bytes,
            )
            .await?;

        tracing::info!(
            %account_id,
            report_id = %report.id,
            year = year.value(),
            included = resolved.len(),
            skipped = skipped.len(),
            file_size_bytes = report.file_size_bytes,
            "Generated batch Schedule E report"
        );

        Ok(GeneratedArtifact {
            report,
            artifact,
            skipped_property_ids: skipped,
        })
    }

    pub async fn list_reports(&self, account_id: Uuid) -> Result<Vec<GeneratedReport>, TaxReportError> {
        self.store.list(account_id).await
    }

    pub async fn download_report(
        &self,
        account_id: Uuid,
        report_id: Uuid,
    ) -> Result<StoredArtifact, TaxReportError> {
        self.store
            .get(account_id, report_id)
            .await?
            .ok_or(TaxReportError::ReportNotFound(report_id))
    }

    pub async fn report_summary(
        &self,
        account_id: Uuid,
        report_id: Uuid,
    ) -> Result<GeneratedReport, TaxReportError> {
        self.store
            .get_metadata(account_id, report_id)
            .await?
            .ok_or(TaxReportError::ReportNotFound(report_id))
    }

    pub async fn delete_report(&self, account_id: Uuid, report_id: Uuid) -> Result<(), TaxReportError> {
        if !self.store.soft_delete(account_id, report_id).await? {
            return Err(TaxReportError::ReportNotFound(report_id));
        }
        tracing::info!(%account_id, %report_id, "Soft-deleted generated report");
        Ok(())
    }
}

fn dedupe_preserving_order(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Stored labels are never blank; the table rejects them.
fn report_label(property_name: &str) -> &str {
    let name = property_name.trim();
    if name.is_empty() {
        UNNAMED_PROPERTY
    } else {
        name
    }
}

fn portfolio_label(resolved: &[PropertyYearAggregate]) -> String {
    let names = resolved
        .iter()
        .map(|totals| report_label(&totals.property_name))
        .collect::<Vec<_>>();

    match names.as_slice() {
        [] => "All Properties".to_string(),
        [only] => (*only).to_string(),
        [first, second] => format!("{first} and {second}"),
        [first, second, third] => format!("{first}, {second} and {third}"),
        [first, second, rest @ ..] => format!("{first}, {second} and {} more", rest.len()),
    }
}

use std::{sync::Arc, time::Duration};

use moka::future::Cache;
use serde_json::Value;
use sqlx::PgPool;

use crate::{
    config::AppConfig,
    db::build_pool,
    repository::{generated_reports::PgReportStore, ledger::PgLedger},
    services::tax_reports::TaxReportService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub tax_reports: Option<Arc<TaxReportService>>,
    pub preview_cache: Cache<String, Value>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = build_pool(&config)?;
        let tax_reports = db_pool.as_ref().map(|pool| {
            Arc::new(TaxReportService::new(
                Arc::new(PgLedger::new(pool.clone())),
                Arc::new(PgReportStore::new(pool.clone())),
                config.tax_report_max_batch_properties,
            )
            .with_aggregation_concurrency(config.tax_report_batch_concurrency))
        });
        Ok(Self::with_service(config, db_pool, tax_reports))
    }

    pub fn with_service(
        config: AppConfig,
        db_pool: Option<PgPool>,
        tax_reports: Option<Arc<TaxReportService>>,
    ) -> Self {
        let preview_cache = Cache::builder()
            .max_capacity(config.report_preview_cache_max_entries)
            .time_to_live(Duration::from_secs(config.report_preview_cache_ttl_seconds))
            .build();
        Self {
            config: Arc::new(config),
            db_pool,
            tax_reports,
            preview_cache,
        }
    }
}

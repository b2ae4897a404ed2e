//! In-memory provider and store used by the service tests.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::services::{
    report_store::{content_digest, GeneratedReport, NewGeneratedReport, ReportStore, StoredArtifact},
    tax_aggregation::{
        ExpenseRecord, FinancialDataProvider, IncomeRecord, LedgerScope, PropertyRecord,
        SoftDeleteFilter,
    },
    tax_reports::TaxReportError,
};

#[derive(Default)]
pub struct InMemoryLedger {
    properties: Mutex<Vec<PropertyRecord>>,
    expenses: Mutex<Vec<ExpenseRecord>>,
    income: Mutex<Vec<IncomeRecord>>,
}

impl InMemoryLedger {
    pub fn add_property(&self, account_id: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.properties.lock().unwrap().push(PropertyRecord {
            id,
            account_id,
            name: name.to_string(),
            deleted_at: None,
        });
        id
    }

    pub fn add_expense(
        &self,
        property_id: Uuid,
        amount: Decimal,
        date: NaiveDate,
        category: Option<&str>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.expenses.lock().unwrap().push(ExpenseRecord {
            id,
            property_id,
            amount,
            date,
            category: category.map(ToOwned::to_owned),
            deleted_at: None,
        });
        id
    }

    pub fn add_income(&self, property_id: Uuid, amount: Decimal, date: NaiveDate) -> Uuid {
        let id = Uuid::new_v4();
        self.income.lock().unwrap().push(IncomeRecord {
            id,
            property_id,
            amount,
            date,
            deleted_at: None,
        });
        id
    }

    pub fn soft_delete_property(&self, property_id: Uuid, at: DateTime<Utc>) {
        for property in self.properties.lock().unwrap().iter_mut() {
            if property.id == property_id {
                property.deleted_at = Some(at);
            }
        }
    }

    pub fn soft_delete_expense(&self, expense_id: Uuid, at: DateTime<Utc>) {
        for expense in self.expenses.lock().unwrap().iter_mut() {
            if expense.id == expense_id {
                expense.deleted_at = Some(at);
            }
        }
    }

    pub fn soft_delete_income(&self, income_id: Uuid, at: DateTime<Utc>) {
        for item in self.income.lock().unwrap().iter_mut() {
            if item.id == income_id {
                item.deleted_at = Some(at);
            }
        }
    }

    fn owns(&self, account_id: Uuid, property_id: Uuid) -> bool {
        self.properties
            .lock()
            .unwrap()
            .iter()
            .any(|property| property.id == property_id && property.account_id == account_id)
    }
}

#[async_trait]
impl FinancialDataProvider for InMemoryLedger {
    async fn find_property(
        &self,
        account_id: Uuid,
        property_id: Uuid,
        soft_delete: SoftDeleteFilter,
    ) -> Result<Option<PropertyRecord>, TaxReportError> {
        Ok(self
            .properties
            .lock()
            .unwrap()
            .iter()
            .find(|property| {
                property.id == property_id
                    && property.account_id == account_id
                    && soft_delete.admits(property.deleted_at)
            })
            .cloned())
    }

    // Returns every row of the property, deleted or outside the year too;
    // filtering is left to the aggregator.
    async fn list_expenses(&self, scope: &LedgerScope) -> Result<Vec<ExpenseRecord>, TaxReportError> {
        if !self.owns(scope.account_id, scope.property_id) {
            return Ok(Vec::new());
        }
        Ok(self
            .expenses
            .lock()
            .unwrap()
            .iter()
            .filter(|expense| expense.property_id == scope.property_id)
            .cloned()
            .collect())
    }

    async fn list_income(&self, scope: &LedgerScope) -> Result<Vec<IncomeRecord>, TaxReportError> {
        if !self.owns(scope.account_id, scope.property_id) {
            return Ok(Vec::new());
        }
        Ok(self
            .income
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.property_id == scope.property_id)
            .cloned()
            .collect())
    }
}

/// Wraps [`InMemoryLedger`] and records how many property lookups were
/// in flight at once. Each lookup yields once before answering.
#[derive(Default)]
pub struct TrackingLedger {
    pub inner: InMemoryLedger,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl TrackingLedger {
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FinancialDataProvider for TrackingLedger {
    async fn find_property(
        &self,
        account_id: Uuid,
        property_id: Uuid,
        soft_delete: SoftDeleteFilter,
    ) -> Result<Option<PropertyRecord>, TaxReportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let found = self
            .inner
            .find_property(account_id, property_id, soft_delete)
            .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        found
    }

    async fn list_expenses(&self, scope: &LedgerScope) -> Result<Vec<ExpenseRecord>, TaxReportError> {
        self.inner.list_expenses(scope).await
    }

    async fn list_income(&self, scope: &LedgerScope) -> Result<Vec<IncomeRecord>, TaxReportError> {
        self.inner.list_income(scope).await
    }
}

/// Every read fails, as if the database were unreachable.
pub struct FailingLedger;

#[async_trait]
impl FinancialDataProvider for FailingLedger {
    async fn find_property(
        &self,
        _account_id: Uuid,
        _property_id: Uuid,
        _soft_delete: SoftDeleteFilter,
    ) -> Result<Option<PropertyRecord>, TaxReportError> {
        Err(TaxReportError::DataSource("connection refused".to_string()))
    }

    async fn list_expenses(&self, _scope: &LedgerScope) -> Result<Vec<ExpenseRecord>, TaxReportError> {
        Err(TaxReportError::DataSource("connection refused".to_string()))
    }

    async fn list_income(&self, _scope: &LedgerScope) -> Result<Vec<IncomeRecord>, TaxReportError> {
        Err(TaxReportError::DataSource("connection refused".to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryReportStore {
    rows: Mutex<Vec<StoredArtifact>>,
    fail_next_save: AtomicBool,
}

impl InMemoryReportStore {
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Rows in any state, soft-deleted included.
    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save(
        &self,
        report: NewGeneratedReport,
        bytes: &[u8],
    ) -> Result<GeneratedReport, TaxReportError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(TaxReportError::Storage("disk full".to_string()));
        }
        // Mirrors the table's CHECK on property_name.
        if report.property_name.trim().is_empty() {
            return Err(TaxReportError::Storage(
                "property_name violates check constraint".to_string(),
            ));
        }
        let mut rows = self.rows.lock().unwrap();
        // Strictly increasing timestamps keep newest-first ordering testable.
        let created_at = Utc::now() + Duration::microseconds(rows.len() as i64);
        let stored = GeneratedReport {
            id: Uuid::new_v4(),
            account_id: report.account_id,
            property_id: report.property_id,
            property_name: report.property_name,
            report_type: report.report_type,
            year: report.year,
            file_type: report.file_type,
            file_name: report.file_name,
            file_size_bytes: bytes.len() as i64,
            content_sha256: content_digest(bytes),
            property_ids: report.property_ids,
            created_at,
            deleted_at: None,
        };
        rows.push(StoredArtifact {
            report: stored.clone(),
            bytes: bytes.to_vec(),
        });
        Ok(stored)
    }

    async fn list(&self, account_id: Uuid) -> Result<Vec<GeneratedReport>, TaxReportError> {
        let mut reports = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|row| row.report.clone())
            .filter(|report| report.account_id == account_id && report.deleted_at.is_none())
            .collect::<Vec<_>>();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(reports)
    }

    async fn get(
        &self,
        account_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<StoredArtifact>, TaxReportError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| {
                row.report.id == report_id
                    && row.report.account_id == account_id
                    && row.report.deleted_at.is_none()
            })
            .cloned())
    }

    async fn get_metadata(
        &self,
        account_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<GeneratedReport>, TaxReportError> {
        Ok(self
            .get(account_id, report_id)
            .await?
            .map(|stored| stored.report))
    }

    async fn soft_delete(&self, account_id: Uuid, report_id: Uuid) -> Result<bool, TaxReportError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|row| {
            row.report.id == report_id
                && row.report.account_id == account_id
                && row.report.deleted_at.is_none()
        }) else {
            return Ok(false);
        };
        row.report.deleted_at = Some(Utc::now());
        Ok(true)
    }
}

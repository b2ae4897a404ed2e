use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::services::{
    tax_aggregation::{
        ExpenseRecord, FinancialDataProvider, IncomeRecord, LedgerScope, PropertyRecord,
        SoftDeleteFilter,
    },
    tax_reports::TaxReportError,
};

/// Reads properties, expenses and income written by the bookkeeping CRUD layer.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FinancialDataProvider for PgLedger {
    async fn find_property(
        &self,
        account_id: Uuid,
        property_id: Uuid,
        soft_delete: SoftDeleteFilter,
    ) -> Result<Option<PropertyRecord>, TaxReportError> {
        let row = sqlx::query(
            "SELECT id, account_id, name, deleted_at
             FROM properties
             WHERE id = $1
               AND account_id = $2
               AND ($3 OR deleted_at IS NULL)
             LIMIT 1",
        )
        .bind(property_id)
        .bind(account_id)
        .bind(includes_deleted(soft_delete))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_read_error)?;

        row.map(|row| read_property(&row))
            .transpose()
            .map_err(map_read_error)
    }

    async fn list_expenses(&self, scope: &LedgerScope) -> Result<Vec<ExpenseRecord>, TaxReportError> {
        let rows = sqlx::query(
            "SELECT e.id, e.property_id, e.amount, e.date, c.code AS category, e.deleted_at
             FROM expenses e
             JOIN properties p ON p.id = e.property_id
             LEFT JOIN expense_categories c ON c.id = e.category_id
             WHERE e.property_id = $1
               AND p.account_id = $2
               AND e.date BETWEEN $3 AND $4
               AND ($5 OR e.deleted_at IS NULL)
             ORDER BY e.date, e.id",
        )
        .bind(scope.property_id)
        .bind(scope.account_id)
        .bind(scope.from)
        .bind(scope.to)
        .bind(includes_deleted(scope.soft_delete))
        .fetch_all(&self.pool)
        .await
        .map_err(map_read_error)?;

        rows.iter()
            .map(read_expense)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_read_error)
    }

    async fn list_income(&self, scope: &LedgerScope) -> Result<Vec<IncomeRecord>, TaxReportError> {
        let rows = sqlx::query(
            "SELECT i.id, i.property_id, i.amount, i.date, i.deleted_at
             FROM income i
             JOIN properties p ON p.id = i.property_id
             WHERE i.property_id = $1
               AND p.account_id = $2
               AND i.date BETWEEN $3 AND $4
               AND ($5 OR i.deleted_at IS NULL)
             ORDER BY i.date, i.id",
        )
        .bind(scope.property_id)
        .bind(scope.account_id)
        .bind(scope.from)
        .bind(scope.to)
        .bind(includes_deleted(scope.soft_delete))
        .fetch_all(&self.pool)
        .await
        .map_err(map_read_error)?;

        rows.iter()
            .map(read_income)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_read_error)
    }
}

fn includes_deleted(filter: SoftDeleteFilter) -> bool {
    filter == SoftDeleteFilter::IncludeDeleted
}

fn read_property(row: &PgRow) -> Result<PropertyRecord, sqlx::Error> {
    Ok(PropertyRecord {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        name: row.try_get("name")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn read_expense(row: &PgRow) -> Result<ExpenseRecord, sqlx::Error> {
    Ok(ExpenseRecord {
        id: row.try_get("id")?,
        property_id: row.try_get("property_id")?,
        amount: row.try_get("amount")?,
        date: row.try_get("date")?,
        category: row.try_get("category")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn read_income(row: &PgRow) -> Result<IncomeRecord, sqlx::Error> {
    Ok(IncomeRecord {
        id: row.try_get("id")?,
        property_id: row.try_get("property_id")?,
        amount: row.try_get("amount")?,
        date: row.try_get("date")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn map_read_error(error: sqlx::Error) -> TaxReportError {
    tracing::error!(error = %error, "Ledger query failed");
    TaxReportError::DataSource(format!("database request failed: {error}"))
}

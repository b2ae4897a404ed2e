use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;

use crate::services::{
    schedule_e::{map_to_line, ScheduleELine},
    tax_reports::TaxReportError,
};

const MIN_TAX_YEAR: i32 = 2000;

/// A calendar year accepted for Schedule E reporting: 2000 through next year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxYear {
    year: i32,
    first_day: NaiveDate,
    last_day: NaiveDate,
}

impl TaxYear {
    pub fn new(year: i32, today: NaiveDate) -> Result<Self, TaxReportError> {
        let max = today.year() + 1;
        if !(MIN_TAX_YEAR..=max).contains(&year) {
            return Err(TaxReportError::InvalidYear { year, max });
        }
        let (Some(first_day), Some(last_day)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Err(TaxReportError::InvalidYear { year, max });
        };
        Ok(Self {
            year,
            first_day,
            last_day,
        })
    }

    pub fn current(year: i32) -> Result<Self, TaxReportError> {
        Self::new(year, Utc::now().date_naive())
    }

    pub fn value(self) -> i32 {
        self.year
    }

    pub fn first_day(self) -> NaiveDate {
        self.first_day
    }

    pub fn last_day(self) -> NaiveDate {
        self.last_day
    }
}

/// Whether soft-deleted rows take part in a read. Always passed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftDeleteFilter {
    ExcludeDeleted,
    IncludeDeleted,
}

impl SoftDeleteFilter {
    pub fn admits(self, deleted_at: Option<DateTime<Utc>>) -> bool {
        match self {
            Self::IncludeDeleted => true,
            Self::ExcludeDeleted => deleted_at.is_none(),
        }
    }
}

/// Rows of one property inside one tax year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerScope {
    pub account_id: Uuid,
    pub property_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub soft_delete: SoftDeleteFilter,
}

impl LedgerScope {
    pub fn for_year(account_id: Uuid, property_id: Uuid, year: TaxYear) -> Self {
        Self {
            account_id,
            property_id,
            from: year.first_day(),
            to: year.last_day(),
            soft_delete: SoftDeleteFilter::ExcludeDeleted,
        }
    }

    fn admits(&self, property_id: Uuid, date: NaiveDate, deleted_at: Option<DateTime<Utc>>) -> bool {
        property_id == self.property_id
            && date >= self.from
            && date <= self.to
            && self.soft_delete.admits(deleted_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseRecord {
    pub id: Uuid,
    pub property_id: Uuid,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub category: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomeRecord {
    pub id: Uuid,
    pub property_id: Uuid,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Read-only access to the bookkeeping tables owned by the CRUD layer.
#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    /// Ownership is part of the lookup: a property of another account is `None`.
    async fn find_property(
        &self,
        account_id: Uuid,
        property_id: Uuid,
        soft_delete: SoftDeleteFilter,
    ) -> Result<Option<PropertyRecord>, TaxReportError>;

    async fn list_expenses(&self, scope: &LedgerScope)
        -> Result<Vec<ExpenseRecord>, TaxReportError>;

    async fn list_income(&self, scope: &LedgerScope) -> Result<Vec<IncomeRecord>, TaxReportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleELineTotal {
    pub line: ScheduleELine,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyYearAggregate {
    pub property_id: Uuid,
    pub property_name: String,
    pub year: i32,
    pub line_totals: Vec<ScheduleELineTotal>,
    pub total_expenses: Decimal,
    pub total_income: Decimal,
    pub net_income: Decimal,
}

impl PropertyYearAggregate {
    pub fn line_amount(&self, line: ScheduleELine) -> Decimal {
        self.line_totals
            .iter()
            .find(|total| total.line == line)
            .map(|total| total.amount)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Aggregates one property's non-deleted expenses and income for `year`.
///
/// The property itself is resolved even when soft-deleted, because tax data
/// of a since-removed property stays reportable. A property that does not
/// exist or belongs to another account is `PropertyNotFound`.
pub async fn aggregate(
    provider: &dyn FinancialDataProvider,
    account_id: Uuid,
    property_id: Uuid,
    year: TaxYear,
) -> Result<PropertyYearAggregate, TaxReportError> {
    let property = provider
        .find_property(account_id, property_id, SoftDeleteFilter::IncludeDeleted)
        .await?
        .filter(|property| property.account_id == account_id && property.id == property_id)
        .ok_or(TaxReportError::PropertyNotFound(property_id))?;

    let scope = LedgerScope::for_year(account_id, property_id, year);
    let expenses = provider.list_expenses(&scope).await?;
    let income = provider.list_income(&scope).await?;

    let aggregate = summarize(&property, &scope, year, &expenses, &income);
    tracing::debug!(
        %account_id,
        %property_id,
        year = year.value(),
        property_deleted = property.deleted_at.is_some(),
        expense_rows = expenses.len(),
        income_rows = income.len(),
        total_expenses = %aggregate.total_expenses,
        total_income = %aggregate.total_income,
        "Aggregated Schedule E totals"
    );
    Ok(aggregate)
}

fn summarize(
    property: &PropertyRecord,
    scope: &LedgerScope,
    year: TaxYear,
    expenses: &[ExpenseRecord],
    income: &[IncomeRecord],
) -> PropertyYearAggregate {
    let mut by_line: BTreeMap<ScheduleELine, Decimal> = BTreeMap::new();
    for expense in expenses {
        if !scope.admits(expense.property_id, expense.date, expense.deleted_at) {
            continue;
        }
        let line = map_to_line(expense.category.as_deref());
        *by_line.entry(line).or_insert(Decimal::ZERO) += expense.amount;
    }

    let line_totals = ScheduleELine::ALL
        .iter()
        .map(|line| ScheduleELineTotal {
            line: *line,
            amount: round_money(by_line.get(line).copied().unwrap_or(Decimal::ZERO)),
        })
        .collect::<Vec<_>>();

    let total_expenses = round_money(line_totals.iter().map(|total| total.amount).sum());
    let total_income = round_money(
        income
            .iter()
            .filter(|item| scope.admits(item.property_id, item.date, item.deleted_at))
            .map(|item| item.amount)
            .sum(),
    );

    PropertyYearAggregate {
        property_id: property.id,
        property_name: property.name.clone(),
        year: year.value(),
        line_totals,
        total_expenses,
        total_income,
        net_income: round_money(total_income - total_expenses),
    }
}

/// Two decimal places, half away from zero, fixed scale.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

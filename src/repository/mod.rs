pub mod generated_reports;
pub mod ledger;

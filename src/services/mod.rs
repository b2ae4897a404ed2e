pub mod report_render;
pub mod report_store;
pub mod schedule_e;
pub mod tax_aggregation;
pub mod tax_reports;

#[cfg(test)]
pub mod fakes;

pub mod commands;
pub mod config;
pub mod drift;
pub mod http;
pub mod logger;
pub mod migrations;
pub mod orphan_cleaner;
pub mod provider_manager;
pub mod reconciliation;
pub mod report;
pub mod repository;
pub mod sync_job;
pub mod task_reporter;

pub use reconciliation::ReconciliationDriver;
pub use report::ReconcileReport;

//! Oncoplan turns oncology treatment-protocol documents into validated
//! regimen records and day-by-day treatment calendars.
//!
//! The pipeline runs in four stages: text extraction from the uploaded
//! PDF, regimen structuring through a completion model, drug enrichment
//! against a knowledge service, and calendar projection. The
//! [`pipeline::processor::TemplateAnalyzer`] drives all of them and holds
//! every document's state.

pub mod config;
pub mod models;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries embedding this crate. Respects
/// `RUST_LOG`, falling back to the crate default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}

pub mod calendar;
pub mod enrichment;
pub mod extraction;
pub mod processor;
pub mod structuring;

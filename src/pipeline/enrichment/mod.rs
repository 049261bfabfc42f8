pub mod engine;
pub mod fdb;
pub mod types;

pub use engine::*;
pub use fdb::*;
pub use types::*;

use thiserror::Error;

/// Failure of a single call to the drug-knowledge service.
#[derive(Error, Debug)]
pub enum EnrichmentCallError {
    #[error("Drug-knowledge service unreachable: {0}")]
    Connection(String),

    #[error("Drug-knowledge request timed out after {0}s")]
    Timeout(u64),

    #[error("Drug-knowledge service returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Could not decode drug-knowledge response: {0}")]
    Decode(String),
}

//! Leader election errors

use crate::lock::LockError;
use crate::metadata::MetadataError;
use thiserror::Error;

/// Leader election errors
#[derive(Debug, Error)]
pub enum LeaderError {
    #[error("Invalid election config: {0}")]
    InvalidConfig(String),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Leadership callback failed: {0}")]
    Callback(String),
}

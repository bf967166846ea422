//! Error type for store and settings operations.
//!
//! Business outcomes (validation failures, conflicts, missing lookups) are not
//! errors; they travel as [`crate::ApiResponse`] values.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("Project file for {id} is invalid: {source}")]
    InvalidProjectFile {
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

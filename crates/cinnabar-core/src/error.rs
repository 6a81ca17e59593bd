use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CinnabarError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence error: {0}")]
    Persist(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Bulk put failed for {failed} of {total} items; first failure: {first}")]
    BulkPut {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CinnabarError>;

impl CinnabarError {
    /// Wrap this error with additional context.
    ///
    /// The context string is prepended to the error message, producing a
    /// chain like `"loading persisted records: Persistence error: ..."`.
    pub fn context(self, msg: impl Into<String>) -> Self {
        CinnabarError::InvalidState(format!("{}: {}", msg.into(), self))
    }
}

use thiserror::Error;

/// Errors raised by the storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// A stored record could not be decoded.
    #[error("corrupt storage record: {0}")]
    Corrupt(String),
}

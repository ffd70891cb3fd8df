//! Image storage contract consumed by article and event workflows.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The file was refused; every reason is reported, not only the first.
    #[error("upload rejected: {}", .0.join("; "))]
    Rejected(Vec<String>),

    #[error("stored file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Stores `data` under `desired_name` plus the extension of `original_name`.
    /// Returns the stored file name, which may differ from the desired one on collision.
    async fn upload(&self, data: Bytes, original_name: &str, desired_name: &str)
        -> StorageResult<String>;

    /// Removes a stored file from public view. The file stays recoverable.
    async fn delete(&self, stored_name: &str) -> StorageResult<()>;

    /// URL path under which a stored file is served.
    fn public_path(&self, stored_name: &str) -> String;
}

//! Image file storage behind a trait so workflows only see upload/delete outcomes.

mod backend;
mod local;

pub use backend::{ImageStorage, StorageError, StorageResult};
pub use local::LocalImageStorage;

#[cfg(test)]
pub(crate) use local::tests::png_bytes;

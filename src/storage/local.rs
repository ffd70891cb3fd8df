//! Local filesystem image storage.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use super::backend::{ImageStorage, StorageError, StorageResult};

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const TRASH_DIR: &str = "trash";

/// Stores images flat in `base_path`; deleted files move to `base_path/trash/`.
pub struct LocalImageStorage {
    base_path: PathBuf,
    public_prefix: String,
    max_bytes: usize,
}

impl LocalImageStorage {
    pub fn new(base_path: PathBuf, public_prefix: &str, max_bytes: usize) -> Self {
        Self {
            base_path,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }


    fn validate(&self, data: &[u8], extension: &str) -> Vec<String> {
        let mut reasons = Vec::new();
        if data.is_empty() {
            reasons.push("file is empty".to_string());
        }
        if data.len() > self.max_bytes {
            reasons.push(format!(
                "file is {} bytes, the limit is {} bytes",
                data.len(),
                self.max_bytes
            ));
        }
        if !ALLOWED_EXTENSIONS.contains(&extension) {
            reasons.push(format!(
                "extension '{}' is not allowed (allowed: {})",
                extension,
                ALLOWED_EXTENSIONS.join(", ")
            ));
        } else if !data.is_empty() && !has_image_signature(data, extension) {
            reasons.push("file content is not a valid image".to_string());
        }
        reasons
    }

    /// Creates the file exclusively, adding a numeric suffix while the name is taken.
    async fn write_new(&self, stem: &str, extension: &str, data: &[u8]) -> StorageResult<String> {
        let mut attempt = 0u32;
        loop {
            let file_name = if attempt == 0 {
                format!("{}.{}", stem, extension)
            } else {
                format!("{}_{}.{}", stem, attempt, extension)
            };
            let path = self.base_path.join(&file_name);

            match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => {
                    fill_or_remove(file, &path, data).await?;
                    return Ok(file_name);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
    }
}

#[async_trait]
impl ImageStorage for LocalImageStorage {
    async fn upload(
        &self,
        data: Bytes,
        original_name: &str,
        desired_name: &str,
    ) -> StorageResult<String> {
        let extension = extension_of(original_name);
        let reasons = self.validate(&data, &extension);
        if !reasons.is_empty() {
            return Err(StorageError::Rejected(reasons));
        }

        fs::create_dir_all(&self.base_path).await?;
        let stem = sanitize_stem(desired_name);
        self.write_new(&stem, &extension, &data).await
    }

    async fn delete(&self, stored_name: &str) -> StorageResult<()> {
        // Stored names are flat; anything else is not ours.
        if stored_name.contains('/') || stored_name.contains('\\') || stored_name.starts_with('.') {
            return Err(StorageError::NotFound(stored_name.to_string()));
        }

        let source = self.base_path.join(stored_name);
        let trash = self.base_path.join(TRASH_DIR);
        fs::create_dir_all(&trash).await?;
        let target = trash.join(format!("{}_{}", Uuid::new_v4().simple(), stored_name));

        match fs::rename(&source, &target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(stored_name.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn public_path(&self, stored_name: &str) -> String {
        format!("{}/{}", self.public_prefix, stored_name)
    }
}

/// Writes `data` to a freshly created file; a partial file is removed on failure.
async fn fill_or_remove<W>(mut file: W, path: &Path, data: &[u8]) -> StorageResult<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(data).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    drop(file);
    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(path).await {
            log::warn!("Could not remove partial upload {}: {}", path.display(), cleanup);
        }
        return Err(StorageError::Io(e));
    }
    Ok(())
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn sanitize_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        Uuid::new_v4().simple().to_string()
    } else {
        cleaned
    }
}

fn has_image_signature(data: &[u8], extension: &str) -> bool {
    match extension {
        "jpg" | "jpeg" => data.starts_with(&[0xFF, 0xD8, 0xFF]),
        "png" => data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        "gif" => data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a"),
        "webp" => data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP",
        _ => false,
    }
}

use bytes::Bytes;

/// An image file received with a form, not yet stored.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Bytes,
    pub caption: Option<String>,
}

impl ImageUpload {
    /// Browsers submit an empty part for an untouched file input.
    pub fn was_received(&self) -> bool {
        !self.file_name.is_empty() && !self.data.is_empty()
    }
}

pub mod articles;
pub mod events;
pub mod reference;

use std::collections::HashMap;
use std::sync::Arc;

use axum_extra::extract::Multipart;
use bytes::Bytes;

use crate::{
    config::Config,
    database::Database,
    error::{AppError, AppResult, FieldErrors},
    models::ImageUpload,
    storage::ImageStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub images: Arc<dyn ImageStorage>,
    pub config: Arc<Config>,
}

/// A multipart form split into its text fields and its file parts.
///
/// Repeated text fields keep every value in order (`captions[]`); a file part with an
/// empty name or body is kept too so that captions stay aligned with their files.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<(String, Bytes)>>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<MultipartForm> {
        let mut form = MultipartForm::default();

        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let name = match field.name() {
                Some(name) => name.trim_end_matches("[]").to_string(),
                None => continue,
            };

            if let Some(file_name) = field.file_name().map(|s| s.to_string()) {
                let data = field.bytes().await.map_err(bad_multipart)?;
                form.files.entry(name).or_default().push((file_name, data));
            } else {
                let value = field.text().await.map_err(bad_multipart)?;
                form.fields.entry(name).or_default().push(value);
            }
        }
        Ok(form)
    }

    /// Last value sent for a text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.last()).map(String::as_str)
    }

    pub fn texts(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// File parts of `name`, each paired with the caption at the same position.
    pub fn images(&self, name: &str, captions: &str) -> Vec<ImageUpload> {
        let captions = self.texts(captions);
        self.files
            .get(name)
            .map(|files| {
                files
                    .iter()
                    .enumerate()
                    .map(|(i, (file_name, data))| ImageUpload {
                        file_name: file_name.clone(),
                        data: data.clone(),
                        caption: crate::utils::forms::non_empty(
                            captions.get(i).map(String::as_str),
                        ),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.fields.entry(name.to_string()).or_default().push(value.to_string());
        self
    }

    #[cfg(test)]
    pub fn with_file(mut self, name: &str, file_name: &str, data: Bytes) -> Self {
        self.files
            .entry(name.to_string())
            .or_default()
            .push((file_name.to_string(), data));
        self
    }
}

fn bad_multipart(e: impl std::fmt::Display) -> AppError {
    AppError::invalid("form", &format!("Malformed multipart body: {}", e))
}

/// Collects per-field parse errors while building a typed value from a form.
#[derive(Debug, Default)]
pub struct FieldCollector {
    errors: FieldErrors,
}

impl FieldCollector {
    pub fn take<T>(&mut self, field: &str, parsed: Result<Option<T>, String>) -> Option<T> {
        match parsed {
            Ok(value) => value,
            Err(message) => {
                self.errors.insert(field.to_string(), message);
                None
            }
        }
    }

    pub fn require<T>(&mut self, field: &str, value: Option<T>, message: &str) -> Option<T> {
        if value.is_none() && !self.errors.contains_key(field) {
            self.errors.insert(field.to_string(), message.to_string());
        }
        value
    }

    pub fn finish(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captions_follow_file_positions() {
        let form = MultipartForm::default()
            .with_file("event_images", "a.png", Bytes::from_static(b"a"))
            .with_file("event_images", "", Bytes::new())
            .with_file("event_images", "c.png", Bytes::from_static(b"c"))
            .with_text("event_image_captions", "devant")
            .with_text("event_image_captions", "")
            .with_text("event_image_captions", "dos");

        let images = form.images("event_images", "event_image_captions");
        assert_eq!(images.len(), 3);
        assert_eq!(images[0].caption.as_deref(), Some("devant"));
        assert!(!images[1].was_received());
        assert_eq!(images[2].caption.as_deref(), Some("dos"));
        assert!(form.images("missing", "event_image_captions").is_empty());
    }

    #[test]
    fn collector_keeps_first_error_per_field() {
        let mut fields = FieldCollector::default();
        let id = fields.take("status_id", Err::<Option<i64>, _>("'x' is not a valid identifier".into()));
        fields.require("status_id", id, "A status is required");
        let errors = fields.finish().unwrap_err();
        assert_eq!(errors["status_id"], "'x' is not a valid identifier");
    }
}

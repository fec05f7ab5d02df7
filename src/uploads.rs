//! On-disk storage for message attachments.
//!
//! Files are written under generated names and served back read-only from
//! `/uploads/<name>`. Nothing references them until a message carrying the
//! returned [`Attachment`] is appended, and unreferenced files are kept.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::errors::AppError;
use crate::models::Attachment;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// URL prefix the upload directory is served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

const MAX_EXTENSION_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
}

impl UploadStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, AppError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            AppError::Internal(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Upload store initialized");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Validate and persist one uploaded file.
    pub async fn store(
        &self,
        original_name: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<Attachment, AppError> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if !is_accepted_type(&mime_type) {
            return Err(AppError::Validation(
                "Only images and PDF files are allowed".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(AppError::Validation("No file uploaded".to_string()));
        }
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation(format!(
                "File exceeds the {} MiB limit",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }

        let file_name = format!(
            "file-{}{}",
            uuid::Uuid::new_v4().simple(),
            safe_extension(original_name)
        );
        let path = self.base_path.join(&file_name);
        fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

        info!(file = %file_name, size = data.len(), mime = %mime_type, "Stored upload");

        let url = format!("{}/{}", UPLOADS_ROUTE, file_name);
        let preview_url = mime_type.starts_with("image/").then(|| url.clone());
        Ok(Attachment {
            name: display_name(original_name),
            mime_type,
            size_bytes: data.len() as u64,
            url,
            preview_url,
        })
    }
}

fn is_accepted_type(mime_type: &str) -> bool {
    mime_type.starts_with("image/") || mime_type == "application/pdf"
}

/// Keep a short alphanumeric extension from the client's name, if any.
fn safe_extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn display_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

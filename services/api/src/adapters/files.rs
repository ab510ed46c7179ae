//! services/api/src/adapters/files.rs
//!
//! Disk storage for uploaded documents. Files are written under the configured
//! upload directory with a UUID prefix so that user-supplied names never collide
//! or escape the directory.

use crm_core::ports::{PortError, PortResult};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Extensions accepted for upload, with the content type served on download.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("csv", "text/csv"),
    ("txt", "text/plain"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
];

/// Returns the content type for an allowed file name, or `None` if the
/// extension is not accepted.
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, content_type)| *content_type)
}

/// Keeps only the final path component and replaces anything outside
/// `[A-Za-z0-9._-]` with an underscore.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, stored_name: &str) -> PortResult<PathBuf> {
        if stored_name != sanitize_file_name(stored_name) {
            return Err(PortError::NotFound(format!("Invalid stored file name {}", stored_name)));
        }
        Ok(self.root.join(stored_name))
    }

    /// Writes the bytes and returns the generated stored name.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> PortResult<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to create upload directory: {}", e)))?;
        let stored_name = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(original_name));
        tokio::fs::write(self.root.join(&stored_name), bytes)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to write upload: {}", e)))?;
        Ok(stored_name)
    }

    pub async fn read(&self, stored_name: &str) -> PortResult<Vec<u8>> {
        let path = self.path_for(stored_name)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PortError::NotFound(format!("File {} not found", stored_name)),
            _ => PortError::Unexpected(e.to_string()),
        })
    }

    /// Removes a stored file; a file that is already gone is not an error.
    pub async fn remove(&self, stored_name: &str) -> PortResult<()> {
        let path = self.path_for(stored_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }
}

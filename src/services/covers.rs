//! Cover image storage on the local filesystem

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{
    config::UploadsConfig,
    error::{AppError, AppResult},
};

/// Public URL prefix under which the uploads directory is served
pub const UPLOADS_ROUTE: &str = "/uploads";

/// An uploaded file as received from a multipart form
#[derive(Debug, Clone)]
pub struct CoverUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct CoverStorage {
    directory: PathBuf,
    max_file_size: usize,
}

impl CoverStorage {
    pub fn new(config: &UploadsConfig) -> Self {
        Self {
            directory: PathBuf::from(&config.directory),
            max_file_size: config.max_file_size,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Write the image and return its public path
    pub async fn store(&self, upload: &CoverUpload) -> AppResult<String> {
        let content_type = upload.content_type.as_deref().unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(AppError::Validation("Please upload only images".to_string()));
        }
        if upload.bytes.is_empty() {
            return Err(AppError::Validation("Cover image is empty".to_string()));
        }
        if upload.bytes.len() > self.max_file_size {
            return Err(AppError::Validation(format!(
                "Image must be at most {} bytes",
                self.max_file_size
            )));
        }

        let extension = file_extension(upload.file_name.as_deref(), content_type);
        let file_name = format!("cover-{}.{}", Uuid::new_v4(), extension);

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create uploads directory: {}", e)))?;
        tokio::fs::write(self.directory.join(&file_name), &upload.bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write cover image: {}", e)))?;

        Ok(format!("{}/{}", UPLOADS_ROUTE, file_name))
    }

    /// Delete a previously stored cover. Failures are only logged.
    pub async fn remove(&self, public_path: &str) {
        let Some(file_name) = public_path
            .strip_prefix(UPLOADS_ROUTE)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return;
        };
        if file_name.contains('/') || file_name.contains("..") {
            return;
        }

        if let Err(e) = tokio::fs::remove_file(self.directory.join(file_name)).await {
            tracing::warn!("Failed to remove old cover {}: {}", public_path, e);
        }
    }
}

/// Extension from the original name, falling back to the image subtype
fn file_extension(file_name: Option<&str>, content_type: &str) -> String {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    from_name.unwrap_or_else(|| {
        let subtype = content_type
            .trim_start_matches("image/")
            .split(['+', ';'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match subtype.as_str() {
            "jpeg" => "jpg".to_string(),
            s if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()) => s.to_string(),
            _ => "img".to_string(),
        }
    })
}

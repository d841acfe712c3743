//! Attachment descriptors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where an attachment's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttachmentSource {
    /// A file on disk, read at upload time.
    File { path: PathBuf },

    /// Bytes captured in memory.
    Content { data: Vec<u8> },
}

/// An attachment referenced by a test result or step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub source: AttachmentSource,
    /// Size in bytes, when known before upload.
    pub size: Option<u64>,
}

impl Attachment {
    /// Creates an attachment backed by a file on disk.
    ///
    /// The file name and MIME type are derived from the path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = mime_for_path(&path).to_string();
        let size = std::fs::metadata(&path).ok().map(|m| m.len());
        Self {
            file_name,
            mime_type,
            source: AttachmentSource::File { path },
            size,
        }
    }

    /// Creates an attachment from in-memory content.
    pub fn from_content(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        let data = data.into();
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size: Some(data.len() as u64),
            source: AttachmentSource::Content { data },
        }
    }

    /// Loads the attachment bytes.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            AttachmentSource::File { path } => tokio::fs::read(path).await,
            AttachmentSource::Content { data } => Ok(data.clone()),
        }
    }
}

/// Guesses a MIME type from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "txt" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

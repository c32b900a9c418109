use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

/// What an uploaded file is used for; determines the accepted content types,
/// the storage subdirectory and the fallback extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    AudioPreview,
    AudioFile,
}

impl MediaKind {
    fn subdir(self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::AudioPreview => "previews",
            MediaKind::AudioFile => "tracks",
        }
    }

    fn accepts(self, content_type: &str) -> bool {
        match self {
            MediaKind::Image => content_type.starts_with("image/"),
            MediaKind::AudioPreview | MediaKind::AudioFile => content_type.starts_with("audio/"),
        }
    }

    fn default_extension(self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::AudioPreview | MediaKind::AudioFile => "mp3",
        }
    }
}

/// A stored upload, addressed by its public URL path
#[derive(Debug, Serialize)]
pub struct StoredFile {
    pub url: String,
    pub original_name: Option<String>,
}

/// Media upload service for the admin console. Files land under the
/// configured upload directory and are served statically at `/uploads`.
#[derive(Clone)]
pub struct UploadService {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadService {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    /// Validate and persist one uploaded file.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn store(
        &self,
        kind: MediaKind,
        file_name: Option<&str>,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<StoredFile, ServiceError> {
        if data.is_empty() {
            return Err(ServiceError::ValidationError(
                "uploaded file is empty".to_string(),
            ));
        }
        if data.len() > self.max_bytes {
            return Err(ServiceError::ValidationError(format!(
                "file exceeds the {} byte upload limit",
                self.max_bytes
            )));
        }

        match content_type {
            Some(ct) if kind.accepts(ct) => {}
            Some(ct) => {
                return Err(ServiceError::ValidationError(format!(
                    "unsupported content type {} for this upload",
                    ct
                )));
            }
            None => {
                return Err(ServiceError::ValidationError(
                    "uploaded file has no content type".to_string(),
                ));
            }
        }

        let extension = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| kind.default_extension())
            .to_ascii_lowercase();

        let stored_name = format!("{}.{}", Uuid::new_v4(), extension);
        let dir = self.root.join(kind.subdir());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ServiceError::InternalError(format!("creating upload dir: {}", e)))?;

        let path = dir.join(&stored_name);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| ServiceError::InternalError(format!("writing upload: {}", e)))?;

        let url = format!("/uploads/{}/{}", kind.subdir(), stored_name);
        info!(%url, "Stored uploaded file");

        Ok(StoredFile {
            url,
            original_name: file_name.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_wrong_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let service = UploadService::new(dir.path(), 1024);

        let err = service
            .store(
                MediaKind::Image,
                Some("song.mp3"),
                Some("audio/mpeg"),
                Bytes::from_static(b"riff"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let service = UploadService::new(dir.path(), 4);

        let err = service
            .store(
                MediaKind::Image,
                Some("cover.png"),
                Some("image/png"),
                Bytes::from_static(b"too large"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn stores_file_and_returns_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let service = UploadService::new(dir.path(), 1024);

        let stored = service
            .store(
                MediaKind::AudioFile,
                Some("track.mp3"),
                Some("audio/mpeg"),
                Bytes::from_static(b"ID3..."),
            )
            .await
            .unwrap();

        assert!(stored.url.starts_with("/uploads/tracks/"));
        assert!(stored.url.ends_with(".mp3"));

        let on_disk = dir
            .path()
            .join("tracks")
            .join(stored.url.rsplit('/').next().unwrap());
        assert!(on_disk.exists());
    }
}

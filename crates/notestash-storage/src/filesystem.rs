use crate::backend_data::FilesystemData;
use crate::keys::{file_name, is_safe_segment};
use crate::traits::{MediaBackend, MediaError, MediaOperation, MediaResult, TypeHint};
use crate::{BackendData, MediaBackendType};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// URL prefix under which the web server serves the upload directory
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Local filesystem media backend
///
/// Files live at `{upload_path}/{uuid}.{ext}`. The directory is created on the
/// first save, not at startup. Saving the same uuid and extension twice
/// overwrites the earlier file.
#[derive(Clone, Debug)]
pub struct FilesystemBackend {
    upload_path: PathBuf,
}

impl FilesystemBackend {
    /// Create a new FilesystemBackend instance
    ///
    /// # Arguments
    /// * `upload_path` - Directory holding the uploads (e.g., "/var/lib/notestash/uploads")
    pub fn new(upload_path: impl Into<PathBuf>) -> Self {
        FilesystemBackend {
            upload_path: upload_path.into(),
        }
    }

    /// Resolve the stored extension into a path, rejecting malformed data
    fn stored_file_name(uuid: &str, data: &FilesystemData) -> MediaResult<String> {
        if !is_safe_segment(&data.ext) {
            return Err(MediaError::data(
                uuid,
                format!("extension {:?} is not a valid file extension", data.ext),
            ));
        }
        file_name(uuid, &data.ext)
    }

    async fn ensure_directory(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.upload_path).await
    }
}

#[async_trait]
impl MediaBackend for FilesystemBackend {
    async fn save_file(
        &self,
        uuid: &str,
        content: Bytes,
        type_hint: &TypeHint,
    ) -> MediaResult<BackendData> {
        let name = file_name(uuid, &type_hint.ext)?;
        let path = self.upload_path.join(&name);
        let size = content.len();
        let start = std::time::Instant::now();

        let write = async {
            self.ensure_directory().await?;
            let mut file = fs::File::create(&path).await?;
            file.write_all(&content).await?;
            file.sync_all().await
        };

        write.await.map_err(|e| {
            tracing::error!(
                error = %e,
                uuid = %uuid,
                path = %path.display(),
                size_bytes = size,
                "Filesystem save failed"
            );
            MediaError::backend(
                MediaOperation::Save,
                uuid,
                format!("could not write {}: {}", path.display(), e),
            )
        })?;

        tracing::info!(
            uuid = %uuid,
            path = %path.display(),
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Filesystem save successful"
        );

        Ok(BackendData::Filesystem(FilesystemData {
            ext: type_hint.ext.clone(),
        }))
    }

    async fn delete_file(&self, uuid: &str, backend_data: &BackendData) -> MediaResult<()> {
        let data = backend_data.as_filesystem(uuid)?;
        let path = self.upload_path.join(Self::stored_file_name(uuid, data)?);

        fs::remove_file(&path).await.map_err(|e| {
            tracing::error!(
                error = %e,
                uuid = %uuid,
                path = %path.display(),
                "Filesystem delete failed"
            );
            MediaError::backend(
                MediaOperation::Delete,
                uuid,
                format!("could not delete {}: {}", path.display(), e),
            )
        })?;

        tracing::info!(uuid = %uuid, path = %path.display(), "Filesystem delete successful");
        Ok(())
    }

    async fn get_file_url(&self, uuid: &str, backend_data: &BackendData) -> MediaResult<String> {
        let data = backend_data.as_filesystem(uuid)?;
        let name = Self::stored_file_name(uuid, data)?;
        Ok(format!("{}/{}", UPLOADS_URL_PREFIX, name))
    }

    fn backend_type(&self) -> MediaBackendType {
        MediaBackendType::Filesystem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn png() -> TypeHint {
        TypeHint::new("image/png", "png")
    }

    #[tokio::test]
    async fn test_save_url_delete() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("media"));

        let data = backend
            .save_file("abc-123", Bytes::from_static(b"png bytes"), &png())
            .await
            .unwrap();
        assert_eq!(
            data,
            BackendData::Filesystem(FilesystemData {
                ext: "png".to_string()
            })
        );

        let path = dir.path().join("media").join("abc-123.png");
        assert_eq!(std::fs::read(&path).unwrap(), b"png bytes");

        let url = backend.get_file_url("abc-123", &data).await.unwrap();
        assert_eq!(url, "/uploads/abc-123.png");

        backend.delete_file("abc-123", &data).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_directory_is_created_lazily() {
        let dir = tempdir().unwrap();
        let upload_path = dir.path().join("nested").join("uploads");
        let backend = FilesystemBackend::new(&upload_path);

        assert!(!upload_path.exists());
        backend
            .save_file("lazy", Bytes::from_static(b"x"), &png())
            .await
            .unwrap();
        assert!(upload_path.join("lazy.png").exists());
    }

    #[tokio::test]
    async fn test_second_save_overwrites() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        backend
            .save_file("same", Bytes::from_static(b"first"), &png())
            .await
            .unwrap();
        backend
            .save_file("same", Bytes::from_static(b"second"), &png())
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("same.png")).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_wrong_backend_data_is_data_error() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        let result = backend.get_file_url("abc", &BackendData::S3).await;
        assert!(matches!(result, Err(MediaError::DataError { .. })));

        let result = backend.delete_file("abc", &BackendData::Azure).await;
        assert!(matches!(result, Err(MediaError::DataError { .. })));
    }

    #[tokio::test]
    async fn test_malformed_extension_is_data_error() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let data = BackendData::Filesystem(FilesystemData {
            ext: "../../etc/passwd".to_string(),
        });

        let result = backend.delete_file("abc", &data).await;
        assert!(matches!(result, Err(MediaError::DataError { .. })));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected_on_save() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        let result = backend
            .save_file("../escape", Bytes::from_static(b"x"), &png())
            .await;
        assert!(matches!(result, Err(MediaError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_backend_error() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let data = BackendData::Filesystem(FilesystemData {
            ext: "png".to_string(),
        });

        let result = backend.delete_file("missing", &data).await;
        assert!(matches!(
            result,
            Err(MediaError::BackendError {
                operation: MediaOperation::Delete,
                ..
            })
        ));
    }
}

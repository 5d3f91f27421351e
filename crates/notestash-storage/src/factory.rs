#[cfg(feature = "storage-azure")]
use crate::AzureBackend;
#[cfg(feature = "storage-filesystem")]
use crate::FilesystemBackend;
#[cfg(feature = "storage-imgur")]
use crate::ImgurBackend;
#[cfg(feature = "storage-s3")]
use crate::S3Backend;
#[cfg(feature = "storage-webdav")]
use crate::WebdavBackend;
#[allow(unused_imports)]
use crate::{MediaBackend, MediaError, MediaResult};
use notestash_core::MediaBackendConfig;
use std::sync::Arc;

/// Create the media backend selected by the configuration.
///
/// Only the selected variant is constructed. For WebDAV a connectivity check
/// is started in the background; its outcome is only logged and never delays
/// or fails startup.
pub async fn create_media_backend(
    config: &MediaBackendConfig,
) -> MediaResult<Arc<dyn MediaBackend>> {
    let backend: Arc<dyn MediaBackend> = match config {
        #[cfg(feature = "storage-filesystem")]
        MediaBackendConfig::Filesystem(fs) => {
            Arc::new(FilesystemBackend::new(fs.upload_path.clone()))
        }

        #[cfg(not(feature = "storage-filesystem"))]
        MediaBackendConfig::Filesystem(_) => {
            return Err(MediaError::ConfigError(
                "Filesystem media backend not available (storage-filesystem feature not enabled)"
                    .to_string(),
            ))
        }

        #[cfg(feature = "storage-s3")]
        MediaBackendConfig::S3(s3) => Arc::new(S3Backend::new(s3)?),

        #[cfg(not(feature = "storage-s3"))]
        MediaBackendConfig::S3(_) => {
            return Err(MediaError::ConfigError(
                "S3 media backend not available (storage-s3 feature not enabled)".to_string(),
            ))
        }

        #[cfg(feature = "storage-azure")]
        MediaBackendConfig::Azure(azure) => Arc::new(AzureBackend::new(azure)?),

        #[cfg(not(feature = "storage-azure"))]
        MediaBackendConfig::Azure(_) => {
            return Err(MediaError::ConfigError(
                "Azure media backend not available (storage-azure feature not enabled)"
                    .to_string(),
            ))
        }

        #[cfg(feature = "storage-webdav")]
        MediaBackendConfig::Webdav(webdav) => {
            let backend: Arc<dyn MediaBackend> = Arc::new(WebdavBackend::new(webdav)?);
            spawn_connection_check(Arc::clone(&backend));
            backend
        }

        #[cfg(not(feature = "storage-webdav"))]
        MediaBackendConfig::Webdav(_) => {
            return Err(MediaError::ConfigError(
                "WebDAV media backend not available (storage-webdav feature not enabled)"
                    .to_string(),
            ))
        }

        #[cfg(feature = "storage-imgur")]
        MediaBackendConfig::Imgur(imgur) => Arc::new(ImgurBackend::new(imgur)?),

        #[cfg(not(feature = "storage-imgur"))]
        MediaBackendConfig::Imgur(_) => {
            return Err(MediaError::ConfigError(
                "Imgur media backend not available (storage-imgur feature not enabled)"
                    .to_string(),
            ))
        }
    };

    tracing::info!(backend = %backend.backend_type(), "Media backend initialized");
    Ok(backend)
}

#[cfg(feature = "storage-webdav")]
fn spawn_connection_check(backend: Arc<dyn MediaBackend>) {
    tokio::spawn(async move {
        match backend.health_check().await {
            Ok(()) => tracing::info!(backend = %backend.backend_type(), "Media backend reachable"),
            Err(e) => tracing::error!(
                error = %e,
                backend = %backend.backend_type(),
                "Media backend connection check failed"
            ),
        }
    });
}

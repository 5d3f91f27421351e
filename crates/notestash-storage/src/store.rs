//! Storage boundary for persisted backend data
//!
//! The media service persists `(uuid, backend data)` pairs as plain strings.
//! `MediaStore` wraps the single active backend and converts backend data to
//! and from that persisted JSON form, so nothing outside this module handles
//! the untyped representation.

use crate::{
    create_media_backend, BackendData, MediaBackend, MediaBackendType, MediaError, MediaResult,
    TypeHint,
};
use bytes::Bytes;
use notestash_core::MediaBackendConfig;
use std::sync::Arc;

/// The active media backend plus the persisted-data boundary
#[derive(Clone)]
pub struct MediaStore {
    backend: Arc<dyn MediaBackend>,
}

impl MediaStore {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        MediaStore { backend }
    }

    /// Build the backend selected by `config` and wrap it.
    pub async fn from_config(config: &MediaBackendConfig) -> MediaResult<Self> {
        Ok(MediaStore::new(create_media_backend(config).await?))
    }

    pub fn backend_type(&self) -> MediaBackendType {
        self.backend.backend_type()
    }

    /// Store `content` and return the backend data to persist next to `uuid`.
    ///
    /// `None` means the backend needs nothing besides the uuid.
    pub async fn save_file(
        &self,
        uuid: &str,
        content: impl Into<Bytes>,
        type_hint: &TypeHint,
    ) -> MediaResult<Option<String>> {
        let data = self
            .backend
            .save_file(uuid, content.into(), type_hint)
            .await?;
        data.to_json()
            .map_err(|e| MediaError::data(uuid, format!("could not encode backend data: {}", e)))
    }

    pub async fn delete_file(&self, uuid: &str, backend_data: Option<&str>) -> MediaResult<()> {
        let data = self.decode(uuid, backend_data)?;
        self.backend.delete_file(uuid, &data).await
    }

    pub async fn get_file_url(&self, uuid: &str, backend_data: Option<&str>) -> MediaResult<String> {
        let data = self.decode(uuid, backend_data)?;
        self.backend.get_file_url(uuid, &data).await
    }

    pub async fn health_check(&self) -> MediaResult<()> {
        self.backend.health_check().await
    }

    fn decode(&self, uuid: &str, backend_data: Option<&str>) -> MediaResult<BackendData> {
        BackendData::from_json(self.backend_type(), uuid, backend_data).map_err(|e| {
            tracing::warn!(
                error = %e,
                uuid = %uuid,
                backend = %self.backend_type(),
                "Rejected persisted backend data"
            );
            e
        })
    }
}

impl std::fmt::Debug for MediaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStore")
            .field("backend", &self.backend_type())
            .finish()
    }
}

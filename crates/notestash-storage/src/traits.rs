//! Media backend abstraction trait
//!
//! This module defines the MediaBackend trait that all storage backends must
//! implement, together with the error taxonomy shared by every backend.

use crate::{BackendData, MediaBackendType};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;

/// Backend operation names, carried by `MediaError::BackendError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOperation {
    Save,
    Delete,
    GetUrl,
    HealthCheck,
}

impl Display for MediaOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaOperation::Save => write!(f, "save"),
            MediaOperation::Delete => write!(f, "delete"),
            MediaOperation::GetUrl => write!(f, "get url"),
            MediaOperation::HealthCheck => write!(f, "health check"),
        }
    }
}

/// Media storage errors
#[derive(Debug, Error)]
pub enum MediaError {
    /// Backend could not be constructed from its configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The underlying storage or network call failed or was refused.
    #[error("Could not {operation} media {uuid}: {message}")]
    BackendError {
        operation: MediaOperation,
        uuid: String,
        message: String,
    },

    /// Backend data is missing or malformed where the backend requires it.
    #[error("Invalid backend data for media {uuid}: {message}")]
    DataError { uuid: String, message: String },

    /// The resource can never be deleted through this backend.
    #[error("Media {uuid} cannot be deleted: {message}")]
    UnrecoverableDelete { uuid: String, message: String },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

impl MediaError {
    pub fn backend(operation: MediaOperation, uuid: &str, message: impl Display) -> Self {
        MediaError::BackendError {
            operation,
            uuid: uuid.to_string(),
            message: message.to_string(),
        }
    }

    pub fn data(uuid: &str, message: impl Display) -> Self {
        MediaError::DataError {
            uuid: uuid.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the same call could succeed later.
    ///
    /// Only storage failures may be transient; this layer never retries itself.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MediaError::BackendError { .. })
    }
}

/// Result type for media operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Detected MIME type and file extension of uploaded content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeHint {
    pub mime: String,
    pub ext: String,
}

impl TypeHint {
    pub fn new(mime: impl Into<String>, ext: impl Into<String>) -> Self {
        TypeHint {
            mime: mime.into(),
            ext: ext.into(),
        }
    }
}

/// Media backend trait
///
/// Every backend (filesystem, S3, Azure, WebDAV, Imgur) implements this trait,
/// so the media service can store and address uploads without knowing which
/// storage system holds them.
///
/// `save_file` returns the `BackendData` the caller must keep next to the uuid;
/// passing it back to `delete_file`/`get_file_url` is all later operations need.
///
/// URLs from S3 and Azure are signed and time-limited: every call may return a
/// different string, so callers must not cache or compare them. Filesystem,
/// WebDAV and Imgur URLs are static for the same inputs.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Store `content` under an address derived from `uuid` (Imgur assigns its own).
    async fn save_file(
        &self,
        uuid: &str,
        content: Bytes,
        type_hint: &TypeHint,
    ) -> MediaResult<BackendData>;

    /// Remove the stored resource.
    async fn delete_file(&self, uuid: &str, backend_data: &BackendData) -> MediaResult<()>;

    /// Produce a URL from which the content can currently be fetched.
    async fn get_file_url(&self, uuid: &str, backend_data: &BackendData) -> MediaResult<String>;

    /// Check that the backend is reachable and authorized.
    ///
    /// Backends without a cheap probe report healthy without I/O.
    async fn health_check(&self) -> MediaResult<()> {
        Ok(())
    }

    /// Get the backend type
    fn backend_type(&self) -> MediaBackendType;
}

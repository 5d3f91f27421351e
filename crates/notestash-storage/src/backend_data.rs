//! Backend data
//!
//! Each backend returns its own addressing metadata from `save_file`. In
//! process it is a tagged union with one variant per backend; it is only
//! turned into its persisted JSON form (and back) at the storage boundary.
//!
//! Persisted shapes:
//!
//! - filesystem: `{"ext":"png"}`
//! - s3, azure: nothing
//! - webdav: `{"file":"<uuid>.png"}`
//! - imgur: `{"url":"https://i.imgur.com/…","deleteHash":"…"}` (`deleteHash` may be `null`)

use crate::{MediaBackendType, MediaError, MediaResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemData {
    pub ext: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebdavData {
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImgurData {
    pub url: String,
    pub delete_hash: Option<String>,
}

/// Backend-specific metadata returned by `save_file`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendData {
    Filesystem(FilesystemData),
    S3,
    Azure,
    Webdav(WebdavData),
    Imgur(ImgurData),
}

impl BackendData {
    /// The backend that produced this data
    pub fn backend_type(&self) -> MediaBackendType {
        match self {
            BackendData::Filesystem(_) => MediaBackendType::Filesystem,
            BackendData::S3 => MediaBackendType::S3,
            BackendData::Azure => MediaBackendType::Azure,
            BackendData::Webdav(_) => MediaBackendType::Webdav,
            BackendData::Imgur(_) => MediaBackendType::Imgur,
        }
    }

    /// Encode for persistence. Backends addressed by uuid alone persist nothing.
    pub fn to_json(&self) -> Result<Option<String>, serde_json::Error> {
        match self {
            BackendData::Filesystem(data) => serde_json::to_string(data).map(Some),
            BackendData::Webdav(data) => serde_json::to_string(data).map(Some),
            BackendData::Imgur(data) => serde_json::to_string(data).map(Some),
            BackendData::S3 | BackendData::Azure => Ok(None),
        }
    }

    /// Decode persisted data for the given backend.
    ///
    /// The JSON is untagged, so the active backend decides the expected shape.
    /// Missing or malformed data for a backend that requires it is a data error.
    pub fn from_json(
        backend: MediaBackendType,
        uuid: &str,
        raw: Option<&str>,
    ) -> MediaResult<Self> {
        match backend {
            MediaBackendType::S3 => Ok(BackendData::S3),
            MediaBackendType::Azure => Ok(BackendData::Azure),
            MediaBackendType::Filesystem => {
                decode(backend, uuid, raw).map(BackendData::Filesystem)
            }
            MediaBackendType::Webdav => decode(backend, uuid, raw).map(BackendData::Webdav),
            MediaBackendType::Imgur => decode(backend, uuid, raw).map(BackendData::Imgur),
        }
    }

    pub fn as_filesystem(&self, uuid: &str) -> MediaResult<&FilesystemData> {
        match self {
            BackendData::Filesystem(data) => Ok(data),
            other => Err(mismatch(MediaBackendType::Filesystem, other, uuid)),
        }
    }

    pub fn as_webdav(&self, uuid: &str) -> MediaResult<&WebdavData> {
        match self {
            BackendData::Webdav(data) => Ok(data),
            other => Err(mismatch(MediaBackendType::Webdav, other, uuid)),
        }
    }

    pub fn as_imgur(&self, uuid: &str) -> MediaResult<&ImgurData> {
        match self {
            BackendData::Imgur(data) => Ok(data),
            other => Err(mismatch(MediaBackendType::Imgur, other, uuid)),
        }
    }
}

fn decode<T: DeserializeOwned>(
    backend: MediaBackendType,
    uuid: &str,
    raw: Option<&str>,
) -> MediaResult<T> {
    let raw = raw.ok_or_else(|| {
        MediaError::data(uuid, format!("{} backend requires backend data", backend))
    })?;
    serde_json::from_str(raw).map_err(|e| {
        MediaError::data(
            uuid,
            format!("malformed {} backend data {:?}: {}", backend, raw, e),
        )
    })
}

fn mismatch(expected: MediaBackendType, actual: &BackendData, uuid: &str) -> MediaError {
    MediaError::data(
        uuid,
        format!(
            "expected {} backend data, got {} backend data",
            expected,
            actual.backend_type()
        ),
    )
}

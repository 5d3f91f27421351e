use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Media backend types
///
/// Discriminant of the single active media backend. It's defined in core
/// because both the configuration loader and the storage boundary need it
/// (backend data is decoded according to the active backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackendType {
    Filesystem,
    S3,
    Azure,
    Webdav,
    Imgur,
}

impl MediaBackendType {
    /// Whether this backend returns structured backend data from `save_file`
    /// that later operations require.
    pub fn requires_backend_data(&self) -> bool {
        matches!(
            self,
            MediaBackendType::Filesystem | MediaBackendType::Webdav | MediaBackendType::Imgur
        )
    }
}

impl FromStr for MediaBackendType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filesystem" => Ok(MediaBackendType::Filesystem),
            "s3" => Ok(MediaBackendType::S3),
            "azure" => Ok(MediaBackendType::Azure),
            "webdav" => Ok(MediaBackendType::Webdav),
            "imgur" => Ok(MediaBackendType::Imgur),
            _ => Err(anyhow::anyhow!("Invalid media backend: {}", s)),
        }
    }
}

impl Display for MediaBackendType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaBackendType::Filesystem => write!(f, "filesystem"),
            MediaBackendType::S3 => write!(f, "s3"),
            MediaBackendType::Azure => write!(f, "azure"),
            MediaBackendType::Webdav => write!(f, "webdav"),
            MediaBackendType::Imgur => write!(f, "imgur"),
        }
    }
}

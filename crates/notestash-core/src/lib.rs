//! Notestash Core Library
//!
//! This crate provides the media backend configuration shared by the storage
//! library and the command-line tool: the backend discriminant and the
//! per-backend configuration sum type.

pub mod config;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    AzureConfig, FilesystemConfig, ImgurConfig, MediaBackendConfig, S3Config, WebdavConfig,
};
pub use storage_types::MediaBackendType;

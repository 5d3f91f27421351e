//! Notestash Storage Library
//!
//! This crate provides the media backend abstraction for note attachments and
//! its five implementations: local filesystem, S3-compatible object stores,
//! Azure Blob Storage, WebDAV and Imgur.
//!
//! # Addressing
//!
//! Callers assign every upload a uuid. Filesystem and WebDAV store it as
//! `{uuid}.{ext}`, S3 and Azure key objects by the bare uuid, and Imgur picks
//! its own address. Whatever a backend needs later is returned from
//! `save_file` as `BackendData`; `MediaStore` converts it to and from the JSON
//! string the media service persists.

pub mod backend_data;
pub mod factory;
pub(crate) mod keys;
pub mod store;
pub mod traits;

#[cfg(feature = "storage-azure")]
pub mod azure;
#[cfg(feature = "storage-filesystem")]
pub mod filesystem;
#[cfg(feature = "storage-imgur")]
pub mod imgur;
#[cfg(feature = "storage-s3")]
pub mod s3;
#[cfg(feature = "storage-webdav")]
pub mod webdav;

// Re-export commonly used types
#[cfg(feature = "storage-azure")]
pub use azure::AzureBackend;
pub use backend_data::{BackendData, FilesystemData, ImgurData, WebdavData};
pub use factory::create_media_backend;
#[cfg(feature = "storage-filesystem")]
pub use filesystem::FilesystemBackend;
#[cfg(feature = "storage-imgur")]
pub use imgur::ImgurBackend;
pub use notestash_core::MediaBackendType;
#[cfg(feature = "storage-s3")]
pub use s3::S3Backend;
pub use store::MediaStore;
pub use traits::{MediaBackend, MediaError, MediaOperation, MediaResult, TypeHint};
#[cfg(feature = "storage-webdav")]
pub use webdav::WebdavBackend;

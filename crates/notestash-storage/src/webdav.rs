use crate::backend_data::WebdavData;
use crate::keys::{file_name, is_safe_segment, join_url};
use crate::traits::{MediaBackend, MediaError, MediaOperation, MediaResult, TypeHint};
use crate::{BackendData, MediaBackendType};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use notestash_core::WebdavConfig;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::{Client, Method, RequestBuilder, Response, Url};

/// WebDAV media backend
///
/// Files are written to `{connection_string}/{upload_dir}/{uuid}.{ext}` and
/// served from `{public_url}/{uuid}.{ext}`. Uploads use `If-None-Match: *`,
/// so saving over an existing file is rejected by the server.
#[derive(Clone)]
pub struct WebdavBackend {
    client: Client,
    base_url: String,
    public_url: String,
    auth_header: Option<String>,
}

impl std::fmt::Debug for WebdavBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebdavBackend")
            .field("base_url", &self.base_url)
            .field("public_url", &self.public_url)
            .finish()
    }
}

impl WebdavBackend {
    /// Create a new WebdavBackend instance
    ///
    /// Credentials embedded in the connection string are moved into a Basic
    /// `Authorization` header that is reused for every request. No request is
    /// made here; see `health_check`.
    pub fn new(config: &WebdavConfig) -> MediaResult<Self> {
        let mut url = Url::parse(&config.connection_string).map_err(|e| {
            MediaError::ConfigError(format!("Invalid WebDAV connection string: {}", e))
        })?;
        Url::parse(&config.public_url).map_err(|e| {
            MediaError::ConfigError(format!(
                "Invalid WebDAV public URL {:?}: {}",
                config.public_url, e
            ))
        })?;

        let auth_header = basic_auth_header(&url)?;
        url.set_username("")
            .and_then(|_| url.set_password(None))
            .map_err(|_| {
                MediaError::ConfigError(
                    "WebDAV connection string cannot carry credentials".to_string(),
                )
            })?;

        let base_url = match config.upload_dir.as_deref() {
            Some(dir) => join_url(url.as_str(), &[dir]),
            None => join_url(url.as_str(), &[]),
        };

        let client = Client::builder()
            .build()
            .map_err(|e| MediaError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(WebdavBackend {
            client,
            base_url,
            public_url: config.public_url.clone(),
            auth_header,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_header {
            Some(header) => request.header(AUTHORIZATION, header.as_str()),
            None => request,
        }
    }

    fn stored_file<'a>(uuid: &str, data: &'a WebdavData) -> MediaResult<&'a str> {
        if !is_safe_segment(&data.file) {
            return Err(MediaError::data(
                uuid,
                format!("file name {:?} is not a valid remote file name", data.file),
            ));
        }
        Ok(&data.file)
    }
}

/// `Basic base64(user:password)` from the URL's userinfo, if any.
fn basic_auth_header(url: &Url) -> MediaResult<Option<String>> {
    if url.username().is_empty() && url.password().is_none() {
        return Ok(None);
    }
    let decode = |value: &str| {
        urlencoding::decode(value)
            .map(|v| v.into_owned())
            .map_err(|e| MediaError::ConfigError(format!("Invalid WebDAV credentials: {}", e)))
    };
    let username = decode(url.username())?;
    let password = decode(url.password().unwrap_or_default())?;
    let token = general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    Ok(Some(format!("Basic {}", token)))
}

/// Map a transport error or a non-2xx response to a backend error.
fn ensure_success(
    operation: MediaOperation,
    uuid: &str,
    url: &str,
    result: reqwest::Result<Response>,
) -> MediaResult<Response> {
    let response = result.map_err(|e| {
        tracing::error!(error = %e, uuid = %uuid, url = %url, "WebDAV {} request failed", operation);
        MediaError::backend(operation, uuid, e)
    })?;

    let status = response.status();
    if !status.is_success() {
        tracing::error!(
            status = %status,
            uuid = %uuid,
            url = %url,
            "WebDAV {} rejected",
            operation
        );
        return Err(MediaError::backend(
            operation,
            uuid,
            format!("WebDAV server responded {}", status),
        ));
    }

    Ok(response)
}

#[async_trait]
impl MediaBackend for WebdavBackend {
    async fn save_file(
        &self,
        uuid: &str,
        content: Bytes,
        type_hint: &TypeHint,
    ) -> MediaResult<BackendData> {
        let remote_file = file_name(uuid, &type_hint.ext)?;
        let url = join_url(&self.base_url, &[remote_file.as_str()]);
        let size = content.len();
        let start = std::time::Instant::now();

        let request = self
            .authorized(self.client.put(&url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(IF_NONE_MATCH, "*")
            .body(content);

        ensure_success(MediaOperation::Save, uuid, &url, request.send().await)?;

        tracing::info!(
            uuid = %uuid,
            url = %url,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "WebDAV upload successful"
        );

        Ok(BackendData::Webdav(WebdavData { file: remote_file }))
    }

    async fn delete_file(&self, uuid: &str, backend_data: &BackendData) -> MediaResult<()> {
        let data = backend_data.as_webdav(uuid)?;
        let url = join_url(&self.base_url, &[Self::stored_file(uuid, data)?]);

        let request = self.authorized(self.client.delete(&url));
        ensure_success(MediaOperation::Delete, uuid, &url, request.send().await)?;

        tracing::info!(uuid = %uuid, url = %url, "WebDAV delete successful");
        Ok(())
    }

    async fn get_file_url(&self, uuid: &str, backend_data: &BackendData) -> MediaResult<String> {
        let data = backend_data.as_webdav(uuid)?;
        Ok(join_url(&self.public_url, &[Self::stored_file(uuid, data)?]))
    }

    /// `PROPFIND` with depth 0 against the upload directory.
    async fn health_check(&self) -> MediaResult<()> {
        let propfind = Method::from_bytes(b"PROPFIND")
            .map_err(|e| MediaError::backend(MediaOperation::HealthCheck, "-", e))?;

        let request = self
            .authorized(self.client.request(propfind, &self.base_url))
            .header(ACCEPT, "text/plain")
            .header("Depth", "0");

        ensure_success(
            MediaOperation::HealthCheck,
            "-",
            &self.base_url,
            request.send().await,
        )?;

        tracing::debug!(url = %self.base_url, "WebDAV connection check successful");
        Ok(())
    }

    fn backend_type(&self) -> MediaBackendType {
        MediaBackendType::Webdav
    }
}

use crate::traits::{MediaBackend, MediaError, MediaOperation, MediaResult, TypeHint};
use crate::{BackendData, MediaBackendType};
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use notestash_core::S3Config;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult, RetryConfig,
};
use reqwest::Url;
use std::time::Duration;

/// Region used when none is configured; S3-compatible servers generally ignore it.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Validity of presigned GET URLs (seven days, the S3 client default).
pub const PRESIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Connection parameters extracted from the configured endpoint URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Endpoint {
    pub host: String,
    pub port: Option<u16>,
    pub use_ssl: bool,
}

impl S3Endpoint {
    /// Parse an absolute endpoint URL.
    ///
    /// The scheme decides TLS, host and port are kept, any path is dropped.
    /// A value without scheme or host is a configuration error.
    pub fn parse(endpoint: &str) -> MediaResult<Self> {
        let url = Url::parse(endpoint).map_err(|e| {
            MediaError::ConfigError(format!("Invalid S3 endpoint {:?}: {}", endpoint, e))
        })?;

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| {
                MediaError::ConfigError(format!("S3 endpoint {:?} has no host", endpoint))
            })?;

        Ok(S3Endpoint {
            host: host.to_string(),
            port: url.port(),
            use_ssl: url.scheme() == "https",
        })
    }

    /// Endpoint URL handed to the client.
    ///
    /// Virtual-hosted addressing puts the bucket in the host name, path-style
    /// addressing leaves it to the request path.
    pub fn url_for(&self, bucket: &str, path_style: bool) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        let host = if path_style {
            self.host.clone()
        } else {
            format!("{}.{}", bucket, self.host)
        };
        match self.port {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        }
    }
}

/// S3-compatible media backend
///
/// Objects are keyed by uuid; no backend data is persisted. URLs are presigned
/// GET capabilities, freshly signed on every call.
pub struct S3Backend {
    store: AmazonS3,
    bucket: String,
    endpoint: S3Endpoint,
}

impl S3Backend {
    /// Create a new S3Backend instance
    ///
    /// Fails immediately when the endpoint cannot be parsed.
    pub fn new(config: &S3Config) -> MediaResult<Self> {
        let endpoint = S3Endpoint::parse(&config.endpoint)?;
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let store = AmazonS3Builder::new()
            .with_access_key_id(config.access_key_id.clone())
            .with_secret_access_key(config.secret_access_key.clone())
            .with_region(region)
            .with_bucket_name(config.bucket.clone())
            .with_endpoint(endpoint.url_for(&config.bucket, config.path_style))
            .with_allow_http(!endpoint.use_ssl)
            .with_virtual_hosted_style_request(!config.path_style)
            .with_retry(RetryConfig {
                max_retries: 0,
                ..Default::default()
            })
            .build()
            .map_err(|e| MediaError::ConfigError(e.to_string()))?;

        tracing::debug!(
            bucket = %config.bucket,
            host = %endpoint.host,
            port = ?endpoint.port,
            use_ssl = endpoint.use_ssl,
            path_style = config.path_style,
            "S3 media backend configured"
        );

        Ok(S3Backend {
            store,
            bucket: config.bucket.clone(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &S3Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl MediaBackend for S3Backend {
    async fn save_file(
        &self,
        uuid: &str,
        content: Bytes,
        type_hint: &TypeHint,
    ) -> MediaResult<BackendData> {
        let location = Path::from(uuid);
        let size = content.len() as u64;
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, type_hint.mime.clone().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(content), options)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                uuid = %uuid,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            MediaError::backend(MediaOperation::Save, uuid, e)
        })?;

        tracing::info!(
            bucket = %self.bucket,
            uuid = %uuid,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(BackendData::S3)
    }

    async fn delete_file(&self, uuid: &str, _backend_data: &BackendData) -> MediaResult<()> {
        let location = Path::from(uuid);
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.delete(&location).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                uuid = %uuid,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 delete failed"
            );
            MediaError::backend(MediaOperation::Delete, uuid, e)
        })?;

        tracing::info!(
            bucket = %self.bucket,
            uuid = %uuid,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn get_file_url(&self, uuid: &str, _backend_data: &BackendData) -> MediaResult<String> {
        let location = Path::from(uuid);
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::GET, &location, PRESIGNED_URL_TTL)
            .await;

        let url = url_result
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    uuid = %uuid,
                    "S3 presign failed"
                );
                MediaError::backend(MediaOperation::GetUrl, uuid, e)
            })?
            .to_string();

        Ok(url)
    }

    fn backend_type(&self) -> MediaBackendType {
        MediaBackendType::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str, path_style: bool) -> S3Config {
        S3Config {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            bucket: "notes".to_string(),
            endpoint: endpoint.to_string(),
            region: None,
            path_style,
        }
    }

    #[test]
    fn test_endpoint_parsing_ignores_path() {
        let endpoint = S3Endpoint::parse("https://s3.example.org:9000/subpath").unwrap();
        assert_eq!(
            endpoint,
            S3Endpoint {
                host: "s3.example.org".to_string(),
                port: Some(9000),
                use_ssl: true,
            }
        );
    }

    #[test]
    fn test_endpoint_plain_http_without_port() {
        let endpoint = S3Endpoint::parse("http://minio.local").unwrap();
        assert_eq!(endpoint.host, "minio.local");
        assert_eq!(endpoint.port, None);
        assert!(!endpoint.use_ssl);
    }

    #[test]
    fn test_endpoint_without_scheme_fails() {
        assert!(matches!(
            S3Endpoint::parse("s3.example.org"),
            Err(MediaError::ConfigError(_))
        ));
        assert!(matches!(
            S3Endpoint::parse("s3.example.org:9000"),
            Err(MediaError::ConfigError(_))
        ));
    }

    #[test]
    fn test_endpoint_addressing_style() {
        let endpoint = S3Endpoint::parse("https://s3.example.org:9000/subpath").unwrap();
        assert_eq!(
            endpoint.url_for("notes", true),
            "https://s3.example.org:9000"
        );
        assert_eq!(
            endpoint.url_for("notes", false),
            "https://notes.s3.example.org:9000"
        );
    }

    #[test]
    fn test_construction_fails_for_bad_endpoint() {
        let result = S3Backend::new(&config("s3.example.org", false));
        assert!(matches!(result, Err(MediaError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_presigned_url_is_signed_and_keyed_by_uuid() {
        let backend = S3Backend::new(&config("https://s3.example.org:9000/subpath", true)).unwrap();
        assert_eq!(backend.endpoint().port, Some(9000));

        let url = backend
            .get_file_url("abc-123", &BackendData::S3)
            .await
            .unwrap();

        assert!(url.starts_with("https://s3.example.org:9000/notes/abc-123?"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=604800"));
        assert!(!url.contains("subpath"));
    }

    #[tokio::test]
    async fn test_failed_upload_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", mockito::Matcher::Any)
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let backend = S3Backend::new(&config(&server.url(), true)).unwrap();
        let result = backend
            .save_file(
                "abc-123",
                Bytes::from_static(b"png bytes"),
                &TypeHint::new("image/png", "png"),
            )
            .await;

        assert!(matches!(
            result,
            Err(MediaError::BackendError {
                operation: MediaOperation::Save,
                ..
            })
        ));
        mock.assert_async().await;
    }
}

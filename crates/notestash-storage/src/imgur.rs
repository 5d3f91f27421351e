use crate::backend_data::ImgurData;
use crate::traits::{MediaBackend, MediaError, MediaOperation, MediaResult, TypeHint};
use crate::{BackendData, MediaBackendType};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use notestash_core::ImgurConfig;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response};
use serde::Deserialize;

/// Public Imgur API
pub const IMGUR_API_BASE: &str = "https://api.imgur.com";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadData,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    link: String,
    #[serde(default)]
    deletehash: Option<String>,
}

/// Imgur media backend
///
/// Imgur assigns its own image URL and an optional one-time delete hash; the
/// uuid only correlates log lines. Without a delete hash an image can never be
/// deleted through this backend.
#[derive(Clone)]
pub struct ImgurBackend {
    client: Client,
    client_id: String,
    api_base: String,
}

impl std::fmt::Debug for ImgurBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImgurBackend")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl ImgurBackend {
    pub fn new(config: &ImgurConfig) -> MediaResult<Self> {
        Self::with_api_base(config, IMGUR_API_BASE)
    }

    /// Create a backend talking to an Imgur-compatible API at `api_base`.
    pub fn with_api_base(config: &ImgurConfig, api_base: impl Into<String>) -> MediaResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| MediaError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(ImgurBackend {
            client,
            client_id: config.client_id.clone(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn authorization(&self) -> String {
        format!("Client-ID {}", self.client_id)
    }

    fn check_status(operation: MediaOperation, uuid: &str, response: &Response) -> MediaResult<()> {
        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, uuid = %uuid, "Imgur {} rejected", operation);
            return Err(MediaError::backend(
                operation,
                uuid,
                format!("Imgur responded {}", status),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaBackend for ImgurBackend {
    async fn save_file(
        &self,
        uuid: &str,
        content: Bytes,
        _type_hint: &TypeHint,
    ) -> MediaResult<BackendData> {
        let size = content.len();
        let start = std::time::Instant::now();
        let encoded = general_purpose::STANDARD.encode(&content);

        let response = self
            .client
            .post(format!("{}/3/image", self.api_base))
            .header(AUTHORIZATION, self.authorization())
            .form(&[("image", encoded)])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, uuid = %uuid, "Imgur upload request failed");
                MediaError::backend(MediaOperation::Save, uuid, e)
            })?;

        Self::check_status(MediaOperation::Save, uuid, &response)?;

        let body: UploadResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, uuid = %uuid, "Imgur upload response unreadable");
            MediaError::backend(MediaOperation::Save, uuid, e)
        })?;

        tracing::info!(
            uuid = %uuid,
            url = %body.data.link,
            size_bytes = size,
            has_delete_hash = body.data.deletehash.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Imgur upload successful"
        );

        Ok(BackendData::Imgur(ImgurData {
            url: body.data.link,
            delete_hash: body.data.deletehash,
        }))
    }

    async fn delete_file(&self, uuid: &str, backend_data: &BackendData) -> MediaResult<()> {
        let data = backend_data.as_imgur(uuid)?;
        let delete_hash = data.delete_hash.as_deref().ok_or_else(|| {
            tracing::warn!(uuid = %uuid, url = %data.url, "Imgur image has no delete hash");
            MediaError::UnrecoverableDelete {
                uuid: uuid.to_string(),
                message: "no delete hash was issued for this Imgur image".to_string(),
            }
        })?;

        let response = self
            .client
            .delete(format!("{}/3/image/{}", self.api_base, delete_hash))
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, uuid = %uuid, "Imgur delete request failed");
                MediaError::backend(MediaOperation::Delete, uuid, e)
            })?;

        Self::check_status(MediaOperation::Delete, uuid, &response)?;

        tracing::info!(uuid = %uuid, url = %data.url, "Imgur delete successful");
        Ok(())
    }

    async fn get_file_url(&self, uuid: &str, backend_data: &BackendData) -> MediaResult<String> {
        let data = backend_data.as_imgur(uuid)?;
        if data.url.is_empty() {
            return Err(MediaError::data(uuid, "Imgur backend data has no url"));
        }
        Ok(data.url.clone())
    }

    fn backend_type(&self) -> MediaBackendType {
        MediaBackendType::Imgur
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config() -> ImgurConfig {
        ImgurConfig {
            client_id: "client-123".to_string(),
        }
    }

    fn imgur_data(delete_hash: Option<&str>) -> BackendData {
        BackendData::Imgur(ImgurData {
            url: "https://i.imgur.com/aBcD.png".to_string(),
            delete_hash: delete_hash.map(String::from),
        })
    }

    #[tokio::test]
    async fn test_upload_returns_provider_url_and_hash() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/3/image")
            .match_header("authorization", "Client-ID client-123")
            .match_body(Matcher::UrlEncoded(
                "image".to_string(),
                general_purpose::STANDARD.encode(b"png bytes"),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":{"id":"aBcD","link":"https://i.imgur.com/aBcD.png","deletehash":"dh42"},"success":true,"status":200}"#,
            )
            .create_async()
            .await;

        let backend = ImgurBackend::with_api_base(&config(), server.url()).unwrap();
        let data = backend
            .save_file(
                "abc-123",
                Bytes::from_static(b"png bytes"),
                &TypeHint::new("image/png", "png"),
            )
            .await
            .unwrap();

        assert_eq!(data, imgur_data(Some("dh42")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_without_delete_hash() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/3/image")
            .with_status(200)
            .with_body(r#"{"data":{"link":"https://i.imgur.com/aBcD.png","deletehash":null}}"#)
            .create_async()
            .await;

        let backend = ImgurBackend::with_api_base(&config(), server.url()).unwrap();
        let data = backend
            .save_file(
                "abc-123",
                Bytes::from_static(b"x"),
                &TypeHint::new("image/png", "png"),
            )
            .await
            .unwrap();

        assert_eq!(data, imgur_data(None));
    }

    #[tokio::test]
    async fn test_upload_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/3/image")
            .with_status(429)
            .create_async()
            .await;

        let backend = ImgurBackend::with_api_base(&config(), server.url()).unwrap();
        let result = backend
            .save_file(
                "abc-123",
                Bytes::from_static(b"x"),
                &TypeHint::new("image/png", "png"),
            )
            .await;

        match result {
            Err(MediaError::BackendError { message, .. }) => assert!(message.contains("429")),
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_uses_delete_hash() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/3/image/dh42")
            .match_header("authorization", "Client-ID client-123")
            .with_status(200)
            .with_body(r#"{"data":true,"success":true,"status":200}"#)
            .create_async()
            .await;

        let backend = ImgurBackend::with_api_base(&config(), server.url()).unwrap();
        backend
            .delete_file("abc-123", &imgur_data(Some("dh42")))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_without_hash_is_unrecoverable() {
        let mut server = Server::new_async().await;
        let never = server
            .mock("DELETE", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let backend = ImgurBackend::with_api_base(&config(), server.url()).unwrap();
        for uuid in ["abc-123", "other", ""] {
            let err = backend
                .delete_file(uuid, &imgur_data(None))
                .await
                .unwrap_err();
            assert!(matches!(err, MediaError::UnrecoverableDelete { .. }));
            assert!(!err.is_recoverable());
        }
        never.assert_async().await;
    }

    #[tokio::test]
    async fn test_url_comes_from_backend_data() {
        let backend = ImgurBackend::new(&config()).unwrap();

        let url = backend
            .get_file_url("abc-123", &imgur_data(None))
            .await
            .unwrap();
        assert_eq!(url, "https://i.imgur.com/aBcD.png");

        let result = backend.get_file_url("abc-123", &BackendData::S3).await;
        assert!(matches!(result, Err(MediaError::DataError { .. })));
    }
}

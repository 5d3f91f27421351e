use crate::traits::{MediaBackend, MediaError, MediaOperation, MediaResult, TypeHint};
use crate::{BackendData, MediaBackendType};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use notestash_core::AzureConfig;
use object_store::azure::{MicrosoftAzure, MicrosoftAzureBuilder};
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult, RetryConfig,
};
use sha2::Sha256;
use std::sync::atomic::{AtomicI64, Ordering};

type HmacSha256 = Hmac<Sha256>;

/// Service version the SAS string-to-sign layout follows
const SAS_VERSION: &str = "2021-08-06";

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const DEFAULT_PROTOCOL: &str = "https";

/// Validity of a read SAS, counted from the moment it is issued
pub fn sas_validity() -> ChronoDuration {
    ChronoDuration::hours(1)
}

/// Parsed Azure storage connection string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AzureConnectionString {
    pub account_name: String,
    pub account_key: String,
    pub blob_endpoint: String,
}

impl AzureConnectionString {
    /// Parse `Key=Value;Key=Value` pairs.
    ///
    /// `AccountName` and `AccountKey` are required. The blob endpoint is taken
    /// from `BlobEndpoint` when present, otherwise built from
    /// `DefaultEndpointsProtocol` and `EndpointSuffix`.
    pub fn parse(connection_string: &str) -> MediaResult<Self> {
        let mut protocol = DEFAULT_PROTOCOL.to_string();
        let mut suffix = DEFAULT_ENDPOINT_SUFFIX.to_string();
        let mut account_name = None;
        let mut account_key = None;
        let mut blob_endpoint = None;

        for pair in connection_string.split(';').map(str::trim) {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                MediaError::ConfigError(format!(
                    "Malformed Azure connection string segment {:?}",
                    pair
                ))
            })?;
            match key {
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "EndpointSuffix" => suffix = value.to_string(),
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        let account_name = account_name.ok_or_else(|| {
            MediaError::ConfigError("Azure connection string has no AccountName".to_string())
        })?;
        let account_key = account_key.ok_or_else(|| {
            MediaError::ConfigError("Azure connection string has no AccountKey".to_string())
        })?;
        let blob_endpoint = blob_endpoint
            .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, account_name, suffix));

        Ok(AzureConnectionString {
            account_name,
            account_key,
            blob_endpoint,
        })
    }
}

/// Shared-key credential, kept for signing SAS tokens
#[derive(Clone)]
pub struct SharedKeyCredential {
    account_name: String,
    key: Vec<u8>,
}

impl SharedKeyCredential {
    pub fn new(account_name: &str, account_key: &str) -> MediaResult<Self> {
        let key = general_purpose::STANDARD.decode(account_key).map_err(|e| {
            MediaError::ConfigError(format!("Azure AccountKey is not valid base64: {}", e))
        })?;
        Ok(SharedKeyCredential {
            account_name: account_name.to_string(),
            key,
        })
    }

    fn sign(&self, string_to_sign: &str) -> MediaResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| MediaError::ConfigError(format!("Invalid Azure account key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Read-only service SAS for a single blob, valid for one hour from `starts_on`.
    pub fn blob_read_sas(
        &self,
        container: &str,
        blob: &str,
        starts_on: DateTime<Utc>,
    ) -> MediaResult<String> {
        let start = starts_on.to_rfc3339_opts(SecondsFormat::Micros, true);
        let expiry = (starts_on + sas_validity()).to_rfc3339_opts(SecondsFormat::Micros, true);
        let resource = format!("/blob/{}/{}/{}", self.account_name, container, blob);

        // permissions, start, expiry, resource, identifier, ip, protocol,
        // version, resource type, snapshot time, encryption scope, rscc,
        // rscd, rsce, rscl, rsct
        let string_to_sign = [
            "r",
            start.as_str(),
            expiry.as_str(),
            resource.as_str(),
            "",
            "",
            "",
            SAS_VERSION,
            "b",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
        ]
        .join("\n");

        let signature = self.sign(&string_to_sign)?;

        Ok(format!(
            "sv={}&st={}&se={}&sr=b&sp=r&sig={}",
            SAS_VERSION,
            urlencoding::encode(&start),
            urlencoding::encode(&expiry),
            urlencoding::encode(&signature)
        ))
    }
}

/// Azure Blob Storage media backend
///
/// Block blobs are keyed by uuid inside one container; no backend data is
/// persisted. URLs carry a freshly issued read-only SAS.
pub struct AzureBackend {
    store: MicrosoftAzure,
    credential: SharedKeyCredential,
    container: String,
    blob_endpoint: String,
    /// Start time of the last issued SAS, in microseconds since the epoch
    last_issued_micros: AtomicI64,
}

impl AzureBackend {
    /// Create a new AzureBackend instance from a connection string and container
    pub fn new(config: &AzureConfig) -> MediaResult<Self> {
        let connection = AzureConnectionString::parse(&config.connection_string)?;
        let credential =
            SharedKeyCredential::new(&connection.account_name, &connection.account_key)?;

        let store = MicrosoftAzureBuilder::new()
            .with_account(connection.account_name.clone())
            .with_access_key(connection.account_key.clone())
            .with_container_name(config.container.clone())
            .with_endpoint(connection.blob_endpoint.clone())
            .with_allow_http(connection.blob_endpoint.starts_with("http://"))
            .with_retry(RetryConfig {
                max_retries: 0,
                ..Default::default()
            })
            .build()
            .map_err(|e| MediaError::ConfigError(e.to_string()))?;

        Ok(AzureBackend {
            store,
            credential,
            container: config.container.clone(),
            blob_endpoint: connection.blob_endpoint,
            last_issued_micros: AtomicI64::new(i64::MIN),
        })
    }

    /// Issuance time for a new SAS.
    ///
    /// Strictly increasing at microsecond precision, so two URLs issued by
    /// this backend never share a start time or a signature.
    fn next_issuance(&self) -> MediaResult<DateTime<Utc>> {
        let now = Utc::now().timestamp_micros();
        let next = |last: i64| now.max(last.saturating_add(1));
        let previous = self
            .last_issued_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
            .unwrap_or_else(|last| last);
        let issued = next(previous);
        DateTime::<Utc>::from_timestamp_micros(issued)
            .ok_or_else(|| MediaError::ConfigError("SAS start time out of range".to_string()))
    }

    fn blob_url(&self, uuid: &str) -> String {
        format!(
            "{}/{}/{}",
            self.blob_endpoint,
            self.container,
            urlencoding::encode(uuid)
        )
    }

    /// Signed URL for `uuid` as issued at `now`.
    pub fn signed_url_at(&self, uuid: &str, now: DateTime<Utc>) -> MediaResult<String> {
        let sas = self.credential.blob_read_sas(&self.container, uuid, now)?;
        Ok(format!("{}?{}", self.blob_url(uuid), sas))
    }
}

#[async_trait]
impl MediaBackend for AzureBackend {
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
                container = %self.container,
                uuid = %uuid,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Azure upload failed"
            );
            MediaError::backend(MediaOperation::Save, uuid, e)
        })?;

        tracing::info!(
            container = %self.container,
            uuid = %uuid,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Azure upload successful"
        );

        Ok(BackendData::Azure)
    }

    async fn delete_file(&self, uuid: &str, _backend_data: &BackendData) -> MediaResult<()> {
        let location = Path::from(uuid);
        let start = std::time::Instant::now();

        // Error codes returned by the service surface here as errors too.
        let result: ObjectResult<_> = self.store.delete(&location).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                container = %self.container,
                uuid = %uuid,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Azure delete failed"
            );
            MediaError::backend(MediaOperation::Delete, uuid, e)
        })?;

        tracing::info!(
            container = %self.container,
            uuid = %uuid,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Azure delete successful"
        );

        Ok(())
    }

    async fn get_file_url(&self, uuid: &str, _backend_data: &BackendData) -> MediaResult<String> {
        self.next_issuance()
            .and_then(|now| self.signed_url_at(uuid, now))
            .map_err(|e| {
                tracing::error!(error = %e, uuid = %uuid, "Azure SAS generation failed");
                MediaError::backend(MediaOperation::GetUrl, uuid, e)
            })
    }

    fn backend_type(&self) -> MediaBackendType {
        MediaBackendType::Azure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // "notestash-test-key" in base64
    const ACCOUNT_KEY: &str = "bm90ZXN0YXNoLXRlc3Qta2V5";

    fn config() -> AzureConfig {
        AzureConfig {
            connection_string: format!(
                "DefaultEndpointsProtocol=https;AccountName=notesacct;AccountKey={};EndpointSuffix=core.windows.net",
                ACCOUNT_KEY
            ),
            container: "media".to_string(),
        }
    }

    fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
        let (_, query) = url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    #[test]
    fn test_connection_string_parsing() {
        let parsed = AzureConnectionString::parse(&config().connection_string).unwrap();
        assert_eq!(parsed.account_name, "notesacct");
        assert_eq!(parsed.account_key, ACCOUNT_KEY);
        assert_eq!(parsed.blob_endpoint, "https://notesacct.blob.core.windows.net");
    }

    #[test]
    fn test_connection_string_with_blob_endpoint() {
        let parsed = AzureConnectionString::parse(&format!(
            "AccountName=devstoreaccount1;AccountKey={};BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1/;",
            ACCOUNT_KEY
        ))
        .unwrap();
        assert_eq!(parsed.blob_endpoint, "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_connection_string_errors() {
        assert!(matches!(
            AzureConnectionString::parse("AccountName=x"),
            Err(MediaError::ConfigError(_))
        ));
        assert!(matches!(
            AzureConnectionString::parse("garbage"),
            Err(MediaError::ConfigError(_))
        ));
        assert!(matches!(
            SharedKeyCredential::new("x", "not base64!"),
            Err(MediaError::ConfigError(_))
        ));
    }

    #[test]
    fn test_sas_is_read_only_for_one_hour() {
        let backend = AzureBackend::new(&config()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let url = backend.signed_url_at("abc-123", now).unwrap();

        assert!(url.starts_with("https://notesacct.blob.core.windows.net/media/abc-123?"));
        assert_eq!(query_param(&url, "sp"), Some("r"));
        assert_eq!(query_param(&url, "sr"), Some("b"));
        assert_eq!(query_param(&url, "sv"), Some(SAS_VERSION));
        assert_eq!(
            query_param(&url, "st"),
            Some("2026-03-01T12%3A00%3A00.000000Z")
        );
        assert_eq!(
            query_param(&url, "se"),
            Some("2026-03-01T13%3A00%3A00.000000Z")
        );
        assert!(query_param(&url, "sig").is_some());
    }

    #[test]
    fn test_each_issuance_is_a_new_signature() {
        let backend = AzureBackend::new(&config()).unwrap();
        let first = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let second = first + ChronoDuration::seconds(1);

        let a = backend.signed_url_at("abc-123", first).unwrap();
        let b = backend.signed_url_at("abc-123", second).unwrap();

        assert_ne!(query_param(&a, "sig"), query_param(&b, "sig"));
        assert_eq!(a.split_once('?').unwrap().0, b.split_once('?').unwrap().0);
    }

    #[tokio::test]
    async fn test_back_to_back_urls_differ() {
        let backend = AzureBackend::new(&config()).unwrap();

        let a = backend
            .get_file_url("abc-123", &BackendData::Azure)
            .await
            .unwrap();
        let b = backend
            .get_file_url("abc-123", &BackendData::Azure)
            .await
            .unwrap();

        assert_ne!(a, b);
        assert_ne!(query_param(&a, "sig"), query_param(&b, "sig"));
        assert_eq!(a.split_once('?').unwrap().0, b.split_once('?').unwrap().0);
    }

    #[test]
    fn test_issuance_is_strictly_increasing() {
        let backend = AzureBackend::new(&config()).unwrap();

        let mut previous = backend.next_issuance().unwrap();
        for _ in 0..1000 {
            let next = backend.next_issuance().unwrap();
            assert!(next > previous);
            previous = next;
        }
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

        let backend = AzureBackend::new(&AzureConfig {
            connection_string: format!(
                "AccountName=devstoreaccount1;AccountKey={};BlobEndpoint={}/devstoreaccount1",
                ACCOUNT_KEY,
                server.url()
            ),
            container: "media".to_string(),
        })
        .unwrap();

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

    #[tokio::test]
    async fn test_get_file_url_needs_no_backend_data() {
        let backend = AzureBackend::new(&config()).unwrap();
        let url = backend
            .get_file_url("abc-123", &BackendData::Azure)
            .await
            .unwrap();
        assert!(url.contains("sig="));
    }
}

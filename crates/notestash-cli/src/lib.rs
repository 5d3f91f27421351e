use notestash_core::MediaBackendType;
use std::path::Path;

/// Content type for a file extension, falling back to `application/octet-stream`.
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// Lowercased extension of `path`, or `bin` when it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Fail early when a backend that needs persisted backend data was given none.
pub fn require_backend_data(backend: MediaBackendType, data: Option<&str>) -> anyhow::Result<()> {
    if backend.requires_backend_data() && data.is_none() {
        anyhow::bail!(
            "The {} backend needs the backend data printed by `save`; pass it with --data",
            backend
        );
    }
    Ok(())
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

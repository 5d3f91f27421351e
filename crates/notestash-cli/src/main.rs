//! notestash CLI: store, resolve and delete note attachments with the
//! configured media backend.
//!
//! Backend selection comes from `MEDIA_BACKEND` and the matching `MEDIA_*`
//! variables (a `.env` file is honoured). Output is JSON on stdout; logs go to
//! stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use notestash_cli::{
    content_type_for_extension, extension_of, init_tracing, require_backend_data,
};
use notestash_core::MediaBackendConfig;
use notestash_storage::{MediaStore, TypeHint};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "notestash", about = "Note attachment storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file and print its uuid, backend data and URL
    Save {
        /// Path to the file to store
        file: std::path::PathBuf,
        /// Uuid to store under (a random v4 uuid when omitted)
        #[arg(long)]
        uuid: Option<String>,
        /// Content type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },
    /// Print the URL for a stored file
    Url {
        /// Uuid the file was stored under
        uuid: String,
        /// Backend data JSON returned by `save`
        #[arg(long)]
        data: Option<String>,
    },
    /// Delete a stored file
    Delete {
        /// Uuid the file was stored under
        uuid: String,
        /// Backend data JSON returned by `save`
        #[arg(long)]
        data: Option<String>,
    },
    /// Check that the configured backend is reachable
    Health,
}

#[derive(Serialize)]
struct SaveOutput {
    uuid: String,
    backend: String,
    backend_data: Option<serde_json::Value>,
    url: String,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let config = MediaBackendConfig::from_env()
        .context("Failed to load media backend configuration. Set MEDIA_BACKEND and its MEDIA_* variables")?;
    let store = MediaStore::from_config(&config)
        .await
        .context("Failed to initialize media backend")?;

    match cli.command {
        Commands::Save { file, uuid, mime } => {
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let ext = extension_of(&file);
            let mime = mime.unwrap_or_else(|| content_type_for_extension(&ext).to_string());
            let uuid = uuid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let backend_data = store
                .save_file(&uuid, content, &TypeHint::new(mime, ext))
                .await?;
            let url = store.get_file_url(&uuid, backend_data.as_deref()).await?;

            let backend_data = backend_data
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()
                .context("Backend data is not valid JSON")?;

            print_json(&SaveOutput {
                uuid,
                backend: store.backend_type().to_string(),
                backend_data,
                url,
            })?;
        }
        Commands::Url { uuid, data } => {
            require_backend_data(store.backend_type(), data.as_deref())?;
            let url = store.get_file_url(&uuid, data.as_deref()).await?;
            print_json(&serde_json::json!({ "uuid": uuid, "url": url }))?;
        }
        Commands::Delete { uuid, data } => {
            require_backend_data(store.backend_type(), data.as_deref())?;
            store.delete_file(&uuid, data.as_deref()).await?;
            print_json(
                &serde_json::json!({ "success": true, "message": format!("File {} deleted", uuid) }),
            )?;
        }
        Commands::Health => {
            store.health_check().await?;
            print_json(&serde_json::json!({
                "healthy": true,
                "backend": store.backend_type().to_string(),
            }))?;
        }
    }

    Ok(())
}

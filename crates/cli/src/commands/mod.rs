//! Subcommand implementations and the wiring they share.

pub mod chat;
pub mod conversations;
pub mod doctor;
pub mod entities;
pub mod onboard;
pub mod samples;
pub mod sync;

use std::sync::Arc;
use std::time::Duration;

use netintent_agent::{ChatService, Collaborators, Reconciler, SampleLibrary, embedder_from_config};
use netintent_config::AppConfig;
use netintent_controller::OnosClient;
use netintent_core::embedding::Embedder;
use netintent_providers::OpenAiCompatProvider;
use netintent_store::SqliteStore;

/// Collaborators opened once per command.
pub struct Runtime {
    pub config: AppConfig,
    pub store: Arc<SqliteStore>,
    pub telemetry: Arc<OnosClient>,
    pub embedder: Arc<dyn Embedder>,
}

impl Runtime {
    pub async fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        let embedder = embedder_from_config(&config)
            .map_err(|e| format!("Failed to set up embeddings: {e}"))?;
        let store = SqliteStore::open(&config.store_path(), config.embedding.dimensions)
            .await
            .map_err(|e| format!("Failed to open store: {e}"))?;
        let telemetry = OnosClient::from_config(&config.controller);

        Ok(Self {
            config,
            store: Arc::new(store),
            telemetry: Arc::new(telemetry),
            embedder,
        })
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.store.clone(),
            Duration::from_secs(self.config.controller.timeout_secs),
        )
    }

    pub fn library(&self) -> SampleLibrary {
        SampleLibrary::new(self.embedder.clone(), self.store.clone())
    }

    pub fn chat(&self) -> Result<ChatService, Box<dyn std::error::Error>> {
        if !self.config.has_api_key() {
            eprintln!();
            eprintln!("  ERROR: No API key configured!");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    GROQ_API_KEY=gsk_...        (default provider)");
            eprintln!("    NETINTENT_API_KEY=...       (any OpenAI-compatible endpoint)");
            eprintln!();
            eprintln!("  Or add it to your config file:");
            eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
            eprintln!();
            return Err("No API key found. See above for setup instructions.".into());
        }

        let provider = OpenAiCompatProvider::from_config(&self.config.provider)?;
        Ok(ChatService::from_config(
            &self.config,
            Collaborators {
                provider: Arc::new(provider),
                telemetry: self.telemetry.clone(),
                identity: self.store.clone(),
                samples: self.store.clone(),
                conversations: self.store.clone(),
                embedder: self.embedder.clone(),
            },
        ))
    }
}

/// Print a value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

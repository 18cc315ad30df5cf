//! netintent CLI - the main entry point.
//!
//! Commands:
//! - `onboard`       - Write a default config file
//! - `chat`          - Interactive or single-message chat
//! - `conversations` - List, create and inspect conversations
//! - `sync`          - Poll the controller once and reconcile identities
//! - `entities`      - List managed entities
//! - `name`          - Assign or clear an entity's friendly name
//! - `forget`        - Delete a managed entity
//! - `samples`       - Manage the config sample library
//! - `doctor`        - Diagnose configuration and connectivity

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "netintent",
    about = "netintent — natural-language intents for ONOS, grounded in live topology",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Onboard,

    /// Chat with the model
    Chat {
        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Override the configured model
        #[arg(long)]
        model: Option<String>,

        /// Skip sample retrieval
        #[arg(long)]
        no_rag: bool,

        /// Print the full turn outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage conversations
    Conversations {
        #[command(subcommand)]
        action: commands::conversations::Action,
    },

    /// Poll the controller once and reconcile identities
    Sync {
        #[arg(long)]
        json: bool,
    },

    /// List managed entities
    Entities {
        /// Poll the controller first to mark live entities
        #[arg(long)]
        refresh: bool,

        #[arg(long)]
        json: bool,
    },

    /// Assign or clear a friendly name
    Name {
        /// Stable id, e.g. `host:10.0.0.5` or `of:0000000000000001`
        stable_id: String,

        /// New name; omit to clear
        name: Option<String>,
    },

    /// Delete a managed entity
    Forget { stable_id: String },

    /// Manage the config sample library
    Samples {
        #[command(subcommand)]
        action: commands::samples::Action,
    },

    /// Diagnose configuration and connectivity
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            conversation,
            message,
            model,
            no_rag,
            json,
        } => {
            let opts = commands::chat::ChatArgs {
                conversation,
                message,
                model,
                use_rag: !no_rag,
                json,
            };
            commands::chat::run(opts).await?
        }
        Commands::Conversations { action } => commands::conversations::run(action).await?,
        Commands::Sync { json } => commands::sync::run(json).await?,
        Commands::Entities { refresh, json } => commands::entities::run(refresh, json).await?,
        Commands::Name { stable_id, name } => commands::entities::name(&stable_id, name).await?,
        Commands::Forget { stable_id } => commands::entities::forget(&stable_id).await?,
        Commands::Samples { action } => commands::samples::run(action).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}

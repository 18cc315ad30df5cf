//! `netintent conversations` - List, create and inspect conversations.

use clap::Subcommand;
use netintent_core::conversation::ConversationStore;
use netintent_core::message::ConversationId;

use super::{Runtime, print_json};

#[derive(Subcommand)]
pub enum Action {
    /// List conversations, most recent first
    List {
        #[arg(long)]
        json: bool,
    },

    /// Start a new conversation
    New {
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Print a conversation's messages
    Show {
        id: String,

        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: Action) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::open().await?;
    let store = runtime.store.as_ref();

    match action {
        Action::List { json } => {
            let conversations = ConversationStore::list(store).await?;
            if json {
                return print_json(&conversations);
            }
            if conversations.is_empty() {
                println!("  No conversations yet. Start one with `netintent chat`.");
            }
            for c in &conversations {
                println!(
                    "  {}  {}  {}",
                    c.id,
                    c.updated_at.format("%Y-%m-%d %H:%M"),
                    c.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }
        Action::New { title } => {
            let title = title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
            let conversation = store.create(title).await?;
            println!("{}", conversation.id);
        }
        Action::Show { id, json } => {
            let id = ConversationId::from(&id);
            let messages = store.history(&id).await?;
            if json {
                return print_json(&messages);
            }
            for m in &messages {
                println!(
                    "[{}] {}:",
                    m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    m.role.as_str()
                );
                for line in m.content.lines() {
                    println!("    {line}");
                }
                println!();
            }
        }
    }

    Ok(())
}

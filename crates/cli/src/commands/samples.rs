//! `netintent samples` - Config sample library commands.

use clap::Subcommand;
use netintent_core::sample::{NewConfigSample, SampleFilter, SampleUpdate};
use serde_json::Value;

use super::{Runtime, print_json};

#[derive(Subcommand)]
pub enum Action {
    /// List samples, newest first
    List {
        /// Substring of intent text or category
        #[arg(short, long)]
        query: Option<String>,

        /// Exact category (case-insensitive)
        #[arg(short, long)]
        category: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        json: bool,
    },

    /// Print one sample
    Show { id: i64 },

    /// Add a sample
    Add {
        #[arg(short, long)]
        category: String,

        #[arg(short, long)]
        intent: String,

        /// Config JSON, or @path to read it from a file
        #[arg(long)]
        config: String,

        /// Extra metadata JSON, or @path
        #[arg(long)]
        extra: Option<String>,
    },

    /// Change a sample. A new intent is re-embedded.
    Update {
        id: i64,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long)]
        intent: Option<String>,

        #[arg(long)]
        config: Option<String>,

        #[arg(long)]
        extra: Option<String>,
    },

    /// Delete a sample
    Delete { id: i64 },

    /// Add every sample from a JSON array that is not already stored
    Import {
        /// JSON array, or @path to read it from a file
        source: String,

        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: Action) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::open().await?;
    let library = runtime.library();

    match action {
        Action::List {
            query,
            category,
            limit,
            offset,
            json,
        } => {
            let samples = library
                .list(&SampleFilter {
                    query,
                    category,
                    limit,
                    offset,
                })
                .await?;
            if json {
                return print_json(&samples);
            }
            if samples.is_empty() {
                println!("  No samples found.");
            }
            for s in &samples {
                println!(
                    "  #{:<5} [{}] {}",
                    s.sample_id,
                    s.category,
                    truncate(&s.intent_text, 80)
                );
            }
        }
        Action::Show { id } => {
            let sample = library
                .get(id)
                .await?
                .ok_or_else(|| format!("Sample {id} not found"))?;
            print_json(&sample)?;
        }
        Action::Add {
            category,
            intent,
            config,
            extra,
        } => {
            let sample = library
                .create(NewConfigSample {
                    category,
                    intent_text: intent,
                    config_payload: parse_json_arg(&config)?,
                    extra_metadata: extra.as_deref().map(parse_json_arg).transpose()?,
                })
                .await?;
            println!("✅ Added sample #{}", sample.sample_id);
        }
        Action::Update {
            id,
            category,
            intent,
            config,
            extra,
        } => {
            let sample = match (category, intent, config, extra) {
                (None, Some(intent), None, None) => library.update_intent(id, &intent).await?,
                (category, intent, config, extra) => {
                    let update = SampleUpdate {
                        category,
                        intent_text: intent,
                        config_payload: config.as_deref().map(parse_json_arg).transpose()?,
                        extra_metadata: extra.as_deref().map(parse_json_arg).transpose()?,
                    };
                    library.update(id, update).await?
                }
            };
            println!("✅ Updated sample #{}", sample.sample_id);
        }
        Action::Import { source, json } => {
            let rows: Vec<NewConfigSample> = serde_json::from_value(parse_json_arg(&source)?)
                .map_err(|e| format!("Expected an array of samples: {e}"))?;
            let report = library.import(rows).await?;
            if json {
                return print_json(&report);
            }
            println!(
                "✅ Imported {} sample(s), skipped {} already present",
                report.added.len(),
                report.skipped
            );
        }
        Action::Delete { id } => {
            if library.delete(id).await? {
                println!("🗑️  Deleted sample #{id}");
            } else {
                println!("  Sample {id} not found");
            }
        }
    }

    Ok(())
}

/// Inline JSON, or `@path` to read a file.
fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {path}: {e}"))?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&text).map_err(|e| format!("Invalid JSON: {e}"))?)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

//! `netintent chat` - Interactive or single-message chat mode.

use netintent_agent::{ChatService, TurnError, TurnOptions, TurnOutcome};
use netintent_core::message::ConversationId;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{Runtime, print_json};

pub struct ChatArgs {
    pub conversation: Option<String>,
    pub message: Option<String>,
    pub model: Option<String>,
    pub use_rag: bool,
    pub json: bool,
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::open().await?;
    let service = runtime.chat()?;

    let mut conversation = match &args.conversation {
        Some(id) => ConversationId::from(id),
        None => service.create_conversation(None).await?.id,
    };

    let options = TurnOptions {
        model: args.model.clone(),
        use_rag: args.use_rag,
    };

    if let Some(msg) = &args.message {
        // Single message mode
        eprint!("  Thinking...");
        let result = service.send_message(&conversation, msg, options).await;
        eprint!("\r              \r");
        let outcome = result?;
        if args.json {
            print_json(&outcome)?;
        } else {
            println!("{}", outcome.reply);
            eprintln!("  conversation: {conversation}");
        }
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  netintent — Interactive Mode");
    println!("  ============================");
    println!();
    println!("  Controller:   {}", runtime.config.controller.api_url);
    println!(
        "  Model:        {}",
        options.model.as_deref().unwrap_or(&service.settings().default_model)
    );
    println!(
        "  Retrieval:    {}",
        if options.use_rag && service.settings().retrieval_enabled {
            "on"
        } else {
            "off"
        }
    );
    println!("  Budget:       {} tokens", runtime.config.context.budget_tokens);
    println!("  Conversation: {conversation}");
    println!();
    println!("  Type your intent and press Enter.");
    println!("  Type '/new' for a fresh conversation, 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        match text {
            "" => {}
            "exit" | "quit" => break,
            "/new" => {
                conversation = service.create_conversation(None).await?.id;
                println!("  Started conversation {conversation}");
            }
            _ => {
                eprint!("  ...");
                let result = service
                    .send_message(&conversation, text, options.clone())
                    .await;
                eprint!("\r     \r");
                print_turn(&service, result);
            }
        }
        prompt()?;
    }

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    use std::io::Write;
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_turn(service: &ChatService, result: Result<TurnOutcome, TurnError>) {
    match result {
        Ok(outcome) => {
            println!();
            for line in outcome.reply.lines() {
                println!("  Assistant > {line}");
            }
            for note in &outcome.notes {
                println!("  [note] {note}");
            }
            println!(
                "  [{} | {} samples | {}/{} tokens | llm {:.2}s]",
                outcome.model,
                outcome.samples.len(),
                outcome.budget.estimated,
                outcome.budget.budget,
                outcome.timings.llm_seconds,
            );
            println!();
        }
        Err(TurnError::ContextOverflow(e)) => {
            eprintln!("  [Error] {e}");
            eprintln!("  Type '/new' to continue in a fresh conversation.");
            println!();
        }
        Err(e) => {
            eprintln!("  [Error] {e}");
            if matches!(e, TurnError::TelemetryUnavailable(_)) {
                eprintln!(
                    "  Controller fallback is '{:?}'; check controller.api_url.",
                    service.settings().on_telemetry_failure
                );
            }
            println!();
        }
    }
}

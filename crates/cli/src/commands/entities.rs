//! `netintent entities`, `name`, `forget` - Managed entity commands.

use super::{Runtime, print_json};

pub async fn run(refresh: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::open().await?;
    let reconciler = runtime.reconciler();

    let live = if refresh {
        match reconciler.refresh(runtime.telemetry.as_ref()).await {
            Ok(r) => r.reconciliation.map(|s| s.live_keys),
            Err(e) => {
                eprintln!("  ⚠️  Controller unreachable ({e}); showing stored state");
                None
            }
        }
    } else {
        None
    };

    let views = reconciler.managed_entities(live.as_ref()).await?;
    if json {
        return print_json(&views);
    }

    if views.is_empty() {
        println!("  No managed entities yet. Run `netintent sync` first.");
        return Ok(());
    }

    println!(
        "  {:<32} {:<7} {:<20} {:<6} {}",
        "STABLE ID", "TYPE", "NAME", "ACTIVE", "ADDRESSES"
    );
    for v in &views {
        let e = &v.entity;
        println!(
            "  {:<32} {:<7} {:<20} {:<6} {}",
            e.stable_id,
            e.entity_type.as_str(),
            e.friendly_name.as_deref().unwrap_or("-"),
            if v.active { "yes" } else { "no" },
            e.addresses.join(", ")
        );
    }

    Ok(())
}

pub async fn name(stable_id: &str, name: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::open().await?;
    let reconciler = runtime.reconciler();

    if !reconciler.set_friendly_name(stable_id, name.as_deref()).await? {
        return Err(format!("No managed entity '{stable_id}'. Run `netintent entities` to list them.").into());
    }

    match name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => println!("✅ {stable_id} is now '{n}'"),
        None => println!("✅ Cleared name of {stable_id}"),
    }
    Ok(())
}

pub async fn forget(stable_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::open().await?;
    if runtime.reconciler().forget(stable_id).await? {
        println!("🗑️  Forgot {stable_id}");
    } else {
        println!("  No managed entity '{stable_id}'");
    }
    Ok(())
}

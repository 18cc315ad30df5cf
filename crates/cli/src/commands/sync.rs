//! `netintent sync` - Poll the controller once and reconcile identities.

use super::{Runtime, print_json};

pub async fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::open().await?;
    let reconciler = runtime.reconciler();

    let refreshed = reconciler
        .refresh(runtime.telemetry.as_ref())
        .await
        .map_err(|e| format!("Sync aborted, identity store untouched: {e}"))?;

    let Some(result) = refreshed.reconciliation else {
        let note = refreshed.snapshot.note.unwrap_or_default();
        return Err(format!("Telemetry fetched but identities were not synced: {note}").into());
    };

    if json {
        return print_json(&result);
    }

    println!("🔄 Sync pass {}", result.seq);
    println!("   Live entities: {}", result.live_keys.len());
    println!("   Created:       {}", result.created);
    println!("   Updated:       {}", result.updated);
    if result.superseded > 0 {
        println!("   Superseded:    {}", result.superseded);
    }
    for m in &result.migrated {
        println!(
            "   Migrated:      {} → {} ({})",
            m.from,
            m.to,
            m.friendly_name.as_deref().unwrap_or("no name")
        );
    }
    for id in &result.collected {
        println!("   Collected:     {id}");
    }
    for c in &result.conflicts {
        println!(
            "   ⚠️  Conflict:   {} at {} held by {}",
            c.stable_id,
            c.address,
            c.candidates.join(", ")
        );
    }
    if !result.conflicts.is_empty() {
        println!();
        println!("   Conflicting rows were left untouched. Resolve with `netintent name` / `netintent forget`.");
    }

    Ok(())
}

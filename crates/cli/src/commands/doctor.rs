//! `netintent doctor` - Diagnose configuration and connectivity.

use netintent_config::AppConfig;
use netintent_core::sample::SampleStore;
use netintent_core::topology::{ResourceKind, TelemetrySource};

use super::Runtime;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 netintent Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found");
    } else {
        println!("  ⚠️  No config file — using defaults (run `netintent onboard`)");
    }

    let runtime = match Runtime::open().await {
        Ok(r) => {
            println!("  ✅ Config valid");
            println!("  ✅ Store open at {}", r.config.store_path().display());
            r
        }
        Err(e) => {
            println!("  ❌ {e}");
            println!("\n  ⚠️  Cannot continue without a valid config and store.");
            return Ok(());
        }
    };

    if runtime.config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured — set GROQ_API_KEY");
        issues += 1;
    }

    match runtime.telemetry.fetch(ResourceKind::Devices).await {
        Ok(_) => println!("  ✅ Controller reachable at {}", runtime.config.controller.api_url),
        Err(e) => {
            println!("  ❌ Controller: {e}");
            issues += 1;
        }
    }

    match runtime.store.count().await {
        Ok(0) => {
            println!("  ⚠️  Sample library is empty — retrieval will add no examples");
            issues += 1;
        }
        Ok(n) => println!(
            "  ✅ {n} config samples ({} embeddings, {} dims)",
            runtime.embedder.name(),
            runtime.embedder.dimensions()
        ),
        Err(e) => {
            println!("  ❌ Sample store: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

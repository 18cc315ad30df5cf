//! `netintent onboard` - First-time setup.

use netintent_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("netintent — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Export GROQ_API_KEY (or set provider.api_key)");
        println!("   2. Point controller.api_url at your ONOS REST API");
        println!("   3. Run `netintent doctor`, then `netintent sync`");
        println!("   4. Add examples with `netintent samples add`");
        println!("   5. Start chatting: `netintent chat`\n");
    }

    Ok(())
}

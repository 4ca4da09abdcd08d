//! `forgeline onboard`: first-time setup.

use forgeline_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let projects_dir = AppConfig::projects_dir();

    println!("Forgeline - First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if !projects_dir.exists() {
        std::fs::create_dir_all(&projects_dir)?;
        println!("  Created export directory: {}", projects_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
        println!("\n  Next steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("      (or export FORGELINE_API_KEY / OPENROUTER_API_KEY)");
        println!("   2. Run: forgeline chat");
        println!("   3. Ask a question, or describe a site to build\n");
    }

    println!("  Setup complete.\n");
    Ok(())
}

//! `forgeline status`: show the effective configuration.

use forgeline_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Forgeline Status");
    println!("================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Exports:      {}", AppConfig::projects_dir().display());
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", config.default_model);
    println!("  Fallback:     {}", config.orchestrator.fallback_provider);
    println!("  Framework:    {}", config.orchestrator.framework);
    println!("  Exploration:  {}", if config.orchestrator.multi_step { "llm-assisted" } else { "deterministic" });
    println!("  Memory:       {} messages, reset {:02}:{:02} (UTC{:+}m)",
        config.memory.window,
        config.memory.reset_hour,
        config.memory.reset_minute,
        config.memory.utc_offset_minutes);
    match config.usage.daily_limit {
        0 => println!("  Daily limit:  none"),
        limit => println!("  Daily limit:  {limit} generations"),
    }
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file. Run `forgeline onboard` first");
    }

    Ok(())
}

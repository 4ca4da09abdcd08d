//! `forgeline providers`: list configured gateways and their budgets.

use forgeline_config::AppConfig;
use forgeline_providers::build_from_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let router = build_from_config(&config);

    println!("Configured Providers");
    println!("====================");
    println!();
    println!("  {:<16} {:>10} {:>10}  Role", "Provider", "Budget", "Reserve");
    for name in router.list() {
        let budget = config.provider_budget(name);
        let role = if name == config.default_provider {
            "primary"
        } else if name == config.orchestrator.fallback_provider {
            "fallback"
        } else {
            ""
        };
        println!(
            "  {:<16} {:>10} {:>10}  {role}",
            name, budget.context_budget, budget.system_reserve
        );
    }
    println!();
    println!("  Escalation: primary -> primary with {:.0}% budget -> fallback",
        config.orchestrator.retry_budget_ratio * 100.0);
    println!();
    println!("  Any OpenAI-compatible endpoint works:");
    println!("    [providers.myhost]");
    println!("    api_url = \"https://your-endpoint.example.com/v1\"");
    println!("    api_key = \"your-key\"");
    println!("    context_budget = 32000");

    Ok(())
}

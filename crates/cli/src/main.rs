//! Forgeline CLI, the main entry point.
//!
//! Commands:
//! - `onboard`   Initialize the config directory and a default config
//! - `chat`      Interactive session (tutor, builder and canvas) or a single message
//! - `classify`  Show which mode a message would be routed to
//! - `providers` List configured gateways and their budgets
//! - `status`    Show the effective configuration

use clap::{Parser, Subcommand};
use forgeline_core::mode::Mode;

mod commands;

#[derive(Parser)]
#[command(
    name = "forgeline",
    about = "Forgeline: an AI tutor and web builder in your terminal",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Chat, learn or build
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Force a mode instead of classifying each message
        #[arg(long)]
        mode: Option<Mode>,

        /// Primary provider for this session
        #[arg(long, env = "FORGELINE_PROVIDER")]
        provider: Option<String>,

        /// Builder target framework ("html" for a single page)
        #[arg(long)]
        framework: Option<String>,
    },

    /// Classify a message without sending it
    Classify {
        text: String,
    },

    /// List configured providers
    Providers,

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            message,
            mode,
            provider,
            framework,
        } => {
            commands::chat::run(commands::chat::ChatOptions {
                message,
                mode,
                provider,
                framework,
            })
            .await?
        }
        Commands::Classify { text } => commands::classify::run(&text)?,
        Commands::Providers => commands::providers::run().await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}

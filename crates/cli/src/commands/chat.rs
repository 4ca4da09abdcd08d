//! `forgeline chat`: interactive or single-message session.
//!
//! Lines starting with `/` are session commands; everything else is
//! submitted to the orchestrator.

use forgeline_config::AppConfig;
use forgeline_core::event::DomainEvent;
use forgeline_core::message::Attachment;
use forgeline_core::mode::Mode;
use forgeline_core::result::GenerationResult;
use forgeline_engine::{Generation, Orchestrator, SubmitInput, spawn_reset_poller};
use forgeline_store::files::VirtualFileManager;
use forgeline_store::sessions::InMemorySessionStore;
use forgeline_store::usage::DailyUsageLedger;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

pub struct ChatOptions {
    pub message: Option<String>,
    pub mode: Option<Mode>,
    pub provider: Option<String>,
    pub framework: Option<String>,
}

pub async fn run(options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && config.providers.values().all(|p| p.api_key.is_none()) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    FORGELINE_API_KEY   (generic)");
        eprintln!("    OPENROUTER_API_KEY  (recommended)");
        eprintln!("    OPENAI_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    if let Some(framework) = options.framework {
        config.orchestrator.framework = framework;
    }
    let provider = options
        .provider
        .unwrap_or_else(|| config.default_provider.clone());
    let orchestrator = Arc::new(build_orchestrator(config.clone()));
    info!(
        provider = %provider,
        fallback = %config.orchestrator.fallback_provider,
        framework = %config.orchestrator.framework,
        daily_limit = config.usage.daily_limit,
        "Chat session started"
    );

    let _poller = spawn_reset_poller(
        orchestrator.memory(),
        Duration::from_secs(config.memory.poll_interval_secs.max(1)),
        Some(orchestrator.events()),
    );
    spawn_event_printer(&orchestrator);

    let mut session = Session {
        orchestrator,
        mode: options.mode,
        provider,
        pending: Vec::new(),
    };

    if let Some(message) = options.message {
        return session.send(&message).await;
    }

    println!();
    println!("  Forgeline - Interactive Mode");
    println!("  ============================");
    println!();
    println!("  Provider:   {}", session.provider);
    println!("  Fallback:   {}", config.orchestrator.fallback_provider);
    println!("  Framework:  {}", config.orchestrator.framework);
    println!(
        "  Mode:       {}",
        session.mode.map(|m| m.to_string()).unwrap_or_else(|| "auto".into())
    );
    println!();
    println!("  Ask a question, describe a site to build, or type 'gambar' to draw.");
    println!("  Type /help for session commands, 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt()?;
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }

        let outcome = match line.strip_prefix('/') {
            Some(command) => session.command(command).await,
            None => session.send(line).await,
        };
        if let Err(e) = outcome {
            warn!(error = %e, "Chat input failed");
            eprintln!("  [Error] {e}");
        }
        println!();
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn build_orchestrator(config: AppConfig) -> Orchestrator {
    let router = forgeline_providers::build_from_config(&config);
    let usage = match config.usage.daily_limit {
        0 => DailyUsageLedger::unlimited(),
        limit => DailyUsageLedger::new(limit),
    };
    Orchestrator::new(config, router)
        .with_session_store(Arc::new(InMemorySessionStore::new()))
        .with_usage_tracker(Arc::new(usage))
}

/// Surface escalations and resets while a request runs.
fn spawn_event_printer(orchestrator: &Orchestrator) {
    let mut rx = orchestrator.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event.as_ref() {
                DomainEvent::Escalated {
                    from_provider,
                    to_provider,
                    reason,
                    ..
                } => eprintln!("  [fallback] {from_provider} -> {to_provider}: {reason}"),
                DomainEvent::MemoryReset { reason, .. } => {
                    eprintln!("  [memory] conversation cleared ({reason})")
                }
                DomainEvent::CollaboratorError {
                    context,
                    error_message,
                    ..
                } => eprintln!("  [warning] {context}: {error_message}"),
                _ => {}
            }
        }
    });
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

struct Session {
    orchestrator: Arc<Orchestrator>,
    mode: Option<Mode>,
    provider: String,
    pending: Vec<Attachment>,
}

impl Session {
    async fn send(&mut self, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut input = SubmitInput::new(text)
            .with_provider(self.provider.clone())
            .with_attachments(std::mem::take(&mut self.pending));
        if let Some(mode) = self.mode {
            input = input.with_mode(mode);
        }

        eprint!("  ...");
        let submit = self.orchestrator.submit(input);
        tokio::pin!(submit);
        let generation = loop {
            tokio::select! {
                outcome = &mut submit => break outcome,
                _ = tokio::signal::ctrl_c() => {
                    if self.orchestrator.cancel() {
                        eprint!("\r  cancelling...");
                    }
                }
            }
        };
        eprint!("\r     \r");

        let generation = generation?;
        render(&generation);
        Ok(())
    }

    async fn command(&mut self, command: &str) -> Result<(), Box<dyn std::error::Error>> {
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        debug!(command = name, arg, "Session command");

        match name {
            "help" => print_help(),
            "files" => {
                let files = self.orchestrator.files();
                let files = files.lock().await;
                if files.is_empty() {
                    println!("  (no files yet)");
                }
                for file in files.all_files() {
                    let marker = if files.entry() == Some(file.path.as_str()) { "*" } else { " " };
                    println!("  {marker} {} ({} bytes)", file.path, file.content.len());
                }
            }
            "versions" => {
                let versions = self.orchestrator.versions().all_versions().await?;
                if versions.is_empty() {
                    println!("  (no versions yet)");
                }
                for version in versions {
                    println!(
                        "  #{:<3} {}  {} file(s)  {}",
                        version.id,
                        version.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        version.files.len(),
                        version.message
                    );
                }
            }
            "restore" => {
                let id: u64 = arg.parse().map_err(|_| format!("usage: /restore <version id>, got '{arg}'"))?;
                if self.orchestrator.restore_version(id).await? {
                    println!("  Restored version #{id}");
                } else {
                    println!("  No version #{id}");
                }
            }
            "entry" => {
                let files = self.orchestrator.files();
                files.lock().await.set_entry(arg)?;
                println!("  Entry set to {arg}");
            }
            "export" => {
                let dir = if arg.is_empty() {
                    AppConfig::projects_dir().join("latest")
                } else {
                    PathBuf::from(arg)
                };
                let files = self.orchestrator.files();
                let count = export_project(&*files.lock().await, &dir)?;
                println!("  Wrote {count} file(s) to {}", dir.display());
            }
            "attach" => {
                let content = std::fs::read_to_string(arg).map_err(|e| format!("cannot read '{arg}': {e}"))?;
                let name = Path::new(arg)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| arg.to_string());
                self.pending.push(Attachment::new("document", name.clone(), content));
                println!("  Attached {name} to your next message");
            }
            "mode" => {
                self.mode = match arg {
                    "" | "auto" => None,
                    other => Some(other.parse::<Mode>()?),
                };
                println!(
                    "  Mode: {}",
                    self.mode.map(|m| m.to_string()).unwrap_or_else(|| "auto".into())
                );
            }
            "provider" => {
                if !arg.is_empty() {
                    self.provider = arg.to_string();
                }
                println!("  Provider: {}", self.provider);
            }
            "clear" => {
                self.orchestrator.memory().lock().await.clear();
                println!("  Conversation memory cleared");
            }
            other => return Err(format!("unknown command '/{other}', try /help").into()),
        }
        Ok(())
    }
}

fn render(generation: &Generation) {
    match &generation.result {
        GenerationResult::Text { content } => print_block("Assistant", content),
        GenerationResult::SingleFile { explanation, .. } => {
            if let Some(explanation) = explanation {
                print_block("Assistant", explanation);
            }
            println!("  [builder] updated index.html{}", version_suffix(generation));
        }
        GenerationResult::MultiFile { files, entry_path } => {
            println!(
                "  [builder] {} file(s), entry {entry_path}{}",
                files.len(),
                version_suffix(generation)
            );
            for file in files {
                println!("    {}", file.path);
            }
        }
        GenerationResult::CanvasReady => {
            println!("  [canvas] Canvas ready. Draw, then tell me what to do with it.");
        }
        GenerationResult::Error { message, .. } => print_block("Error", message),
    }

    if let Some(provider) = &generation.provider
        && generation.hops > 0
    {
        println!("  (answered by {provider} after {} escalation(s))", generation.hops);
    }
    if generation.mode == Mode::Builder && generation.result.is_error() {
        for line in &generation.log {
            println!("  | {line}");
        }
    }
}

fn version_suffix(generation: &Generation) -> String {
    generation
        .version
        .map(|v| format!(" (version #{v})"))
        .unwrap_or_default()
}

fn print_block(label: &str, text: &str) {
    println!();
    for line in text.lines() {
        println!("  {label} > {line}");
    }
}

fn print_help() {
    println!("  /files             list project files (* marks the entry)");
    println!("  /versions          list saved versions, newest first");
    println!("  /restore <id>      restore a saved version");
    println!("  /entry <path>      set the project entry file");
    println!("  /export [dir]      write the project to disk");
    println!("  /attach <path>     attach a text file to the next message");
    println!("  /mode <mode>       tutor, builder, canvas or auto");
    println!("  /provider <name>   switch the primary provider");
    println!("  /clear             forget the conversation so far");
}

/// Write every project file under `dir`, creating parent directories.
///
/// Paths that would escape `dir` are rejected.
fn export_project(files: &VirtualFileManager, dir: &Path) -> std::io::Result<usize> {
    let mut written = 0;
    for file in files.all_files() {
        let relative = Path::new(&file.path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            warn!(path = %file.path, "Refusing to export a path outside the target directory");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("refusing to export outside the target directory: {}", file.path),
            ));
        }
        let target = dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &file.content)?;
        written += 1;
    }
    info!(dir = %dir.display(), files = written, "Exported project");
    Ok(written)
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hark_core::config::{HarkConfig, InputMode, VALID_LLM_PROVIDERS};
use hark_core::llm::{ChatModel, LlmService};
use hark_core::model::{normalize_label, validate_duration, ActiveTimer};
use hark_core::speech::{audio_format, Transcriber, WhisperService};
use hark_core::storage::{create_backend, SqliteStorage, TimerStore};
use hark_core::CommandService;
use owo_colors::OwoColorize;

#[derive(Parser)]
#[command(name = "hark", about = "Hark: voice command assistant with LLM tool calling", version)]
enum Cli {
    /// Initialize Hark in the current project
    Init {
        /// Chat provider to configure (openai, groq, ollama, openai-compatible)
        #[arg(long, default_value = "openai")]
        provider: String,
    },
    /// Send a typed command to the assistant
    Ask {
        /// Command text, e.g. "set a timer for five minutes"
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Transcribe a recorded command and send it to the assistant
    Listen {
        /// Audio file (wav, mp3, m4a, ogg, webm, flac)
        path: PathBuf,
    },
    /// Inspect or change timers directly, without the model
    #[command(subcommand)]
    Timers(TimersCommand),
    /// Show configuration and store status
    Status,
}

#[derive(Subcommand)]
enum TimersCommand {
    /// List running timers
    List {
        /// Output raw JSON instead of table
        #[arg(long)]
        json: bool,
    },
    /// Start a timer
    Add {
        /// Length in seconds
        seconds: i64,
        /// Optional label
        #[arg(short, long)]
        label: Option<String>,
    },
    /// Cancel a timer by ID
    Cancel {
        /// Timer ID as shown by `hark timers list`
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hark=warn")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let config = HarkConfig::load(Some(&std::env::current_dir()?)).unwrap_or_else(|e| {
        tracing::warn!("failed to load config, using defaults: {e}");
        HarkConfig::default_config()
    });

    run(cli, &config).await
}

async fn run(cli: Cli, config: &HarkConfig) -> Result<()> {
    match cli {
        Cli::Init { provider } => cmd_init(&provider),
        Cli::Ask { text } => {
            let service = make_command_service(config)?;
            cmd_ask(&service, &text.join(" ")).await
        }
        Cli::Listen { path } => {
            let service = make_command_service(config)?;
            cmd_listen(&service, config, &path).await
        }
        Cli::Timers(cmd) => {
            let storage = make_storage(config)?;
            match cmd {
                TimersCommand::List { json } => cmd_timers_list(&storage, json).await,
                TimersCommand::Add { seconds, label } => {
                    cmd_timers_add(&storage, seconds, label.as_deref()).await
                }
                TimersCommand::Cancel { id } => cmd_timers_cancel(&storage, id).await,
            }
        }
        Cli::Status => {
            let storage = make_storage(config)?;
            cmd_status(&storage, config).await
        }
    }
}

fn make_storage(config: &HarkConfig) -> Result<SqliteStorage> {
    create_backend(config).context("failed to open timer store")
}

fn make_command_service(config: &HarkConfig) -> Result<CommandService<LlmService, SqliteStorage>> {
    let llm = LlmService::from_config(&config.llm).context("failed to create LLM client")?;
    let storage = make_storage(config)?;
    Ok(CommandService::new(llm, storage, config.assistant.clone()))
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn cmd_init(provider: &str) -> Result<()> {
    if !VALID_LLM_PROVIDERS.contains(&provider) {
        anyhow::bail!(
            "unknown provider '{}'. Valid options: {}",
            provider,
            VALID_LLM_PROVIDERS.join(", ")
        );
    }

    let cwd = std::env::current_dir()?;
    let hark_dir = cwd.join(".hark");

    if hark_dir.join("config.toml").exists() {
        println!("Hark already initialized in this project.");
        return Ok(());
    }

    std::fs::create_dir_all(&hark_dir)?;

    let mut config = HarkConfig::default_config();
    let (model, note) = match provider {
        "groq" => ("llama-3.3-70b-versatile", "# Set GROQ_API_KEY env var\n"),
        "ollama" => (
            "llama3.2",
            "# Requires Ollama running locally; speech-to-text still needs OPENAI_API_KEY\n",
        ),
        "openai-compatible" => (
            "default",
            "# Set llm.base_url to your server; api_key is optional\n",
        ),
        _ => ("gpt-4o-mini", "# Set OPENAI_API_KEY env var\n"),
    };
    config.llm.provider = provider.to_string();
    config.llm.model = model.to_string();
    if provider == "groq" {
        config.transcription.provider = "groq".to_string();
        config.transcription.model = "whisper-large-v3-turbo".to_string();
    }

    let toml_str = format!("{}{}", note, config.to_toml()?);
    std::fs::write(hark_dir.join("config.toml"), toml_str)?;

    // Keep local overrides (API keys) out of version control
    let gitignore_path = cwd.join(".gitignore");
    let entry = ".hark/config.local.toml";
    if gitignore_path.exists() {
        let contents = std::fs::read_to_string(&gitignore_path)?;
        if !contents.lines().any(|l| l.trim() == entry) {
            let mut appended = contents;
            if !appended.ends_with('\n') {
                appended.push('\n');
            }
            appended.push_str(entry);
            appended.push('\n');
            std::fs::write(&gitignore_path, appended)?;
        }
    } else {
        std::fs::write(&gitignore_path, format!("{entry}\n"))?;
    }

    println!("{}", "Initialized Hark in .hark/".green());
    println!("  {}   .hark/config.toml", "Config:".dimmed());
    println!("  {} {} / {}", "Provider:".dimmed(), provider.cyan(), model);
    println!(
        "  {}",
        "Edit .hark/config.local.toml for local overrides (gitignored)".dimmed()
    );
    println!();
    println!("{}", "Quick Start:".bold());
    println!("  1. Try a command:  {}", "hark ask \"set a timer for 5 minutes\"".cyan());
    println!(
        "  2. Start server:   {} {}  {}",
        "hark-web".cyan(),
        "->".dimmed(),
        format!("http://{}:{}/command", config.web.host, config.web.port).cyan()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// ask / listen
// ---------------------------------------------------------------------------

async fn cmd_ask<M: ChatModel, S: TimerStore>(
    service: &CommandService<M, S>,
    text: &str,
) -> Result<()> {
    let reply = service.process_command(text).await?;
    println!("{reply}");
    Ok(())
}

async fn cmd_listen<M: ChatModel, S: TimerStore>(
    service: &CommandService<M, S>,
    config: &HarkConfig,
    path: &Path,
) -> Result<()> {
    let audio = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("command.wav")
        .to_string();

    let reply = match config.assistant.input_mode {
        InputMode::Transcribe => {
            let stt = WhisperService::from_config(&config.transcription)
                .context("failed to create speech-to-text client")?;
            let transcript = stt.transcribe(audio, &file_name).await?;
            println!("  {} {}", "Heard:".dimmed(), transcript.italic());
            service.process_command(&transcript).await?
        }
        InputMode::Audio => {
            service
                .process_audio_command(audio, audio_format(&file_name)?)
                .await?
        }
    };
    println!("{reply}");
    Ok(())
}

// ---------------------------------------------------------------------------
// timers
// ---------------------------------------------------------------------------

fn timer_json(timer: &ActiveTimer) -> serde_json::Value {
    serde_json::json!({
        "id": timer.id,
        "remaining_seconds": timer.remaining.as_secs_f64().ceil() as u64,
        "remaining": timer.remaining_display(),
        "label": timer.label,
    })
}

async fn cmd_timers_list(storage: &SqliteStorage, json: bool) -> Result<()> {
    let timers = storage
        .list_active()
        .await
        .context("failed to list timers")?;

    if json {
        let entries: Vec<serde_json::Value> = timers.iter().map(timer_json).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if timers.is_empty() {
        println!("No active timers.");
        return Ok(());
    }

    println!(
        "  {}  {}  {}",
        format!("{:<6}", "ID").dimmed(),
        format!("{:<10}", "Remaining").dimmed(),
        "Label".dimmed(),
    );
    println!("{}", "─".repeat(48).dimmed());

    for timer in &timers {
        println!(
            "  {}  {:<10}  {}",
            format!("{:<6}", timer.id).cyan(),
            timer.remaining_display(),
            timer.label.as_deref().unwrap_or("-"),
        );
    }

    println!("{}", "─".repeat(48).dimmed());
    println!(
        "  {} timer{}",
        timers.len(),
        if timers.len() == 1 { "" } else { "s" }
    );

    Ok(())
}

async fn cmd_timers_add(storage: &SqliteStorage, seconds: i64, label: Option<&str>) -> Result<()> {
    let seconds = validate_duration(seconds)?;
    let label = normalize_label(label)?;
    let timer = storage.create(seconds, label).await?;

    let expires = timer.expires_at().with_timezone(&chrono::Local);
    println!(
        "{} timer {} ({}s, ends {})",
        "Started".green(),
        timer.id.to_string().cyan(),
        timer.duration_seconds,
        expires.format("%H:%M:%S"),
    );
    if let Some(label) = &timer.label {
        println!("  {} {}", "Label:".dimmed(), label);
    }
    Ok(())
}

async fn cmd_timers_cancel(storage: &SqliteStorage, id: i64) -> Result<()> {
    if storage.delete(id).await? {
        println!("{} timer {}", "Cancelled".green(), id.to_string().cyan());
        Ok(())
    } else {
        anyhow::bail!("no timer found with ID {id}")
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

async fn cmd_status(storage: &SqliteStorage, config: &HarkConfig) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    println!("{}", format!("Hark Status v{version}").bold());
    println!("  {}      {}", "Store:".dimmed(), storage.path().display());

    match (storage.count().await, storage.list_active().await) {
        (Ok(total), Ok(active)) => println!(
            "  {}     {} active, {} stored",
            "Timers:".dimmed(),
            active.len().to_string().cyan(),
            total
        ),
        (Err(e), _) | (_, Err(e)) => {
            println!("  {}     {} - {}", "Timers:".dimmed(), "unavailable".red(), e)
        }
    }

    match LlmService::from_config(&config.llm) {
        Ok(llm) => println!(
            "  {}        {} / {} ({})",
            "LLM:".dimmed(),
            config.llm.provider.cyan(),
            llm.model_name(),
            llm.base_url()
        ),
        Err(e) => println!(
            "  {}        {} / {} - {}",
            "LLM:".dimmed(),
            config.llm.provider.cyan(),
            config.llm.model,
            e.to_string().yellow()
        ),
    }

    match WhisperService::from_config(&config.transcription) {
        Ok(stt) => println!(
            "  {} {} / {} ({})",
            "Speech-to-text:".dimmed(),
            config.transcription.provider.cyan(),
            config.transcription.model,
            stt.url()
        ),
        Err(e) => println!(
            "  {} {} - {}",
            "Speech-to-text:".dimmed(),
            config.transcription.provider.cyan(),
            e.to_string().yellow()
        ),
    }

    let input_mode = match config.assistant.input_mode {
        InputMode::Transcribe => "transcribe",
        InputMode::Audio => "audio",
    };
    println!("  {} {}", "Input mode:".dimmed(), input_mode);
    println!(
        "  {} {} (bad arguments: {:?})",
        "Max rounds:".dimmed(),
        config.assistant.max_rounds,
        config.assistant.invalid_arguments
    );
    println!(
        "  {}        http://{}:{}",
        "Web:".dimmed(),
        config.web.host,
        config.web.port
    );

    Ok(())
}

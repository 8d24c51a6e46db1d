//! # RaybanAI CLI
//!
//! The `raybanai` binary runs the vision-analysis relay and provides a few
//! operator commands around its data directory.
//!
//! ## Usage
//!
//! ```bash
//! raybanai --config ./raybanai.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `raybanai init` | Create the data directory and seed defaults |
//! | `raybanai serve` | Start the HTTP relay server |
//! | `raybanai history` | Print recorded analyses |
//! | `raybanai prompts list` | List local prompt categories |
//! | `raybanai prompts set <category> <text>` | Write one local prompt entry |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use raybanai::config::{load_settings, ConfigStore, Settings};
use raybanai::history::read_history;
use raybanai::prompts::LocalPromptStore;
use raybanai::store::sqlite::SqliteDocumentStore;

/// RaybanAI: a backend relay that forwards image references to a
/// vision-capable language model and records the analysis.
#[derive(Parser)]
#[command(
    name = "raybanai",
    about = "Vision-analysis relay server",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when the
    /// file is absent.
    #[arg(long, global = true, default_value = "./raybanai.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, seed the prompt mapping and runtime
    /// configuration, and initialize the document-store schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Start the HTTP relay server.
    Serve,

    /// Print recorded analyses from the history log.
    History,

    /// Inspect and edit the local prompt mapping.
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },
}

#[derive(Subcommand)]
enum PromptsAction {
    /// List all categories and their prompt text.
    List,

    /// Insert or overwrite the prompt for one category.
    Set { category: String, text: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&settings).await,
        Commands::Serve => raybanai::server::run_server(settings).await,
        Commands::History => run_history(&settings).await,
        Commands::Prompts { action } => match action {
            PromptsAction::List => run_prompts_list(&settings).await,
            PromptsAction::Set { category, text } => {
                run_prompts_set(&settings, &category, &text).await
            }
        },
    }
}

async fn run_init(settings: &Settings) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&settings.data.dir).await?;

    LocalPromptStore::new(settings.prompts_file())
        .ensure_seeded()
        .await?;

    let config_store = ConfigStore::new(settings.config_file());
    let config = config_store.load().await;
    config_store.save(&config).await?;

    SqliteDocumentStore::connect(&settings.document_store.path).await?;

    println!("initialized data directory at {}", settings.data.dir.display());
    Ok(())
}

async fn run_history(settings: &Settings) -> anyhow::Result<()> {
    match read_history(&settings.log_file()).await? {
        Some(entries) => {
            for entry in &entries {
                let output = entry.model_output.replace('\n', " ");
                println!("{}  {}  {}", entry.timestamp.to_rfc3339(), entry.image_ref, output);
            }
            println!("{} entries", entries.len());
        }
        None => println!("no history recorded yet"),
    }
    Ok(())
}

async fn run_prompts_list(settings: &Settings) -> anyhow::Result<()> {
    let store = LocalPromptStore::new(settings.prompts_file());
    for (category, text) in store.load().await? {
        println!("{}: {}", category, text);
    }
    Ok(())
}

async fn run_prompts_set(settings: &Settings, category: &str, text: &str) -> anyhow::Result<()> {
    let store = LocalPromptStore::new(settings.prompts_file());
    store.set(category, text).await?;
    println!("prompt for '{}' updated", category);
    Ok(())
}

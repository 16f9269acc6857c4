//! # Crisis Harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite database and run schema migrations |
//! | `harvest sources` | List configured adapters and their availability |
//! | `harvest project create` | Create a project in `draft` |
//! | `harvest project list` | List projects |
//! | `harvest project show <id>` | Project details and per-source item counts |
//! | `harvest project archive <id>` | Archive a completed project |
//! | `harvest collect <id>` | Run collection in the foreground (Ctrl-C cancels) |
//! | `harvest pause <id>` | Pause a collecting project |
//! | `harvest status <id>` | Status and collected count |
//! | `harvest items <id>` | Most recent collected items |
//!
//! Logs go to stderr; set `RUST_LOG` (default `info`) to adjust.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crisis_harvest::project_cmd::CreateArgs;
use crisis_harvest::{collect_cmd, config, migrate, project_cmd, sources};

/// Crisis Harvest: collect disaster-related social content for offline analysis.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Collect time-bounded, keyword-filtered social content into a local store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (projects, items, collection_checkpoints). Idempotent.
    Init,

    /// List configured adapters and whether they are available.
    Sources,

    /// Create, list, inspect and archive projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Collect a project's sources.
    ///
    /// Starts from `draft`, or continues a `paused` project from the first
    /// source it had not finished. Ctrl-C cancels after the in-flight fetch.
    Collect {
        /// Project UUID.
        id: String,

        /// Progress output on stderr: `off`, `human` or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Pause a collecting project.
    ///
    /// Also recovers a project left `collecting` by a crash or cancel.
    Pause {
        /// Project UUID.
        id: String,
    },

    /// Show a project's collection status.
    Status {
        /// Project UUID.
        id: String,
    },

    /// List collected items, most recently published first.
    Items {
        /// Project UUID.
        id: String,

        /// Only items from this source.
        #[arg(long)]
        source: Option<String>,

        /// Maximum number of items to print.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project.
    Create {
        #[arg(long)]
        name: String,

        /// Target event label (e.g. `typhoon`, `flood`).
        #[arg(long)]
        event: String,

        #[arg(long)]
        region: String,

        /// First day of the collection window (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// Last day of the collection window (YYYY-MM-DD), inclusive.
        #[arg(long)]
        end: String,

        /// Keyword to match; repeat for several.
        #[arg(long = "keyword", required = true)]
        keywords: Vec<String>,

        /// Source id (adapter name) to collect from; repeat for several.
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
    },
    /// List projects.
    List,
    /// Show one project.
    Show {
        /// Project UUID.
        id: String,
    },
    /// Archive a completed project.
    Archive {
        /// Project UUID.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Project { action } => match action {
            ProjectAction::Create {
                name,
                event,
                region,
                start,
                end,
                keywords,
                sources,
            } => {
                project_cmd::run_create(
                    &cfg,
                    CreateArgs {
                        name,
                        event,
                        region,
                        start,
                        end,
                        keywords,
                        sources,
                    },
                )
                .await?;
            }
            ProjectAction::List => project_cmd::run_list(&cfg).await?,
            ProjectAction::Show { id } => project_cmd::run_show(&cfg, &id).await?,
            ProjectAction::Archive { id } => project_cmd::run_archive(&cfg, &id).await?,
        },
        Commands::Collect { id, progress } => {
            collect_cmd::run_collect(&cfg, &id, progress).await?;
        }
        Commands::Pause { id } => {
            project_cmd::run_pause(&cfg, &id).await?;
        }
        Commands::Status { id } => {
            project_cmd::run_status(&cfg, &id).await?;
        }
        Commands::Items { id, source, limit } => {
            project_cmd::run_items(&cfg, &id, source, limit).await?;
        }
    }

    Ok(())
}

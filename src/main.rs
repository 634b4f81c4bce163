//! # Agent Catalog CLI (`agentc`)
//!
//! ## Usage
//!
//! ```bash
//! agentc --config ./agentc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `agentc index` | Build the local tool and prompt catalogs |
//! | `agentc find "<query>"` | Search a catalog by description |
//! | `agentc find --name <name>` | Look an item up by name |
//! | `agentc publish` | Push local catalogs to the remote store |
//! | `agentc ls` | List the items of each catalog |
//! | `agentc status` | Show catalog versions and item counts |
//! | `agentc clean` | Delete local catalog files |
//! | `agentc completions <shell>` | Print shell completions |

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use agent_catalog::config;
use agent_catalog::find_cmd::{self, FindArgs};
use agent_catalog::index_cmd::{self, IndexArgs};
use agent_catalog::ls_cmd;
use agent_catalog::progress::ProgressMode;
use agent_catalog::publish_cmd::{self, parse_key_val};
use agent_catalog::secrets::SecretsProvider;
use agent_catalog::status;
use agent_catalog_core::models::CatalogKind;

/// Agent Catalog CLI: index, version, and search agent tools and prompts.
#[derive(Parser)]
#[command(
    name = "agentc",
    about = "Agent Catalog: index, version, and search agent tools and prompts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "./agentc.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Tool,
    Prompt,
}

impl From<KindArg> for CatalogKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Tool => CatalogKind::Tool,
            KindArg::Prompt => CatalogKind::Prompt,
        }
    }
}

fn kinds(args: &[KindArg]) -> Vec<CatalogKind> {
    args.iter().map(|&k| k.into()).collect()
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the local catalogs.
    ///
    /// Scans the source directories, extracts tool and prompt descriptors,
    /// reuses embeddings of unchanged items from the previous catalog, and
    /// embeds the rest. The catalog file is only written when the whole
    /// build succeeds.
    Index {
        /// Source directories. Defaults to `catalog.source_dirs`.
        dirs: Vec<PathBuf>,

        /// Catalog kind to build (repeatable). Defaults to both.
        #[arg(long = "kind", value_enum)]
        kinds: Vec<KindArg>,

        /// Scan and merge only; report what would be embedded.
        #[arg(long)]
        dry_run: bool,

        /// Error budget; zero or less means no limit.
        #[arg(long, allow_negative_numbers = true)]
        max_errs: Option<i64>,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressArg,
    },

    /// Search a catalog.
    Find {
        /// Natural-language description of what you need.
        query: Option<String>,

        /// Exact item name; skips vector search.
        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_enum, default_value = "tool")]
        kind: KindArg,

        /// Maximum results; zero or less means no limit.
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        limit: i64,

        /// Annotation filter, e.g. `gdpr="true" AND region="eu"`.
        #[arg(long)]
        annotations: Option<String>,

        /// Remote snapshot to search (`__LATEST__` for the newest).
        #[arg(long)]
        snapshot: Option<String>,

        /// Trim results to the closest cluster.
        #[arg(long)]
        refine: bool,

        /// Search only the remote catalog.
        #[arg(long)]
        db: bool,

        /// Search only the local catalog.
        #[arg(long)]
        local: bool,
    },

    /// Publish local catalogs to the remote store.
    Publish {
        #[arg(long = "kind", value_enum)]
        kinds: Vec<KindArg>,

        /// Snapshot annotation as `key=value` (repeatable).
        #[arg(long = "annotation", value_parser = parse_key_val)]
        annotations: Vec<(String, String)>,
    },

    /// List catalog items by kind.
    Ls {
        #[arg(long = "kind", value_enum)]
        kinds: Vec<KindArg>,

        /// List the latest remote snapshot even if a local catalog exists.
        #[arg(long)]
        db: bool,
    },

    /// Show catalog versions, item counts, and models.
    Status {
        #[arg(long = "kind", value_enum)]
        kinds: Vec<KindArg>,
    },

    /// Delete local catalog files.
    Clean {
        #[arg(long = "kind", value_enum)]
        kinds: Vec<KindArg>,
    },

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "agent_catalog=debug,agent_catalog_core=debug"
    } else {
        "agent_catalog=info,agent_catalog_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "agentc", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_or_default(&cli.config)?;
    let secrets = SecretsProvider::from_env(&cfg.secrets.from_env);

    match cli.command {
        Commands::Index {
            dirs,
            kinds: kind_args,
            dry_run,
            max_errs,
            progress,
        } => {
            let args = IndexArgs {
                dirs,
                kinds: kinds(&kind_args),
                dry_run,
                max_errs,
                progress: progress.into(),
            };
            index_cmd::run_index(&cfg, &secrets, args).await?;
        }
        Commands::Find {
            query,
            name,
            kind,
            limit,
            annotations,
            snapshot,
            refine,
            db,
            local,
        } => {
            let args = FindArgs {
                query,
                name,
                kind: kind.into(),
                limit,
                annotations,
                snapshot,
                refine,
                db,
                local,
            };
            find_cmd::run_find(&cfg, &secrets, args).await?;
        }
        Commands::Publish {
            kinds: kind_args,
            annotations,
        } => {
            publish_cmd::run_publish(&cfg, &kinds(&kind_args), annotations).await?;
        }
        Commands::Ls {
            kinds: kind_args,
            db,
        } => {
            ls_cmd::run_ls(&cfg, &secrets, &kinds(&kind_args), db).await?;
        }
        Commands::Status { kinds: kind_args } => {
            status::run_status(&cfg, &secrets, &kinds(&kind_args)).await?;
        }
        Commands::Clean { kinds: kind_args } => {
            index_cmd::run_clean(&cfg, &kinds(&kind_args))?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

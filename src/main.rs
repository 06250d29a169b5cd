//! tagvote - Community tag governance

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagvote::{
    config::Config,
    db::{self, DatabasePool},
    models::DocumentId,
    services::{Governance, ReplayOptions},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Resolve every pending request that meets the voting threshold
    Sweep,
    /// Re-apply active approved rules after a tag regeneration
    Replay {
        /// Only replay rules of this tag category
        #[arg(long)]
        category: Option<String>,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// List pending requests, most voted first
    Pending {
        /// Only requests on this document
        #[arg(long)]
        document: Option<i64>,
    },
    /// Show the stored voting configuration
    Config,
    /// Show a document's view counters
    Views {
        /// Internal document id
        #[arg(long)]
        document: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagvote=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::load_with_env(&cli.config)?;
    tracing::info!("Configuration loaded from {}", cli.config.display());

    let pool = db::create_pool(&config.database).await?;
    let pending_migrations = db::migrations::pending_count(&pool).await?;
    db::migrations::run_migrations(&pool).await?;

    let gov = Governance::new(pool.clone(), config.voting.clone());

    match cli.command {
        Commands::Migrate => {
            tracing::info!("Database migrations completed");
            print_json(&serde_json::json!({ "applied": pending_migrations }))?;
        }
        Commands::Sweep => print_json(&gov.sweep.run_auto_apply_sweep().await?)?,
        Commands::Replay { category, dry_run } => {
            let report = gov
                .replay
                .apply_approved_rules(&ReplayOptions { category, dry_run })
                .await?;
            print_json(&report)?;
        }
        Commands::Pending { document } => {
            let pending = match document {
                Some(id) => gov.requests.get_pending_for_document(DocumentId::new(id)).await?,
                None => gov.requests.get_all_pending().await?,
            };
            print_json(&pending)?;
        }
        Commands::Config => print_json(&gov.voting_config.get().await?)?,
        Commands::Views { document } => {
            print_json(&gov.popularity.stats(DocumentId::new(document)).await?)?
        }
    }

    pool.close().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

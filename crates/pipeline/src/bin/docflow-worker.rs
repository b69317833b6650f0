//! docflow-worker -- runs the document pipeline until interrupted.
//!
//! Jobs:
//! - `discover-documents` registers new files from the source directories
//! - `render-previews` rasterizes pages to preview images
//! - `extract-text` runs OCR over the previews
//! - `analyze-documents` sends the text to the configured LLM backend

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use docflow_core::{config, Config, ItemId};
use docflow_pipeline::{reset_item, Pipeline};
use docflow_store::{ItemStore, SharedItemStore, SqliteItemStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Document pipeline worker: discovery, preview rendering, OCR and analysis.
#[derive(Parser, Debug)]
#[command(name = "docflow-worker", version, about)]
struct Cli {
    /// Configuration profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "DOCFLOW_PROFILE", default_value = "")]
    profile: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until Ctrl-C (default).
    Run,
    /// Clear an item's text and analysis so it is processed again.
    Reset {
        /// Item id as shown by `list`.
        id: ItemId,
    },
    /// Print every item as one JSON object per line.
    List,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::for_profile(&cli.profile);
    config.prepare_dirs()?;

    let db_path = config.storage.database_path();
    let store: SharedItemStore = Arc::new(
        SqliteItemStore::open(&db_path)
            .await
            .with_context(|| format!("opening item store at {}", db_path.display()))?,
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, store).await,
        Command::Reset { id } => {
            reset_item(store.as_ref(), id).await?;
            println!("item {id} reset");
            Ok(())
        }
        Command::List => {
            for item in store.list().await? {
                println!("{}", serde_json::to_string(&item)?);
            }
            Ok(())
        }
    }
}

async fn run(config: &Config, store: SharedItemStore) -> anyhow::Result<()> {
    config.log_summary();

    let pipeline = Pipeline::from_config(config, store)?;
    pipeline.start()?;
    info!("docflow-worker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;

    info!("Shutdown signal received");
    pipeline.stop();
    Ok(())
}

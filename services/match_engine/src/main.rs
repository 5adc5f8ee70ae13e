use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::{fs::File, path::PathBuf, sync::Arc};
use tracing::{info, warn};

use match_engine::{
    config::EngineConfig,
    export::write_minutes_csv,
    logging,
    store::{InMemoryStore, MatchRepository, PgStore},
    types::MatchId,
    web::{self, AppState},
    MatchService,
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind, overrides MATCH_ENGINE_BIND
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Create the match engine tables in DATABASE_URL
    InitDb,
    /// Write a match's minutes ledger to a CSV file
    ExportMinutes {
        #[arg(short, long)]
        match_id: String,
        #[arg(short, long)]
        output: PathBuf,
        /// Minute that open intervals are counted up to
        #[arg(long)]
        at: Option<u32>,
    },
    /// Rebuild a match's score from its goal events
    RecomputeScore {
        #[arg(short, long)]
        match_id: String,
    },
}

async fn open_repository(config: &EngineConfig) -> Result<Arc<dyn MatchRepository>> {
    if config.database.url.is_some() {
        return open_database(config, "serve").await;
    }
    warn!("DATABASE_URL not set, matches are kept in memory only");
    Ok(Arc::new(InMemoryStore::new()))
}

/// Commands that read an existing match need a persistent store.
async fn open_database(config: &EngineConfig, command: &str) -> Result<Arc<dyn MatchRepository>> {
    let Some(url) = &config.database.url else {
        bail!("DATABASE_URL must be set for {command}, an in-memory store holds no matches");
    };
    let store = PgStore::connect(&config.database, url)
        .await
        .context("connecting to DATABASE_URL")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    match cli.command {
        Commands::Serve { bind } => {
            let repo = open_repository(&config).await?;
            let service = MatchService::new(repo, config.rules.clone());
            let state = AppState {
                service,
                require_principal: config.server.require_principal,
            };
            let bind_addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
            web::serve(state, &bind_addr).await?;
        }
        Commands::InitDb => {
            let Some(url) = &config.database.url else {
                bail!("DATABASE_URL must be set to initialise the schema");
            };
            let store = PgStore::connect(&config.database, url).await?;
            store.init_schema().await?;
        }
        Commands::ExportMinutes {
            match_id,
            output,
            at,
        } => {
            let repo = open_database(&config, "export-minutes").await?;
            let service = MatchService::new(repo, config.rules.clone());
            let report = service.minutes_report(&MatchId::new(match_id), at).await?;
            let file = File::create(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            let rows = write_minutes_csv(&report, file)?;
            info!("Wrote {} intervals to {:?}", rows, output);
        }
        Commands::RecomputeScore { match_id } => {
            let repo = open_database(&config, "recompute-score").await?;
            let service = MatchService::new(repo, config.rules.clone());
            let view = service.recompute_score(&MatchId::new(match_id)).await?;
            println!(
                "{}: {} - {}",
                view.state.id, view.state.score_home, view.state.score_away
            );
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use arachne_core::crawl::CrawlStore;
use arachne_core::queue::JobQueue;
use arachne_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "arachne", version, about = "Arachne scraping service ops tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect queue jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Inspect and manage crawls
    Crawl {
        #[command(subcommand)]
        command: CrawlCommands,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Show a job's observable state
    State { id: Uuid },

    /// Dump the full job record as JSON
    Get { id: Uuid },
}

#[derive(Subcommand)]
enum CrawlCommands {
    /// Show crawl progress (done / total child jobs)
    Status { id: Uuid },

    /// Cancel a crawl
    Cancel { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let db = Database::connect(&DatabaseConfig::from_env()?)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Job { command } => match command {
            JobCommands::State { id } => {
                let state = db.job_queue().state(id).await?;
                println!("{state}");
            }
            JobCommands::Get { id } => match db.job_queue().get(id).await? {
                Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
                None => anyhow::bail!("Job not found: {id}"),
            },
        },
        Commands::Crawl { command } => match command {
            CrawlCommands::Status { id } => {
                let store = db.crawl_store();
                let Some(crawl) = store.get_crawl(id).await? else {
                    anyhow::bail!("Crawl not found: {id}");
                };
                let total = store.get_crawl_jobs(id).await?.len();
                let done = store.get_done_length(id).await?;
                let expiry = store.get_expiry(id).await?;

                println!("origin:     {}", crawl.origin_url);
                println!("team:       {}", crawl.team_id);
                println!("progress:   {done}/{total}");
                println!("cancelled:  {}", crawl.cancelled);
                if let Some(expiry) = expiry {
                    println!("expires at: {expiry}");
                }
            }
            CrawlCommands::Cancel { id } => {
                let store = db.crawl_store();
                if store.get_crawl(id).await?.is_none() {
                    anyhow::bail!("Crawl not found: {id}");
                }
                store.cancel(id).await?;
                println!("Crawl {id} cancelled");
            }
        },
    }

    Ok(())
}

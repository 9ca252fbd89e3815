use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "marketpipe")]
#[command(about = "Market data ingestion pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one producer tick: fetch candles and write them to the stream
    Produce {
        /// Skip the stream write and report what would have been sent
        #[arg(long)]
        dry_run: bool,
    },
    /// Provision the stream processor: create the job, attach logging,
    /// issue the one-time start
    Deploy,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketpipe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Produce { dry_run } => {
            marketpipe::cli::produce::run(dry_run.then_some(true)).await?;
        }
        Commands::Deploy => {
            marketpipe::cli::deploy::run().await?;
        }
    }

    Ok(())
}

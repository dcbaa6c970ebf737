use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use video_relay::state::StateStore;

#[derive(Parser)]
#[command(name = "state-inspector")]
#[command(about = "Relay state inspection utility")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = ".video_relay_state")]
    state_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cursor position and collection sizes
    Stats,
    /// List processed fingerprints
    Processed,
    /// List failure records with their reasons
    Failed,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();
    let store = StateStore::open(cli.state_dir).await?;

    match cli.command {
        Commands::Stats => {
            let cursor = store.cursor();
            info!("📊 Relay state:");
            info!("  Cursor offset: {}", cursor.offset);
            info!("  Last updated: {}", cursor.last_updated);
            info!("  Total processed (advisory): {}", cursor.total_processed);
            info!("  Processed fingerprints: {}", store.processed_fingerprints().len());
            info!("  Failure records: {}", store.failed_records().len());
        }

        Commands::Processed => {
            let fingerprints = store.processed_fingerprints();
            if fingerprints.is_empty() {
                info!("📭 No processed videos");
                return Ok(());
            }

            info!("✅ {} processed videos:", fingerprints.len());
            for fingerprint in fingerprints {
                info!("  {}", fingerprint);
            }
        }

        Commands::Failed => {
            let records = store.failed_records();
            if records.is_empty() {
                info!("📭 No failure records");
                return Ok(());
            }

            info!("❌ {} failure records:", records.len());
            for record in records {
                let when = record
                    .failed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown time".to_string());
                info!("  {} - {} at {}", record.fingerprint, record.reason, when);
                if let Some(error) = &record.raw_error {
                    info!("    error: {}", error);
                }
            }
        }
    }

    Ok(())
}

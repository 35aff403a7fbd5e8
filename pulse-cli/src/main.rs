//! pulse-cli — operator frontend for the Pulse telemetry pipeline.
//!
//! # Subcommands
//! - `enable` / `disable`     — toggle local collection
//! - `track <event>`          — record one usage event locally
//! - `submit`                 — manual submit-now; reports success/failure
//! - `status`                 — show ingestion server health
//! - `stats`                  — show aggregate server statistics

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pulse_client::TelemetryClient;
use pulse_core::models::EventType;
use pulse_core::ClientConfig;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

#[derive(Debug, Parser)]
#[command(
    name = "pulse-cli",
    version,
    about = "Pulse anonymous usage telemetry CLI"
)]
struct Cli {
    /// Ingestion server URL (overrides PULSE_SERVER_URL env var)
    #[arg(long, env = "PULSE_SERVER_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Local data directory (defaults to the platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Enable local telemetry collection
    Enable,

    /// Disable collection and delete local data
    Disable,

    /// Record one usage event locally
    Track {
        /// Event type, e.g. thought_created or graph_opened
        #[arg(value_parser = parse_event_type)]
        event: EventType,
    },

    /// Submit the pending batch now
    Submit,

    /// Show ingestion server health
    Status,

    /// Show aggregate server statistics
    Stats,
}

fn parse_event_type(raw: &str) -> Result<EventType, String> {
    EventType::parse_wire(raw).ok_or_else(|| {
        let known: Vec<&str> = EventType::ALL.iter().map(|e| e.as_wire()).collect();
        format!("unknown event type '{}' (expected one of: {})", raw, known.join(", "))
    })
}

fn make_client(cli: &Cli) -> anyhow::Result<TelemetryClient> {
    let config = ClientConfig {
        endpoint: cli.server.clone(),
        data_dir: cli.data_dir.clone(),
        ..Default::default()
    };
    TelemetryClient::new(
        config,
        env!("CARGO_PKG_VERSION").to_string(),
        "cli".to_string(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Enable => {
            make_client(&cli)?.enable()?;
            println!("Telemetry enabled");
        }
        Commands::Disable => {
            make_client(&cli)?.disable()?;
            println!("Telemetry disabled, local data deleted");
        }
        Commands::Track { event } => {
            let client = make_client(&cli)?;
            client.track_event(*event, None);
            println!("Recorded {}", event.as_wire());
        }
        Commands::Submit => {
            let client = make_client(&cli)?;
            match client.submit_now().await {
                Ok(response) => println!(
                    "Submission accepted: {} events processed (record {})",
                    response.events_processed, response.file_id
                ),
                Err(e) => {
                    eprintln!("Submission failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Status => {
            let body = fetch_json(&cli.server, "/api/health").await?;
            println!(
                "{} — service {} v{}",
                body["status"].as_str().unwrap_or("unknown"),
                body["service"].as_str().unwrap_or("?"),
                body["version"].as_str().unwrap_or("?")
            );
        }
        Commands::Stats => {
            let body = fetch_json(&cli.server, "/api/stats").await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

async fn fetch_json(server: &str, path: &str) -> anyhow::Result<serde_json::Value> {
    let url = format!("{}{}", server.trim_end_matches('/'), path);
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("requesting {}", url))?;
    anyhow::ensure!(
        response.status().is_success(),
        "server returned {}",
        response.status()
    );
    Ok(response.json().await?)
}

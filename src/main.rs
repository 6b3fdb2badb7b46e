//! `locus` command line: run the backend, scan for places, or check a config file.

use anyhow::Context;
use clap::{Parser, Subcommand};
use locus::config::Config;
use locus::places::{PlacesFetcher, DEFAULT_RADIUS_M};
use locus::server::{self, Server};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Exit code for "could not reach any places provider".
const EXIT_SIGNAL_LOST: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "locus", version, about = "Rate-limited nearby-places backend")]
struct Cli {
    /// Config file (default: ./locus.toml if present)
    #[arg(short, long, global = true, env = "LOCUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP backend
    Serve {
        /// Listen address, overrides `server.bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Fetch nearby places through the backend, falling back to the provider
    Scan {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Search radius in meters
        #[arg(long, default_value_t = DEFAULT_RADIUS_M)]
        radius: u32,
    },
    /// Load and validate the config, then print the effective values
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
                config.validate().context("invalid --bind")?;
            }
            locus::telemetry::init(&config.log);
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Scan { lat, lon, radius } => {
            locus::telemetry::init(&config.log);
            scan(&config, lat, lon, radius).await
        }
        Commands::CheckConfig => {
            print!("{}", config.to_redacted_toml()?);
            eprintln!("configuration OK");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let client = server::http_client().context("building HTTP client")?;
    let Server { router, store, clock } = Server::from_config(&config, client)?;
    let sweeper = server::spawn_sweeper(
        store,
        clock,
        config.limits.sweep_interval(),
        config.limits.idle_ttl(),
    );

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(target: "locus::server", %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(target: "locus::server", error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    sweeper.abort();
    info!(target: "locus::server", "shut down");
    Ok(())
}

async fn scan(config: &Config, lat: f64, lon: f64, radius: u32) -> anyhow::Result<ExitCode> {
    let client = server::http_client().context("building HTTP client")?;
    let fetcher = PlacesFetcher::from_config(config, client)?;

    match fetcher.fetch_nearby(lat, lon, radius).await {
        Ok(places) if places.is_empty() => {
            println!("No places found within {} m.", radius);
            Ok(ExitCode::SUCCESS)
        }
        Ok(places) => {
            for place in &places.features {
                let p = &place.properties;
                println!("{:<40} {:>10.5} {:>11.5}  {}", place.label(), p.lat, p.lon, p.place_id);
            }
            println!("{} places", places.len());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_validation() => Err(e).context("invalid scan request"),
        Err(e) => {
            eprintln!("Signal lost: {}", e);
            Ok(ExitCode::from(EXIT_SIGNAL_LOST))
        }
    }
}

mod api;
mod config;
mod error;
mod extract;
mod layout;
mod replica;
mod run;
mod units;

use clap::{Parser, ValueEnum};
use config::PullerConfig;
use layout::OutputLayout;
use std::path::PathBuf;

/// A Rust CLI tool that pulls labeled video-quality time-series windows from
/// a telemetry platform: discover sessions, resolve the labeled measurement
/// window, download the raw series, align it to wall-clock time, and archive
/// the filtered result per flow.
#[derive(Parser, Debug)]
#[command(name = "tspull", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "tspull.toml")]
    config: PathBuf,

    /// Discovery variant: sessions API or replica database
    #[arg(long, value_enum, default_value = "api")]
    source: Source,

    /// Flow name to pull (repeatable; overrides config)
    #[arg(short, long = "flow", value_name = "NAME")]
    flows: Vec<String>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (label selection, per-session details)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Source {
    /// Sessions-list endpoint filtered by flow tag, passed sessions only
    Api,
    /// Replica database join over a trailing time window
    Db,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "tspull=debug"
    } else if cli.quiet {
        "tspull=warn"
    } else {
        "tspull=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.parse().unwrap()),
        )
        .with_target(false)
        .init();

    tracing::info!("tspull starting");

    let mut cfg = match PullerConfig::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(1);
        }
    };
    if !cli.flows.is_empty() {
        cfg.discovery.flows = cli.flows.clone();
    }

    if cli.dry_run {
        println!("tspull v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file:  {}", cli.config.display());
        println!("Source:       {:?}", cli.source);
        println!("Base URL:     {}", cfg.api.base_url);
        println!("Metric:       {}", cfg.metric.category);
        println!("Flows:        {:?}", cfg.discovery.flows);
        println!("Output root:  {}", cfg.output.root.display());
        println!("Dry run mode — config validated, not running.");
        return;
    }

    if cfg.discovery.flows.is_empty() {
        tracing::error!("no flows configured (set [discovery] flows or pass --flow)");
        std::process::exit(1);
    }
    if cfg.api.access_token.is_empty() {
        tracing::error!(
            "no access token configured (set [api] access_token or {})",
            config::TOKEN_ENV_VAR
        );
        std::process::exit(1);
    }

    let api = match api::TelemetryApi::new(&cfg) {
        Ok(api) => api,
        Err(e) => {
            tracing::error!(error = %e, "failed to build API client");
            std::process::exit(1);
        }
    };
    let layout = OutputLayout::new(cfg.output.root.clone());

    let summary = match cli.source {
        Source::Api => run::run_api_discovery(&cfg, &api, &layout).await,
        Source::Db => {
            if cfg.replica.url.is_empty() {
                tracing::error!("database discovery selected but [replica] url is not configured");
                std::process::exit(1);
            }
            let db = match replica::ReplicaDb::connect(&cfg.replica.url).await {
                Ok(db) => db,
                Err(e) => {
                    tracing::error!(error = %e, "failed to connect to replica");
                    std::process::exit(1);
                }
            };
            run::run_db_discovery(&cfg, &api, &db, &layout).await
        }
    };

    tracing::info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        "processing complete"
    );
}

mod config;
mod engine;
mod error;
mod ml;
mod realtime;
mod scoring;
mod tracker;
mod types;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Settings;
use engine::ForecastEngine;
use error::ForecastError;
use ml::features::series_features;
use ml::ModelKind;
use tracker::AccuracyFilter;
use types::{EventRequest, PredictRequest, RiskRequest};

#[derive(Parser)]
#[command(name = "forecast-core")]
#[command(version = "0.1.0")]
#[command(about = "Serve market forecasts and risk/event scores, and track prediction accuracy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to forecast.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which models and scorers are loaded
    Models,
    /// Forecast with one model
    Predict {
        /// lstm, arima, sarima or lightgbm
        #[arg(short, long)]
        model: String,
        /// Comma-separated closing prices or features
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        series: Vec<f64>,
        /// Steps ahead for the classical models
        #[arg(long, default_value = "1")]
        horizon: usize,
        /// Build the engineered feature vector from the closes first
        #[arg(long)]
        engineered: bool,
        /// Log the prediction to the tracker under this symbol
        #[arg(long)]
        log_symbol: Option<String>,
    },
    /// Run every model on the same input
    Compare {
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        series: Vec<f64>,
        #[arg(long, default_value = "1")]
        horizon: usize,
    },
    /// Score the risk of a ticker
    Risk {
        #[arg(short, long)]
        ticker: String,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        volume: f64,
        /// Derived from the latest quote when omitted
        #[arg(long, allow_hyphen_values = true)]
        volatility: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        sentiment: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        liquidity: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        event_severity: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        macro_index: Option<f64>,
    },
    /// Score the market impact of a news event
    Event {
        #[arg(long)]
        headline: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(short, long, default_value = "")]
        ticker: String,
        #[arg(long, allow_hyphen_values = true)]
        sentiment: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        volatility: Option<f64>,
    },
    /// Score the built-in sample requests
    Samples,
    /// Fetch the latest quote, falling back to the cache
    Quote {
        symbol: String,
    },
    /// Prediction tracker
    Track {
        #[command(subcommand)]
        command: TrackCommands,
    },
    /// Realtime quote cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum TrackCommands {
    /// Append a prediction to the ledger
    LogPrediction {
        #[arg(short, long)]
        model: String,
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long, allow_hyphen_values = true)]
        predicted: f64,
        #[arg(short, long, allow_hyphen_values = true)]
        actual: Option<f64>,
        /// Unix seconds; defaults to now
        #[arg(short, long)]
        timestamp: Option<i64>,
    },
    /// Record the observed value for a symbol at a timestamp
    LogActual {
        #[arg(short, long)]
        symbol: String,
        /// Unix seconds
        #[arg(short, long)]
        timestamp: i64,
        #[arg(short, long, allow_hyphen_values = true)]
        actual: f64,
    },
    /// Error metrics over resolved predictions
    Accuracy {
        #[arg(short, long)]
        model: Option<String>,
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Every ledger entry in insertion order
    List,
    /// Entries for one symbol
    History {
        symbol: String,
    },
    /// Totals and per-model / per-symbol accuracy
    Stats,
    /// Write the ledger as JSON
    Export {
        #[arg(short, long, default_value = "prediction_tracker.json")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove quotes older than the TTL
    Purge,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective settings
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    init_logging(&settings, cli.verbose)?;
    info!("{} v0.1.0", settings.app.name);

    if let Commands::Config { command: ConfigCommands::Show } = cli.command {
        println!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    let engine = ForecastEngine::new(&settings).await?;

    match run(&engine, cli.command).await {
        Err(e) => match e.downcast_ref::<ForecastError>() {
            Some(fe) if fe.is_caller_error() => {
                error!("Request rejected: {}", fe);
                std::process::exit(2);
            }
            _ => Err(e),
        },
        ok => ok,
    }
}

async fn run(engine: &ForecastEngine, command: Commands) -> Result<()> {
    match command {
        Commands::Models => print_json(&engine.model_report())?,
        Commands::Predict { model, series, horizon, engineered, log_symbol } => {
            let kind: ModelKind = model.parse()?;
            let series = if engineered {
                series_features(&series)
                    .ok_or_else(|| anyhow!("engineered features need at least 10 finite closes"))?
                    .to_array()
                    .to_vec()
            } else {
                series
            };
            let req = PredictRequest { series, horizon };

            match log_symbol {
                Some(symbol) => print_json(&engine.predict_and_log(kind, &symbol, &req).await?)?,
                None => {
                    let value = engine.predict(kind, &req)?;
                    print_json(&serde_json::json!({
                        "model": kind.as_str(),
                        "horizon": horizon,
                        "prediction": value,
                    }))?
                }
            }
        }
        Commands::Compare { series, horizon } => {
            print_json(&engine.compare(&PredictRequest { series, horizon })?)?
        }
        Commands::Risk { ticker, price, volume, volatility, sentiment, liquidity, event_severity, macro_index } => {
            let req = RiskRequest {
                ticker,
                price,
                volume,
                volatility,
                sentiment,
                liquidity,
                event_severity,
                macro_index,
            };
            print_json(&engine.score_risk(&req).await?)?
        }
        Commands::Event { headline, description, ticker, sentiment, volatility } => {
            let req = EventRequest { headline, description, ticker, sentiment, volatility };
            print_json(&engine.score_event(&req)?)?
        }
        Commands::Samples => {
            let mut risk = Vec::new();
            for req in RiskRequest::samples() {
                risk.push(engine.score_risk(&req).await?);
            }
            let events = EventRequest::samples()
                .iter()
                .map(|req| engine.score_event(req))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            print_json(&serde_json::json!({ "risk": risk, "events": events }))?
        }
        Commands::Quote { symbol } => print_json(&engine.quote(&symbol).await?)?,
        Commands::Track { command } => run_track(engine, command).await?,
        Commands::Cache { command: CacheCommands::Purge } => {
            let removed = engine.realtime().cache().purge_expired()?;
            print_json(&serde_json::json!({ "removed": removed }))?
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

async fn run_track(engine: &ForecastEngine, command: TrackCommands) -> Result<()> {
    let tracker = engine.tracker();

    match command {
        TrackCommands::LogPrediction { model, symbol, predicted, actual, timestamp } => {
            let timestamp = timestamp.map(parse_timestamp).transpose()?;
            let entry = tracker
                .log_prediction(&model, &symbol, predicted, actual, timestamp)
                .await?;
            print_json(&entry)?;
        }
        TrackCommands::LogActual { symbol, timestamp, actual } => {
            let resolved = tracker
                .log_actual(&symbol, parse_timestamp(timestamp)?, actual)
                .await?;
            print_json(&serde_json::json!({ "symbol": symbol, "timestamp": timestamp, "resolved": resolved }))?;
        }
        TrackCommands::Accuracy { model, symbol } => {
            let filter = AccuracyFilter { model_name: model, symbol };
            print_json(&tracker.accuracy(&filter).await)?;
        }
        TrackCommands::List => print_json(&tracker.get_all().await)?,
        TrackCommands::History { symbol } => print_json(&tracker.history(&symbol).await)?,
        TrackCommands::Stats => print_json(&tracker.stats().await)?,
        TrackCommands::Export { output } => {
            let count = tracker.export_json(&output).await?;
            info!("Wrote {} entries to {}", count, output.display());
        }
    }

    Ok(())
}

fn init_logging(settings: &Settings, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = if settings.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow!("failed to initialise logging: {}", e))
}

fn parse_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .with_context(|| format!("invalid timestamp {}", secs))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Mahler PnL attribution CLI
//!
//! # Usage
//!
//! ```bash
//! # Attribute a backtest run (positions/trades/closes parquet in one directory)
//! mahler-attribution attribute --data results/run-01
//!
//! # Override individual inputs and tune the analysis
//! mahler-attribution attribute --data results/run-01 --closes data/closes.parquet --config config/attribution.toml
//!
//! # Check snapshot Greeks against Black-Scholes
//! mahler-attribution validate-greeks --data results/run-01 --threshold 0.95
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use mahler_attribution::data::loader::{
    market_data, position_records, read_parquet, trade_records,
};
use mahler_attribution::data::DataLoader;
use mahler_attribution::pricing::BlackScholes;
use mahler_attribution::{
    AnalysisConfig, AnalysisPipeline, GreeksConsistencyValidator, SnapshotBuilder,
};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "mahler-attribution")]
#[command(about = "Greek PnL attribution for options backtests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attribute daily PnL to Greeks and diagnose the strategy
    Attribute {
        /// Backtest output directory
        #[arg(short, long, default_value = "results")]
        data: PathBuf,

        /// Positions parquet (defaults to <data>/positions.parquet)
        #[arg(long)]
        positions: Option<PathBuf>,

        /// Trades parquet (defaults to <data>/trades.parquet)
        #[arg(long)]
        trades: Option<PathBuf>,

        /// Daily closes parquet (defaults to <data>/closes.parquet)
        #[arg(long)]
        closes: Option<PathBuf>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate snapshot Greeks against the pricing model
    ValidateGreeks {
        /// Backtest output directory
        #[arg(short, long, default_value = "results")]
        data: PathBuf,

        /// Positions parquet (defaults to <data>/positions.parquet)
        #[arg(long)]
        positions: Option<PathBuf>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Minimum pass rate per Greek
        #[arg(long, default_value = "0.95")]
        threshold: f64,
    },
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(p) => AnalysisConfig::load(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn cmd_attribute(
    loader: DataLoader,
    positions: Option<PathBuf>,
    trades: Option<PathBuf>,
    closes: Option<PathBuf>,
    config: AnalysisConfig,
) -> Result<()> {
    let positions = positions.unwrap_or_else(|| loader.positions_path());
    let records = position_records(&read_parquet(&positions)?)
        .with_context(|| format!("Failed to read positions from {}", positions.display()))?;

    let trades_path = trades.unwrap_or_else(|| loader.trades_path());
    let trades = trade_records(&read_parquet(&trades_path)?)
        .with_context(|| format!("Failed to read trades from {}", trades_path.display()))?;

    let market = match closes {
        Some(path) => market_data(&read_parquet(&path)?)
            .with_context(|| format!("Failed to read closes from {}", path.display()))?,
        None => loader
            .load_market_data()
            .context("Failed to read daily closes")?,
    };
    if market.symbols().is_empty() {
        info!("No daily closes loaded, regime and diagnosis values will be unknown");
    }

    info!(
        records = records.len(),
        trades = trades.len(),
        "Running attribution"
    );
    let report = AnalysisPipeline::new(config)
        .run(&records, &trades, &market)
        .context("Attribution failed")?;

    println!("{}", SEPARATOR);
    println!("{}", report.summary());
    println!("{}", SEPARATOR);

    for gap in &report.attribution.unattributed {
        println!(
            "Unattributed: {} ({}) last seen {}, missing on {}",
            gap.position_id, gap.underlying, gap.last_seen, gap.missing_on
        );
    }

    Ok(())
}

fn cmd_validate_greeks(
    loader: DataLoader,
    positions: Option<PathBuf>,
    config: AnalysisConfig,
    threshold: f64,
) -> Result<()> {
    let positions = positions.unwrap_or_else(|| loader.positions_path());
    let records = position_records(&read_parquet(&positions)?)
        .with_context(|| format!("Failed to read positions from {}", positions.display()))?;

    let bs = BlackScholes::new(config.pricing.rate, config.pricing.dividend);
    let snapshots = SnapshotBuilder::new(config.pricing)
        .build_all(&records)
        .context("Failed to build snapshots")?;

    let report = GreeksConsistencyValidator::new(bs).validate(&snapshots);
    println!("{}", report.summary());

    if !report.all_pass(threshold) {
        bail!(
            "Greeks pass rate below {:.1}% on {} validated rows",
            threshold * 100.0,
            report.validated_rows
        );
    }

    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mahler_attribution=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Attribute {
            data,
            positions,
            trades,
            closes,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            cmd_attribute(DataLoader::new(data), positions, trades, closes, config)?;
        }
        Commands::ValidateGreeks {
            data,
            positions,
            config,
            threshold,
        } => {
            let config = load_config(config.as_deref())?;
            cmd_validate_greeks(DataLoader::new(data), positions, config, threshold)?;
        }
    }

    Ok(())
}

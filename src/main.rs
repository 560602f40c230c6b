//! Grid trader - main entry point
//!
//! This binary provides three subcommands:
//! - analyze: Evaluate every configured instrument and print its plan
//! - fill: Record an executed order fill into the grid ledger
//! - pnl: Report realized P&L from the trade history

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-trader")]
#[command(about = "BIAS/ATR adaptive grid trading decision engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate every configured instrument and print suggested orders
    Analyze {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/etf_basket.json")]
        config: String,

        /// Run instruments sequentially instead of in parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Record an executed fill (updates grid pairs and trade history)
    Fill {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/etf_basket.json")]
        config: String,

        /// Instrument code, e.g. sh510050
        #[arg(long)]
        code: String,

        /// buy or sell
        #[arg(long)]
        side: String,

        /// Executed price
        #[arg(long)]
        price: f64,

        /// Executed share count
        #[arg(long)]
        amount: i64,

        /// Target sell price for a buy fill (defaults to the minimum
        /// profit target above the buy price)
        #[arg(long)]
        target_sell: Option<f64>,

        /// Grid pair to close for a sell fill
        #[arg(long)]
        pair_id: Option<i64>,
    },

    /// Report realized P&L
    Pnl {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/etf_basket.json")]
        config: String,

        /// Only count trades from this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Analyze { .. } => "analyze",
        Commands::Fill { .. } => "fill",
        Commands::Pnl { .. } => "pnl",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Analyze { config, sequential } => commands::analyze::run(config, sequential),

        Commands::Fill {
            config,
            code,
            side,
            price,
            amount,
            target_sell,
            pair_id,
        } => commands::fill::run(config, code, side, price, amount, target_sell, pair_id),

        Commands::Pnl { config, since } => commands::pnl::run(config, since),
    }
}

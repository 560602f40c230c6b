//! Realized P&L report command

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;

use grid_trader::{Config, GridLedger};

pub fn run(config_path: String, since: Option<String>) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    let ledger = Arc::new(GridLedger::open(&config.trading.state_db)?);

    let since_date = since
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .with_context(|| format!("Invalid --since date: {s}"))
        })
        .transpose()?;

    let total = ledger.realized_pnl(since_date);

    match since_date {
        Some(date) => println!("Realized P&L since {date}: {total:+.2}"),
        None => println!("Realized P&L (all time): {total:+.2}"),
    }

    Ok(())
}

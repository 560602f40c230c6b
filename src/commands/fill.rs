//! Fill recording command
//!
//! Collaborator hook invoked after a real execution. A buy fill opens a
//! grid pair with its target sell price; a sell fill closes the matched
//! pair and books the realized P&L. The engine itself only proposes
//! orders; this keeps the ledger in step with what actually executed.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;

use grid_trader::{Config, GridLedger, Side};

#[allow(clippy::too_many_arguments)]
pub fn run(
    config_path: String,
    code: String,
    side: String,
    price: f64,
    amount: i64,
    target_sell: Option<f64>,
    pair_id: Option<i64>,
) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    let ledger = Arc::new(GridLedger::open(&config.trading.state_db)?);

    let side: Side = side.parse().map_err(anyhow::Error::msg)?;

    if price <= 0.0 {
        bail!("--price must be positive");
    }
    if amount <= 0 {
        bail!("--amount must be positive");
    }
    if amount % config.trading.lot_size != 0 {
        bail!(
            "--amount {} is not a multiple of the lot size {}",
            amount,
            config.trading.lot_size
        );
    }

    match side {
        Side::Buy => {
            // default target: minimum profit band above the buy price
            let target = target_sell
                .unwrap_or(price * (1.0 + config.strategy.min_profit.base_pct));
            ledger.add_grid_pair(&code, price, amount, target);
            ledger.record_fill(&code, Side::Buy, price, amount, 0.0);
            info!("Buy fill recorded: {code} {amount} @ {price:.3} -> target {target:.3}");
            println!("Recorded BUY {code}: {amount} @ {price:.3}, target sell {target:.3}");
        }
        Side::Sell => {
            let realized = match pair_id {
                Some(id) => {
                    let pair = ledger
                        .active_pairs(&code)
                        .into_iter()
                        .find(|p| p.id == id);
                    match pair {
                        Some(pair) => {
                            ledger.close_pair(id);
                            (price - pair.buy_price) * amount as f64
                        }
                        None => bail!("No open pair with id {id} for {code}"),
                    }
                }
                None => 0.0,
            };
            ledger.record_fill(&code, Side::Sell, price, amount, realized);
            info!("Sell fill recorded: {code} {amount} @ {price:.3} | pnl {realized:+.2}");
            println!("Recorded SELL {code}: {amount} @ {price:.3}, realized {realized:+.2}");
        }
    }

    Ok(())
}

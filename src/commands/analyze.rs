//! Analyze command implementation
//!
//! Evaluates every configured instrument, prints the resulting plans and
//! runs the trigger check against the latest close. One instrument's
//! failure never aborts the rest of the basket.

use anyhow::Result;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::info;

use grid_trader::{
    data, Candle, Config, GridLedger, StrategyEngine, Symbol, TradePlan, TriggeredSignal,
};

pub fn run(config_path: String, sequential: bool) -> Result<()> {
    info!("Starting analysis");

    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let ledger = Arc::new(GridLedger::open(&config.trading.state_db)?);

    let codes = config.trading.symbols();
    let candle_map = data::load_basket(&config.trading.data_dir, &codes)?;
    info!("Loaded data for {} instruments", candle_map.len());

    let engine = StrategyEngine::new(config.clone(), ledger.clone());

    let empty: Vec<Candle> = Vec::new();
    let evaluate_one = |code: &Symbol| -> TradePlan {
        let candles = candle_map.get(code).unwrap_or(&empty);
        let holding = config.trading.holding_for(code.as_str());
        engine.evaluate(code, candles, &holding)
    };

    // evaluations for distinct codes are independent (engine contract)
    let plans: Vec<TradePlan> = if sequential {
        codes.iter().map(evaluate_one).collect()
    } else {
        codes.par_iter().map(evaluate_one).collect()
    };

    print_plans(&config, &plans);

    // trigger check against the latest close
    let today = chrono::Local::now().date_naive();
    let mut signals: Vec<TriggeredSignal> = Vec::new();
    for plan in &plans {
        if plan.current_price > 0.0 {
            signals.extend(engine.check_triggers(plan, plan.current_price, today));
        }
    }

    if !signals.is_empty() {
        println!("\nTRIGGERED SIGNALS");
        println!("{}", "-".repeat(72));
        for s in &signals {
            println!(
                "{:<10} {:<4} {:>8} @ {:<8.3} (live {:.3}) {}",
                s.code.as_str(),
                s.order.side.as_str(),
                s.order.amount,
                s.order.price,
                s.live_price,
                s.order.desc
            );
        }
    }

    let realized = ledger.realized_pnl(None);
    println!("\nRealized P&L (all time): {realized:+.2}");

    info!("Analysis completed: {} plans, {} signals", plans.len(), signals.len());

    Ok(())
}

fn print_plans(config: &Config, plans: &[TradePlan]) {
    println!("\n{}", "=".repeat(90));
    println!("GRID ANALYSIS");
    println!("{}", "=".repeat(90));
    println!(
        "{:<10} {:>8} {:>8} {:>8} {:>10} {:>9} {:>7} {:<22}",
        "code", "price", "bias%", "target%", "value", "pnl", "risk", "status"
    );
    println!("{}", "-".repeat(90));

    for plan in plans {
        let holding = config.trading.holding_for(plan.code.as_str());
        let market_value = plan.current_price * holding.volume as f64;
        let pnl = holding
            .pnl_pct(plan.current_price)
            .map(|p| format!("{:+.1}%", p * 100.0))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<10} {:>8.3} {:>8.2} {:>8.0} {:>10.0} {:>9} {:>7} {:<22}",
            plan.code.as_str(),
            plan.current_price,
            plan.current_bias,
            plan.target_pos_pct * 100.0,
            market_value,
            pnl,
            if plan.risk_triggered { "YES" } else { "-" },
            plan.status.to_string()
        );
    }

    println!("\nSUGGESTED ORDERS");
    println!("{}", "-".repeat(72));
    let mut any_orders = false;
    for plan in plans {
        for order in &plan.orders {
            any_orders = true;
            println!(
                "{:<10} {:<4} {:<6} {:>8} @ {:<8.3} {}",
                plan.code.as_str(),
                order.side.as_str(),
                order.order_type.to_string(),
                order.amount,
                order.price,
                order.desc
            );
        }
    }
    if !any_orders {
        println!("(none)");
    }

    let warnings: Vec<(&str, &String)> = plans
        .iter()
        .flat_map(|p| p.warnings.iter().map(move |w| (p.code.as_str(), w)))
        .collect();
    if !warnings.is_empty() {
        println!("\nWARNINGS");
        println!("{}", "-".repeat(72));
        for (code, warning) in warnings {
            println!("[{code}] {warning}");
        }
    }
}

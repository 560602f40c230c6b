//! Grid state ledger
//!
//! SQLite-backed persistence for the three cross-call stores: per-day
//! trigger records, open grid pairs, and the realized-trade history.
//!
//! The public API never returns an error to the caller: a storage failure
//! is logged and the operation degrades to a neutral answer ("not
//! triggered", "no open pairs", zero PnL) so one broken database row can
//! never abort an evaluation cycle. Write idempotency for triggers comes
//! from the table's primary key rather than locking.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use crate::Side;

/// Absolute tolerance for trigger price equality. Fixed, not relative to
/// the instrument's price scale.
pub const PRICE_TOLERANCE: f64 = 1e-4;

/// An open buy lot awaiting its matched sell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridPair {
    pub id: i64,
    pub code: String,
    pub buy_price: f64,
    pub buy_amount: i64,
    pub target_sell_price: f64,
    pub status: String, // "OPEN" or "CLOSED"
    pub created_at: String,
    pub closed_at: Option<String>,
}

impl GridPair {
    pub fn is_open(&self) -> bool {
        self.status == "OPEN"
    }
}

/// SQLite-backed ledger shared by every evaluation
pub struct GridLedger {
    conn: Arc<Mutex<Connection>>,
}

impl GridLedger {
    /// Open (or create) the ledger database at the given path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        // WAL mode for concurrent readers during evaluation cycles
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let ledger = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        ledger.create_tables()?;
        info!("Grid ledger initialized: {}", db_path.display());

        Ok(ledger)
    }

    /// Open an in-memory ledger (tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let ledger = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        ledger.create_tables()?;
        Ok(ledger)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        // One row per signaled (day, code, price, direction); the primary
        // key makes duplicate marks a no-op
        conn.execute(
            "CREATE TABLE IF NOT EXISTS triggered_grids (
                date TEXT,
                code TEXT,
                price REAL,
                direction TEXT,
                timestamp TEXT,
                PRIMARY KEY (date, code, price, direction)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS grid_pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT,
                buy_price REAL,
                buy_amount INTEGER,
                target_sell_price REAL,
                status TEXT DEFAULT 'OPEN',
                created_at TEXT,
                closed_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trade_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT,
                direction TEXT,
                price REAL,
                volume INTEGER,
                realized_pnl REAL DEFAULT 0,
                timestamp TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_grid_pairs_code_status ON grid_pairs(code, status)",
            [],
        )?;

        debug!("Ledger schema created/verified");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Trigger records (per-day exactly-once signaling)
    // -------------------------------------------------------------------

    /// Has this grid level already been signaled today?
    ///
    /// Storage failure degrades to `false` ("not yet triggered").
    pub fn is_triggered(&self, date: NaiveDate, code: &str, price: f64, side: Side) -> bool {
        match self.try_is_triggered(date, code, price, side) {
            Ok(hit) => hit,
            Err(e) => {
                error!("Failed to query trigger state: {e:#}");
                false
            }
        }
    }

    fn try_is_triggered(&self, date: NaiveDate, code: &str, price: f64, side: Side) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let hit: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM triggered_grids
                 WHERE date = ?1 AND code = ?2 AND ABS(price - ?3) < ?4 AND direction = ?5",
                params![
                    date.to_string(),
                    code,
                    price,
                    PRICE_TOLERANCE,
                    side.as_str()
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Mark a grid level as signaled for the day. Idempotent: repeating the
    /// same key leaves exactly one record.
    pub fn mark_triggered(&self, date: NaiveDate, code: &str, price: f64, side: Side) {
        if let Err(e) = self.try_mark_triggered(date, code, price, side) {
            error!("Failed to mark trigger: {e:#}");
        }
    }

    fn try_mark_triggered(&self, date: NaiveDate, code: &str, price: f64, side: Side) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO triggered_grids (date, code, price, direction, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                date.to_string(),
                code,
                price,
                side.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        info!("Trigger saved: {} {} @ {:.3}", code, side, price);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Grid pairs
    // -------------------------------------------------------------------

    /// Record a new pair after a buy executes
    pub fn add_grid_pair(&self, code: &str, buy_price: f64, buy_amount: i64, target_sell: f64) {
        if let Err(e) = self.try_add_grid_pair(code, buy_price, buy_amount, target_sell) {
            error!("Failed to add grid pair: {e:#}");
        }
    }

    fn try_add_grid_pair(
        &self,
        code: &str,
        buy_price: f64,
        buy_amount: i64,
        target_sell: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO grid_pairs (code, buy_price, buy_amount, target_sell_price, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'OPEN', ?5)",
            params![
                code,
                buy_price,
                buy_amount,
                target_sell,
                Utc::now().to_rfc3339()
            ],
        )?;
        info!(
            "Grid pair added: {} buy @ {:.3} -> target {:.3}",
            code, buy_price, target_sell
        );
        Ok(())
    }

    /// All OPEN pairs for an instrument, highest buy price first.
    ///
    /// Storage failure degrades to an empty list.
    pub fn active_pairs(&self, code: &str) -> Vec<GridPair> {
        match self.try_active_pairs(code) {
            Ok(pairs) => pairs,
            Err(e) => {
                error!("Failed to query grid pairs: {e:#}");
                Vec::new()
            }
        }
    }

    fn try_active_pairs(&self, code: &str) -> Result<Vec<GridPair>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, code, buy_price, buy_amount, target_sell_price, status, created_at, closed_at
             FROM grid_pairs WHERE code = ?1 AND status = 'OPEN' ORDER BY buy_price DESC",
        )?;

        let pairs = stmt
            .query_map(params![code], |row| {
                Ok(GridPair {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    buy_price: row.get(2)?,
                    buy_amount: row.get(3)?,
                    target_sell_price: row.get(4)?,
                    status: row.get(5)?,
                    created_at: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    closed_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pairs)
    }

    /// Close a pair after its matched sell executes
    pub fn close_pair(&self, pair_id: i64) {
        if let Err(e) = self.try_close_pair(pair_id) {
            error!("Failed to close grid pair {pair_id}: {e:#}");
        }
    }

    fn try_close_pair(&self, pair_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE grid_pairs SET status = 'CLOSED', closed_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), pair_id],
        )?;
        info!("Grid pair closed: id {pair_id}");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Trade history & realized PnL
    // -------------------------------------------------------------------

    /// Append an executed trade with its realized PnL
    pub fn record_fill(&self, code: &str, side: Side, price: f64, volume: i64, realized_pnl: f64) {
        if let Err(e) = self.try_record_fill(code, side, price, volume, realized_pnl) {
            error!("Failed to record trade: {e:#}");
        }
    }

    fn try_record_fill(
        &self,
        code: &str,
        side: Side,
        price: f64,
        volume: i64,
        realized_pnl: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO trade_history (code, direction, price, volume, realized_pnl, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                code,
                side.as_str(),
                price,
                volume,
                realized_pnl,
                Utc::now().to_rfc3339()
            ],
        )?;
        info!(
            "Trade recorded: {} {} {} @ {:.3} | pnl {:+.2}",
            side, code, volume, price, realized_pnl
        );
        Ok(())
    }

    /// Sum of realized PnL, optionally from a calendar date onward.
    ///
    /// Storage failure degrades to 0.0.
    pub fn realized_pnl(&self, since: Option<NaiveDate>) -> f64 {
        match self.try_realized_pnl(since) {
            Ok(total) => total,
            Err(e) => {
                error!("Failed to query realized pnl: {e:#}");
                0.0
            }
        }
    }

    fn try_realized_pnl(&self, since: Option<NaiveDate>) -> Result<f64> {
        let conn = self.conn.lock().unwrap();
        let total: Option<f64> = match since {
            Some(date) => conn.query_row(
                "SELECT SUM(realized_pnl) FROM trade_history WHERE date(timestamp) >= ?1",
                params![date.to_string()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT SUM(realized_pnl) FROM trade_history", [], |row| {
                row.get(0)
            })?,
        };
        Ok(total.unwrap_or(0.0))
    }
}

//! SQLite ledger adapter.
//!
//! Amounts are stored as decimal text so they round-trip exactly. Trades run
//! under `BEGIN IMMEDIATE`: the write lock is taken before the balance is
//! read, so concurrent trades serialize and each one validates against the
//! previous one's committed state.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::domain::error::PapertradeError;
use crate::domain::holding::{AccountSnapshot, Holding};
use crate::domain::trade::{NewTrade, TradeRecord};
use crate::domain::types::{Amount, TradeId, UserId};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerPort, LedgerTx, TxWork};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        cash TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS trades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        symbol TEXT NOT NULL CHECK (symbol <> ''),
        price TEXT NOT NULL,
        quantity INTEGER NOT NULL CHECK (quantity <> 0),
        executed_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_trades_user_symbol ON trades(user_id, symbol);
    CREATE INDEX IF NOT EXISTS idx_trades_user_time ON trades(user_id, executed_at);
    CREATE TRIGGER IF NOT EXISTS trades_no_update BEFORE UPDATE ON trades
    BEGIN
        SELECT RAISE(ABORT, 'trade records are immutable');
    END;
    CREATE TRIGGER IF NOT EXISTS trades_no_delete BEFORE DELETE ON trades
    BEGIN
        SELECT RAISE(ABORT, 'trade records are append-only');
    END;";

const DEFAULT_BUSY_TIMEOUT_MS: i64 = 5_000;

pub struct SqliteLedgerAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteLedgerAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PapertradeError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| PapertradeError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        let busy_timeout_ms = config
            .get_int("sqlite", "busy_timeout_ms", DEFAULT_BUSY_TIMEOUT_MS)
            .max(0) as u64;

        Self::build(
            SqliteConnectionManager::file(&db_path),
            pool_size,
            busy_timeout_ms,
        )
    }

    pub fn in_memory() -> Result<Self, PapertradeError> {
        Self::build(
            SqliteConnectionManager::memory(),
            1,
            DEFAULT_BUSY_TIMEOUT_MS as u64,
        )
    }

    fn build(
        manager: SqliteConnectionManager,
        pool_size: u32,
        busy_timeout_ms: u64,
    ) -> Result<Self, PapertradeError> {
        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| PapertradeError::Storage {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PapertradeError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| PapertradeError::Storage {
                reason: e.to_string(),
            })
    }
}

fn query_err(e: rusqlite::Error) -> PapertradeError {
    PapertradeError::Storage {
        reason: e.to_string(),
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn format_amount(amount: Amount) -> String {
    amount.normalize().to_string()
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_err<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn amount_column(row: &rusqlite::Row<'_>, column: usize) -> rusqlite::Result<Amount> {
    let text: String = row.get(column)?;
    Amount::from_str(&text).map_err(|e| conversion_err(column, e))
}

fn timestamp_column(row: &rusqlite::Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_err(column, e))
}

fn ensure_user(conn: &Connection, user_id: UserId) -> Result<(), PapertradeError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM users WHERE id = ?1",
            params![user_id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(query_err)?;
    match found {
        Some(_) => Ok(()),
        None => Err(PapertradeError::UserNotFound { user_id }),
    }
}

fn query_cash(conn: &Connection, user_id: UserId) -> Result<Amount, PapertradeError> {
    conn.query_row(
        "SELECT cash FROM users WHERE id = ?1",
        params![user_id.0],
        |row| amount_column(row, 0),
    )
    .optional()
    .map_err(query_err)?
    .ok_or(PapertradeError::UserNotFound { user_id })
}

fn query_positions(conn: &Connection, user_id: UserId) -> Result<Vec<Holding>, PapertradeError> {
    let mut stmt = conn
        .prepare(
            "SELECT symbol, SUM(quantity) FROM trades
             WHERE user_id = ?1
             GROUP BY symbol
             ORDER BY symbol",
        )
        .map_err(query_err)?;

    let rows = stmt
        .query_map(params![user_id.0], |row| {
            Ok(Holding {
                symbol: row.get(0)?,
                quantity: row.get(1)?,
            })
        })
        .map_err(query_err)?;

    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl LedgerTx for SqliteTx<'_> {
    fn cash_balance(&mut self, user_id: UserId) -> Result<Amount, PapertradeError> {
        query_cash(self.conn, user_id)
    }

    fn net_quantity(&mut self, user_id: UserId, symbol: &str) -> Result<i64, PapertradeError> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(quantity), 0) FROM trades WHERE user_id = ?1 AND symbol = ?2",
                params![user_id.0, symbol],
                |row| row.get(0),
            )
            .map_err(query_err)
    }

    fn update_cash_balance(
        &mut self,
        user_id: UserId,
        new_balance: Amount,
    ) -> Result<(), PapertradeError> {
        let updated = self
            .conn
            .execute(
                "UPDATE users SET cash = ?1 WHERE id = ?2",
                params![format_amount(new_balance), user_id.0],
            )
            .map_err(query_err)?;
        if updated == 0 {
            return Err(PapertradeError::UserNotFound { user_id });
        }
        Ok(())
    }

    fn insert_trade(&mut self, trade: NewTrade) -> Result<TradeRecord, PapertradeError> {
        let last: Option<DateTime<Utc>> = self
            .conn
            .query_row(
                "SELECT MAX(executed_at) FROM trades WHERE user_id = ?1",
                params![trade.user_id.0],
                |row| {
                    let text: Option<String> = row.get(0)?;
                    text.map(|t| {
                        DateTime::parse_from_rfc3339(&t)
                            .map(|ts| ts.with_timezone(&Utc))
                            .map_err(|e| conversion_err(0, e))
                    })
                    .transpose()
                },
            )
            .map_err(query_err)?;

        // Stored at microsecond precision; never earlier than the user's last trade.
        let now = Utc::now().trunc_subsecs(6);
        let executed_at = last.map_or(now, |last| last.max(now));

        self.conn
            .execute(
                "INSERT INTO trades (user_id, symbol, price, quantity, executed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    trade.user_id.0,
                    trade.symbol,
                    format_amount(trade.price),
                    trade.quantity,
                    format_timestamp(executed_at)
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    PapertradeError::Storage {
                        reason: format!("trade record rejected: {e}"),
                    }
                } else {
                    query_err(e)
                }
            })?;

        Ok(TradeRecord {
            id: TradeId(self.conn.last_insert_rowid()),
            user_id: trade.user_id,
            symbol: trade.symbol,
            price: trade.price,
            quantity: trade.quantity,
            executed_at,
        })
    }
}

impl LedgerPort for SqliteLedgerAdapter {
    fn initialize_schema(&self) -> Result<(), PapertradeError> {
        let conn = self.conn()?;

        // In-memory databases answer "memory" and stay as they are.
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(query_err)?;
        debug!(journal_mode = %mode, "sqlite journal mode");

        conn.execute_batch(SCHEMA).map_err(query_err)?;
        Ok(())
    }

    fn create_user(
        &self,
        username: &str,
        starting_cash: Amount,
    ) -> Result<UserId, PapertradeError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (username, cash) VALUES (?1, ?2)",
            params![username, format_amount(starting_cash)],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                PapertradeError::invalid_input("username already exists")
            } else {
                query_err(e)
            }
        })?;
        Ok(UserId(conn.last_insert_rowid()))
    }

    fn find_user(&self, username: &str) -> Result<Option<UserId>, PapertradeError> {
        let conn = self.conn()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;
        Ok(id.map(UserId))
    }

    fn cash_balance(&self, user_id: UserId) -> Result<Amount, PapertradeError> {
        let conn = self.conn()?;
        query_cash(&conn, user_id)
    }

    fn net_positions(&self, user_id: UserId) -> Result<Vec<Holding>, PapertradeError> {
        let conn = self.conn()?;
        ensure_user(&conn, user_id)?;
        query_positions(&conn, user_id)
    }

    fn traded_symbols(&self, user_id: UserId) -> Result<BTreeSet<String>, PapertradeError> {
        let conn = self.conn()?;
        ensure_user(&conn, user_id)?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM trades WHERE user_id = ?1 AND quantity != 0")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user_id.0], |row| row.get(0))
            .map_err(query_err)?;

        rows.collect::<rusqlite::Result<BTreeSet<String>>>()
            .map_err(query_err)
    }

    fn trade_history(&self, user_id: UserId) -> Result<Vec<TradeRecord>, PapertradeError> {
        let conn = self.conn()?;
        ensure_user(&conn, user_id)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, symbol, price, quantity, executed_at
                 FROM trades
                 WHERE user_id = ?1
                 ORDER BY executed_at DESC, id DESC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![user_id.0], |row| {
                Ok(TradeRecord {
                    id: TradeId(row.get(0)?),
                    user_id: UserId(row.get(1)?),
                    symbol: row.get(2)?,
                    price: amount_column(row, 3)?,
                    quantity: row.get(4)?,
                    executed_at: timestamp_column(row, 5)?,
                })
            })
            .map_err(query_err)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    fn account_snapshot(&self, user_id: UserId) -> Result<AccountSnapshot, PapertradeError> {
        let mut conn = self.conn()?;
        // One read transaction so cash and positions come from the same snapshot.
        let tx = conn.transaction().map_err(query_err)?;
        let cash = query_cash(&tx, user_id)?;
        let positions = query_positions(&tx, user_id)?;
        tx.commit().map_err(query_err)?;
        Ok(AccountSnapshot { cash, positions })
    }

    fn in_transaction(
        &self,
        user_id: UserId,
        work: &mut TxWork<'_>,
    ) -> Result<TradeRecord, PapertradeError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        // Dropping `tx` on the error path rolls everything back.
        let record = work(&mut SqliteTx { conn: &tx })?;
        tx.commit().map_err(query_err)?;
        debug!(%user_id, trade = %record.id, "ledger transaction committed");
        Ok(record)
    }
}

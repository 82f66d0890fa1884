//! Ledger store port traits.
//!
//! The store persists users (id, cash balance) and the append-only trade
//! ledger. It enforces storage constraints only; funds and share checks live
//! in the accounting engine and run inside [`LedgerPort::in_transaction`].

use std::collections::BTreeSet;

use crate::domain::error::PapertradeError;
use crate::domain::holding::{AccountSnapshot, Holding};
use crate::domain::trade::{NewTrade, TradeRecord};
use crate::domain::types::{Amount, UserId};

/// Work executed inside one all-or-nothing ledger transaction.
pub type TxWork<'w> =
    dyn FnMut(&mut dyn LedgerTx) -> Result<TradeRecord, PapertradeError> + 'w;

/// Handle to an open ledger transaction.
///
/// Reads observe every write made earlier through the same handle. Nothing is
/// visible to other callers until the enclosing transaction commits.
pub trait LedgerTx {
    fn cash_balance(&mut self, user_id: UserId) -> Result<Amount, PapertradeError>;

    /// Raw sum of signed quantities for one symbol, zero when never traded.
    fn net_quantity(&mut self, user_id: UserId, symbol: &str) -> Result<i64, PapertradeError>;

    fn update_cash_balance(
        &mut self,
        user_id: UserId,
        new_balance: Amount,
    ) -> Result<(), PapertradeError>;

    fn insert_trade(&mut self, trade: NewTrade) -> Result<TradeRecord, PapertradeError>;
}

pub trait LedgerPort {
    fn initialize_schema(&self) -> Result<(), PapertradeError>;

    fn create_user(&self, username: &str, starting_cash: Amount)
    -> Result<UserId, PapertradeError>;

    fn find_user(&self, username: &str) -> Result<Option<UserId>, PapertradeError>;

    fn cash_balance(&self, user_id: UserId) -> Result<Amount, PapertradeError>;

    /// Net quantity per symbol, unfiltered, sorted by symbol.
    fn net_positions(&self, user_id: UserId) -> Result<Vec<Holding>, PapertradeError>;

    /// Symbols with at least one non-zero trade record.
    fn traded_symbols(&self, user_id: UserId) -> Result<BTreeSet<String>, PapertradeError>;

    /// All trade records, newest first.
    fn trade_history(&self, user_id: UserId) -> Result<Vec<TradeRecord>, PapertradeError>;

    /// Cash balance and net positions from one consistent snapshot.
    fn account_snapshot(&self, user_id: UserId) -> Result<AccountSnapshot, PapertradeError>;

    /// Run `work` as one atomic unit serialized against every other
    /// transaction for the same user. Commits when `work` returns `Ok`,
    /// rolls back otherwise.
    fn in_transaction(
        &self,
        user_id: UserId,
        work: &mut TxWork<'_>,
    ) -> Result<TradeRecord, PapertradeError>;
}

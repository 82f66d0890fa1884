//! In-process ledger adapter.
//!
//! Each user's account sits behind its own mutex, so trades for one user
//! serialize while trades for different users proceed in parallel. A
//! transaction works on a copy of the account and swaps it in only on commit.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;

use crate::domain::accounting::aggregate_positions;
use crate::domain::error::PapertradeError;
use crate::domain::holding::{AccountSnapshot, Holding};
use crate::domain::trade::{NewTrade, TradeRecord};
use crate::domain::types::{Amount, TradeId, UserId};
use crate::ports::ledger_port::{LedgerPort, LedgerTx, TxWork};

#[derive(Debug, Clone)]
struct Account {
    username: String,
    cash: Amount,
    trades: Vec<TradeRecord>,
}

#[derive(Default)]
pub struct MemoryLedgerAdapter {
    accounts: RwLock<HashMap<UserId, Arc<Mutex<Account>>>>,
    next_user_id: AtomicI64,
    next_trade_id: AtomicI64,
}

impl MemoryLedgerAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn account(&self, user_id: UserId) -> Result<Arc<Mutex<Account>>, PapertradeError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| PapertradeError::storage("account map lock poisoned"))?;
        accounts
            .get(&user_id)
            .cloned()
            .ok_or(PapertradeError::UserNotFound { user_id })
    }

    fn with_account<T>(
        &self,
        user_id: UserId,
        read: impl FnOnce(&Account) -> T,
    ) -> Result<T, PapertradeError> {
        let account = self.account(user_id)?;
        let guard = lock(&account)?;
        Ok(read(&guard))
    }
}

fn lock(account: &Mutex<Account>) -> Result<MutexGuard<'_, Account>, PapertradeError> {
    account
        .lock()
        .map_err(|_| PapertradeError::storage("account lock poisoned"))
}

struct MemoryTx<'a> {
    user_id: UserId,
    working: Account,
    next_trade_id: &'a AtomicI64,
}

impl MemoryTx<'_> {
    fn check_user(&self, user_id: UserId) -> Result<(), PapertradeError> {
        if user_id != self.user_id {
            return Err(PapertradeError::storage(format!(
                "transaction is scoped to user {}, not {user_id}",
                self.user_id
            )));
        }
        Ok(())
    }
}

impl LedgerTx for MemoryTx<'_> {
    fn cash_balance(&mut self, user_id: UserId) -> Result<Amount, PapertradeError> {
        self.check_user(user_id)?;
        Ok(self.working.cash)
    }

    fn net_quantity(&mut self, user_id: UserId, symbol: &str) -> Result<i64, PapertradeError> {
        self.check_user(user_id)?;
        self.working
            .trades
            .iter()
            .filter(|t| t.symbol == symbol)
            .try_fold(0i64, |net, t| net.checked_add(t.quantity))
            .ok_or_else(|| {
                PapertradeError::invalid_input(format!("net position in {symbol} out of range"))
            })
    }

    fn update_cash_balance(
        &mut self,
        user_id: UserId,
        new_balance: Amount,
    ) -> Result<(), PapertradeError> {
        self.check_user(user_id)?;
        self.working.cash = new_balance;
        Ok(())
    }

    fn insert_trade(&mut self, trade: NewTrade) -> Result<TradeRecord, PapertradeError> {
        self.check_user(trade.user_id)?;
        if trade.symbol.is_empty() || trade.quantity == 0 {
            return Err(PapertradeError::storage(
                "trade record violates storage constraints",
            ));
        }
        let id = self.next_trade_id.fetch_add(1, Ordering::SeqCst) + 1;
        // Keep timestamps non-decreasing per user even if the wall clock steps back.
        let executed_at = match self.working.trades.last() {
            Some(last) => last.executed_at.max(Utc::now()),
            None => Utc::now(),
        };
        let record = TradeRecord {
            id: TradeId(id),
            user_id: trade.user_id,
            symbol: trade.symbol,
            price: trade.price,
            quantity: trade.quantity,
            executed_at,
        };
        self.working.trades.push(record.clone());
        Ok(record)
    }
}

impl LedgerPort for MemoryLedgerAdapter {
    fn initialize_schema(&self) -> Result<(), PapertradeError> {
        Ok(())
    }

    fn create_user(
        &self,
        username: &str,
        starting_cash: Amount,
    ) -> Result<UserId, PapertradeError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| PapertradeError::storage("account map lock poisoned"))?;

        for account in accounts.values() {
            if lock(account)?.username == username {
                return Err(PapertradeError::invalid_input("username already exists"));
            }
        }

        let user_id = UserId(self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1);
        accounts.insert(
            user_id,
            Arc::new(Mutex::new(Account {
                username: username.to_string(),
                cash: starting_cash,
                trades: Vec::new(),
            })),
        );
        Ok(user_id)
    }

    fn find_user(&self, username: &str) -> Result<Option<UserId>, PapertradeError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| PapertradeError::storage("account map lock poisoned"))?;
        for (user_id, account) in accounts.iter() {
            if lock(account)?.username == username {
                return Ok(Some(*user_id));
            }
        }
        Ok(None)
    }

    fn cash_balance(&self, user_id: UserId) -> Result<Amount, PapertradeError> {
        self.with_account(user_id, |a| a.cash)
    }

    fn net_positions(&self, user_id: UserId) -> Result<Vec<Holding>, PapertradeError> {
        self.with_account(user_id, |a| aggregate_positions(&a.trades))?
    }

    fn traded_symbols(&self, user_id: UserId) -> Result<BTreeSet<String>, PapertradeError> {
        self.with_account(user_id, |a| {
            a.trades
                .iter()
                .filter(|t| t.quantity != 0)
                .map(|t| t.symbol.clone())
                .collect()
        })
    }

    fn trade_history(&self, user_id: UserId) -> Result<Vec<TradeRecord>, PapertradeError> {
        self.with_account(user_id, |a| {
            let mut history = a.trades.clone();
            history.sort_by(|x, y| y.executed_at.cmp(&x.executed_at).then(y.id.cmp(&x.id)));
            history
        })
    }

    fn account_snapshot(&self, user_id: UserId) -> Result<AccountSnapshot, PapertradeError> {
        self.with_account(user_id, |a| -> Result<AccountSnapshot, PapertradeError> {
            Ok(AccountSnapshot {
                cash: a.cash,
                positions: aggregate_positions(&a.trades)?,
            })
        })?
    }

    fn in_transaction(
        &self,
        user_id: UserId,
        work: &mut TxWork<'_>,
    ) -> Result<TradeRecord, PapertradeError> {
        let account = self.account(user_id)?;
        let mut guard = lock(&account)?;

        let mut tx = MemoryTx {
            user_id,
            working: guard.clone(),
            next_trade_id: &self.next_trade_id,
        };
        let record = work(&mut tx)?;
        *guard = tx.working;
        Ok(record)
    }
}

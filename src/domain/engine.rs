//! Accounting engine: validates trades and applies them to the ledger.
//!
//! Holdings are derived on read by aggregating the append-only ledger. Cash is
//! the one running total, and it only changes inside the same ledger
//! transaction that appends the matching trade record. Funds and share checks
//! run inside that transaction too, so two concurrent trades for one user can
//! never both pass against the same stale balance.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::accounting::{
    open_holdings, position_after_buy, settle_buy, settle_sell, trade_value, validate_price,
    validate_quantity, validate_symbol,
};
use super::error::PapertradeError;
use super::holding::{AccountSnapshot, Holding};
use super::quote::Quote;
use super::settings::LedgerSettings;
use super::trade::{NewTrade, Side, TradeRecord};
use super::types::{Amount, UserId};
use super::valuation::{value_portfolio, PortfolioValuation};
use crate::ports::ledger_port::{LedgerPort, LedgerTx};
use crate::ports::quote_port::QuotePort;

#[derive(Clone)]
pub struct AccountingEngine {
    ledger: Arc<dyn LedgerPort + Send + Sync>,
    settings: LedgerSettings,
}

impl AccountingEngine {
    pub fn new(ledger: Arc<dyn LedgerPort + Send + Sync>, settings: LedgerSettings) -> Self {
        Self { ledger, settings }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Register a user with the configured starting cash.
    pub fn register(&self, username: &str) -> Result<UserId, PapertradeError> {
        self.register_with_cash(username, self.settings.starting_cash)
    }

    pub fn register_with_cash(
        &self,
        username: &str,
        starting_cash: Amount,
    ) -> Result<UserId, PapertradeError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(PapertradeError::invalid_input("must provide username"));
        }
        if starting_cash < Amount::ZERO {
            return Err(PapertradeError::invalid_input(
                "starting cash must be non-negative",
            ));
        }
        if self.ledger.find_user(username)?.is_some() {
            return Err(PapertradeError::invalid_input("username already exists"));
        }

        let user_id = self.ledger.create_user(username, starting_cash)?;
        info!(%user_id, username, %starting_cash, "registered user");
        Ok(user_id)
    }

    pub fn find_user(&self, username: &str) -> Result<Option<UserId>, PapertradeError> {
        self.ledger.find_user(username.trim())
    }

    pub fn cash_balance(&self, user_id: UserId) -> Result<Amount, PapertradeError> {
        self.ledger.cash_balance(user_id)
    }

    /// Strictly positive net positions, sorted by symbol.
    pub fn holdings(&self, user_id: UserId) -> Result<Vec<Holding>, PapertradeError> {
        let positions = self.ledger.net_positions(user_id)?;
        Ok(open_holdings(positions))
    }

    pub fn traded_symbols(&self, user_id: UserId) -> Result<BTreeSet<String>, PapertradeError> {
        self.ledger.traded_symbols(user_id)
    }

    /// Every trade record for the user, newest first.
    pub fn trade_history(&self, user_id: UserId) -> Result<Vec<TradeRecord>, PapertradeError> {
        self.ledger.trade_history(user_id)
    }

    pub fn account_snapshot(&self, user_id: UserId) -> Result<AccountSnapshot, PapertradeError> {
        self.ledger.account_snapshot(user_id)
    }

    /// Cash and open holdings priced at current quotes.
    pub fn portfolio(
        &self,
        user_id: UserId,
        quotes: &dyn QuotePort,
    ) -> Result<PortfolioValuation, PapertradeError> {
        let snapshot = self.ledger.account_snapshot(user_id)?;
        value_portfolio(&snapshot, quotes)
    }

    pub fn quote(&self, symbol: &str, quotes: &dyn QuotePort) -> Result<Quote, PapertradeError> {
        let symbol = validate_symbol(symbol)?;
        quotes
            .lookup(&symbol)?
            .ok_or(PapertradeError::SymbolNotFound { symbol })
    }

    pub fn execute_buy(
        &self,
        user_id: UserId,
        symbol: &str,
        quantity: i64,
        unit_price: Amount,
    ) -> Result<TradeRecord, PapertradeError> {
        let symbol = validate_symbol(symbol)?;
        let quantity = validate_quantity(quantity)?;
        let unit_price = validate_price(unit_price)?;
        let cost = trade_value(quantity, unit_price)?;

        let result = self.with_retry("buy", user_id, || {
            self.ledger.in_transaction(
                user_id,
                &mut |tx: &mut dyn LedgerTx| -> Result<TradeRecord, PapertradeError> {
                    let held = tx.net_quantity(user_id, &symbol)?;
                    position_after_buy(&symbol, held, quantity)?;
                    let cash = tx.cash_balance(user_id)?;
                    let remaining = settle_buy(cash, cost)?;
                    tx.update_cash_balance(user_id, remaining)?;
                    tx.insert_trade(NewTrade {
                        user_id,
                        symbol: symbol.clone(),
                        price: unit_price,
                        quantity: Side::Buy.signed(quantity),
                    })
                },
            )
        });

        match &result {
            Ok(record) => info!(
                %user_id,
                symbol = %record.symbol,
                quantity,
                price = %unit_price,
                %cost,
                trade = %record.id,
                "bought"
            ),
            Err(e) => debug!(%user_id, %symbol, quantity, error = %e, "buy rejected"),
        }
        result
    }

    pub fn execute_sell(
        &self,
        user_id: UserId,
        symbol: &str,
        quantity: i64,
        unit_price: Amount,
    ) -> Result<TradeRecord, PapertradeError> {
        let symbol = validate_symbol(symbol)?;
        let quantity = validate_quantity(quantity)?;
        let unit_price = validate_price(unit_price)?;
        let proceeds = trade_value(quantity, unit_price)?;

        let result = self.with_retry("sell", user_id, || {
            self.ledger.in_transaction(
                user_id,
                &mut |tx: &mut dyn LedgerTx| -> Result<TradeRecord, PapertradeError> {
                    let held = tx.net_quantity(user_id, &symbol)?;
                    let cash = tx.cash_balance(user_id)?;
                    let updated = settle_sell(&symbol, cash, held, quantity, proceeds)?;
                    tx.update_cash_balance(user_id, updated)?;
                    tx.insert_trade(NewTrade {
                        user_id,
                        symbol: symbol.clone(),
                        price: unit_price,
                        quantity: Side::Sell.signed(quantity),
                    })
                },
            )
        });

        match &result {
            Ok(record) => info!(
                %user_id,
                symbol = %record.symbol,
                quantity,
                price = %unit_price,
                %proceeds,
                trade = %record.id,
                "sold"
            ),
            Err(e) => debug!(%user_id, %symbol, quantity, error = %e, "sell rejected"),
        }
        result
    }

    /// Look `symbol` up and buy at the quoted price. The quote's own symbol is
    /// what lands in the ledger.
    pub fn buy_at_market(
        &self,
        user_id: UserId,
        symbol: &str,
        quantity: i64,
        quotes: &dyn QuotePort,
    ) -> Result<TradeRecord, PapertradeError> {
        let quote = self.quote(symbol, quotes)?;
        self.execute_buy(user_id, &quote.symbol, quantity, quote.price)
    }

    pub fn sell_at_market(
        &self,
        user_id: UserId,
        symbol: &str,
        quantity: i64,
        quotes: &dyn QuotePort,
    ) -> Result<TradeRecord, PapertradeError> {
        let quote = self.quote(symbol, quotes)?;
        self.execute_sell(user_id, &quote.symbol, quantity, quote.price)
    }

    /// Re-run the whole validate-and-commit unit while storage keeps failing
    /// transiently, up to the configured attempt count.
    fn with_retry<F>(
        &self,
        operation: &str,
        user_id: UserId,
        mut attempt_once: F,
    ) -> Result<TradeRecord, PapertradeError>
    where
        F: FnMut() -> Result<TradeRecord, PapertradeError>,
    {
        let mut attempt = 1;
        loop {
            match attempt_once() {
                Err(e) if e.is_retryable() && attempt < self.settings.max_attempts => {
                    warn!(%user_id, operation, attempt, error = %e, "retrying after storage failure");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#![allow(dead_code)]

use papertrade::adapters::file_config_adapter::FileConfigAdapter;
use papertrade::adapters::memory_ledger_adapter::MemoryLedgerAdapter;
use papertrade::adapters::sqlite_adapter::SqliteLedgerAdapter;
use papertrade::domain::engine::AccountingEngine;
use papertrade::domain::error::PapertradeError;
use papertrade::domain::quote::Quote;
use papertrade::domain::settings::LedgerSettings;
use papertrade::domain::types::Amount;
use papertrade::ports::ledger_port::LedgerPort;
use papertrade::ports::quote_port::QuotePort;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

pub struct MockQuotePort {
    pub quotes: HashMap<String, Quote>,
    pub errors: HashMap<String, String>,
}

impl MockQuotePort {
    pub fn new() -> Self {
        Self {
            quotes: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_quote(mut self, symbol: &str, name: &str, price: Amount) -> Self {
        self.quotes.insert(
            symbol.to_string(),
            Quote {
                symbol: symbol.to_string(),
                name: name.to_string(),
                price,
            },
        );
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl QuotePort for MockQuotePort {
    fn lookup(&self, symbol: &str) -> Result<Option<Quote>, PapertradeError> {
        let symbol = symbol.to_uppercase();
        if let Some(reason) = self.errors.get(&symbol) {
            return Err(PapertradeError::QuoteSource {
                reason: reason.clone(),
            });
        }
        Ok(self.quotes.get(&symbol).cloned())
    }
}

pub fn settings(starting_cash: Amount) -> LedgerSettings {
    LedgerSettings {
        starting_cash,
        max_attempts: 3,
    }
}

pub fn memory_engine(starting_cash: Amount) -> AccountingEngine {
    AccountingEngine::new(Arc::new(MemoryLedgerAdapter::new()), settings(starting_cash))
}

pub fn sqlite_memory_engine(starting_cash: Amount) -> AccountingEngine {
    let ledger = SqliteLedgerAdapter::in_memory().unwrap();
    ledger.initialize_schema().unwrap();
    AccountingEngine::new(Arc::new(ledger), settings(starting_cash))
}

/// SQLite ledger in a temporary file with a multi-connection pool.
pub fn sqlite_file_engine(starting_cash: Amount) -> (TempDir, AccountingEngine) {
    let dir = TempDir::new().unwrap();
    let ini = format!(
        "[sqlite]\npath = {}\npool_size = 4\nbusy_timeout_ms = 10000\n",
        dir.path().join("ledger.db").display()
    );
    let config = FileConfigAdapter::from_string(&ini).unwrap();
    let ledger = SqliteLedgerAdapter::from_config(&config).unwrap();
    ledger.initialize_schema().unwrap();
    let engine = AccountingEngine::new(Arc::new(ledger), settings(starting_cash));
    (dir, engine)
}

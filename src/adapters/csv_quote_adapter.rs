//! CSV quote sheet adapter.
//!
//! The sheet has a header row and `symbol,name,price` columns. It is re-read on
//! every lookup, so edits to the file show up as price moves.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::error::PapertradeError;
use crate::domain::quote::Quote;
use crate::domain::types::Amount;
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::QuotePort;

pub struct CsvQuoteAdapter {
    path: PathBuf,
}

impl CsvQuoteAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PapertradeError> {
        let path = config
            .get_string("quotes", "path")
            .ok_or_else(|| PapertradeError::ConfigMissing {
                section: "quotes".into(),
                key: "path".into(),
            })?;
        Ok(Self::new(PathBuf::from(path)))
    }

    fn parse_record(record: &csv::StringRecord, line: usize) -> Result<Quote, PapertradeError> {
        let field = move |index: usize, column: &str| {
            record
                .get(index)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PapertradeError::QuoteSource {
                    reason: format!("line {line}: missing {column} column"),
                })
        };

        let symbol = field(0, "symbol")?.to_uppercase();
        let name = field(1, "name")?.to_string();
        let price = Amount::from_str(field(2, "price")?).map_err(|e| {
            PapertradeError::QuoteSource {
                reason: format!("line {line}: invalid price: {e}"),
            }
        })?;
        if price <= Amount::ZERO {
            return Err(PapertradeError::QuoteSource {
                reason: format!("line {line}: price for {symbol} must be positive"),
            });
        }

        Ok(Quote {
            symbol,
            name,
            price,
        })
    }
}

impl QuotePort for CsvQuoteAdapter {
    fn lookup(&self, symbol: &str) -> Result<Option<Quote>, PapertradeError> {
        let wanted = symbol.trim().to_uppercase();
        let content = fs::read_to_string(&self.path).map_err(|e| PapertradeError::QuoteSource {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        for (index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| PapertradeError::QuoteSource {
                reason: format!("CSV parse error: {}", e),
            })?;
            // Header is line 1.
            let quote = Self::parse_record(&record, index + 2)?;
            if quote.symbol == wanted {
                return Ok(Some(quote));
            }
        }
        Ok(None)
    }
}

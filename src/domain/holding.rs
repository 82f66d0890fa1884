//! Holdings derived from the trade ledger.

use super::error::PapertradeError;
use super::types::Amount;

/// Net quantity of one symbol, summed over a user's trade records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub symbol: String,
    pub quantity: i64,
}

impl Holding {
    pub fn new(symbol: impl Into<String>, quantity: i64) -> Self {
        Holding {
            symbol: symbol.into(),
            quantity,
        }
    }

    /// Exact zero and negative aggregates both count as not held.
    pub fn is_open(&self) -> bool {
        self.quantity > 0
    }

    pub fn market_value(&self, price: Amount) -> Result<Amount, PapertradeError> {
        Amount::from(self.quantity).checked_mul(price).ok_or_else(|| {
            PapertradeError::invalid_input(format!("market value of {} out of range", self.symbol))
        })
    }
}

/// Cash and raw net positions read from one storage snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub cash: Amount,
    /// Unfiltered net quantity per traded symbol, sorted by symbol.
    pub positions: Vec<Holding>,
}

impl AccountSnapshot {
    pub fn open_holdings(&self) -> Vec<Holding> {
        self.positions
            .iter()
            .filter(|h| h.is_open())
            .cloned()
            .collect()
    }

    pub fn net_quantity(&self, symbol: &str) -> i64 {
        self.positions
            .iter()
            .find(|h| h.symbol == symbol)
            .map_or(0, |h| h.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn open_only_when_positive() {
        assert!(Holding::new("AAPL", 1).is_open());
        assert!(!Holding::new("AAPL", 0).is_open());
        assert!(!Holding::new("AAPL", -3).is_open());
    }

    #[test]
    fn market_value_scales_by_quantity() {
        assert_eq!(
            Holding::new("AAPL", 6).market_value(dec!(150)).unwrap(),
            dec!(900)
        );
    }

    #[test]
    fn market_value_overflow_is_an_error() {
        assert!(matches!(
            Holding::new("AAPL", i64::MAX).market_value(Amount::MAX),
            Err(PapertradeError::InvalidInput { .. })
        ));
    }

    #[test]
    fn snapshot_filters_closed_positions() {
        let snapshot = AccountSnapshot {
            cash: dec!(100),
            positions: vec![
                Holding::new("AAPL", 0),
                Holding::new("MSFT", 5),
                Holding::new("TSLA", -1),
            ],
        };
        assert_eq!(snapshot.open_holdings(), vec![Holding::new("MSFT", 5)]);
        assert_eq!(snapshot.net_quantity("TSLA"), -1);
        assert_eq!(snapshot.net_quantity("NFLX"), 0);
    }
}

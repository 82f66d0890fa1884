//! Pure accounting rules: input validation, trade valuation, settlement and
//! ledger re-aggregation. No storage access happens here.

use std::collections::BTreeMap;

use super::error::PapertradeError;
use super::holding::Holding;
use super::trade::TradeRecord;
use super::types::Amount;

/// Trim and uppercase a symbol, rejecting blanks.
pub fn validate_symbol(symbol: &str) -> Result<String, PapertradeError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(PapertradeError::invalid_input("must provide stock symbol"));
    }
    Ok(symbol.to_uppercase())
}

pub fn validate_quantity(quantity: i64) -> Result<i64, PapertradeError> {
    if quantity <= 0 {
        return Err(PapertradeError::invalid_input(format!(
            "quantity must be a positive integer, got {quantity}"
        )));
    }
    Ok(quantity)
}

pub fn validate_price(price: Amount) -> Result<Amount, PapertradeError> {
    if price <= Amount::ZERO {
        return Err(PapertradeError::invalid_input(format!(
            "unit price must be positive, got {price}"
        )));
    }
    Ok(price)
}

/// `quantity * unit_price`, rejecting products that overflow the decimal range.
pub fn trade_value(quantity: i64, unit_price: Amount) -> Result<Amount, PapertradeError> {
    Amount::from(quantity)
        .checked_mul(unit_price)
        .ok_or_else(|| PapertradeError::invalid_input("trade value out of range"))
}

/// Cash remaining after paying `cost`.
pub fn settle_buy(cash: Amount, cost: Amount) -> Result<Amount, PapertradeError> {
    if cost > cash {
        return Err(PapertradeError::InsufficientFunds {
            required: cost,
            available: cash,
        });
    }
    Ok(cash - cost)
}

/// Cash after receiving `proceeds` for `quantity` shares out of `held`.
pub fn settle_sell(
    symbol: &str,
    cash: Amount,
    held: i64,
    quantity: i64,
    proceeds: Amount,
) -> Result<Amount, PapertradeError> {
    if quantity > held {
        return Err(PapertradeError::InsufficientShares {
            symbol: symbol.to_string(),
            requested: quantity,
            held,
        });
    }
    cash.checked_add(proceeds)
        .ok_or_else(|| PapertradeError::invalid_input("cash balance out of range"))
}

/// Net position after buying `quantity` more shares on top of `held`.
pub fn position_after_buy(
    symbol: &str,
    held: i64,
    quantity: i64,
) -> Result<i64, PapertradeError> {
    held.checked_add(quantity).ok_or_else(|| {
        PapertradeError::invalid_input(format!("position in {symbol} would exceed {}", i64::MAX))
    })
}

/// Net signed quantity per symbol over `trades`, unfiltered, sorted by symbol.
pub fn aggregate_positions<'a, I>(trades: I) -> Result<Vec<Holding>, PapertradeError>
where
    I: IntoIterator<Item = &'a TradeRecord>,
{
    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for trade in trades {
        let total = totals.entry(trade.symbol.as_str()).or_insert(0);
        *total = total.checked_add(trade.quantity).ok_or_else(|| {
            PapertradeError::invalid_input(format!("net position in {} out of range", trade.symbol))
        })?;
    }
    Ok(totals
        .into_iter()
        .map(|(symbol, quantity)| Holding::new(symbol, quantity))
        .collect())
}

/// Keep only strictly positive positions.
pub fn open_holdings(positions: Vec<Holding>) -> Vec<Holding> {
    positions.into_iter().filter(Holding::is_open).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{TradeId, UserId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn record(symbol: &str, quantity: i64) -> TradeRecord {
        TradeRecord {
            id: TradeId(0),
            user_id: UserId(1),
            symbol: symbol.into(),
            price: dec!(10),
            quantity,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn symbol_is_trimmed_and_uppercased() {
        assert_eq!(validate_symbol("  aapl ").unwrap(), "AAPL");
    }

    #[test]
    fn blank_symbol_rejected() {
        assert!(matches!(
            validate_symbol("   "),
            Err(PapertradeError::InvalidInput { .. })
        ));
    }

    #[test]
    fn non_positive_quantity_rejected() {
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-5).is_err());
        assert_eq!(validate_quantity(3).unwrap(), 3);
    }

    #[test]
    fn non_positive_price_rejected() {
        assert!(validate_price(dec!(0)).is_err());
        assert!(validate_price(dec!(-1.5)).is_err());
        assert_eq!(validate_price(dec!(0.01)).unwrap(), dec!(0.01));
    }

    #[test]
    fn trade_value_multiplies() {
        assert_eq!(trade_value(10, dec!(100)).unwrap(), dec!(1000));
        assert_eq!(trade_value(3, dec!(19.99)).unwrap(), dec!(59.97));
    }

    #[test]
    fn trade_value_overflow_is_invalid_input() {
        let result = trade_value(i64::MAX, Amount::MAX);
        assert!(matches!(result, Err(PapertradeError::InvalidInput { .. })));
    }

    #[test]
    fn settle_buy_allows_spending_everything() {
        assert_eq!(settle_buy(dec!(1000), dec!(1000)).unwrap(), dec!(0));
    }

    #[test]
    fn settle_buy_rejects_overspend() {
        match settle_buy(dec!(500), dec!(1000)) {
            Err(PapertradeError::InsufficientFunds {
                required,
                available,
            }) => {
                assert_eq!(required, dec!(1000));
                assert_eq!(available, dec!(500));
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
    }

    #[test]
    fn settle_sell_rejects_oversell() {
        match settle_sell("AAPL", dec!(0), 5, 6, dec!(60)) {
            Err(PapertradeError::InsufficientShares {
                symbol,
                requested,
                held,
            }) => {
                assert_eq!(symbol, "AAPL");
                assert_eq!(requested, 6);
                assert_eq!(held, 5);
            }
            other => panic!("expected InsufficientShares, got {other:?}"),
        }
    }

    #[test]
    fn settle_sell_credits_proceeds() {
        assert_eq!(
            settle_sell("AAPL", dec!(9000), 10, 4, dec!(600)).unwrap(),
            dec!(9600)
        );
    }

    #[test]
    fn aggregate_sums_per_symbol() {
        let trades = vec![
            record("AAPL", 10),
            record("MSFT", 2),
            record("AAPL", -4),
            record("MSFT", -2),
        ];
        let positions = aggregate_positions(&trades).unwrap();
        assert_eq!(
            positions,
            vec![Holding::new("AAPL", 6), Holding::new("MSFT", 0)]
        );
        assert_eq!(open_holdings(positions), vec![Holding::new("AAPL", 6)]);
    }

    #[test]
    fn aggregate_of_nothing_is_empty() {
        assert!(aggregate_positions(&Vec::<TradeRecord>::new()).unwrap().is_empty());
    }

    #[test]
    fn aggregate_overflow_is_an_error() {
        let trades = vec![record("AAPL", i64::MAX), record("AAPL", 1)];
        assert!(matches!(
            aggregate_positions(&trades),
            Err(PapertradeError::InvalidInput { .. })
        ));
    }

    #[test]
    fn position_after_buy_rejects_overflow() {
        assert_eq!(position_after_buy("AAPL", 10, 5).unwrap(), 15);
        assert_eq!(position_after_buy("AAPL", 0, i64::MAX).unwrap(), i64::MAX);
        assert!(matches!(
            position_after_buy("AAPL", i64::MAX, 1),
            Err(PapertradeError::InvalidInput { .. })
        ));
    }
}

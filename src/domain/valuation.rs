//! Portfolio valuation at current quotes.

use super::error::PapertradeError;
use super::holding::AccountSnapshot;
use super::types::Amount;
use crate::ports::quote_port::QuotePort;

#[derive(Debug, Clone, PartialEq)]
pub struct ValuedHolding {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: Amount,
    pub total: Amount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioValuation {
    pub rows: Vec<ValuedHolding>,
    pub holdings_total: Amount,
    pub cash: Amount,
}

impl PortfolioValuation {
    /// Cash plus the market value of every open holding. Always in range for
    /// a valuation built by [`value_portfolio`].
    pub fn grand_total(&self) -> Amount {
        self.cash.saturating_add(self.holdings_total)
    }
}

/// Price every open holding in `snapshot`. A held symbol the quote source no
/// longer knows is an error rather than a silently dropped row.
pub fn value_portfolio(
    snapshot: &AccountSnapshot,
    quotes: &dyn QuotePort,
) -> Result<PortfolioValuation, PapertradeError> {
    let mut rows = Vec::new();
    for holding in snapshot.open_holdings() {
        let quote =
            quotes
                .lookup(&holding.symbol)?
                .ok_or_else(|| PapertradeError::SymbolNotFound {
                    symbol: holding.symbol.clone(),
                })?;
        rows.push(ValuedHolding {
            total: holding.market_value(quote.price)?,
            symbol: holding.symbol,
            name: quote.name,
            shares: holding.quantity,
            price: quote.price,
        });
    }

    let out_of_range = || PapertradeError::invalid_input("portfolio value out of range");
    let holdings_total = rows
        .iter()
        .try_fold(Amount::ZERO, |sum, r| sum.checked_add(r.total))
        .ok_or_else(out_of_range)?;
    snapshot
        .cash
        .checked_add(holdings_total)
        .ok_or_else(out_of_range)?;
    Ok(PortfolioValuation {
        rows,
        holdings_total,
        cash: snapshot.cash,
    })
}

//! Ledger trade records.

use chrono::{DateTime, Utc};

use super::types::{Amount, TradeId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Sign applied to the quantity stored in the ledger.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        }
    }
}

/// A trade about to be appended. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrade {
    pub user_id: UserId,
    pub symbol: String,
    pub price: Amount,
    pub quantity: i64,
}

/// An appended, immutable ledger entry. Positive quantity acquires, negative disposes.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: TradeId,
    pub user_id: UserId,
    pub symbol: String,
    pub price: Amount,
    pub quantity: i64,
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn side(&self) -> Side {
        if self.quantity > 0 { Side::Buy } else { Side::Sell }
    }

    /// Cash moved by this trade: negative for buys, positive for sells.
    pub fn cash_delta(&self) -> Amount {
        -(Amount::from(self.quantity) * self.price)
    }
}

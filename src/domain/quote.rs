//! Quote returned by the quote source.

use super::types::Amount;

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Amount,
}

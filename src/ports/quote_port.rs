//! Quote source port trait.

use crate::domain::error::PapertradeError;
use crate::domain::quote::Quote;

pub trait QuotePort {
    /// Current quote for `symbol`, or `None` when the source does not know it.
    fn lookup(&self, symbol: &str) -> Result<Option<Quote>, PapertradeError>;
}

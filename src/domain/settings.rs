//! Ledger settings built from configuration.
//!
//! Reads the `[ledger]` section:
//! - `starting_cash`: cash granted at registration (default 10000.00)
//! - `max_attempts`: how many times a trade is attempted when storage fails
//!   transiently (default 3)

use crate::domain::error::PapertradeError;
use crate::domain::types::Amount;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_STARTING_CASH: Amount = Amount::from_parts(1_000_000, 0, 0, false, 2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSettings {
    pub starting_cash: Amount,
    pub max_attempts: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            starting_cash: DEFAULT_STARTING_CASH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

pub fn build_ledger_settings(config: &dyn ConfigPort) -> Result<LedgerSettings, PapertradeError> {
    let starting_cash = config.get_decimal("ledger", "starting_cash", DEFAULT_STARTING_CASH);
    if starting_cash < Amount::ZERO {
        return Err(PapertradeError::ConfigInvalid {
            section: "ledger".to_string(),
            key: "starting_cash".to_string(),
            reason: "starting_cash must be non-negative".to_string(),
        });
    }

    let max_attempts = config.get_int("ledger", "max_attempts", DEFAULT_MAX_ATTEMPTS as i64);
    if !(1..=i64::from(u32::MAX)).contains(&max_attempts) {
        return Err(PapertradeError::ConfigInvalid {
            section: "ledger".to_string(),
            key: "max_attempts".to_string(),
            reason: "max_attempts must be at least 1".to_string(),
        });
    }

    Ok(LedgerSettings {
        starting_cash,
        max_attempts: max_attempts as u32,
    })
}

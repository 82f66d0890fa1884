//! Domain error types.

use rust_decimal::Decimal;

use super::types::UserId;

/// Top-level error type for papertrade.
#[derive(Debug, thiserror::Error)]
pub enum PapertradeError {
    #[error("user {user_id} not found")]
    UserNotFound { user_id: UserId },

    #[error("symbol {symbol} not found")]
    SymbolNotFound { symbol: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: String,
        requested: i64,
        held: i64,
    },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("quote source error: {reason}")]
    QuoteSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PapertradeError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        PapertradeError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl ToString) -> Self {
        PapertradeError::Storage {
            reason: reason.to_string(),
        }
    }

    /// Unknown user or unknown symbol.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PapertradeError::UserNotFound { .. } | PapertradeError::SymbolNotFound { .. }
        )
    }

    /// Only storage failures are worth re-running the whole validate-and-commit unit for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PapertradeError::Storage { .. })
    }
}

impl From<&PapertradeError> for std::process::ExitCode {
    fn from(err: &PapertradeError) -> Self {
        let code: u8 = match err {
            PapertradeError::Io(_) => 1,
            PapertradeError::ConfigParse { .. }
            | PapertradeError::ConfigMissing { .. }
            | PapertradeError::ConfigInvalid { .. } => 2,
            PapertradeError::Storage { .. } => 3,
            PapertradeError::UserNotFound { .. }
            | PapertradeError::SymbolNotFound { .. }
            | PapertradeError::InvalidInput { .. } => 4,
            PapertradeError::InsufficientFunds { .. }
            | PapertradeError::InsufficientShares { .. } => 5,
            PapertradeError::QuoteSource { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

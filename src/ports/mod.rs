//! Port traits: the boundaries the accounting core consumes.

pub mod config_port;
pub mod ledger_port;
pub mod quote_port;

//! Core domain types and accounting logic.

pub mod types;
pub mod trade;
pub mod holding;
pub mod quote;
pub mod accounting;
pub mod valuation;
pub mod settings;
pub mod engine;
pub mod error;

//! CLI definition and dispatch.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use crate::adapters::csv_quote_adapter::CsvQuoteAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::sqlite_adapter::SqliteLedgerAdapter;
use crate::domain::accounting::validate_symbol;
use crate::domain::engine::AccountingEngine;
use crate::domain::error::PapertradeError;
use crate::domain::quote::Quote;
use crate::domain::settings::build_ledger_settings;
use crate::domain::trade::{Side, TradeRecord};
use crate::domain::types::{usd, UserId};
use crate::domain::valuation::PortfolioValuation;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::quote_port::QuotePort;

#[derive(Parser, Debug)]
#[command(name = "papertrade", about = "Paper stock-trading ledger")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the ledger database and its tables
    Init {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Register a user
    Register {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        username: String,
        /// Starting cash, defaults to [ledger] starting_cash
        #[arg(long)]
        cash: Option<Decimal>,
    },
    /// Look up the current quote for a symbol
    Quote {
        #[arg(short, long)]
        config: PathBuf,
        symbol: String,
    },
    /// Buy shares at the quoted price
    Buy {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: i64,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        shares: i64,
    },
    /// Sell shares at the quoted price
    Sell {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: i64,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        shares: i64,
    },
    /// Show open holdings valued at current quotes
    Portfolio {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: i64,
    },
    /// Show every trade, newest first
    History {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: i64,
    },
    /// Show the cash balance
    Cash {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: i64,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let stdout = io::stdout();
    match execute(cli.command, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            (&err).into()
        }
    }
}

/// Run one command, writing its report to `out`.
pub fn execute(command: Command, out: &mut dyn Write) -> Result<(), PapertradeError> {
    match command {
        Command::Init { config } => {
            let config = load_config(&config)?;
            SqliteLedgerAdapter::from_config(&config)?.initialize_schema()?;
            writeln!(out, "ledger initialized")?;
        }
        Command::Register {
            config,
            username,
            cash,
        } => {
            let engine = open_engine(&load_config(&config)?)?;
            let user_id = match cash {
                Some(cash) => engine.register_with_cash(&username, cash)?,
                None => engine.register(&username)?,
            };
            writeln!(out, "registered {} as user {}", username.trim(), user_id)?;
        }
        Command::Quote { config, symbol } => {
            let quotes = CsvQuoteAdapter::from_config(&load_config(&config)?)?;
            let symbol = validate_symbol(&symbol)?;
            let quote = quotes
                .lookup(&symbol)?
                .ok_or(PapertradeError::SymbolNotFound { symbol })?;
            writeln!(out, "{}", format_quote(&quote))?;
        }
        Command::Buy {
            config,
            user,
            symbol,
            shares,
        } => {
            let config = load_config(&config)?;
            let quotes = CsvQuoteAdapter::from_config(&config)?;
            let engine = open_engine(&config)?;
            let record = engine.buy_at_market(UserId(user), &symbol, shares, &quotes)?;
            writeln!(out, "Bought! {}", format_trade(&record))?;
        }
        Command::Sell {
            config,
            user,
            symbol,
            shares,
        } => {
            let config = load_config(&config)?;
            let quotes = CsvQuoteAdapter::from_config(&config)?;
            let engine = open_engine(&config)?;
            let record = engine.sell_at_market(UserId(user), &symbol, shares, &quotes)?;
            writeln!(out, "Sold! {}", format_trade(&record))?;
        }
        Command::Portfolio { config, user } => {
            let config = load_config(&config)?;
            let quotes = CsvQuoteAdapter::from_config(&config)?;
            let engine = open_engine(&config)?;
            let valuation = engine.portfolio(UserId(user), &quotes)?;
            write!(out, "{}", format_portfolio(&valuation))?;
        }
        Command::History { config, user } => {
            let engine = open_engine(&load_config(&config)?)?;
            write!(out, "{}", format_history(&engine.trade_history(UserId(user))?))?;
        }
        Command::Cash { config, user } => {
            let engine = open_engine(&load_config(&config)?)?;
            writeln!(out, "{}", usd(engine.cash_balance(UserId(user))?))?;
        }
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, PapertradeError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Build an engine over the configured SQLite ledger, creating tables if needed.
pub fn open_engine(config: &dyn ConfigPort) -> Result<AccountingEngine, PapertradeError> {
    let ledger = SqliteLedgerAdapter::from_config(config)?;
    let settings = build_ledger_settings(config)?;
    ledger.initialize_schema()?;
    Ok(AccountingEngine::new(Arc::new(ledger), settings))
}

pub fn format_quote(quote: &Quote) -> String {
    format!("A share of {} ({}) costs {}.", quote.name, quote.symbol, usd(quote.price))
}

pub fn format_trade(record: &TradeRecord) -> String {
    let verb = match record.side() {
        Side::Buy => "bought",
        Side::Sell => "sold",
    };
    format!(
        "{} {} {} @ {} ({})",
        record.id,
        verb,
        record.quantity.unsigned_abs(),
        usd(record.price),
        record.symbol
    )
}

pub fn format_portfolio(valuation: &PortfolioValuation) -> String {
    let mut out = format!(
        "{:<8} {:<28} {:>8} {:>14} {:>16}\n",
        "Symbol", "Name", "Shares", "Price", "Total"
    );
    for row in &valuation.rows {
        out.push_str(&format!(
            "{:<8} {:<28} {:>8} {:>14} {:>16}\n",
            row.symbol,
            row.name,
            row.shares,
            usd(row.price),
            usd(row.total)
        ));
    }
    out.push_str(&format!("{:<62}{:>16}\n", "CASH", usd(valuation.cash)));
    out.push_str(&format!(
        "{:<62}{:>16}\n",
        "TOTAL",
        usd(valuation.grand_total())
    ));
    out
}

pub fn format_history(history: &[TradeRecord]) -> String {
    let mut out = format!(
        "{:<8} {:>8} {:>14}  {}\n",
        "Symbol", "Shares", "Price", "Transacted"
    );
    for record in history {
        out.push_str(&format!(
            "{:<8} {:>8} {:>14}  {}\n",
            record.symbol,
            record.quantity,
            usd(record.price),
            record.executed_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    out
}

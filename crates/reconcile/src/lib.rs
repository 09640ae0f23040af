//! Dividend reconciliation over a normalized cash ledger, plus the two small
//! transforms that feed the purchase history: the trade-description grammar
//! and the prefix-sum purchase aggregator.

pub mod description;
pub mod engine;
pub mod purchases;

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("malformed trade description: '{0}'")]
    MalformedDescription(String),
    #[error("no conversion row found for {currency} dividend on '{product}' booked {date}")]
    UnresolvedFxRate {
        product: String,
        date: NaiveDate,
        currency: String,
    },
    #[error("corporate action cost on {date} matches dividends from multiple products: {products:?}")]
    AmbiguousMatch {
        date: NaiveDate,
        products: Vec<String>,
    },
    #[error("conflicting conversion rates for {currency} on {date}")]
    AmbiguousFxQuote { date: NaiveDate, currency: String },
}

pub use description::{is_trade_description, parse_trade_description};
pub use engine::reconcile_dividends;
pub use purchases::aggregate_purchases;

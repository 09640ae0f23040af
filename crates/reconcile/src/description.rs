//! Grammar for the broker's free-text trade descriptions:
//!
//! ```text
//! <verb> <quantity> @ <price> [<currency>]
//! ```
//!
//! e.g. `Koop 10 @ 123,45 EUR` or `Buy 10 @ 123,45 EUR`, numeric tokens
//! using the comma-as-decimal convention. Anything else is rejected instead
//! of being positionally mis-split.

use std::sync::OnceLock;

use models::TradeFill;
use regex::Regex;

use crate::ReconcileError;

const TRADE_PATTERN: &str =
    r"^\S+\s+(-?[0-9][0-9.,]*)\s+@\s+(-?[0-9][0-9.,]*)(?:\s+[A-Z]{3})?$";

fn trade_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TRADE_PATTERN).unwrap())
}

/// Returns whether a description matches the trade grammar; used to select
/// trade rows out of a mixed ledger.
pub fn is_trade_description(text: &str) -> bool {
    trade_regex().is_match(text.trim())
}

/// Parses a trade description into its quantity and unit price.
pub fn parse_trade_description(text: &str) -> Result<TradeFill, ReconcileError> {
    let malformed = || ReconcileError::MalformedDescription(text.to_string());

    if text.split_whitespace().count() < 4 {
        return Err(malformed());
    }
    let caps = trade_regex().captures(text.trim()).ok_or_else(malformed)?;

    let quantity = parse_comma_decimal(&caps[1]).ok_or_else(malformed)?;
    let unit_price = parse_comma_decimal(&caps[2]).ok_or_else(malformed)?;
    Ok(TradeFill {
        quantity,
        unit_price,
    })
}

/// `.` groups thousands, `,` separates decimals.
fn parse_comma_decimal(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace('.', "").replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_buy_with_comma_decimal_price() {
        // Scenario D.
        let fill = parse_trade_description("Buy 10 @ 123,45 EUR").unwrap();
        assert_eq!(fill.quantity, 10.0);
        assert_eq!(fill.unit_price, 123.45);
    }

    #[test]
    fn parses_the_dutch_verb_too() {
        let fill = parse_trade_description("Koop 3 @ 1.234,56 EUR").unwrap();
        assert_eq!(fill.quantity, 3.0);
        assert_eq!(fill.unit_price, 1234.56);
    }

    #[test]
    fn currency_token_is_optional() {
        let fill = parse_trade_description("Verkoop -2 @ 55,10 EUR").unwrap();
        assert_eq!(fill.quantity, -2.0);
        let without = parse_trade_description("Buy 4 @ 10,00 USD").unwrap();
        assert_eq!(without.quantity, 4.0);
    }

    #[test]
    fn too_few_tokens_is_malformed() {
        let err = parse_trade_description("Buy 10 @").unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedDescription(_)));
    }

    #[test]
    fn non_numeric_tokens_are_malformed() {
        assert!(parse_trade_description("Buy ten @ 123,45 EUR").is_err());
        assert!(parse_trade_description("Buy 10 @ expensive EUR").is_err());
    }

    #[test]
    fn unrelated_descriptions_do_not_match_the_grammar() {
        assert!(!is_trade_description("Dividend"));
        assert!(!is_trade_description("iDEAL storting"));
        assert!(!is_trade_description("Corporate Action Kosten"));
        assert!(is_trade_description("Koop 10 @ 123,45 EUR"));
    }
}

//! The reconciliation core: matches raw dividend ledger rows to their
//! corporate-action fee deductions and realized FX rates, producing the true
//! dividend received in the account's base currency.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use models::{DividendEvent, FxQuote, LedgerRecord};

use crate::ReconcileError;

/// Dividend rows are recognized by this case-sensitive fragment. It also
/// matches the broker's dividend-tax rows ("Dividendbelasting"), which net
/// against the payout the same way.
const DIVIDEND_MARKER: &str = "Dividend";
/// Fee rows charged for processing a corporate event; always cash-only
/// (empty product).
const CORPORATE_ACTION_COST_MARKER: &str = "Corporate Action Kosten";

/// Reconciles every dividend row of `ledger` into a [`DividendEvent`] in the
/// account's base currency.
///
/// The ledger must already be sorted ascending by booking date (the statement
/// loader guarantees this); the engine preserves that order and does not
/// re-sort. Pure function: same ledger in, same events out.
///
/// A value date's fee is netted against exactly one event — the first
/// dividend row booked on that date — so a payout that also books a tax row
/// the same day is not charged twice.
///
/// Fails with:
/// - [`ReconcileError::AmbiguousMatch`] when a fee row falls on a value date
///   shared by dividends of more than one product — fee rows carry no product
///   identifier, so attribution would be a guess;
/// - [`ReconcileError::UnresolvedFxRate`] when a foreign-currency dividend has
///   no conversion row on its booking date — never silently assumes rate 1;
/// - [`ReconcileError::AmbiguousFxQuote`] when conversion rows on one date
///   disagree about the rate for one currency.
pub fn reconcile_dividends(
    ledger: &[LedgerRecord],
    base_currency: &str,
) -> Result<Vec<DividendEvent>, ReconcileError> {
    // Stage 1: classification. Fee rows are checked first since their
    // description could in principle also mention the dividend itself.
    let mut dividends: Vec<&LedgerRecord> = Vec::new();
    let mut costs: Vec<&LedgerRecord> = Vec::new();
    for rec in ledger {
        if rec.description.contains(CORPORATE_ACTION_COST_MARKER) {
            costs.push(rec);
        } else if rec.description.contains(DIVIDEND_MARKER) {
            dividends.push(rec);
        }
    }

    // Stage 2: fee matching on value date. Multiple fee rows on one date sum;
    // a date carrying a fee and dividends of several products is ambiguous.
    let mut costs_by_date: HashMap<NaiveDate, f64> = HashMap::new();
    for cost in &costs {
        *costs_by_date.entry(cost.value_date).or_insert(0.0) += cost.amount;
    }
    // Sorted, so with several ambiguous dates the earliest one is reported.
    let mut fee_dates: Vec<NaiveDate> = costs_by_date.keys().copied().collect();
    fee_dates.sort();
    for date in fee_dates {
        let mut products: Vec<String> = dividends
            .iter()
            .filter(|d| d.value_date == date)
            .map(|d| d.product.clone())
            .collect();
        products.sort();
        products.dedup();
        if products.len() > 1 {
            return Err(ReconcileError::AmbiguousMatch { date, products });
        }
    }

    // Stage 3: FX table from the account's own conversion rows.
    let quotes = build_fx_table(ledger)?;

    // Stage 4: conversion, in booking order. A date's fee is attached exactly
    // once, to the first dividend row booked on it: one product can pay out
    // and withhold tax on the same value date (both rows match the dividend
    // marker), and charging the fee to each row would double-count it.
    let mut events = Vec::with_capacity(dividends.len());
    let mut claimed_fee_dates: HashSet<NaiveDate> = HashSet::new();
    for div in dividends {
        let corporate_action_cost = match costs_by_date.get(&div.value_date) {
            Some(&fee) if claimed_fee_dates.insert(div.value_date) => fee,
            _ => 0.0,
        };

        let fx_rate = if div.currency == base_currency {
            1.0
        } else {
            // "Valuta Debitering" value date agrees with the dividend's
            // booking date, hence the cross-field match key.
            match quotes.get(&(div.booking_date, div.currency.clone())) {
                Some(rate) => *rate,
                None => {
                    return Err(ReconcileError::UnresolvedFxRate {
                        product: div.product.clone(),
                        date: div.booking_date,
                        currency: div.currency.clone(),
                    })
                }
            }
        };

        // Cost rows are negative debits, so addition nets correctly.
        let dividend_foreign = div.amount + corporate_action_cost;

        events.push(DividendEvent {
            product: div.product.clone(),
            booking_date: div.booking_date,
            value_date: div.value_date,
            year_month: year_month(div.booking_date),
            currency: div.currency.clone(),
            gross_amount: div.amount,
            corporate_action_cost,
            fx_rate,
            net_base_amount: dividend_foreign / fx_rate,
        });
    }
    Ok(events)
}

/// Extracts the realized FX quotes from a ledger: conversion rows carry a
/// rate and no product. Keyed by (value date, currency); duplicate rows with
/// the same rate are tolerated, conflicting rates are surfaced.
pub fn fx_quotes(ledger: &[LedgerRecord]) -> Result<Vec<FxQuote>, ReconcileError> {
    let table = build_fx_table(ledger)?;
    let mut quotes: Vec<FxQuote> = table
        .into_iter()
        .map(|((value_date, currency), rate)| FxQuote {
            value_date,
            currency,
            rate,
        })
        .collect();
    quotes.sort_by(|a, b| (a.value_date, &a.currency).cmp(&(b.value_date, &b.currency)));
    Ok(quotes)
}

fn build_fx_table(
    ledger: &[LedgerRecord],
) -> Result<HashMap<(NaiveDate, String), f64>, ReconcileError> {
    let mut table: HashMap<(NaiveDate, String), f64> = HashMap::new();
    for rec in ledger {
        let rate = match rec.fx_rate {
            Some(rate) if rec.product.is_empty() => rate,
            _ => continue,
        };
        let key = (rec.value_date, rec.currency.clone());
        if let Some(existing) = table.get(&key) {
            if (existing - rate).abs() > 1e-9 {
                return Err(ReconcileError::AmbiguousFxQuote {
                    date: rec.value_date,
                    currency: rec.currency.clone(),
                });
            }
        } else {
            table.insert(key, rate);
        }
    }
    Ok(table)
}

fn year_month(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        booking: &str,
        value: &str,
        description: &str,
        product: &str,
        amount: f64,
        currency: &str,
        fx_rate: Option<f64>,
    ) -> LedgerRecord {
        LedgerRecord {
            booking_date: NaiveDate::parse_from_str(booking, "%Y-%m-%d").unwrap(),
            value_date: NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap(),
            description: description.to_string(),
            product: product.to_string(),
            amount,
            currency: currency.to_string(),
            fx_rate,
        }
    }

    fn dividend(date: &str, product: &str, amount: f64, currency: &str) -> LedgerRecord {
        record(date, date, "Dividend", product, amount, currency, None)
    }

    fn cost(date: &str, amount: f64, currency: &str) -> LedgerRecord {
        record(
            date,
            date,
            "Corporate Action Kosten",
            "",
            amount,
            currency,
            None,
        )
    }

    fn conversion(date: &str, currency: &str, rate: f64) -> LedgerRecord {
        record(date, date, "Valuta Debitering", "", 0.0, currency, Some(rate))
    }

    #[test]
    fn base_currency_dividend_with_fee_same_value_date() {
        // Scenario A: 100 EUR dividend, -5 EUR fee, base currency EUR -> 95.
        let ledger = vec![
            dividend("2024-06-03", "VANGUARD FTSE AW", 100.0, "EUR"),
            cost("2024-06-03", -5.0, "EUR"),
        ];
        let events = reconcile_dividends(&ledger, "EUR").unwrap();

        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.fx_rate, 1.0);
        assert_eq!(e.gross_amount, 100.0);
        assert_eq!(e.corporate_action_cost, -5.0);
        assert_eq!(e.net_base_amount, 95.0);
        assert_eq!(e.year_month, "2024-06");
    }

    #[test]
    fn base_currency_net_is_gross_plus_cost_exactly() {
        let ledger = vec![
            dividend("2024-01-15", "ACME", 12.34, "EUR"),
            cost("2024-01-15", -0.5, "EUR"),
            dividend("2024-04-15", "ACME", 56.78, "EUR"),
        ];
        let events = reconcile_dividends(&ledger, "EUR").unwrap();
        for e in &events {
            assert_eq!(e.net_base_amount, e.gross_amount + e.corporate_action_cost);
        }
    }

    #[test]
    fn foreign_dividend_converted_at_booking_date_rate() {
        // Scenario B: 100 USD dividend, base EUR, conversion row at 1.10.
        let ledger = vec![
            dividend("2024-03-05", "ACME US", 100.0, "USD"),
            conversion("2024-03-05", "USD", 1.10),
        ];
        let events = reconcile_dividends(&ledger, "EUR").unwrap();

        assert_eq!(events[0].fx_rate, 1.10);
        assert!((events[0].net_base_amount - 100.0 / 1.10).abs() < 1e-9);
    }

    #[test]
    fn foreign_dividend_without_conversion_row_fails() {
        // Scenario C: never default a missing rate to 1.
        let ledger = vec![dividend("2024-03-05", "ACME US", 100.0, "USD")];
        let err = reconcile_dividends(&ledger, "EUR").unwrap_err();
        assert_eq!(
            err,
            ReconcileError::UnresolvedFxRate {
                product: "ACME US".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                currency: "USD".to_string(),
            }
        );
    }

    #[test]
    fn fee_shared_by_two_products_is_ambiguous() {
        // Scenario E: fee rows carry no product, so this cannot be attributed.
        let ledger = vec![
            dividend("2024-06-03", "ACME", 40.0, "EUR"),
            dividend("2024-06-03", "GLOBEX", 60.0, "EUR"),
            cost("2024-06-03", -5.0, "EUR"),
        ];
        let err = reconcile_dividends(&ledger, "EUR").unwrap_err();
        match err {
            ReconcileError::AmbiguousMatch { date, products } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
                assert_eq!(products, vec!["ACME".to_string(), "GLOBEX".to_string()]);
            }
            other => panic!("expected AmbiguousMatch, got {:?}", other),
        }
    }

    #[test]
    fn two_products_same_date_without_fee_is_fine() {
        let ledger = vec![
            dividend("2024-06-03", "ACME", 40.0, "EUR"),
            dividend("2024-06-03", "GLOBEX", 60.0, "EUR"),
        ];
        let events = reconcile_dividends(&ledger, "EUR").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].corporate_action_cost, 0.0);
        assert_eq!(events[1].corporate_action_cost, 0.0);
    }

    #[test]
    fn tax_row_of_the_same_product_does_not_double_count_the_fee() {
        // One product, one value date: the payout row plus the broker's
        // withholding-tax row. The fee nets against the date once.
        let ledger = vec![
            dividend("2024-06-03", "ACME", 100.0, "EUR"),
            record(
                "2024-06-03",
                "2024-06-03",
                "Dividendbelasting",
                "ACME",
                -15.0,
                "EUR",
                None,
            ),
            cost("2024-06-03", -5.0, "EUR"),
        ];
        let events = reconcile_dividends(&ledger, "EUR").unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].corporate_action_cost, -5.0);
        assert_eq!(events[1].corporate_action_cost, 0.0);
        let total: f64 = events.iter().map(|e| e.net_base_amount).sum();
        assert_eq!(total, 100.0 - 15.0 - 5.0);
    }

    #[test]
    fn earliest_ambiguous_date_is_reported() {
        let ledger = vec![
            dividend("2024-06-03", "ACME", 40.0, "EUR"),
            dividend("2024-06-03", "GLOBEX", 60.0, "EUR"),
            cost("2024-06-03", -5.0, "EUR"),
            dividend("2024-09-03", "ACME", 40.0, "EUR"),
            dividend("2024-09-03", "GLOBEX", 60.0, "EUR"),
            cost("2024-09-03", -5.0, "EUR"),
        ];
        let err = reconcile_dividends(&ledger, "EUR").unwrap_err();
        match err {
            ReconcileError::AmbiguousMatch { date, .. } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
            }
            other => panic!("expected AmbiguousMatch, got {:?}", other),
        }
    }

    #[test]
    fn multiple_fee_rows_on_one_date_sum() {
        let ledger = vec![
            dividend("2024-06-03", "ACME", 100.0, "EUR"),
            cost("2024-06-03", -2.0, "EUR"),
            cost("2024-06-03", -3.0, "EUR"),
        ];
        let events = reconcile_dividends(&ledger, "EUR").unwrap();
        assert_eq!(events[0].corporate_action_cost, -5.0);
        assert_eq!(events[0].net_base_amount, 95.0);
    }

    #[test]
    fn conflicting_rates_on_one_date_fail() {
        let ledger = vec![
            dividend("2024-03-05", "ACME US", 100.0, "USD"),
            conversion("2024-03-05", "USD", 1.10),
            conversion("2024-03-05", "USD", 1.20),
        ];
        let err = reconcile_dividends(&ledger, "EUR").unwrap_err();
        assert!(matches!(err, ReconcileError::AmbiguousFxQuote { .. }));
    }

    #[test]
    fn duplicate_equal_rate_rows_are_tolerated() {
        // The debit and credit legs of one conversion repeat the same rate.
        let ledger = vec![
            dividend("2024-03-05", "ACME US", 100.0, "USD"),
            conversion("2024-03-05", "USD", 1.10),
            conversion("2024-03-05", "USD", 1.10),
        ];
        let events = reconcile_dividends(&ledger, "EUR").unwrap();
        assert_eq!(events[0].fx_rate, 1.10);
    }

    #[test]
    fn conversion_rows_with_product_are_not_quotes() {
        let mut odd = conversion("2024-03-05", "USD", 1.10);
        odd.product = "ACME US".to_string();
        let ledger = vec![dividend("2024-03-05", "ACME US", 100.0, "USD"), odd];
        let err = reconcile_dividends(&ledger, "EUR").unwrap_err();
        assert!(matches!(err, ReconcileError::UnresolvedFxRate { .. }));
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let ledger = vec![
            dividend("2024-01-15", "ACME", 10.0, "EUR"),
            cost("2024-01-15", -0.5, "EUR"),
            dividend("2024-03-05", "ACME US", 100.0, "USD"),
            conversion("2024-03-05", "USD", 1.10),
        ];
        let first = reconcile_dividends(&ledger, "EUR").unwrap();
        let second = reconcile_dividends(&ledger, "EUR").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn events_keep_booking_order() {
        let ledger = vec![
            dividend("2024-01-15", "ACME", 1.0, "EUR"),
            dividend("2024-02-15", "ACME", 2.0, "EUR"),
            dividend("2024-03-15", "ACME", 3.0, "EUR"),
        ];
        let events = reconcile_dividends(&ledger, "EUR").unwrap();
        let dates: Vec<_> = events.iter().map(|e| e.booking_date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }

    #[test]
    fn non_dividend_rows_are_ignored() {
        let ledger = vec![
            record(
                "2024-01-02",
                "2024-01-02",
                "iDEAL storting",
                "",
                500.0,
                "EUR",
                None,
            ),
            record(
                "2024-01-03",
                "2024-01-03",
                "Koop 10 @ 12,34 EUR",
                "ACME",
                -123.4,
                "EUR",
                None,
            ),
            dividend("2024-01-15", "ACME", 10.0, "EUR"),
        ];
        let events = reconcile_dividends(&ledger, "EUR").unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn fx_quotes_are_extracted_and_sorted() {
        let ledger = vec![
            conversion("2024-03-07", "GBP", 0.85),
            conversion("2024-03-05", "USD", 1.10),
        ];
        let quotes = fx_quotes(&ledger).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].currency, "USD");
        assert_eq!(quotes[1].currency, "GBP");
    }
}

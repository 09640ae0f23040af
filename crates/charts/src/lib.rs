//! Chart renderer: turns reconciled dividend events and aggregated purchases
//! into time-series chart documents, written as pretty-printed JSON for the
//! frontend to plot. All presentation concerns (currency symbols, titles)
//! live here; the symbol table comes from explicit settings, never a
//! process-wide constant.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use models::{
    AggregatedPosition, ChartDocument, ChartPoint, ChartSeries, DividendEvent, MonthlyTotal,
    Settings,
};

/// Resolves the display symbol for an ISO currency code from the settings
/// map, falling back to the code itself.
pub fn currency_symbol(settings: &Settings, code: &str) -> String {
    settings
        .currency_symbols
        .get(code)
        .cloned()
        .unwrap_or_else(|| code.to_string())
}

/// Builds the per-event and cumulative dividend series in the base currency.
pub fn dividend_series(
    events: &[DividendEvent],
    settings: &Settings,
    base_currency: &str,
) -> ChartSeries {
    let mut cumulative = 0.0;
    let points = events
        .iter()
        .map(|e| {
            cumulative += e.net_base_amount;
            ChartPoint {
                date: e.booking_date,
                value: e.net_base_amount,
                cumulative,
            }
        })
        .collect();

    ChartSeries {
        title: "Dividend".to_string(),
        currency: base_currency.to_string(),
        currency_symbol: currency_symbol(settings, base_currency),
        points,
    }
}

/// Builds the per-trade and cumulative purchase series. The currency is taken
/// from the first position; the statement convention has one trade currency
/// per security.
pub fn purchase_series(positions: &[AggregatedPosition], settings: &Settings) -> ChartSeries {
    let currency = positions
        .first()
        .map(|p| p.currency.clone())
        .unwrap_or_else(|| settings.base_currency.clone());

    let points = positions
        .iter()
        .map(|p| ChartPoint {
            date: p.booking_date,
            value: p.notional,
            cumulative: p.cumulative_notional,
        })
        .collect();

    ChartSeries {
        title: "Aankopen".to_string(),
        currency_symbol: currency_symbol(settings, &currency),
        currency,
        points,
    }
}

/// Groups reconciled dividends into per-month base-currency totals. Events
/// arrive in booking order, so months come out chronologically.
pub fn monthly_dividend_totals(events: &[DividendEvent]) -> Vec<MonthlyTotal> {
    let mut totals: Vec<MonthlyTotal> = Vec::new();
    for event in events {
        match totals.last_mut() {
            Some(last) if last.year_month == event.year_month => {
                last.net_base_amount += event.net_base_amount;
            }
            _ => totals.push(MonthlyTotal {
                year_month: event.year_month.clone(),
                net_base_amount: event.net_base_amount,
            }),
        }
    }
    totals
}

pub fn build_chart_document(
    positions: &[AggregatedPosition],
    events: &[DividendEvent],
    settings: &Settings,
    base_currency: &str,
    product_filter: Option<&str>,
) -> ChartDocument {
    ChartDocument {
        generated_at: Utc::now().to_rfc3339(),
        base_currency: base_currency.to_string(),
        product_filter: product_filter.map(|p| p.to_string()),
        purchases: purchase_series(positions, settings),
        dividends: dividend_series(events, settings, base_currency),
        monthly_dividends: monthly_dividend_totals(events),
    }
}

/// Writes a chart document as pretty JSON, creating parent directories.
pub fn write_chart_json(document: &ChartDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(document).context("serializing chart document")?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

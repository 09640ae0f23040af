use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Settings model
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	#[serde(default = "default_base_currency")]
	pub base_currency: String,
	/// ISO code -> display symbol, used by the chart renderer.
	#[serde(default)]
	pub currency_symbols: HashMap<String, String>,
	/// Default product (security) substring filter for the CLI.
	#[serde(default)]
	pub product: Option<String>,
}

fn default_base_currency() -> String {
	"EUR".to_string()
}

impl Default for Settings {
	fn default() -> Self {
		Settings {
			base_currency: default_base_currency(),
			currency_symbols: HashMap::new(),
			product: None,
		}
	}
}

// Ledger input
/// One row of the account statement, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
	pub booking_date: NaiveDate,
	/// Date the mutation is economically effective; may differ from booking date.
	pub value_date: NaiveDate,
	pub description: String,
	/// Security name; empty for cash-only rows.
	#[serde(default)]
	pub product: String,
	pub amount: f64,
	pub currency: String,
	/// Base-currency-to-currency rate, present only on conversion rows.
	#[serde(default)]
	pub fx_rate: Option<f64>,
}

// Reconciliation outputs
/// One dividend payout with its fee and FX resolution applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DividendEvent {
	pub product: String,
	pub booking_date: NaiveDate,
	pub value_date: NaiveDate,
	/// Booking date truncated to "YYYY-MM" for downstream grouping.
	pub year_month: String,
	pub currency: String,
	pub gross_amount: f64,
	/// Matched corporate-action fee in the dividend's currency; stored as the
	/// broker books it (a negative debit), 0 when no fee row matched.
	pub corporate_action_cost: f64,
	pub fx_rate: f64,
	pub net_base_amount: f64,
}

/// Realized conversion rate recorded by the account's own cash-conversion rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FxQuote {
	pub value_date: NaiveDate,
	pub currency: String,
	pub rate: f64,
}

/// Quantity/price pair extracted from a trade description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeFill {
	pub quantity: f64,
	pub unit_price: f64,
}

/// Running purchase state of one security after a trade row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedPosition {
	pub product: String,
	pub booking_date: NaiveDate,
	pub quantity: f64,
	pub unit_price: f64,
	/// quantity * unit_price for this trade.
	pub notional: f64,
	pub cumulative_quantity: f64,
	pub cumulative_notional: f64,
	pub currency: String,
}

// Chart output models
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
	pub date: NaiveDate,
	pub value: f64,
	pub cumulative: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
	pub title: String,
	pub currency: String,
	pub currency_symbol: String,
	pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
	pub year_month: String,
	pub net_base_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartDocument {
	pub generated_at: String,
	pub base_currency: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub product_filter: Option<String>,
	pub purchases: ChartSeries,
	pub dividends: ChartSeries,
	pub monthly_dividends: Vec<MonthlyTotal>,
}

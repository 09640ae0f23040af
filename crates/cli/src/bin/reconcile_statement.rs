use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use models::LedgerRecord;
use reconcile::engine::fx_quotes;
use reconcile::{aggregate_purchases, is_trade_description, reconcile_dividends};

#[derive(Parser, Debug)]
#[command(
    name = "reconcile-statement",
    about = "Reconcile a brokerage account statement: purchase history, dividends net of corporate-action costs and FX."
)]
struct Args {
    /// Path to the account statement export (.xls, .xlsx or .csv)
    #[arg(short, long)]
    input: PathBuf,

    /// Substring filter on the security name (e.g. "VANGUARD")
    #[arg(short, long)]
    product: Option<String>,

    /// Account base currency; overrides the settings file
    #[arg(short, long)]
    base_currency: Option<String>,

    /// Path to settings.json (defaults to ./settings.json when present)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Output directory for the report and chart JSON files
    #[arg(short, long, default_value = "report")]
    out_dir: PathBuf,
}

/// Keeps rows matching the product filter plus all cash-only rows: fee and
/// conversion rows carry no product name but the engine needs them.
fn filter_product(ledger: &[LedgerRecord], needle: &str) -> Vec<LedgerRecord> {
    ledger
        .iter()
        .filter(|r| r.product.is_empty() || r.product.contains(needle))
        .cloned()
        .collect()
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = settings_loader::load_settings_with_fallback(args.settings.as_ref())?;
    let base_currency = args
        .base_currency
        .unwrap_or_else(|| settings.base_currency.clone());
    let product_filter = args.product.or_else(|| settings.product.clone());

    println!(
        "📖 Loading statement from: {} (schema v{})",
        args.input.display(),
        statement::SCHEMA_VERSION
    );
    let full_ledger = statement::load_statement(&args.input)
        .with_context(|| format!("loading statement {}", args.input.display()))?;

    let ledger = match &product_filter {
        Some(needle) => filter_product(&full_ledger, needle),
        None => full_ledger.clone(),
    };

    let trades: Vec<LedgerRecord> = ledger
        .iter()
        .filter(|r| !r.product.is_empty() && is_trade_description(&r.description))
        .cloned()
        .collect();
    let positions = aggregate_purchases(&trades).context("aggregating purchase history")?;

    let events = reconcile_dividends(&ledger, &base_currency).context("reconciling dividends")?;
    let quotes = fx_quotes(&ledger).context("collecting FX quotes")?;

    let chart = charts::build_chart_document(
        &positions,
        &events,
        &settings,
        &base_currency,
        product_filter.as_deref(),
    );

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let dividends_path = args.out_dir.join("dividends.json");
    let purchases_path = args.out_dir.join("purchases.json");
    let charts_path = args.out_dir.join("charts.json");

    fs::write(&dividends_path, serde_json::to_string_pretty(&events)?)
        .with_context(|| format!("writing {}", dividends_path.display()))?;
    fs::write(&purchases_path, serde_json::to_string_pretty(&positions)?)
        .with_context(|| format!("writing {}", purchases_path.display()))?;
    charts::write_chart_json(&chart, &charts_path)?;

    let total_net: f64 = events.iter().map(|e| e.net_base_amount).sum();
    let total_invested = positions
        .last()
        .map(|p| p.cumulative_notional)
        .unwrap_or(0.0);

    println!("\n📊 Summary:");
    println!("─────────────────────────────────────────");
    println!("✓ Ledger rows loaded: {} ({} after product filter)", full_ledger.len(), ledger.len());
    if let Some(needle) = &product_filter {
        println!("✓ Product filter: '{}'", needle);
    }
    println!("✓ Trades aggregated: {}", positions.len());
    println!("✓ Dividends reconciled: {}", events.len());
    println!("✓ FX quotes in statement: {}", quotes.len());
    println!("✓ Total invested: {:.2} {}", total_invested, base_currency);
    println!("✓ Total net dividend: {:.2} {}", total_net, base_currency);
    println!("─────────────────────────────────────────");
    println!("✅ Reports written to: {}", args.out_dir.display());

    Ok(())
}

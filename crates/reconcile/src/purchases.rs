//! Running purchase history for one security: prefix sums of signed quantity
//! and of traded notional, in the order the trades were booked.

use models::{AggregatedPosition, LedgerRecord};

use crate::description::parse_trade_description;
use crate::ReconcileError;

/// Aggregates chronologically sorted trade rows of a single security.
///
/// Stateless transform; the only failure mode is a description that does not
/// follow the trade grammar, which aborts the run.
pub fn aggregate_purchases(
    trades: &[LedgerRecord],
) -> Result<Vec<AggregatedPosition>, ReconcileError> {
    let mut positions = Vec::with_capacity(trades.len());
    let mut cumulative_quantity = 0.0;
    let mut cumulative_notional = 0.0;

    for trade in trades {
        let fill = parse_trade_description(&trade.description)?;
        let notional = fill.quantity * fill.unit_price;
        cumulative_quantity += fill.quantity;
        cumulative_notional += notional;

        positions.push(AggregatedPosition {
            product: trade.product.clone(),
            booking_date: trade.booking_date,
            quantity: fill.quantity,
            unit_price: fill.unit_price,
            notional,
            cumulative_quantity,
            cumulative_notional,
            currency: trade.currency.clone(),
        });
    }
    Ok(positions)
}

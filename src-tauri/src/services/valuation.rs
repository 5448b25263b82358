//! Lot selection for outbound stock.
//!
//! Pure functions over already-loaded lots, so the depletion policy can be
//! tested without a database.

use crate::models::{InventoryItem, ValuationMethod};

/// Units to take from one lot and the unit cost they are booked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedDraw {
    pub inventory_item_id: i64,
    pub quantity: i64,
    pub cost_per_unit_cents: i64,
}

/// Not enough stock across the eligible lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub available: i64,
}

/// Decide which lots satisfy `quantity` units.
///
/// `lots` must be ordered oldest receipt first. FIFO depletes in that order,
/// LIFO in reverse. AVERAGE_COST depletes oldest first but books every unit at
/// the quantity-weighted average cost of the eligible lots.
pub fn plan_draws(
    lots: &[InventoryItem],
    quantity: i64,
    method: ValuationMethod,
) -> Result<Vec<PlannedDraw>, Shortfall> {
    let available = lots
        .iter()
        .fold(0i64, |total, lot| total.saturating_add(lot.quantity_left.max(0)));
    if available < quantity {
        return Err(Shortfall { available });
    }

    let average = average_cost_cents(lots);
    let ordered: Vec<&InventoryItem> = match method {
        ValuationMethod::Lifo => lots.iter().rev().collect(),
        ValuationMethod::Fifo | ValuationMethod::AverageCost => lots.iter().collect(),
    };

    let mut remaining = quantity;
    let mut draws = Vec::new();
    for lot in ordered {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.quantity_left);
        if take <= 0 {
            continue;
        }
        let cost_per_unit_cents = match method {
            ValuationMethod::AverageCost => average,
            ValuationMethod::Fifo | ValuationMethod::Lifo => lot.cost_price_cents,
        };
        draws.push(PlannedDraw {
            inventory_item_id: lot.id,
            quantity: take,
            cost_per_unit_cents,
        });
        remaining -= take;
    }

    Ok(draws)
}

/// Quantity-weighted average unit cost, rounded half up to whole cents.
///
/// Summed in `i128`: each lot's value fits an `i64` but their total may not.
pub fn average_cost_cents(lots: &[InventoryItem]) -> i64 {
    let (units, value) = lots
        .iter()
        .filter(|lot| lot.quantity_left > 0)
        .fold((0i128, 0i128), |(units, value), lot| {
            let left = i128::from(lot.quantity_left);
            (units + left, value + left * i128::from(lot.cost_price_cents))
        });

    if units == 0 {
        return 0;
    }
    // Never above the dearest lot's cost, so it always fits back in an i64.
    i64::try_from((value * 2 + units) / (units * 2)).unwrap_or(i64::MAX)
}

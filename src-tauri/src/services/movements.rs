//! Stock movement recorder.
//!
//! Appends immutable ledger rows. It never touches `InventoryItem`; the
//! inventory service mutates the lot and then calls [`record_movement`] in the
//! same transaction.

use chrono::Utc;
use rusqlite::Connection;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Direction, InventoryItem, MovementFilter, MovementPage, MovementStatus, MovementType,
    NewMovement, StockMovement,
};
use crate::store;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 500;

/// Validate and append one completed movement for `item`.
///
/// For transfers, `transfer_warehouse_id` names the other end: the
/// destination for an outbound leg, the origin for an inbound one.
pub fn record_movement(
    conn: &Connection,
    item: &InventoryItem,
    movement: NewMovement,
) -> LedgerResult<StockMovement> {
    validate(item, &movement)?;
    let total_cost_cents = movement
        .quantity
        .checked_mul(movement.cost_per_unit_cents)
        .ok_or_else(|| LedgerError::out_of_range("movement total cost"))?;

    let (source, destination) = match (movement.movement_type, movement.direction) {
        (MovementType::Transfer, Direction::Outbound) => {
            (item.warehouse_id, movement.transfer_warehouse_id)
        }
        (MovementType::Transfer, Direction::Inbound) => (
            movement.transfer_warehouse_id.unwrap_or(item.warehouse_id),
            Some(item.warehouse_id),
        ),
        _ => (item.warehouse_id, None),
    };

    let record = StockMovement {
        id: 0,
        inventory_item_id: item.id,
        product_id: item.product_id,
        movement_type: movement.movement_type,
        quantity: movement.quantity,
        direction: movement.direction,
        source_inventory_id: source,
        destination_inventory_id: destination,
        cost_per_unit_cents: movement.cost_per_unit_cents,
        total_cost_cents,
        performed_by: movement.performed_by,
        status: MovementStatus::Completed,
        reference_number: movement.reference_number,
        reason: movement.reason,
        created_at: Utc::now(),
    };

    let saved = store::movements::insert(conn, &record)?;
    tracing::debug!(
        movement_id = saved.id,
        inventory_item_id = saved.inventory_item_id,
        movement_type = %saved.movement_type,
        direction = %saved.direction,
        quantity = saved.quantity,
        "recorded stock movement"
    );
    Ok(saved)
}

fn validate(item: &InventoryItem, movement: &NewMovement) -> LedgerResult<()> {
    if movement.inventory_item_id != item.id {
        return Err(LedgerError::validation(format!(
            "movement targets inventory item {} but item {} was supplied",
            movement.inventory_item_id, item.id
        )));
    }
    if movement.quantity <= 0 {
        return Err(LedgerError::validation("movement quantity must be positive"));
    }
    if movement.cost_per_unit_cents < 0 {
        return Err(LedgerError::validation("cost per unit cannot be negative"));
    }
    if !movement.movement_type.allows(movement.direction) {
        return Err(LedgerError::validation(format!(
            "'{}' movements cannot be {}",
            movement.movement_type, movement.direction
        )));
    }

    let is_transfer = movement.movement_type == MovementType::Transfer;
    match movement.transfer_warehouse_id {
        None if is_transfer => Err(LedgerError::validation(
            "transfer movements need the other warehouse",
        )),
        Some(_) if !is_transfer => Err(LedgerError::validation(
            "only transfer movements name another warehouse",
        )),
        Some(other) if other == item.warehouse_id => Err(LedgerError::validation(
            "cannot transfer stock to the warehouse it is already in",
        )),
        _ => Ok(()),
    }
}

/// Check that a lot's snapshot, counters and ledger all agree.
///
/// Drift here means a bug, not bad input: it is logged at error level and the
/// enclosing transaction is expected to roll back.
pub fn verify_item(conn: &Connection, inventory_item_id: i64) -> LedgerResult<InventoryItem> {
    let item = store::inventory::get(conn, inventory_item_id)?
        .ok_or_else(|| LedgerError::not_found("inventory item", inventory_item_id))?;
    let ledger = store::movements::ledger_balance(conn, inventory_item_id)?;
    let counted = item.counted_left();

    if item.quantity_left < 0 || counted != item.quantity_left || ledger != item.quantity_left {
        tracing::error!(
            inventory_item_id,
            snapshot = item.quantity_left,
            counted,
            ledger,
            "inventory item does not reconcile"
        );
        return Err(LedgerError::Reconciliation {
            item_id: inventory_item_id,
            snapshot: item.quantity_left,
            ledger: if ledger != item.quantity_left { ledger } else { counted },
        });
    }

    Ok(item)
}

pub fn movements_for_item(conn: &Connection, inventory_item_id: i64) -> LedgerResult<Vec<StockMovement>> {
    store::movements::for_item(conn, inventory_item_id)
}

/// Movements written under one reference, e.g. every lot drawn by a sale.
pub fn movements_for_reference(conn: &Connection, reference_number: &str) -> LedgerResult<Vec<StockMovement>> {
    store::movements::with_reference(conn, reference_number)
}

/// Paged movement history for one warehouse.
pub fn list_movements(conn: &Connection, filter: &MovementFilter) -> LedgerResult<MovementPage> {
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(LedgerError::validation("date range starts after it ends"));
        }
    }

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let page = filter.page.unwrap_or(1).max(1);
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| LedgerError::out_of_range("page"))?;

    let (movements, total) = store::movements::list(conn, filter, limit, offset)?;
    if total == 0 {
        tracing::warn!(warehouse_id = filter.warehouse_id, "no movements match filter");
    }

    Ok(MovementPage {
        movements,
        total,
        pages: (total + limit - 1) / limit,
        page,
    })
}

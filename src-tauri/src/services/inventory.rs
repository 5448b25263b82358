//! Inventory item manager.
//!
//! Owns every change to a lot's counters and snapshot. Each public operation
//! mutates the lot, appends the matching movement, checks the lot still
//! reconciles against its ledger and re-aggregates the product, all on the
//! connection it is given (normally one transaction).

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Direction, InventoryItem, ItemStatus, MovementType, NewMovement, StockMovement,
};
use crate::services::{batches, movements, products, valuation};
use crate::store;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveStock {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub selling_price_cents: i64,
    #[serde(default)]
    pub supplier_id: Option<i64>,
    #[serde(default)]
    pub performed_by: i64,
    #[serde(default)]
    pub reference_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeStock {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub performed_by: i64,
    #[serde(default)]
    pub reference_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStock {
    pub inventory_item_id: i64,
    pub physical_count: i64,
    pub reason: String,
    pub performed_by: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SupplierReturn {
    pub inventory_item_id: i64,
    pub quantity: i64,
    pub reason: String,
    pub performed_by: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransferStock {
    pub inventory_item_id: i64,
    pub destination_warehouse_id: i64,
    pub quantity: i64,
    pub performed_by: i64,
}

/// A lot after a change, with the movement that recorded it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StockChange {
    pub item: InventoryItem,
    pub movement: StockMovement,
}

/// Units taken from one lot by an outbound sale.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LotDraw {
    pub item: InventoryItem,
    pub quantity: i64,
    pub cost_per_unit_cents: i64,
    pub movement: StockMovement,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Consumption {
    pub product_id: i64,
    pub draws: Vec<LotDraw>,
}

impl Consumption {
    pub fn total_cost_cents(&self) -> LedgerResult<i64> {
        self.draws
            .iter()
            .try_fold(0i64, |total, d| total.checked_add(d.movement.total_cost_cents))
            .ok_or_else(|| LedgerError::out_of_range("consumption cost"))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Adjustment {
    pub item: InventoryItem,
    /// Physical count minus the system count before the adjustment.
    pub discrepancy: i64,
    /// `None` when the count matched and nothing was recorded.
    pub movement: Option<StockMovement>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Transfer {
    pub source: StockChange,
    pub destination: StockChange,
}

pub fn get_item(conn: &Connection, id: i64) -> LedgerResult<InventoryItem> {
    store::inventory::get(conn, id)?.ok_or_else(|| LedgerError::not_found("inventory item", id))
}

pub fn list_items_for_product(conn: &Connection, product_id: i64) -> LedgerResult<Vec<InventoryItem>> {
    store::inventory::list_for_product(conn, product_id)
}

fn ensure_warehouse(conn: &Connection, warehouse_id: i64) -> LedgerResult<()> {
    store::warehouses::get(conn, warehouse_id)?
        .map(|_| ())
        .ok_or_else(|| LedgerError::not_found("warehouse", warehouse_id))
}

/// Move a lot counter by `delta`, refusing to leave the `i64` range.
fn shift(counter: &mut i64, delta: i64) -> LedgerResult<()> {
    *counter = counter
        .checked_add(delta)
        .ok_or_else(|| LedgerError::out_of_range("inventory quantity"))?;
    Ok(())
}

/// Apply `mutate` to `item`, persist it, append `movement`, and return the
/// reconciled lot together with the movement.
fn apply_change(
    conn: &Connection,
    mut item: InventoryItem,
    mutate: impl FnOnce(&mut InventoryItem) -> LedgerResult<()>,
    movement: NewMovement,
) -> LedgerResult<StockChange> {
    mutate(&mut item)?;
    if item.quantity_left < 0 {
        return Err(LedgerError::InsufficientStock {
            product_id: item.product_id,
            requested: movement.quantity,
            available: item.quantity_left.saturating_add(movement.quantity),
        });
    }
    item.updated_at = Utc::now();
    item.refresh_status();
    store::inventory::update_quantities(conn, &item)?;

    let movement = movements::record_movement(conn, &item, movement)?;
    let item = movements::verify_item(conn, item.id)?;
    Ok(StockChange { item, movement })
}

/// Receive new stock, topping up the newest lot when it has the same supplier
/// and prices and opening a new lot otherwise.
#[tracing::instrument(skip_all, fields(product_id = request.product_id, warehouse_id = request.warehouse_id, quantity = request.quantity))]
pub fn receive_stock(conn: &Connection, request: ReceiveStock) -> LedgerResult<InventoryItem> {
    if request.quantity <= 0 {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    if request.unit_cost_cents < 0 || request.selling_price_cents < 0 {
        return Err(LedgerError::validation("unit cost and selling price cannot be negative"));
    }
    if request.quantity.checked_mul(request.unit_cost_cents).is_none() {
        return Err(LedgerError::out_of_range("receipt cost"));
    }
    let product = products::get_product(conn, request.product_id)?;
    ensure_warehouse(conn, request.warehouse_id)?;

    // Only the newest lot can absorb a receipt; topping up an older one would
    // let these units jump the FIFO queue.
    let existing = store::inventory::latest_lot(conn, product.id, request.warehouse_id)?
        .filter(|lot| {
            lot.supplier_id == request.supplier_id
                && lot.cost_price_cents == request.unit_cost_cents
                && lot.selling_price_cents == request.selling_price_cents
        });
    let item = match existing {
        Some(lot) => lot,
        None => {
            let now = Utc::now();
            store::inventory::insert(
                conn,
                &InventoryItem {
                    id: 0,
                    product_id: product.id,
                    warehouse_id: request.warehouse_id,
                    supplier_id: request.supplier_id,
                    quantity_supplied: 0,
                    quantity_sold: 0,
                    returned_to_shop: 0,
                    returned_to_supplier: 0,
                    quantity_left: 0,
                    cost_price_cents: request.unit_cost_cents,
                    selling_price_cents: request.selling_price_cents,
                    reorder_point: product.reorder_point,
                    status: ItemStatus::OutOfStock,
                    received_at: now,
                    updated_at: now,
                },
            )?
        }
    };

    let quantity = request.quantity;
    let item_id = item.id;
    let change = apply_change(
        conn,
        item,
        |item| {
            shift(&mut item.quantity_supplied, quantity)?;
            shift(&mut item.quantity_left, quantity)?;
            Ok(())
        },
        NewMovement {
            inventory_item_id: item_id,
            movement_type: MovementType::Added,
            quantity,
            direction: Direction::Inbound,
            cost_per_unit_cents: request.unit_cost_cents,
            performed_by: request.performed_by,
            transfer_warehouse_id: None,
            reference_number: request.reference_number,
            reason: None,
        },
    )?;
    products::refresh_product(conn, product.id)?;

    tracing::info!(
        inventory_item_id = change.item.id,
        quantity_left = change.item.quantity_left,
        "received stock"
    );
    Ok(change.item)
}

/// Sell stock of a product from a warehouse, across lots per the product's
/// valuation method. Either the whole quantity is taken or nothing is.
#[tracing::instrument(skip_all, fields(product_id = request.product_id, warehouse_id = request.warehouse_id, quantity = request.quantity))]
pub fn consume_stock(conn: &Connection, request: ConsumeStock) -> LedgerResult<Consumption> {
    let consumption = draw_stock(conn, &request)?;
    batches::draw_batches(conn, request.product_id, request.quantity)?;
    products::refresh_product(conn, request.product_id)?;
    Ok(consumption)
}

/// [`consume_stock`] without re-aggregating the product, for callers that
/// batch the aggregation once per transaction.
pub(crate) fn draw_stock(conn: &Connection, request: &ConsumeStock) -> LedgerResult<Consumption> {
    if request.quantity <= 0 {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    let product = products::get_product(conn, request.product_id)?;
    ensure_warehouse(conn, request.warehouse_id)?;

    let lots = store::inventory::lots_with_stock(conn, product.id, request.warehouse_id)?;
    let plan = valuation::plan_draws(&lots, request.quantity, product.valuation_method)
        .map_err(|shortfall| {
            tracing::warn!(
                product_id = product.id,
                requested = request.quantity,
                available = shortfall.available,
                "insufficient stock"
            );
            LedgerError::InsufficientStock {
                product_id: product.id,
                requested: request.quantity,
                available: shortfall.available,
            }
        })?;

    let mut draws = Vec::with_capacity(plan.len());
    for planned in plan {
        let lot = lots
            .iter()
            .find(|lot| lot.id == planned.inventory_item_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("inventory item", planned.inventory_item_id))?;

        let change = apply_change(
            conn,
            lot,
            |item| {
                shift(&mut item.quantity_sold, planned.quantity)?;
                shift(&mut item.quantity_left, -planned.quantity)?;
                Ok(())
            },
            NewMovement {
                inventory_item_id: planned.inventory_item_id,
                movement_type: MovementType::Sold,
                quantity: planned.quantity,
                direction: Direction::Outbound,
                cost_per_unit_cents: planned.cost_per_unit_cents,
                performed_by: request.performed_by,
                transfer_warehouse_id: None,
                reference_number: request.reference_number.clone(),
                reason: None,
            },
        )?;

        draws.push(LotDraw {
            item: change.item,
            quantity: planned.quantity,
            cost_per_unit_cents: planned.cost_per_unit_cents,
            movement: change.movement,
        });
    }

    Ok(Consumption {
        product_id: product.id,
        draws,
    })
}

/// Set a lot to its physically counted quantity, recording the discrepancy.
#[tracing::instrument(skip_all, fields(inventory_item_id = request.inventory_item_id, physical_count = request.physical_count))]
pub fn adjust_stock(conn: &Connection, request: AdjustStock) -> LedgerResult<Adjustment> {
    if request.physical_count < 0 {
        return Err(LedgerError::validation("physical count cannot be negative"));
    }
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(LedgerError::validation("adjustments need a reason"));
    }

    let item = get_item(conn, request.inventory_item_id)?;
    let discrepancy = request.physical_count - item.quantity_left;
    let Some(direction) = Direction::of_delta(discrepancy) else {
        tracing::info!(inventory_item_id = item.id, "stocktake matches system count");
        return Ok(Adjustment {
            item,
            discrepancy: 0,
            movement: None,
        });
    };

    let product_id = item.product_id;
    let cost = item.cost_price_cents;
    let physical_count = request.physical_count;
    let change = apply_change(
        conn,
        item,
        |item| {
            // quantity_supplied is the net quantity brought into the lot
            shift(&mut item.quantity_supplied, discrepancy)?;
            item.quantity_left = physical_count;
            Ok(())
        },
        NewMovement {
            inventory_item_id: request.inventory_item_id,
            movement_type: MovementType::Adjustment,
            quantity: discrepancy.abs(),
            direction,
            cost_per_unit_cents: cost,
            performed_by: request.performed_by,
            transfer_warehouse_id: None,
            reference_number: None,
            reason: Some(reason.to_string()),
        },
    )?;
    products::refresh_product(conn, product_id)?;

    tracing::info!(
        inventory_item_id = change.item.id,
        discrepancy,
        "recorded stock adjustment"
    );
    Ok(Adjustment {
        item: change.item,
        discrepancy,
        movement: Some(change.movement),
    })
}

/// Send units of a lot back to its supplier.
#[tracing::instrument(skip_all, fields(inventory_item_id = request.inventory_item_id, quantity = request.quantity))]
pub fn return_to_supplier(conn: &Connection, request: SupplierReturn) -> LedgerResult<StockChange> {
    if request.quantity <= 0 {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(LedgerError::validation("supplier returns need a reason"));
    }

    let item = get_item(conn, request.inventory_item_id)?;
    if item.quantity_left < request.quantity {
        return Err(LedgerError::InsufficientStock {
            product_id: item.product_id,
            requested: request.quantity,
            available: item.quantity_left,
        });
    }

    let product_id = item.product_id;
    let cost = item.cost_price_cents;
    let quantity = request.quantity;
    let change = apply_change(
        conn,
        item,
        |item| {
            shift(&mut item.returned_to_supplier, quantity)?;
            shift(&mut item.quantity_left, -quantity)?;
            Ok(())
        },
        NewMovement {
            inventory_item_id: request.inventory_item_id,
            movement_type: MovementType::Returned,
            quantity,
            direction: Direction::Outbound,
            cost_per_unit_cents: cost,
            performed_by: request.performed_by,
            transfer_warehouse_id: None,
            reference_number: None,
            reason: Some(reason.to_string()),
        },
    )?;
    products::refresh_product(conn, product_id)?;
    Ok(change)
}

/// Put units a customer brought back into the lot they were sold from.
pub fn restock_return(
    conn: &Connection,
    inventory_item_id: i64,
    quantity: i64,
    performed_by: i64,
    reference_number: String,
    reason: &str,
) -> LedgerResult<StockChange> {
    if quantity <= 0 {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    let item = get_item(conn, inventory_item_id)?;
    let product_id = item.product_id;
    let cost = item.cost_price_cents;

    let change = apply_change(
        conn,
        item,
        |item| {
            shift(&mut item.returned_to_shop, quantity)?;
            shift(&mut item.quantity_left, quantity)?;
            Ok(())
        },
        NewMovement {
            inventory_item_id,
            movement_type: MovementType::Returned,
            quantity,
            direction: Direction::Inbound,
            cost_per_unit_cents: cost,
            performed_by,
            transfer_warehouse_id: None,
            reference_number: Some(reference_number),
            reason: Some(reason.to_string()),
        },
    )?;
    products::refresh_product(conn, product_id)?;
    Ok(change)
}

/// Move units of a lot to another warehouse.
///
/// The destination lot keeps the source's supplier, cost, price and receipt
/// date so it ages the same way under FIFO. Units only merge into a
/// destination lot received at that same moment.
#[tracing::instrument(skip_all, fields(inventory_item_id = request.inventory_item_id, destination = request.destination_warehouse_id, quantity = request.quantity))]
pub fn transfer_stock(conn: &Connection, request: TransferStock) -> LedgerResult<Transfer> {
    if request.quantity <= 0 {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    let source = get_item(conn, request.inventory_item_id)?;
    ensure_warehouse(conn, request.destination_warehouse_id)?;
    if source.warehouse_id == request.destination_warehouse_id {
        return Err(LedgerError::validation(
            "cannot transfer stock to the warehouse it is already in",
        ));
    }
    if source.quantity_left < request.quantity {
        return Err(LedgerError::InsufficientStock {
            product_id: source.product_id,
            requested: request.quantity,
            available: source.quantity_left,
        });
    }

    let destination = match store::inventory::find_matching_lot(
        conn,
        source.product_id,
        request.destination_warehouse_id,
        source.supplier_id,
        source.cost_price_cents,
        source.selling_price_cents,
        source.received_at,
    )? {
        Some(lot) => lot,
        None => store::inventory::insert(
            conn,
            &InventoryItem {
                id: 0,
                warehouse_id: request.destination_warehouse_id,
                quantity_supplied: 0,
                quantity_sold: 0,
                returned_to_shop: 0,
                returned_to_supplier: 0,
                quantity_left: 0,
                status: ItemStatus::OutOfStock,
                updated_at: Utc::now(),
                ..source.clone()
            },
        )?,
    };

    let quantity = request.quantity;
    let origin_warehouse = source.warehouse_id;
    let product_id = source.product_id;
    let cost = source.cost_price_cents;

    let outbound = apply_change(
        conn,
        source,
        |item| {
            shift(&mut item.quantity_supplied, -quantity)?;
            shift(&mut item.quantity_left, -quantity)?;
            Ok(())
        },
        NewMovement {
            inventory_item_id: request.inventory_item_id,
            movement_type: MovementType::Transfer,
            quantity,
            direction: Direction::Outbound,
            cost_per_unit_cents: cost,
            performed_by: request.performed_by,
            transfer_warehouse_id: Some(request.destination_warehouse_id),
            reference_number: None,
            reason: None,
        },
    )?;

    let destination_id = destination.id;
    let inbound = apply_change(
        conn,
        destination,
        |item| {
            shift(&mut item.quantity_supplied, quantity)?;
            shift(&mut item.quantity_left, quantity)?;
            Ok(())
        },
        NewMovement {
            inventory_item_id: destination_id,
            movement_type: MovementType::Transfer,
            quantity,
            direction: Direction::Inbound,
            cost_per_unit_cents: cost,
            performed_by: request.performed_by,
            transfer_warehouse_id: Some(origin_warehouse),
            reference_number: None,
            reason: None,
        },
    )?;
    products::refresh_product(conn, product_id)?;

    tracing::info!(
        from_item = outbound.item.id,
        to_item = inbound.item.id,
        quantity,
        "transferred stock"
    );
    Ok(Transfer {
        source: outbound,
        destination: inbound,
    })
}

//! Customer returns against sold orders.
//!
//! A return is requested as `pending`, then either completed (stock goes back
//! into the lot the order drew from) or rejected (stock untouched).

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{PaymentStatus, Return, ReturnStatus, SaleStatus};
use crate::services::inventory;
use crate::store;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub order_id: i64,
    pub quantity: i64,
    pub reason: String,
    pub performed_by: i64,
}

pub fn get_return(conn: &Connection, id: i64) -> LedgerResult<Return> {
    store::returns::get(conn, id)?.ok_or_else(|| LedgerError::not_found("return", id))
}

/// Open a pending return for part or all of an order.
pub fn request_return(conn: &Connection, request: ReturnRequest) -> LedgerResult<Return> {
    if request.quantity <= 0 {
        return Err(LedgerError::validation("return quantity must be positive"));
    }
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(LedgerError::validation("returns need a reason"));
    }

    let order = store::sales::get_order(conn, request.order_id)?
        .ok_or_else(|| LedgerError::not_found("order", request.order_id))?;
    let sale = store::sales::get_sale(conn, order.sale_id)?
        .ok_or_else(|| LedgerError::not_found("sale", order.sale_id))?;
    if sale.status == SaleStatus::Cancelled {
        return Err(LedgerError::validation("cannot return items from a cancelled sale"));
    }

    let claimed = store::returns::claimed_quantity(conn, order.id)?;
    let returnable = order.quantity - claimed;
    if request.quantity > returnable {
        tracing::warn!(
            order_id = order.id,
            requested = request.quantity,
            returnable,
            "return exceeds what is left on the order"
        );
        return Err(LedgerError::validation(format!(
            "only {returnable} of {} units on order {} can still be returned",
            order.quantity, order.id
        )));
    }

    let ret = store::returns::insert(
        conn,
        &Return {
            id: 0,
            order_id: order.id,
            sale_id: order.sale_id,
            product_id: order.product_id,
            inventory_item_id: order.inventory_item_id,
            quantity: request.quantity,
            amount_cents: order.selling_price_cents * request.quantity,
            reason: reason.to_string(),
            status: ReturnStatus::Pending,
            performed_by: request.performed_by,
            created_at: Utc::now(),
            resolved_at: None,
        },
    )?;
    tracing::info!(return_id = ret.id, order_id = order.id, quantity = ret.quantity, "return requested");
    Ok(ret)
}

fn pending(conn: &Connection, return_id: i64) -> LedgerResult<Return> {
    let ret = get_return(conn, return_id)?;
    if ret.status != ReturnStatus::Pending {
        return Err(LedgerError::validation(format!(
            "return {return_id} is already {}",
            ret.status
        )));
    }
    Ok(ret)
}

/// Put the returned units back in stock and complete the return.
pub fn approve_return(conn: &Connection, return_id: i64) -> LedgerResult<Return> {
    let ret = pending(conn, return_id)?;
    let inventory_item_id = ret
        .inventory_item_id
        .ok_or_else(|| LedgerError::validation("order has no lot to restock"))?;
    let sale = store::sales::get_sale(conn, ret.sale_id)?
        .ok_or_else(|| LedgerError::not_found("sale", ret.sale_id))?;

    inventory::restock_return(
        conn,
        inventory_item_id,
        ret.quantity,
        ret.performed_by,
        sale.receipt_number,
        &ret.reason,
    )?;

    let resolved_at = Utc::now();
    store::returns::resolve(conn, ret.id, ReturnStatus::Completed, resolved_at)?;

    let order = store::sales::get_order(conn, ret.order_id)?
        .ok_or_else(|| LedgerError::not_found("order", ret.order_id))?;
    if store::returns::completed_quantity(conn, order.id)? >= order.quantity {
        store::sales::set_order_payment_status(conn, order.id, PaymentStatus::Refunded)?;
    }

    tracing::info!(return_id = ret.id, inventory_item_id, quantity = ret.quantity, "return completed");
    Ok(Return {
        status: ReturnStatus::Completed,
        resolved_at: Some(resolved_at),
        ..ret
    })
}

pub fn reject_return(conn: &Connection, return_id: i64) -> LedgerResult<Return> {
    let ret = pending(conn, return_id)?;
    let resolved_at = Utc::now();
    store::returns::resolve(conn, ret.id, ReturnStatus::Rejected, resolved_at)?;
    tracing::info!(return_id = ret.id, "return rejected");
    Ok(Return {
        status: ReturnStatus::Rejected,
        resolved_at: Some(resolved_at),
        ..ret
    })
}

/// Request and approve a return in one step.
#[tracing::instrument(skip_all, fields(order_id = request.order_id, quantity = request.quantity))]
pub fn process_return(conn: &Connection, request: ReturnRequest) -> LedgerResult<Return> {
    let ret = request_return(conn, request)?;
    approve_return(conn, ret.id)
}

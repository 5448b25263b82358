//! Batch and expiry tracking layered over a product's stock.
//!
//! Batches never hold more active units than the product's aggregate
//! quantity. Sales draw from them soonest-expiry first; every other outbound
//! change trims them through [`clamp_batches`].

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{BatchStatus, BatchTracking};
use crate::store;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub product_id: i64,
    pub batch_number: String,
    pub quantity: i64,
    pub expiry_date: Option<NaiveDate>,
}

pub fn register_batch(conn: &Connection, new: NewBatch) -> LedgerResult<BatchTracking> {
    let batch_number = new.batch_number.trim();
    if batch_number.is_empty() {
        return Err(LedgerError::validation("batch number cannot be empty"));
    }
    if new.quantity <= 0 {
        return Err(LedgerError::validation("batch quantity must be positive"));
    }

    let product = store::products::get(conn, new.product_id)?
        .ok_or_else(|| LedgerError::not_found("product", new.product_id))?;
    if store::batches::find(conn, product.id, batch_number)?.is_some() {
        return Err(LedgerError::validation(format!(
            "batch '{batch_number}' already exists for product {}",
            product.id
        )));
    }

    let tracked = store::batches::active_total(conn, product.id)?
        .checked_add(new.quantity)
        .ok_or_else(|| LedgerError::out_of_range("batch quantity"))?;
    if tracked > product.quantity {
        return Err(LedgerError::validation(format!(
            "batch of {} would track {} units but product {} only holds {}",
            new.quantity,
            tracked,
            product.id,
            product.quantity
        )));
    }

    let batch = store::batches::insert(
        conn,
        &BatchTracking {
            id: 0,
            product_id: product.id,
            batch_number: batch_number.to_string(),
            quantity: new.quantity,
            expiry_date: new.expiry_date,
            status: BatchStatus::Active,
            created_at: Utc::now(),
        },
    )?;
    tracing::info!(batch_id = batch.id, product_id = product.id, batch_number, "registered batch");
    Ok(batch)
}

/// Take up to `quantity` units from active batches, soonest expiry first.
///
/// Untracked stock is allowed, so drawing more than the batches hold simply
/// depletes them. Returns the batches that changed.
pub fn draw_batches(
    conn: &Connection,
    product_id: i64,
    quantity: i64,
) -> LedgerResult<Vec<BatchTracking>> {
    let mut remaining = quantity;
    let mut touched = Vec::new();

    for mut batch in store::batches::active_for_product(conn, product_id)? {
        if remaining <= 0 {
            break;
        }
        let take = remaining.min(batch.quantity);
        batch.quantity -= take;
        if batch.quantity == 0 {
            batch.status = BatchStatus::Depleted;
        }
        store::batches::update(conn, batch.id, batch.quantity, batch.status)?;
        remaining -= take;
        touched.push(batch);
    }

    Ok(touched)
}

/// Trim active batches so they hold at most `product_quantity` units.
pub fn clamp_batches(conn: &Connection, product_id: i64, product_quantity: i64) -> LedgerResult<()> {
    let tracked = store::batches::active_total(conn, product_id)?;
    let excess = tracked - product_quantity;
    if excess > 0 {
        tracing::debug!(product_id, excess, "trimming batch tracking to stock on hand");
        draw_batches(conn, product_id, excess)?;
    }
    Ok(())
}

/// Mark active batches whose expiry date is before `as_of` as expired.
pub fn expire_batches(conn: &Connection, as_of: NaiveDate) -> LedgerResult<Vec<BatchTracking>> {
    let expired = store::batches::expire_before(conn, as_of)?;
    if !expired.is_empty() {
        tracing::info!(count = expired.len(), %as_of, "expired batches");
    }
    Ok(expired)
}

/// All batches of a product. Missing batch data is not an error.
pub fn list_batches(conn: &Connection, product_id: i64) -> LedgerResult<Vec<BatchTracking>> {
    let batches = store::batches::list_for_product(conn, product_id)?;
    if batches.is_empty() {
        tracing::warn!(product_id, "no batch tracking for product");
    }
    Ok(batches)
}

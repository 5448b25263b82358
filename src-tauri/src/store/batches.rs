use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LedgerResult;
use crate::models::{BatchStatus, BatchTracking};

const COLUMNS: &str = "id, product_id, batch_number, quantity, expiry_date, status, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<BatchTracking> {
    Ok(BatchTracking {
        id: row.get(0)?,
        product_id: row.get(1)?,
        batch_number: row.get(2)?,
        quantity: row.get(3)?,
        expiry_date: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn insert(conn: &Connection, batch: &BatchTracking) -> LedgerResult<BatchTracking> {
    conn.execute(
        "INSERT INTO batch_tracking (product_id, batch_number, quantity, expiry_date, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            batch.product_id,
            batch.batch_number,
            batch.quantity,
            batch.expiry_date,
            batch.status,
            batch.created_at,
        ],
    )?;

    Ok(BatchTracking {
        id: conn.last_insert_rowid(),
        ..batch.clone()
    })
}

pub fn find(
    conn: &Connection,
    product_id: i64,
    batch_number: &str,
) -> LedgerResult<Option<BatchTracking>> {
    let batch = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM batch_tracking WHERE product_id = ?1 AND batch_number = ?2"
            ),
            params![product_id, batch_number],
            from_row,
        )
        .optional()?;
    Ok(batch)
}

/// Active batches of a product, soonest expiry first (undated batches last).
pub fn active_for_product(conn: &Connection, product_id: i64) -> LedgerResult<Vec<BatchTracking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM batch_tracking
         WHERE product_id = ?1 AND status = 'active'
         ORDER BY expiry_date ASC NULLS LAST, id ASC"
    ))?;

    let batches = stmt
        .query_map([product_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(batches)
}

pub fn list_for_product(conn: &Connection, product_id: i64) -> LedgerResult<Vec<BatchTracking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM batch_tracking WHERE product_id = ?1 ORDER BY id"
    ))?;

    let batches = stmt
        .query_map([product_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(batches)
}

pub fn active_total(conn: &Connection, product_id: i64) -> LedgerResult<i64> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(quantity), 0) FROM batch_tracking
         WHERE product_id = ?1 AND status = 'active'",
        [product_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

pub fn update(conn: &Connection, id: i64, quantity: i64, status: BatchStatus) -> LedgerResult<()> {
    conn.execute(
        "UPDATE batch_tracking SET quantity = ?1, status = ?2 WHERE id = ?3",
        params![quantity, status, id],
    )?;
    Ok(())
}

/// Mark active batches that expired before `as_of`; returns them.
pub fn expire_before(conn: &Connection, as_of: NaiveDate) -> LedgerResult<Vec<BatchTracking>> {
    let mut stmt = conn.prepare(&format!(
        "UPDATE batch_tracking SET status = 'expired'
         WHERE status = 'active' AND expiry_date IS NOT NULL AND expiry_date < ?1
         RETURNING {COLUMNS}"
    ))?;

    let expired = stmt
        .query_map([as_of], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(expired)
}

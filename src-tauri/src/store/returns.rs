use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LedgerResult;
use crate::models::{Return, ReturnStatus};

const COLUMNS: &str = "id, order_id, sale_id, product_id, inventory_item_id, quantity, amount_cents,
     reason, status, performed_by, created_at, resolved_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Return> {
    Ok(Return {
        id: row.get(0)?,
        order_id: row.get(1)?,
        sale_id: row.get(2)?,
        product_id: row.get(3)?,
        inventory_item_id: row.get(4)?,
        quantity: row.get(5)?,
        amount_cents: row.get(6)?,
        reason: row.get(7)?,
        status: row.get(8)?,
        performed_by: row.get(9)?,
        created_at: row.get(10)?,
        resolved_at: row.get(11)?,
    })
}

pub fn insert(conn: &Connection, ret: &Return) -> LedgerResult<Return> {
    conn.execute(
        "INSERT INTO returns (order_id, sale_id, product_id, inventory_item_id, quantity,
                              amount_cents, reason, status, performed_by, created_at, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            ret.order_id,
            ret.sale_id,
            ret.product_id,
            ret.inventory_item_id,
            ret.quantity,
            ret.amount_cents,
            ret.reason,
            ret.status,
            ret.performed_by,
            ret.created_at,
            ret.resolved_at,
        ],
    )?;

    Ok(Return {
        id: conn.last_insert_rowid(),
        ..ret.clone()
    })
}

pub fn get(conn: &Connection, id: i64) -> LedgerResult<Option<Return>> {
    let ret = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM returns WHERE id = ?1"),
            [id],
            from_row,
        )
        .optional()?;
    Ok(ret)
}

pub fn resolve(
    conn: &Connection,
    id: i64,
    status: ReturnStatus,
    resolved_at: DateTime<Utc>,
) -> LedgerResult<()> {
    conn.execute(
        "UPDATE returns SET status = ?1, resolved_at = ?2 WHERE id = ?3",
        params![status, resolved_at, id],
    )?;
    Ok(())
}

/// Quantity of an order already claimed by returns that were not rejected.
pub fn claimed_quantity(conn: &Connection, order_id: i64) -> LedgerResult<i64> {
    let claimed = conn.query_row(
        "SELECT COALESCE(SUM(quantity), 0) FROM returns
         WHERE order_id = ?1 AND status != 'rejected'",
        [order_id],
        |row| row.get(0),
    )?;
    Ok(claimed)
}

pub fn completed_quantity(conn: &Connection, order_id: i64) -> LedgerResult<i64> {
    let completed = conn.query_row(
        "SELECT COALESCE(SUM(quantity), 0) FROM returns
         WHERE order_id = ?1 AND status = 'completed'",
        [order_id],
        |row| row.get(0),
    )?;
    Ok(completed)
}

pub fn for_sale(conn: &Connection, sale_id: i64) -> LedgerResult<Vec<Return>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM returns WHERE sale_id = ?1 ORDER BY id"
    ))?;

    let returns = stmt
        .query_map([sale_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(returns)
}

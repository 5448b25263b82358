use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::error::LedgerResult;
use crate::models::{MovementFilter, StockMovement};

const COLUMNS: &str = "m.id, m.inventory_item_id, m.product_id, m.movement_type, m.quantity,
     m.direction, m.source_inventory_id, m.destination_inventory_id, m.cost_per_unit_cents,
     m.total_cost_cents, m.performed_by, m.status, m.reference_number, m.reason, m.created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<StockMovement> {
    Ok(StockMovement {
        id: row.get(0)?,
        inventory_item_id: row.get(1)?,
        product_id: row.get(2)?,
        movement_type: row.get(3)?,
        quantity: row.get(4)?,
        direction: row.get(5)?,
        source_inventory_id: row.get(6)?,
        destination_inventory_id: row.get(7)?,
        cost_per_unit_cents: row.get(8)?,
        total_cost_cents: row.get(9)?,
        performed_by: row.get(10)?,
        status: row.get(11)?,
        reference_number: row.get(12)?,
        reason: row.get(13)?,
        created_at: row.get(14)?,
    })
}

/// Append `movement` to the ledger. The `id` field is ignored and assigned.
pub fn insert(conn: &Connection, movement: &StockMovement) -> LedgerResult<StockMovement> {
    conn.execute(
        "INSERT INTO stock_movements (inventory_item_id, product_id, movement_type, quantity,
                                      direction, source_inventory_id, destination_inventory_id,
                                      cost_per_unit_cents, total_cost_cents, performed_by,
                                      status, reference_number, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            movement.inventory_item_id,
            movement.product_id,
            movement.movement_type,
            movement.quantity,
            movement.direction,
            movement.source_inventory_id,
            movement.destination_inventory_id,
            movement.cost_per_unit_cents,
            movement.total_cost_cents,
            movement.performed_by,
            movement.status,
            movement.reference_number,
            movement.reason,
            movement.created_at,
        ],
    )?;

    Ok(StockMovement {
        id: conn.last_insert_rowid(),
        ..movement.clone()
    })
}

/// Signed sum (inbound minus outbound) of an item's completed movements.
pub fn ledger_balance(conn: &Connection, inventory_item_id: i64) -> LedgerResult<i64> {
    let balance = conn.query_row(
        "SELECT COALESCE(SUM(CASE direction WHEN 'inbound' THEN quantity ELSE -quantity END), 0)
         FROM stock_movements
         WHERE inventory_item_id = ?1 AND status = 'completed'",
        [inventory_item_id],
        |row| row.get(0),
    )?;
    Ok(balance)
}

pub fn for_item(conn: &Connection, inventory_item_id: i64) -> LedgerResult<Vec<StockMovement>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM stock_movements m
         WHERE m.inventory_item_id = ?1
         ORDER BY m.id"
    ))?;

    let movements = stmt
        .query_map([inventory_item_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(movements)
}

pub fn with_reference(conn: &Connection, reference_number: &str) -> LedgerResult<Vec<StockMovement>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM stock_movements m
         WHERE m.reference_number = ?1
         ORDER BY m.id"
    ))?;

    let movements = stmt
        .query_map([reference_number], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(movements)
}

/// One page of movements on lots held at `filter.warehouse_id`, newest
/// first, together with the total number of matching rows.
pub fn list(
    conn: &Connection,
    filter: &MovementFilter,
    limit: i64,
    offset: i64,
) -> LedgerResult<(Vec<StockMovement>, i64)> {
    let mut clauses = vec!["i.warehouse_id = ?"];
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(filter.warehouse_id)];

    if let Some(item_id) = filter.inventory_item_id {
        clauses.push("m.inventory_item_id = ?");
        values.push(Box::new(item_id));
    }
    if let Some(movement_type) = filter.movement_type {
        clauses.push("m.movement_type = ?");
        values.push(Box::new(movement_type));
    }
    if let Some(direction) = filter.direction {
        clauses.push("m.direction = ?");
        values.push(Box::new(direction));
    }
    if let Some(from) = filter.from {
        clauses.push("m.created_at >= ?");
        values.push(Box::new(from));
    }
    if let Some(to) = filter.to {
        clauses.push("m.created_at <= ?");
        values.push(Box::new(to));
    }

    let from_where = format!(
        "FROM stock_movements m
         JOIN inventory_items i ON i.id = m.inventory_item_id
         WHERE {}",
        clauses.join(" AND ")
    );

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {from_where}"),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(Box::new(limit));
    values.push(Box::new(offset));
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} {from_where} ORDER BY m.created_at DESC, m.id DESC LIMIT ? OFFSET ?"
    ))?;
    let movements = stmt
        .query_map(params_from_iter(values.iter()), from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((movements, total))
}

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LedgerResult;
use crate::models::InventoryItem;

const COLUMNS: &str = "id, product_id, warehouse_id, supplier_id, quantity_supplied, quantity_sold,
     returned_to_shop, returned_to_supplier, quantity_left, cost_price_cents,
     selling_price_cents, reorder_point, status, received_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<InventoryItem> {
    Ok(InventoryItem {
        id: row.get(0)?,
        product_id: row.get(1)?,
        warehouse_id: row.get(2)?,
        supplier_id: row.get(3)?,
        quantity_supplied: row.get(4)?,
        quantity_sold: row.get(5)?,
        returned_to_shop: row.get(6)?,
        returned_to_supplier: row.get(7)?,
        quantity_left: row.get(8)?,
        cost_price_cents: row.get(9)?,
        selling_price_cents: row.get(10)?,
        reorder_point: row.get(11)?,
        status: row.get(12)?,
        received_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> LedgerResult<Option<InventoryItem>> {
    let item = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM inventory_items WHERE id = ?1"),
            [id],
            from_row,
        )
        .optional()?;
    Ok(item)
}

/// The most recently received lot of a product at a warehouse.
pub fn latest_lot(
    conn: &Connection,
    product_id: i64,
    warehouse_id: i64,
) -> LedgerResult<Option<InventoryItem>> {
    let item = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM inventory_items
                 WHERE product_id = ?1 AND warehouse_id = ?2
                 ORDER BY received_at DESC, id DESC
                 LIMIT 1"
            ),
            [product_id, warehouse_id],
            from_row,
        )
        .optional()?;
    Ok(item)
}

/// A lot with the same origin, pricing and receipt time, if any.
pub fn find_matching_lot(
    conn: &Connection,
    product_id: i64,
    warehouse_id: i64,
    supplier_id: Option<i64>,
    cost_price_cents: i64,
    selling_price_cents: i64,
    received_at: DateTime<Utc>,
) -> LedgerResult<Option<InventoryItem>> {
    let item = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM inventory_items
                 WHERE product_id = ?1 AND warehouse_id = ?2 AND supplier_id IS ?3
                   AND cost_price_cents = ?4 AND selling_price_cents = ?5
                   AND received_at = ?6
                 ORDER BY id DESC
                 LIMIT 1"
            ),
            params![
                product_id,
                warehouse_id,
                supplier_id,
                cost_price_cents,
                selling_price_cents,
                received_at
            ],
            from_row,
        )
        .optional()?;
    Ok(item)
}

pub fn insert(conn: &Connection, item: &InventoryItem) -> LedgerResult<InventoryItem> {
    conn.execute(
        "INSERT INTO inventory_items (product_id, warehouse_id, supplier_id, quantity_supplied,
                                      quantity_sold, returned_to_shop, returned_to_supplier,
                                      quantity_left, cost_price_cents, selling_price_cents,
                                      reorder_point, status, received_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            item.product_id,
            item.warehouse_id,
            item.supplier_id,
            item.quantity_supplied,
            item.quantity_sold,
            item.returned_to_shop,
            item.returned_to_supplier,
            item.quantity_left,
            item.cost_price_cents,
            item.selling_price_cents,
            item.reorder_point,
            item.status,
            item.received_at,
            item.updated_at,
        ],
    )?;

    Ok(InventoryItem {
        id: conn.last_insert_rowid(),
        ..item.clone()
    })
}

/// Persist the counters, snapshot and status of an existing lot.
pub fn update_quantities(conn: &Connection, item: &InventoryItem) -> LedgerResult<()> {
    conn.execute(
        "UPDATE inventory_items
         SET quantity_supplied = ?1, quantity_sold = ?2, returned_to_shop = ?3,
             returned_to_supplier = ?4, quantity_left = ?5, status = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            item.quantity_supplied,
            item.quantity_sold,
            item.returned_to_shop,
            item.returned_to_supplier,
            item.quantity_left,
            item.status,
            item.updated_at,
            item.id,
        ],
    )?;
    Ok(())
}

/// Lots of a product at a warehouse that still hold stock, oldest receipt first.
pub fn lots_with_stock(
    conn: &Connection,
    product_id: i64,
    warehouse_id: i64,
) -> LedgerResult<Vec<InventoryItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM inventory_items
         WHERE product_id = ?1 AND warehouse_id = ?2 AND quantity_left > 0
         ORDER BY received_at ASC, id ASC"
    ))?;

    let items = stmt
        .query_map([product_id, warehouse_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn list_for_product(conn: &Connection, product_id: i64) -> LedgerResult<Vec<InventoryItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM inventory_items
         WHERE product_id = ?1
         ORDER BY warehouse_id, received_at, id"
    ))?;

    let items = stmt
        .query_map([product_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn total_left(conn: &Connection, product_id: i64) -> LedgerResult<i64> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(quantity_left), 0) FROM inventory_items WHERE product_id = ?1",
        [product_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

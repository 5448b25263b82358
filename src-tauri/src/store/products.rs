use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LedgerResult;
use crate::models::{Product, ProductStatus, ProductValuation};

const COLUMNS: &str = "id, name, sku, selling_price_cents, purchase_price_cents, quantity,
     reorder_point, status, valuation_method, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        sku: row.get(2)?,
        selling_price_cents: row.get(3)?,
        purchase_price_cents: row.get(4)?,
        quantity: row.get(5)?,
        reorder_point: row.get(6)?,
        status: row.get(7)?,
        valuation_method: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Insert `product` and return it with its assigned id.
pub fn insert(conn: &Connection, product: &Product) -> LedgerResult<Product> {
    conn.execute(
        "INSERT INTO products (name, sku, selling_price_cents, purchase_price_cents, quantity,
                               reorder_point, status, valuation_method, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            product.name,
            product.sku,
            product.selling_price_cents,
            product.purchase_price_cents,
            product.quantity,
            product.reorder_point,
            product.status,
            product.valuation_method,
            product.created_at,
        ],
    )?;

    Ok(Product {
        id: conn.last_insert_rowid(),
        ..product.clone()
    })
}

pub fn get(conn: &Connection, id: i64) -> LedgerResult<Option<Product>> {
    let product = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM products WHERE id = ?1"),
            [id],
            from_row,
        )
        .optional()?;
    Ok(product)
}

pub fn sku_exists(conn: &Connection, sku: &str) -> LedgerResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM products WHERE sku = ?1)",
        [sku],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn update_stock(
    conn: &Connection,
    id: i64,
    quantity: i64,
    status: ProductStatus,
) -> LedgerResult<()> {
    conn.execute(
        "UPDATE products SET quantity = ?1, status = ?2 WHERE id = ?3",
        params![quantity, status, id],
    )?;
    Ok(())
}

/// Products at or below their reorder point, emptiest first.
pub fn list_low_stock(conn: &Connection) -> LedgerResult<Vec<Product>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM products
         WHERE status IN ('low_stock', 'out_of_stock')
         ORDER BY quantity ASC, name"
    ))?;

    let products = stmt
        .query_map([], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(products)
}

pub fn valuation(conn: &Connection) -> LedgerResult<Vec<ProductValuation>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.quantity, p.status,
                COALESCE(SUM(i.quantity_left * i.cost_price_cents), 0)
         FROM products p
         LEFT JOIN inventory_items i ON i.product_id = p.id
         GROUP BY p.id
         ORDER BY p.name",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(ProductValuation {
                product_id: row.get(0)?,
                name: row.get(1)?,
                quantity: row.get(2)?,
                status: row.get(3)?,
                value_at_cost_cents: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

//! Catalog entries and the product quantity aggregator.

use chrono::Utc;
use rand::Rng;
use rusqlite::Connection;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{NewProduct, Product, ProductStatus, ProductValuation, Warehouse};
use crate::services::batches;
use crate::store;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SKU_ATTEMPTS: usize = 5;

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// `<prefix>-<unix millis in base 36>-<3 random base-36 chars>`, e.g. `PRD-LZ3K9Q1A-7XQ`.
pub(crate) fn generate_code(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..3)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{prefix}-{}-{suffix}", to_base36(millis))
}

pub fn create_warehouse(conn: &Connection, name: &str) -> LedgerResult<Warehouse> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("warehouse name cannot be empty"));
    }
    if store::warehouses::name_exists(conn, name)? {
        return Err(LedgerError::validation(format!("warehouse '{name}' already exists")));
    }

    let warehouse = store::warehouses::insert(conn, name)?;
    tracing::info!(warehouse_id = warehouse.id, name, "created warehouse");
    Ok(warehouse)
}

/// Create a catalog entry with no stock.
///
/// Steps run in order: validate, resolve or generate the SKU, derive the
/// initial status, insert.
pub fn create_product(
    conn: &Connection,
    config: &LedgerConfig,
    new: NewProduct,
) -> LedgerResult<Product> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("product name cannot be empty"));
    }
    if new.selling_price_cents < 0 || new.purchase_price_cents < 0 {
        return Err(LedgerError::validation("prices cannot be negative"));
    }
    let reorder_point = new.reorder_point.unwrap_or(config.default_reorder_point);
    if reorder_point < 0 {
        return Err(LedgerError::validation("reorder point cannot be negative"));
    }

    let sku = resolve_sku(conn, new.sku.as_deref())?;

    let product = Product {
        id: 0,
        name: name.to_string(),
        sku,
        selling_price_cents: new.selling_price_cents,
        purchase_price_cents: new.purchase_price_cents,
        quantity: 0,
        reorder_point,
        status: ProductStatus::derive(0, reorder_point),
        valuation_method: new
            .valuation_method
            .unwrap_or(config.default_valuation_method),
        created_at: Utc::now(),
    };

    let product = store::products::insert(conn, &product)?;
    tracing::info!(product_id = product.id, sku = %product.sku, "created product");
    Ok(product)
}

fn resolve_sku(conn: &Connection, requested: Option<&str>) -> LedgerResult<String> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        Some(sku) => {
            if store::products::sku_exists(conn, sku)? {
                return Err(LedgerError::validation(format!("SKU '{sku}' is already in use")));
            }
            Ok(sku.to_string())
        }
        None => {
            for _ in 0..SKU_ATTEMPTS {
                let sku = generate_code("PRD");
                if !store::products::sku_exists(conn, &sku)? {
                    return Ok(sku);
                }
            }
            Err(LedgerError::validation("could not generate a unique SKU"))
        }
    }
}

pub fn get_product(conn: &Connection, id: i64) -> LedgerResult<Product> {
    store::products::get(conn, id)?.ok_or_else(|| LedgerError::not_found("product", id))
}

/// Recompute a product's aggregate quantity and status from its lots.
///
/// Also trims batch tracking so active batches never exceed the new total.
pub fn refresh_product(conn: &Connection, product_id: i64) -> LedgerResult<Product> {
    let mut product = get_product(conn, product_id)?;
    let quantity = store::inventory::total_left(conn, product_id)?;
    let status = ProductStatus::derive(quantity, product.reorder_point);

    if quantity != product.quantity || status != product.status {
        store::products::update_stock(conn, product_id, quantity, status)?;
        tracing::debug!(product_id, quantity, status = %status, "refreshed product stock");
    }
    batches::clamp_batches(conn, product_id, quantity)?;

    product.quantity = quantity;
    product.status = status;
    Ok(product)
}

pub fn list_low_stock(conn: &Connection) -> LedgerResult<Vec<Product>> {
    store::products::list_low_stock(conn)
}

/// Per-product quantity and value at cost, for dashboards.
pub fn stock_valuation(conn: &Connection) -> LedgerResult<Vec<ProductValuation>> {
    store::products::valuation(conn)
}

use serde::{Deserialize, Serialize};

use crate::commands::{respond, CommandResponse};
use crate::db::Database;
use crate::models::{NewProduct, Product, ProductValuation, Warehouse};
use crate::services::products;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateWarehouse {
    pub name: String,
}

pub fn create_warehouse(db: &Database, request: CreateWarehouse) -> CommandResponse<Warehouse> {
    respond(
        "create_warehouse",
        db.transaction(|tx| products::create_warehouse(tx, &request.name)),
    )
}

pub fn create_product(db: &Database, request: NewProduct) -> CommandResponse<Product> {
    respond(
        "create_product",
        db.transaction(|tx| products::create_product(tx, db.config(), request)),
    )
}

pub fn get_product(db: &Database, product_id: i64) -> CommandResponse<Product> {
    respond(
        "get_product",
        db.read(|conn| products::get_product(conn, product_id)),
    )
}

pub fn get_low_stock(db: &Database) -> CommandResponse<Vec<Product>> {
    respond("get_low_stock", db.read(products::list_low_stock))
}

pub fn get_stock_valuation(db: &Database) -> CommandResponse<Vec<ProductValuation>> {
    respond("get_stock_valuation", db.read(products::stock_valuation))
}

use crate::commands::{respond, CommandResponse};
use crate::db::Database;
use crate::models::{InventoryItem, MovementFilter, MovementPage, StockMovement};
use crate::services::inventory::{
    self, AdjustStock, Adjustment, ConsumeStock, Consumption, ReceiveStock, StockChange,
    SupplierReturn, Transfer, TransferStock,
};
use crate::services::movements;

pub fn receive_stock(db: &Database, request: ReceiveStock) -> CommandResponse<InventoryItem> {
    respond(
        "receive_stock",
        db.transaction(|tx| inventory::receive_stock(tx, request)),
    )
}

pub fn consume_stock(db: &Database, request: ConsumeStock) -> CommandResponse<Consumption> {
    respond(
        "consume_stock",
        db.transaction(|tx| inventory::consume_stock(tx, request)),
    )
}

pub fn create_adjustment(db: &Database, request: AdjustStock) -> CommandResponse<Adjustment> {
    let response = respond(
        "create_adjustment",
        db.transaction(|tx| inventory::adjust_stock(tx, request)),
    );
    let unchanged = response
        .data
        .as_ref()
        .is_some_and(|adjustment| adjustment.movement.is_none());
    if unchanged {
        response.with_message("physical count matches stock on hand")
    } else {
        response
    }
}

pub fn return_to_supplier(db: &Database, request: SupplierReturn) -> CommandResponse<StockChange> {
    respond(
        "return_to_supplier",
        db.transaction(|tx| inventory::return_to_supplier(tx, request)),
    )
}

pub fn transfer_stock(db: &Database, request: TransferStock) -> CommandResponse<Transfer> {
    respond(
        "transfer_stock",
        db.transaction(|tx| inventory::transfer_stock(tx, request)),
    )
}

pub fn get_inventory_item(db: &Database, inventory_item_id: i64) -> CommandResponse<InventoryItem> {
    respond(
        "get_inventory_item",
        db.read(|conn| inventory::get_item(conn, inventory_item_id)),
    )
}

pub fn list_inventory_items(db: &Database, product_id: i64) -> CommandResponse<Vec<InventoryItem>> {
    respond(
        "list_inventory_items",
        db.read(|conn| inventory::list_items_for_product(conn, product_id)),
    )
}

pub fn verify_inventory_item(db: &Database, inventory_item_id: i64) -> CommandResponse<InventoryItem> {
    respond(
        "verify_inventory_item",
        db.read(|conn| movements::verify_item(conn, inventory_item_id)),
    )
}

pub fn get_item_movements(db: &Database, inventory_item_id: i64) -> CommandResponse<Vec<StockMovement>> {
    respond(
        "get_item_movements",
        db.read(|conn| movements::movements_for_item(conn, inventory_item_id)),
    )
}

pub fn list_movements(db: &Database, filter: MovementFilter) -> CommandResponse<MovementPage> {
    let response = respond(
        "list_movements",
        db.read(|conn| movements::list_movements(conn, &filter)),
    );
    if response.data.as_ref().is_some_and(|page| page.total == 0) {
        response.with_message("no movements found")
    } else {
        response
    }
}

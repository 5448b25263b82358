//! Tauri shell: IPC commands over the ledger and the app entry point.

use chrono::NaiveDate;
use tauri::{AppHandle, Manager};

use crate::commands::{self, CommandResponse};
use crate::config::LedgerConfig;
use crate::db::{Database, DatabaseExt};
use crate::models::{
    BatchTracking, InventoryItem, MovementFilter, MovementPage, NewProduct, Product,
    ProductValuation, Return, SaleWithDetails, StockMovement, Warehouse,
};
use crate::services::batches::NewBatch;
use crate::services::inventory::{
    AdjustStock, Adjustment, ConsumeStock, Consumption, ReceiveStock, StockChange, SupplierReturn,
    Transfer, TransferStock,
};
use crate::services::returns::ReturnRequest;
use crate::services::sales::NewSale;

// Catalog

#[tauri::command]
fn create_warehouse(app: AppHandle, request: commands::catalog::CreateWarehouse) -> CommandResponse<Warehouse> {
    commands::catalog::create_warehouse(app.db(), request)
}

#[tauri::command]
fn create_product(app: AppHandle, request: NewProduct) -> CommandResponse<Product> {
    commands::catalog::create_product(app.db(), request)
}

#[tauri::command]
fn get_product(app: AppHandle, product_id: i64) -> CommandResponse<Product> {
    commands::catalog::get_product(app.db(), product_id)
}

#[tauri::command]
fn get_low_stock(app: AppHandle) -> CommandResponse<Vec<Product>> {
    commands::catalog::get_low_stock(app.db())
}

#[tauri::command]
fn get_stock_valuation(app: AppHandle) -> CommandResponse<Vec<ProductValuation>> {
    commands::catalog::get_stock_valuation(app.db())
}

// Inventory

#[tauri::command]
fn receive_stock(app: AppHandle, request: ReceiveStock) -> CommandResponse<InventoryItem> {
    commands::inventory::receive_stock(app.db(), request)
}

#[tauri::command]
fn consume_stock(app: AppHandle, request: ConsumeStock) -> CommandResponse<Consumption> {
    commands::inventory::consume_stock(app.db(), request)
}

#[tauri::command]
fn create_adjustment(app: AppHandle, request: AdjustStock) -> CommandResponse<Adjustment> {
    commands::inventory::create_adjustment(app.db(), request)
}

#[tauri::command]
fn return_to_supplier(app: AppHandle, request: SupplierReturn) -> CommandResponse<StockChange> {
    commands::inventory::return_to_supplier(app.db(), request)
}

#[tauri::command]
fn transfer_stock(app: AppHandle, request: TransferStock) -> CommandResponse<Transfer> {
    commands::inventory::transfer_stock(app.db(), request)
}

#[tauri::command]
fn get_inventory_item(app: AppHandle, inventory_item_id: i64) -> CommandResponse<InventoryItem> {
    commands::inventory::get_inventory_item(app.db(), inventory_item_id)
}

#[tauri::command]
fn list_inventory_items(app: AppHandle, product_id: i64) -> CommandResponse<Vec<InventoryItem>> {
    commands::inventory::list_inventory_items(app.db(), product_id)
}

#[tauri::command]
fn verify_inventory_item(app: AppHandle, inventory_item_id: i64) -> CommandResponse<InventoryItem> {
    commands::inventory::verify_inventory_item(app.db(), inventory_item_id)
}

#[tauri::command]
fn get_item_movements(app: AppHandle, inventory_item_id: i64) -> CommandResponse<Vec<StockMovement>> {
    commands::inventory::get_item_movements(app.db(), inventory_item_id)
}

#[tauri::command]
fn list_movements(app: AppHandle, filter: MovementFilter) -> CommandResponse<MovementPage> {
    commands::inventory::list_movements(app.db(), filter)
}

// Sales and returns

#[tauri::command]
fn create_sale(app: AppHandle, request: NewSale) -> CommandResponse<SaleWithDetails> {
    commands::sales::create_sale(app.db(), request)
}

#[tauri::command]
fn get_sale(app: AppHandle, sale_id: i64) -> CommandResponse<SaleWithDetails> {
    commands::sales::get_sale(app.db(), sale_id)
}

#[tauri::command]
fn process_return(app: AppHandle, request: ReturnRequest) -> CommandResponse<Return> {
    commands::sales::process_return(app.db(), request)
}

#[tauri::command]
fn request_return(app: AppHandle, request: ReturnRequest) -> CommandResponse<Return> {
    commands::sales::request_return(app.db(), request)
}

#[tauri::command]
fn approve_return(app: AppHandle, return_id: i64) -> CommandResponse<Return> {
    commands::sales::approve_return(app.db(), return_id)
}

#[tauri::command]
fn reject_return(app: AppHandle, return_id: i64) -> CommandResponse<Return> {
    commands::sales::reject_return(app.db(), return_id)
}

// Batches

#[tauri::command]
fn register_batch(app: AppHandle, request: NewBatch) -> CommandResponse<BatchTracking> {
    commands::batches::register_batch(app.db(), request)
}

#[tauri::command]
fn list_batches(app: AppHandle, product_id: i64) -> CommandResponse<Vec<BatchTracking>> {
    commands::batches::list_batches(app.db(), product_id)
}

#[tauri::command]
fn expire_batches(app: AppHandle, as_of: NaiveDate) -> CommandResponse<Vec<BatchTracking>> {
    commands::batches::expire_batches(app.db(), as_of)
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let config = match LedgerConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid ledger configuration, using defaults: {err}");
            LedgerConfig::default()
        }
    };
    crate::logging::init(&config);

    let result = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(move |app| {
            let path = if config.database_path.is_absolute() {
                config.database_path.clone()
            } else {
                app.path().app_data_dir()?.join(&config.database_path)
            };
            let db = Database::open(&path, &config)?;
            app.manage(db);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Catalog
            create_warehouse,
            create_product,
            get_product,
            get_low_stock,
            get_stock_valuation,
            // Inventory
            receive_stock,
            consume_stock,
            create_adjustment,
            return_to_supplier,
            transfer_stock,
            get_inventory_item,
            list_inventory_items,
            verify_inventory_item,
            get_item_movements,
            list_movements,
            // Sales and returns
            create_sale,
            get_sale,
            process_return,
            request_return,
            approve_return,
            reject_return,
            // Batches
            register_batch,
            list_batches,
            expire_batches,
        ])
        .run(tauri::generate_context!());

    if let Err(err) = result {
        tracing::error!(error = %err, "desktop shell exited with an error");
    }
}

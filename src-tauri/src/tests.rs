//! Integration tests for the ledger services
//! These tests run every operation against a fresh in-memory SQLite database

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::{Duration, NaiveDate, Utc};
    use proptest::prelude::*;

    use crate::commands;
    use crate::config::LedgerConfig;
    use crate::db::Database;
    use crate::error::{ErrorKind, LedgerError, LedgerResult};
    use crate::models::{
        BatchStatus, Direction, InventoryItem, ItemStatus, MovementFilter, MovementStatus,
        MovementType, NewProduct, PaymentMethod, PaymentStatus, Product, ProductStatus,
        ReturnStatus, SaleStatus, SaleWithDetails, ValuationMethod,
    };
    use crate::services::batches::{self, NewBatch};
    use crate::services::inventory::{
        self, AdjustStock, ConsumeStock, ReceiveStock, SupplierReturn, TransferStock,
    };
    use crate::services::returns::{self, ReturnRequest};
    use crate::services::sales::{self, NewSale, PaymentData, SaleLine};
    use crate::services::{movements, products};
    use crate::store;

    #[derive(Debug, Clone, Copy)]
    struct Seed {
        shop: i64,
        backroom: i64,
        beans: i64,
    }

    /// Create a test database with schema
    fn setup_test_db() -> Database {
        Database::open_in_memory(&LedgerConfig::default()).expect("Failed to create in-memory database")
    }

    fn seed_test_data(db: &Database) -> Seed {
        db.transaction(|tx| {
            let shop = products::create_warehouse(tx, "Main Shop")?;
            let backroom = products::create_warehouse(tx, "Backroom")?;
            let beans = products::create_product(
                tx,
                db.config(),
                NewProduct {
                    name: "Espresso Beans 1kg".to_string(),
                    sku: Some("BEAN-1KG".to_string()),
                    selling_price_cents: 2500,
                    purchase_price_cents: 1000,
                    reorder_point: Some(10),
                    valuation_method: None,
                },
            )?;
            Ok(Seed {
                shop: shop.id,
                backroom: backroom.id,
                beans: beans.id,
            })
        })
        .expect("Failed to seed test data")
    }

    fn add_product(db: &Database, name: &str, valuation_method: ValuationMethod) -> Product {
        db.transaction(|tx| {
            products::create_product(
                tx,
                db.config(),
                NewProduct {
                    name: name.to_string(),
                    selling_price_cents: 1000,
                    purchase_price_cents: 400,
                    reorder_point: Some(5),
                    valuation_method: Some(valuation_method),
                    ..NewProduct::default()
                },
            )
        })
        .expect("Failed to create product")
    }

    fn receive(db: &Database, product_id: i64, warehouse_id: i64, quantity: i64, cost: i64) -> InventoryItem {
        db.transaction(|tx| {
            inventory::receive_stock(
                tx,
                ReceiveStock {
                    product_id,
                    warehouse_id,
                    quantity,
                    unit_cost_cents: cost,
                    selling_price_cents: 2500,
                    supplier_id: None,
                    performed_by: 1,
                    reference_number: None,
                },
            )
        })
        .expect("Failed to receive stock")
    }

    fn consume(db: &Database, product_id: i64, warehouse_id: i64, quantity: i64) -> LedgerResult<inventory::Consumption> {
        db.transaction(|tx| {
            inventory::consume_stock(
                tx,
                ConsumeStock {
                    product_id,
                    warehouse_id,
                    quantity,
                    performed_by: 1,
                    reference_number: None,
                },
            )
        })
    }

    /// A cash sale paid in full; lines are (product, quantity, unit price).
    fn cash_sale(shop_id: i64, lines: &[(i64, i64, i64)]) -> NewSale {
        let line_items: Vec<SaleLine> = lines
            .iter()
            .map(|&(product_id, quantity, selling_price_cents)| SaleLine {
                product_id,
                quantity,
                selling_price_cents,
            })
            .collect();
        let total = line_items.iter().map(|line| line.total_cents().unwrap()).sum();
        NewSale {
            shop_id,
            line_items,
            payment_data: PaymentData {
                method: PaymentMethod::Cash,
                amount_paid_cents: total,
                discount_cents: 0,
                reference: None,
            },
            sales_person_id: 7,
        }
    }

    fn item(db: &Database, id: i64) -> InventoryItem {
        db.read(|conn| inventory::get_item(conn, id)).unwrap()
    }

    fn product(db: &Database, id: i64) -> Product {
        db.read(|conn| products::get_product(conn, id)).unwrap()
    }

    fn count_rows(db: &Database, table: &str) -> i64 {
        db.read(|conn| {
            let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(count)
        })
        .unwrap()
    }

    fn assert_reconciles(db: &Database, item_id: i64) {
        let checked = db
            .read(|conn| movements::verify_item(conn, item_id))
            .expect("inventory item should reconcile");
        assert!(checked.quantity_left >= 0);
        assert_eq!(checked.status, ItemStatus::derive(checked.quantity_left, checked.reorder_point));
    }

    // ===== RECEIVING TESTS =====

    #[test]
    fn test_receive_stock_logs_inbound_movement() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        // 100 units at 10.00 each
        let lot = receive(&db, seed.beans, seed.shop, 100, 1000);
        assert_eq!(lot.quantity_left, 100);
        assert_eq!(lot.quantity_supplied, 100);
        assert_eq!(lot.status, ItemStatus::InStock);

        let history = db.read(|conn| movements::movements_for_item(conn, lot.id)).unwrap();
        assert_eq!(history.len(), 1);
        let movement = &history[0];
        assert_eq!(movement.movement_type, MovementType::Added);
        assert_eq!(movement.direction, Direction::Inbound);
        assert_eq!(movement.quantity, 100);
        assert_eq!(movement.cost_per_unit_cents, 1000);
        assert_eq!(movement.total_cost_cents, 100_000);
        assert_eq!(movement.status, MovementStatus::Completed);
        assert_eq!(movement.source_inventory_id, seed.shop);

        let beans = product(&db, seed.beans);
        assert_eq!(beans.quantity, 100);
        assert_eq!(beans.status, ProductStatus::HighStock);
        assert_reconciles(&db, lot.id);
    }

    #[test]
    fn test_receive_matching_lot_is_incremented() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let first = receive(&db, seed.beans, seed.shop, 10, 1000);
        let second = receive(&db, seed.beans, seed.shop, 15, 1000);
        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity_supplied, 25);
        assert_eq!(second.quantity_left, 25);

        // Different cost means a different lot
        let third = receive(&db, seed.beans, seed.shop, 5, 1200);
        assert_ne!(third.id, first.id);
        assert_eq!(product(&db, seed.beans).quantity, 30);

        let lots = db
            .read(|conn| inventory::list_items_for_product(conn, seed.beans))
            .unwrap();
        assert_eq!(lots.len(), 2);
        assert_reconciles(&db, first.id);
        assert_reconciles(&db, third.id);
    }

    #[test]
    fn test_receive_rejects_invalid_input() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let zero = db.transaction(|tx| {
            inventory::receive_stock(
                tx,
                ReceiveStock {
                    product_id: seed.beans,
                    warehouse_id: seed.shop,
                    quantity: 0,
                    unit_cost_cents: 1000,
                    selling_price_cents: 2500,
                    supplier_id: None,
                    performed_by: 1,
                    reference_number: None,
                },
            )
        });
        assert!(matches!(zero, Err(LedgerError::Validation(_))));

        let missing = db.transaction(|tx| {
            inventory::receive_stock(
                tx,
                ReceiveStock {
                    product_id: 999,
                    warehouse_id: seed.shop,
                    quantity: 5,
                    unit_cost_cents: 1000,
                    selling_price_cents: 2500,
                    supplier_id: None,
                    performed_by: 1,
                    reference_number: None,
                },
            )
        });
        assert!(matches!(missing, Err(LedgerError::NotFound { entity: "product", id: 999 })));

        assert_eq!(count_rows(&db, "inventory_items"), 0);
        assert_eq!(count_rows(&db, "stock_movements"), 0);
    }

    #[test]
    fn test_product_sku_generation_and_uniqueness() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let generated = add_product(&db, "Oat Milk", ValuationMethod::Fifo);
        assert!(generated.sku.starts_with("PRD-"));
        assert_eq!(generated.status, ProductStatus::OutOfStock);
        assert_eq!(generated.quantity, 0);

        let duplicate = db.transaction(|tx| {
            products::create_product(
                tx,
                db.config(),
                NewProduct {
                    name: "Other Beans".to_string(),
                    sku: Some("BEAN-1KG".to_string()),
                    ..NewProduct::default()
                },
            )
        });
        assert!(matches!(duplicate, Err(LedgerError::Validation(_))));

        // Default reorder point and valuation come from configuration
        let beans = product(&db, seed.beans);
        assert_eq!(beans.reorder_point, 10);
        assert_eq!(beans.valuation_method, ValuationMethod::Fifo);
    }

    #[test]
    fn test_receipt_behind_newer_lot_opens_its_own_lot() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let day_one = receive(&db, seed.beans, seed.shop, 5, 1000);
        let day_two = receive(&db, seed.beans, seed.shop, 5, 1200);
        consume(&db, seed.beans, seed.shop, 5).unwrap();

        // Same supplier and prices as day one, but received after day two
        let day_three = receive(&db, seed.beans, seed.shop, 5, 1000);
        assert_ne!(day_three.id, day_one.id);
        assert_eq!(day_three.quantity_supplied, 5);
        assert_eq!(item(&db, day_one.id).quantity_left, 0);

        let second = consume(&db, seed.beans, seed.shop, 5).unwrap();
        assert_eq!(second.draws.len(), 1);
        assert_eq!(second.draws[0].item.id, day_two.id);
        assert_eq!(second.draws[0].cost_per_unit_cents, 1200);
        assert_eq!(item(&db, day_three.id).quantity_left, 5);

        assert_reconciles(&db, day_one.id);
        assert_reconciles(&db, day_two.id);
        assert_reconciles(&db, day_three.id);
    }

    // ===== CONSUMPTION TESTS =====

    #[test]
    fn test_read_after_write() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let lot = receive(&db, seed.beans, seed.shop, 50, 1000);
        consume(&db, seed.beans, seed.shop, 20).unwrap();

        let lot = item(&db, lot.id);
        assert_eq!(lot.quantity_left, 30);
        assert_eq!(lot.quantity_sold, 20);

        let history = db.read(|conn| movements::movements_for_item(conn, lot.id)).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.status == MovementStatus::Completed));
        assert_eq!((history[0].direction, history[0].quantity), (Direction::Inbound, 50));
        assert_eq!((history[1].direction, history[1].quantity), (Direction::Outbound, 20));
        assert_eq!(history[1].movement_type, MovementType::Sold);
        assert_reconciles(&db, lot.id);
    }

    #[test]
    fn test_insufficient_stock_leaves_no_trace() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let lot = receive(&db, seed.beans, seed.shop, 5, 1000);
        let err = consume(&db, seed.beans, seed.shop, 8).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientStock { requested: 8, available: 5, .. }
        ));
        assert!(err.kind().is_user_correctable());

        assert_eq!(item(&db, lot.id).quantity_left, 5);
        assert_eq!(count_rows(&db, "stock_movements"), 1);
    }

    #[test]
    fn test_exact_stock_limit() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let lot = receive(&db, seed.beans, seed.shop, 12, 1000);
        consume(&db, seed.beans, seed.shop, 12).unwrap();

        let lot = item(&db, lot.id);
        assert_eq!(lot.quantity_left, 0);
        assert_eq!(lot.status, ItemStatus::OutOfStock);
        assert_eq!(product(&db, seed.beans).status, ProductStatus::OutOfStock);
        assert_reconciles(&db, lot.id);
    }

    #[test]
    fn test_fifo_consumes_oldest_lot_first() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let old = receive(&db, seed.beans, seed.shop, 5, 100);
        let new = receive(&db, seed.beans, seed.shop, 10, 200);

        let consumption = consume(&db, seed.beans, seed.shop, 8).unwrap();
        assert_eq!(consumption.draws.len(), 2);
        assert_eq!(consumption.draws[0].item.id, old.id);
        assert_eq!(consumption.draws[0].quantity, 5);
        assert_eq!(consumption.draws[1].item.id, new.id);
        assert_eq!(consumption.draws[1].quantity, 3);
        assert_eq!(consumption.total_cost_cents().unwrap(), 5 * 100 + 3 * 200);

        assert_eq!(item(&db, old.id).quantity_left, 0);
        assert_eq!(item(&db, new.id).quantity_left, 7);
        assert_reconciles(&db, old.id);
        assert_reconciles(&db, new.id);
    }

    #[test]
    fn test_lifo_consumes_newest_lot_first() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let syrup = add_product(&db, "Vanilla Syrup", ValuationMethod::Lifo);

        let old = receive(&db, syrup.id, seed.shop, 5, 100);
        let new = receive(&db, syrup.id, seed.shop, 10, 200);
        consume(&db, syrup.id, seed.shop, 8).unwrap();

        assert_eq!(item(&db, old.id).quantity_left, 5);
        assert_eq!(item(&db, new.id).quantity_left, 2);
    }

    #[test]
    fn test_average_cost_books_weighted_average() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let milk = add_product(&db, "Whole Milk", ValuationMethod::AverageCost);

        receive(&db, milk.id, seed.shop, 5, 100);
        receive(&db, milk.id, seed.shop, 10, 200);
        let consumption = consume(&db, milk.id, seed.shop, 8).unwrap();

        // (5 * 100 + 10 * 200) / 15 rounds to 167
        assert!(consumption.draws.iter().all(|d| d.cost_per_unit_cents == 167));
        assert!(consumption
            .draws
            .iter()
            .all(|d| d.movement.cost_per_unit_cents == 167));
    }

    #[test]
    fn test_consume_only_draws_from_requested_warehouse() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        receive(&db, seed.beans, seed.backroom, 40, 1000);
        let err = consume(&db, seed.beans, seed.shop, 1).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 0, .. }));
    }

    // ===== SALE TESTS =====

    #[test]
    fn test_sale_records_orders_payment_and_receipt() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 100, 1000);

        let details = sales::checkout(&db, cash_sale(seed.shop, &[(seed.beans, 30, 2500)])).unwrap();

        let lot = item(&db, lot.id);
        assert_eq!(lot.quantity_left, 70);
        assert_eq!(lot.quantity_sold, 30);

        let sale = &details.sale;
        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sale.gross_amount_cents, 75_000);
        assert_eq!(sale.net_amount_cents, 75_000);
        assert_eq!(sale.profit_cents, 30 * (2500 - 1000));
        assert_eq!(sale.change_given_cents, 0);
        assert!(sale.receipt_number.starts_with("RCP-"));

        assert_eq!(details.orders.len(), 1);
        assert_eq!(details.orders[0].inventory_item_id, Some(lot.id));
        assert_eq!(details.orders[0].payment_status, PaymentStatus::Paid);
        assert_eq!(details.orders[0].line_total_cents(), 75_000);
        assert_eq!(details.payment.amount_paid_cents, 75_000);
        assert_eq!(details.receipt.total_cents, 75_000);
        assert_eq!(details.receipt.receipt_number, sale.receipt_number);

        // The sold movement carries the receipt number
        let sold = db
            .read(|conn| movements::movements_for_reference(conn, &sale.receipt_number))
            .unwrap();
        assert_eq!(sold.len(), 1);
        assert_eq!(sold[0].movement_type, MovementType::Sold);
        assert_eq!(sold[0].direction, Direction::Outbound);
        assert_eq!(sold[0].quantity, 30);
        assert_reconciles(&db, lot.id);

        let fetched = db.read(|conn| sales::get_sale(conn, sale.id)).unwrap();
        assert_eq!(fetched, details);
    }

    #[test]
    fn test_sale_with_discount_and_change() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 100, 1000);

        let mut request = cash_sale(seed.shop, &[(seed.beans, 30, 2500)]);
        request.payment_data.discount_cents = 5_000;
        request.payment_data.amount_paid_cents = 80_000;
        let details = sales::checkout(&db, request).unwrap();

        assert_eq!(details.sale.gross_amount_cents, 75_000);
        assert_eq!(details.sale.net_amount_cents, 70_000);
        assert_eq!(details.sale.change_given_cents, 10_000);
        assert_eq!(details.payment.change_given_cents, 10_000);
        // Profit is not reduced by the discount
        assert_eq!(details.sale.profit_cents, 45_000);
    }

    #[test]
    fn test_sale_spanning_lots_creates_order_per_lot() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let old = receive(&db, seed.beans, seed.shop, 4, 900);
        let new = receive(&db, seed.beans, seed.shop, 10, 1100);

        let details = sales::checkout(&db, cash_sale(seed.shop, &[(seed.beans, 6, 2500)])).unwrap();

        assert_eq!(details.orders.len(), 2);
        assert_eq!(details.orders[0].inventory_item_id, Some(old.id));
        assert_eq!(details.orders[0].quantity, 4);
        assert_eq!(details.orders[0].cost_price_cents, 900);
        assert_eq!(details.orders[1].inventory_item_id, Some(new.id));
        assert_eq!(details.orders[1].quantity, 2);
        assert_eq!(details.sale.profit_cents, 4 * 1600 + 2 * 1400);
        assert_eq!(product(&db, seed.beans).quantity, 8);
    }

    #[test]
    fn test_failed_sale_line_rolls_back_whole_sale() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let cups = add_product(&db, "Paper Cups", ValuationMethod::Fifo);
        let lids = add_product(&db, "Cup Lids", ValuationMethod::Fifo);

        let beans_lot = receive(&db, seed.beans, seed.shop, 20, 1000);
        let cups_lot = receive(&db, cups.id, seed.shop, 20, 100);
        receive(&db, lids.id, seed.shop, 1, 50);
        let movements_before = count_rows(&db, "stock_movements");

        // Third line runs out of stock after the first two were drawn
        let err = sales::checkout(
            &db,
            cash_sale(seed.shop, &[(seed.beans, 2, 2500), (cups.id, 2, 300), (lids.id, 5, 100)]),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));

        assert_eq!(count_rows(&db, "stock_movements"), movements_before);
        assert_eq!(count_rows(&db, "orders"), 0);
        assert_eq!(count_rows(&db, "payments"), 0);
        assert_eq!(count_rows(&db, "receipts"), 0);
        assert_eq!(count_rows(&db, "sales"), 0);
        assert_eq!(item(&db, beans_lot.id).quantity_left, 20);
        assert_eq!(item(&db, cups_lot.id).quantity_left, 20);
        assert_eq!(product(&db, seed.beans).quantity, 20);
    }

    #[test]
    fn test_invalid_third_line_rejected_before_any_mutation() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let cups = add_product(&db, "Paper Cups", ValuationMethod::Fifo);
        receive(&db, seed.beans, seed.shop, 20, 1000);
        receive(&db, cups.id, seed.shop, 20, 100);
        let movements_before = count_rows(&db, "stock_movements");

        let err = sales::checkout(
            &db,
            cash_sale(seed.shop, &[(seed.beans, 2, 2500), (cups.id, 2, 300), (cups.id, 0, 300)]),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = sales::checkout(
            &db,
            cash_sale(seed.shop, &[(seed.beans, 2, 2500), (cups.id, 2, 300), (cups.id, 1, -300)]),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert_eq!(count_rows(&db, "stock_movements"), movements_before);
        assert_eq!(count_rows(&db, "sales"), 0);
    }

    #[test]
    fn test_underpayment_is_rejected() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 10, 1000);

        let mut request = cash_sale(seed.shop, &[(seed.beans, 3, 2500)]);
        request.payment_data.amount_paid_cents = 5_000;
        let err = sales::checkout(&db, request).unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Underpayment { net_amount: 7_500, amount_paid: 5_000 }
        ));
        assert_eq!(err.kind(), ErrorKind::Underpayment);
        assert_eq!(item(&db, lot.id).quantity_left, 10);
        assert_eq!(count_rows(&db, "sales"), 0);
    }

    #[test]
    fn test_partial_payment_when_allowed() {
        let config = LedgerConfig {
            allow_partial_payment: true,
            ..LedgerConfig::default()
        };
        let db = Database::open_in_memory(&config).unwrap();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 10, 1000);

        let mut request = cash_sale(seed.shop, &[(seed.beans, 3, 2500)]);
        request.payment_data.method = PaymentMethod::Credit;
        request.payment_data.amount_paid_cents = 5_000;
        let details = sales::checkout(&db, request).unwrap();

        assert_eq!(details.sale.status, SaleStatus::Pending);
        assert_eq!(details.sale.change_given_cents, 0);
        assert!(details
            .orders
            .iter()
            .all(|o| o.payment_status == PaymentStatus::Unpaid));
        assert_eq!(product(&db, seed.beans).quantity, 7);
    }

    #[test]
    fn test_discount_cannot_exceed_total() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 10, 1000);

        let mut request = cash_sale(seed.shop, &[(seed.beans, 1, 2500)]);
        request.payment_data.discount_cents = 3_000;
        let err = sales::checkout(&db, request).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    // ===== RETURN TESTS =====

    fn sell_thirty(db: &Database, seed: Seed) -> (InventoryItem, SaleWithDetails) {
        let lot = receive(db, seed.beans, seed.shop, 100, 1000);
        let details = sales::checkout(db, cash_sale(seed.shop, &[(seed.beans, 30, 2500)])).unwrap();
        (lot, details)
    }

    fn return_request(order_id: i64, quantity: i64) -> ReturnRequest {
        ReturnRequest {
            order_id,
            quantity,
            reason: "Damaged packaging".to_string(),
            performed_by: 2,
        }
    }

    #[test]
    fn test_return_restores_stock() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let (lot, details) = sell_thirty(&db, seed);
        let order_id = details.orders[0].id;

        let ret = db
            .transaction(|tx| returns::process_return(tx, return_request(order_id, 5)))
            .unwrap();
        assert_eq!(ret.status, ReturnStatus::Completed);
        assert_eq!(ret.amount_cents, 5 * 2500);
        assert!(ret.resolved_at.is_some());

        let lot = item(&db, lot.id);
        assert_eq!(lot.quantity_left, 75);
        assert_eq!(lot.returned_to_shop, 5);

        let history = db.read(|conn| movements::movements_for_item(conn, lot.id)).unwrap();
        let returned: Vec<_> = history
            .iter()
            .filter(|m| m.movement_type == MovementType::Returned)
            .collect();
        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].direction, Direction::Inbound);
        assert_eq!(returned[0].quantity, 5);
        assert_eq!(returned[0].reference_number.as_deref(), Some(details.sale.receipt_number.as_str()));
        assert_reconciles(&db, lot.id);

        // Still only partly returned
        let sale = db.read(|conn| sales::get_sale(conn, details.sale.id)).unwrap();
        assert_eq!(sale.orders[0].payment_status, PaymentStatus::Paid);
        assert_eq!(sale.returns.len(), 1);
    }

    #[test]
    fn test_return_cannot_exceed_order_quantity() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let (lot, details) = sell_thirty(&db, seed);
        let order_id = details.orders[0].id;

        let err = db
            .transaction(|tx| returns::process_return(tx, return_request(order_id, 31)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        db.transaction(|tx| returns::process_return(tx, return_request(order_id, 20)))
            .unwrap();
        let err = db
            .transaction(|tx| returns::process_return(tx, return_request(order_id, 11)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert_eq!(item(&db, lot.id).quantity_left, 90);
    }

    #[test]
    fn test_rejected_return_never_touches_stock() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let (lot, details) = sell_thirty(&db, seed);
        let order_id = details.orders[0].id;
        let movements_before = count_rows(&db, "stock_movements");

        let pending = db
            .transaction(|tx| returns::request_return(tx, return_request(order_id, 30)))
            .unwrap();
        assert_eq!(pending.status, ReturnStatus::Pending);

        let rejected = db
            .transaction(|tx| returns::reject_return(tx, pending.id))
            .unwrap();
        assert_eq!(rejected.status, ReturnStatus::Rejected);
        assert_eq!(item(&db, lot.id).quantity_left, 70);
        assert_eq!(count_rows(&db, "stock_movements"), movements_before);

        // A resolved return cannot be approved afterwards
        let err = db
            .transaction(|tx| returns::approve_return(tx, pending.id))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        // Rejected quantity can be claimed again
        db.transaction(|tx| returns::request_return(tx, return_request(order_id, 30)))
            .unwrap();
    }

    #[test]
    fn test_full_return_marks_order_refunded() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let (lot, details) = sell_thirty(&db, seed);
        let order_id = details.orders[0].id;

        db.transaction(|tx| returns::process_return(tx, return_request(order_id, 10)))
            .unwrap();
        let pending = db
            .transaction(|tx| returns::request_return(tx, return_request(order_id, 20)))
            .unwrap();
        let approved = db
            .transaction(|tx| returns::approve_return(tx, pending.id))
            .unwrap();
        assert_eq!(approved.status, ReturnStatus::Completed);

        let sale = db.read(|conn| sales::get_sale(conn, details.sale.id)).unwrap();
        assert_eq!(sale.orders[0].payment_status, PaymentStatus::Refunded);
        assert_eq!(item(&db, lot.id).quantity_left, 100);
        assert_eq!(product(&db, seed.beans).quantity, 100);
        assert_reconciles(&db, lot.id);
    }

    #[test]
    fn test_return_for_unknown_order() {
        let db = setup_test_db();
        seed_test_data(&db);

        let err = db
            .transaction(|tx| returns::process_return(tx, return_request(42, 1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "order", id: 42 }));
    }

    // ===== ADJUSTMENT TESTS =====

    fn adjust(db: &Database, inventory_item_id: i64, physical_count: i64) -> LedgerResult<inventory::Adjustment> {
        db.transaction(|tx| {
            inventory::adjust_stock(
                tx,
                AdjustStock {
                    inventory_item_id,
                    physical_count,
                    reason: "Monthly stocktake".to_string(),
                    performed_by: 3,
                },
            )
        })
    }

    #[test]
    fn test_stocktake_shortfall_records_outbound_adjustment() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let (lot, details) = sell_thirty(&db, seed);
        db.transaction(|tx| returns::process_return(tx, return_request(details.orders[0].id, 5)))
            .unwrap();
        assert_eq!(item(&db, lot.id).quantity_left, 75);

        let adjustment = adjust(&db, lot.id, 70).unwrap();
        assert_eq!(adjustment.discrepancy, -5);
        let movement = adjustment.movement.expect("adjustment movement");
        assert_eq!(movement.movement_type, MovementType::Adjustment);
        assert_eq!(movement.direction, Direction::Outbound);
        assert_eq!(movement.quantity, 5);
        assert_eq!(movement.reason.as_deref(), Some("Monthly stocktake"));

        assert_eq!(adjustment.item.quantity_left, 70);
        assert_eq!(product(&db, seed.beans).quantity, 70);
        assert_reconciles(&db, lot.id);
    }

    #[test]
    fn test_stocktake_surplus_and_exact_count() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 10, 1000);

        let surplus = adjust(&db, lot.id, 13).unwrap();
        assert_eq!(surplus.discrepancy, 3);
        assert_eq!(surplus.movement.unwrap().direction, Direction::Inbound);
        assert_eq!(surplus.item.quantity_left, 13);
        assert_reconciles(&db, lot.id);

        let movements_before = count_rows(&db, "stock_movements");
        let exact = adjust(&db, lot.id, 13).unwrap();
        assert_eq!(exact.discrepancy, 0);
        assert!(exact.movement.is_none());
        assert_eq!(count_rows(&db, "stock_movements"), movements_before);
    }

    #[test]
    fn test_adjustment_validation() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 10, 1000);

        assert!(matches!(adjust(&db, lot.id, -1), Err(LedgerError::Validation(_))));
        assert!(matches!(
            adjust(&db, 999, 4),
            Err(LedgerError::NotFound { entity: "inventory item", .. })
        ));

        let blank_reason = db.transaction(|tx| {
            inventory::adjust_stock(
                tx,
                AdjustStock {
                    inventory_item_id: lot.id,
                    physical_count: 4,
                    reason: "   ".to_string(),
                    performed_by: 3,
                },
            )
        });
        assert!(matches!(blank_reason, Err(LedgerError::Validation(_))));
        assert_eq!(item(&db, lot.id).quantity_left, 10);
    }

    // ===== TRANSFER AND SUPPLIER RETURN TESTS =====

    #[test]
    fn test_transfer_moves_stock_between_warehouses() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 20, 1000);

        let transfer = db
            .transaction(|tx| {
                inventory::transfer_stock(
                    tx,
                    TransferStock {
                        inventory_item_id: lot.id,
                        destination_warehouse_id: seed.backroom,
                        quantity: 8,
                        performed_by: 1,
                    },
                )
            })
            .unwrap();

        assert_eq!(transfer.source.item.quantity_left, 12);
        assert_eq!(transfer.destination.item.quantity_left, 8);
        assert_eq!(transfer.destination.item.warehouse_id, seed.backroom);
        assert_eq!(transfer.destination.item.cost_price_cents, 1000);
        assert_eq!(transfer.destination.item.received_at, lot.received_at);

        let outbound = &transfer.source.movement;
        assert_eq!((outbound.movement_type, outbound.direction), (MovementType::Transfer, Direction::Outbound));
        assert_eq!(outbound.source_inventory_id, seed.shop);
        assert_eq!(outbound.destination_inventory_id, Some(seed.backroom));
        let inbound = &transfer.destination.movement;
        assert_eq!(inbound.direction, Direction::Inbound);
        assert_eq!(inbound.source_inventory_id, seed.shop);
        assert_eq!(inbound.destination_inventory_id, Some(seed.backroom));

        // Moving stock does not change the product total
        assert_eq!(product(&db, seed.beans).quantity, 20);
        assert_reconciles(&db, lot.id);
        assert_reconciles(&db, transfer.destination.item.id);

        // Backroom stock can now be sold from the backroom
        consume(&db, seed.beans, seed.backroom, 8).unwrap();
    }

    #[test]
    fn test_transfer_rejections() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 20, 1000);

        let transfer = |destination: i64, quantity: i64| {
            db.transaction(|tx| {
                inventory::transfer_stock(
                    tx,
                    TransferStock {
                        inventory_item_id: lot.id,
                        destination_warehouse_id: destination,
                        quantity,
                        performed_by: 1,
                    },
                )
            })
        };

        assert!(matches!(transfer(seed.shop, 5), Err(LedgerError::Validation(_))));
        assert!(matches!(
            transfer(seed.backroom, 21),
            Err(LedgerError::InsufficientStock { available: 20, .. })
        ));
        assert!(matches!(transfer(999, 5), Err(LedgerError::NotFound { .. })));
        assert_eq!(count_rows(&db, "inventory_items"), 1);
    }

    #[test]
    fn test_return_to_supplier() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 20, 1000);

        let supplier_return = |quantity: i64| {
            db.transaction(|tx| {
                inventory::return_to_supplier(
                    tx,
                    SupplierReturn {
                        inventory_item_id: lot.id,
                        quantity,
                        reason: "Wrong roast".to_string(),
                        performed_by: 1,
                    },
                )
            })
        };

        let change = supplier_return(5).unwrap();
        assert_eq!(change.item.quantity_left, 15);
        assert_eq!(change.item.returned_to_supplier, 5);
        assert_eq!(change.movement.movement_type, MovementType::Returned);
        assert_eq!(change.movement.direction, Direction::Outbound);
        assert_reconciles(&db, lot.id);

        assert!(matches!(
            supplier_return(50),
            Err(LedgerError::InsufficientStock { available: 15, .. })
        ));
        assert_eq!(product(&db, seed.beans).quantity, 15);
    }

    // ===== BATCH TESTS =====

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn register(db: &Database, product_id: i64, batch_number: &str, quantity: i64, expiry: Option<NaiveDate>) -> LedgerResult<crate::models::BatchTracking> {
        db.transaction(|tx| {
            batches::register_batch(
                tx,
                NewBatch {
                    product_id,
                    batch_number: batch_number.to_string(),
                    quantity,
                    expiry_date: expiry,
                },
            )
        })
    }

    #[test]
    fn test_sales_draw_soonest_expiring_batch_first() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 100, 1000);

        let later = register(&db, seed.beans, "LOT-A", 30, Some(date(2026, 1, 10))).unwrap();
        let sooner = register(&db, seed.beans, "LOT-B", 40, Some(date(2025, 12, 1))).unwrap();
        let undated = register(&db, seed.beans, "LOT-C", 20, None).unwrap();

        sales::checkout(&db, cash_sale(seed.shop, &[(seed.beans, 50, 2500)])).unwrap();

        let listed = db.read(|conn| batches::list_batches(conn, seed.beans)).unwrap();
        let find = |id: i64| listed.iter().find(|b| b.id == id).unwrap();
        assert_eq!(find(sooner.id).quantity, 0);
        assert_eq!(find(sooner.id).status, BatchStatus::Depleted);
        assert_eq!(find(later.id).quantity, 20);
        assert_eq!(find(undated.id).quantity, 20);
    }

    #[test]
    fn test_batches_cannot_exceed_product_quantity() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 50, 1000);

        register(&db, seed.beans, "LOT-A", 40, None).unwrap();
        assert!(matches!(
            register(&db, seed.beans, "LOT-B", 11, None),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            register(&db, seed.beans, "LOT-A", 1, None),
            Err(LedgerError::Validation(_))
        ));
        register(&db, seed.beans, "LOT-B", 10, None).unwrap();
    }

    #[test]
    fn test_batches_follow_stock_after_adjustment() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 50, 1000);
        register(&db, seed.beans, "LOT-A", 30, Some(date(2026, 3, 1))).unwrap();
        register(&db, seed.beans, "LOT-B", 20, None).unwrap();

        adjust(&db, lot.id, 25).unwrap();

        let active = db
            .read(|conn| store::batches::active_total(conn, seed.beans))
            .unwrap();
        assert_eq!(active, 25);
    }

    #[test]
    fn test_expire_batches() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 50, 1000);
        let stale = register(&db, seed.beans, "OLD", 10, Some(date(2020, 1, 1))).unwrap();
        register(&db, seed.beans, "FRESH", 10, Some(date(2030, 1, 1))).unwrap();
        register(&db, seed.beans, "UNDATED", 10, None).unwrap();

        let expired = db
            .transaction(|tx| batches::expire_batches(tx, date(2024, 1, 1)))
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
        assert_eq!(expired[0].status, BatchStatus::Expired);

        // Running again finds nothing new
        let again = db
            .transaction(|tx| batches::expire_batches(tx, date(2024, 1, 1)))
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_missing_batch_data_is_not_an_error() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let response = commands::batches::list_batches(&db, seed.beans);
        assert!(response.success);
        assert_eq!(response.data, Some(Vec::new()));
        assert!(response.message.is_some());
    }

    // ===== MOVEMENT LEDGER TESTS =====

    #[test]
    fn test_movements_are_append_only() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 10, 1000);

        let update = db.read(|conn| Ok(conn.execute("UPDATE stock_movements SET quantity = 1", [])?));
        assert!(update.is_err(), "Movements must not be editable");
        let delete = db.read(|conn| Ok(conn.execute("DELETE FROM stock_movements", [])?));
        assert!(delete.is_err(), "Movements must not be deletable");
        assert_eq!(count_rows(&db, "stock_movements"), 1);
    }

    #[test]
    fn test_list_movements_paginates_and_filters() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 10, 1000);
        receive(&db, seed.beans, seed.shop, 10, 1100);
        receive(&db, seed.beans, seed.shop, 10, 1200);
        receive(&db, seed.beans, seed.backroom, 10, 1000);
        consume(&db, seed.beans, seed.shop, 1).unwrap();

        let list = |filter: MovementFilter| db.read(|conn| movements::list_movements(conn, &filter));

        let first = list(MovementFilter {
            warehouse_id: seed.shop,
            limit: Some(2),
            ..MovementFilter::default()
        })
        .unwrap();
        assert_eq!(first.total, 4);
        assert_eq!(first.pages, 2);
        assert_eq!(first.page, 1);
        assert_eq!(first.movements.len(), 2);

        let second = list(MovementFilter {
            warehouse_id: seed.shop,
            limit: Some(2),
            page: Some(2),
            ..MovementFilter::default()
        })
        .unwrap();
        assert_eq!(second.movements.len(), 2);
        assert!(second
            .movements
            .iter()
            .all(|m| first.movements.iter().all(|f| f.id != m.id)));

        let outbound = list(MovementFilter {
            warehouse_id: seed.shop,
            direction: Some(Direction::Outbound),
            ..MovementFilter::default()
        })
        .unwrap();
        assert_eq!(outbound.total, 1);

        let added = list(MovementFilter {
            warehouse_id: seed.shop,
            movement_type: Some(MovementType::Added),
            ..MovementFilter::default()
        })
        .unwrap();
        assert_eq!(added.total, 3);

        let backroom = list(MovementFilter {
            warehouse_id: seed.backroom,
            ..MovementFilter::default()
        })
        .unwrap();
        assert_eq!(backroom.total, 1);

        let future = list(MovementFilter {
            warehouse_id: seed.shop,
            from: Some(Utc::now() + Duration::days(1)),
            ..MovementFilter::default()
        })
        .unwrap();
        assert_eq!(future.total, 0);
        assert!(future.movements.is_empty());

        let inverted = list(MovementFilter {
            warehouse_id: seed.shop,
            from: Some(Utc::now()),
            to: Some(Utc::now() - Duration::days(1)),
            ..MovementFilter::default()
        });
        assert!(matches!(inverted, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_reconciliation_detects_drift() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 10, 1000);

        // Bypass the services to corrupt the snapshot
        db.read(|conn| {
            conn.execute(
                "UPDATE inventory_items SET quantity_left = 99 WHERE id = ?1",
                [lot.id],
            )?;
            Ok(())
        })
        .unwrap();

        let err = db
            .read(|conn| movements::verify_item(conn, lot.id))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Reconciliation { snapshot: 99, ledger: 10, .. }
        ));
        assert!(!err.kind().is_user_correctable());

        // Mutations on a drifted lot roll back instead of hiding the drift
        let movements_before = count_rows(&db, "stock_movements");
        assert!(matches!(
            consume(&db, seed.beans, seed.shop, 1),
            Err(LedgerError::Reconciliation { .. })
        ));
        assert_eq!(count_rows(&db, "stock_movements"), movements_before);
        assert_eq!(item(&db, lot.id).quantity_left, 99);
    }

    #[test]
    fn test_status_matches_stored_quantities() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 100, 1000);
        consume(&db, seed.beans, seed.shop, 85).unwrap();

        let beans = product(&db, seed.beans);
        assert_eq!(beans.quantity, 15);
        assert_eq!(beans.status, ProductStatus::MediumStock);
        assert_eq!(item(&db, lot.id).status, ItemStatus::InStock);

        consume(&db, seed.beans, seed.shop, 6).unwrap();
        assert_eq!(product(&db, seed.beans).status, ProductStatus::LowStock);
        assert_eq!(item(&db, lot.id).status, ItemStatus::LowStock);

        let low = db.read(products::list_low_stock).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, seed.beans);

        let valuation = db.read(products::stock_valuation).unwrap();
        assert_eq!(valuation[0].quantity, 9);
        assert_eq!(valuation[0].value_at_cost_cents, 9 * 1000);
    }

    // ===== OUT-OF-RANGE INPUT TESTS =====

    fn receive_request(db: &Database, seed: Seed, quantity: i64, cost: i64) -> LedgerResult<InventoryItem> {
        db.transaction(|tx| {
            inventory::receive_stock(
                tx,
                ReceiveStock {
                    product_id: seed.beans,
                    warehouse_id: seed.shop,
                    quantity,
                    unit_cost_cents: cost,
                    selling_price_cents: 2500,
                    supplier_id: None,
                    performed_by: 1,
                    reference_number: None,
                },
            )
        })
    }

    #[test]
    fn test_sale_totals_out_of_range_are_rejected() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 10, 1000);

        let mut huge_line = cash_sale(seed.shop, &[(seed.beans, 1, 2500)]);
        huge_line.line_items[0].quantity = 4_000_000_000;
        huge_line.line_items[0].selling_price_cents = 4_000_000_000;
        assert!(matches!(sales::checkout(&db, huge_line), Err(LedgerError::Validation(_))));

        // Each line fits on its own, the sum does not
        let mut huge_sum = cash_sale(seed.shop, &[(seed.beans, 1, 2500), (seed.beans, 1, 2500)]);
        for line in &mut huge_sum.line_items {
            line.selling_price_cents = i64::MAX / 2 + 1;
        }
        assert!(matches!(sales::checkout(&db, huge_sum), Err(LedgerError::Validation(_))));

        assert_eq!(count_rows(&db, "sales"), 0);
        assert_eq!(count_rows(&db, "stock_movements"), 1);
        assert_eq!(item(&db, lot.id).quantity_left, 10);
    }

    #[test]
    fn test_receipt_cost_out_of_range_is_rejected() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);

        let result = receive_request(&db, seed, 10_000_000_000_000, 10_000_000);
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert_eq!(count_rows(&db, "inventory_items"), 0);
        assert_eq!(count_rows(&db, "stock_movements"), 0);
        assert_eq!(product(&db, seed.beans).quantity, 0);
    }

    #[test]
    fn test_lot_counter_overflow_rolls_back() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        let lot = receive_request(&db, seed, i64::MAX, 0).unwrap();

        let topped_up = receive_request(&db, seed, 1, 0);
        assert!(matches!(topped_up, Err(LedgerError::Validation(_))));

        assert_eq!(item(&db, lot.id).quantity_left, i64::MAX);
        assert_eq!(count_rows(&db, "inventory_items"), 1);
        assert_eq!(count_rows(&db, "stock_movements"), 1);
        assert_reconciles(&db, lot.id);
    }

    #[test]
    fn test_page_out_of_range_is_rejected() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 10, 1000);

        let page = |page: i64| {
            db.read(|conn| {
                movements::list_movements(
                    conn,
                    &MovementFilter {
                        warehouse_id: seed.shop,
                        page: Some(page),
                        limit: Some(100),
                        ..MovementFilter::default()
                    },
                )
            })
        };

        assert!(matches!(page(i64::MAX), Err(LedgerError::Validation(_))));
        assert_eq!(page(1).unwrap().movements.len(), 1);
        assert!(page(2).unwrap().movements.is_empty());
    }

    #[test]
    fn test_batch_quantity_out_of_range_is_rejected() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 10, 1000);
        register(&db, seed.beans, "LOT-A", 5, None).unwrap();

        let result = register(&db, seed.beans, "LOT-B", i64::MAX, None);
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert_eq!(count_rows(&db, "batch_tracking"), 1);
    }

    // ===== CONCURRENCY TESTS =====

    #[test]
    fn test_concurrent_consumes_on_shared_handle() {
        let db = Arc::new(setup_test_db());
        let seed = seed_test_data(&db);
        let lot = receive(&db, seed.beans, seed.shop, 10, 1000);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || consume(&db, seed.beans, seed.shop, 8))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LedgerError::InsufficientStock { available: 2, .. }))));
        assert_eq!(item(&db, lot.id).quantity_left, 2);
        assert_reconciles(&db, lot.id);
    }

    #[test]
    fn test_concurrent_consumes_on_separate_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let config = LedgerConfig::default();

        let first = Database::open(&path, &config).unwrap();
        let seed = seed_test_data(&first);
        let lot = receive(&first, seed.beans, seed.shop, 10, 1000);
        let second = Database::open(&path, &config).unwrap();

        let barrier = Barrier::new(2);
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = [&first, &second]
                .into_iter()
                .map(|db| {
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        consume(db, seed.beans, seed.shop, 8)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LedgerError::InsufficientStock { .. }))));
        assert_eq!(item(&second, lot.id).quantity_left, 2);
        assert_reconciles(&first, lot.id);
    }

    // ===== COMMAND TESTS =====

    #[test]
    fn test_commands_report_user_correctable_failures() {
        let db = setup_test_db();
        let seed = seed_test_data(&db);
        receive(&db, seed.beans, seed.shop, 3, 1000);

        let response = commands::inventory::consume_stock(
            &db,
            ConsumeStock {
                product_id: seed.beans,
                warehouse_id: seed.shop,
                quantity: 500,
                performed_by: 1,
                reference_number: None,
            },
        );
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error, Some(ErrorKind::InsufficientStock));
        assert!(response.message.is_some());

        let mut request = cash_sale(seed.shop, &[(seed.beans, 1, 2500)]);
        request.payment_data.amount_paid_cents = 3_000;
        let response = commands::sales::create_sale(&db, request);
        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some("change due: 5.00"));
    }

    #[test]
    fn test_requests_deserialize_from_camel_case() {
        let request: NewSale = serde_json::from_value(serde_json::json!({
            "shopId": 1,
            "lineItems": [{ "productId": 2, "quantity": 3, "sellingPriceCents": 2500 }],
            "paymentData": { "method": "mobile_money", "amountPaidCents": 7500 },
            "salesPersonId": 4
        }))
        .unwrap();
        assert_eq!(request.line_items[0].total_cents().unwrap(), 7500);
        assert_eq!(request.payment_data.method, PaymentMethod::MobileMoney);
        assert_eq!(request.payment_data.discount_cents, 0);

        let receive: ReceiveStock = serde_json::from_value(serde_json::json!({
            "productId": 1, "warehouseId": 1, "quantity": 5,
            "unitCostCents": 100, "sellingPriceCents": 150
        }))
        .unwrap();
        assert_eq!(receive.supplier_id, None);
        assert_eq!(receive.performed_by, 0);
    }

    // ===== PROPERTY TESTS =====

    #[derive(Debug, Clone)]
    enum Op {
        Receive { quantity: i64, cost: i64 },
        Sell { quantity: i64 },
        Adjust { count: i64 },
        ReturnLast { quantity: i64 },
        ToSupplier { quantity: i64 },
        Transfer { quantity: i64 },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..50, 50i64..500).prop_map(|(quantity, cost)| Op::Receive { quantity, cost }),
            (1i64..40).prop_map(|quantity| Op::Sell { quantity }),
            (0i64..80).prop_map(|count| Op::Adjust { count }),
            (1i64..6).prop_map(|quantity| Op::ReturnLast { quantity }),
            (1i64..10).prop_map(|quantity| Op::ToSupplier { quantity }),
            (1i64..10).prop_map(|quantity| Op::Transfer { quantity }),
        ]
    }

    fn first_shop_lot(db: &Database, seed: Seed) -> LedgerResult<Option<InventoryItem>> {
        let lots = db.read(|conn| inventory::list_items_for_product(conn, seed.beans))?;
        Ok(lots.into_iter().find(|lot| lot.warehouse_id == seed.shop))
    }

    fn apply(db: &Database, seed: Seed, op: &Op, last_order: &mut Option<i64>) -> LedgerResult<()> {
        match *op {
            Op::Receive { quantity, cost } => {
                db.transaction(|tx| {
                    inventory::receive_stock(
                        tx,
                        ReceiveStock {
                            product_id: seed.beans,
                            warehouse_id: seed.shop,
                            quantity,
                            unit_cost_cents: cost,
                            selling_price_cents: 2500,
                            supplier_id: None,
                            performed_by: 1,
                            reference_number: None,
                        },
                    )
                })?;
            }
            Op::Sell { quantity } => {
                let details = sales::checkout(db, cash_sale(seed.shop, &[(seed.beans, quantity, 2500)]))?;
                *last_order = details.orders.first().map(|o| o.id);
            }
            Op::Adjust { count } => {
                if let Some(lot) = first_shop_lot(db, seed)? {
                    adjust(db, lot.id, count)?;
                }
            }
            Op::ReturnLast { quantity } => {
                if let Some(order_id) = *last_order {
                    db.transaction(|tx| returns::process_return(tx, return_request(order_id, quantity)))?;
                }
            }
            Op::ToSupplier { quantity } => {
                if let Some(lot) = first_shop_lot(db, seed)? {
                    db.transaction(|tx| {
                        inventory::return_to_supplier(
                            tx,
                            SupplierReturn {
                                inventory_item_id: lot.id,
                                quantity,
                                reason: "Recall".to_string(),
                                performed_by: 1,
                            },
                        )
                    })?;
                }
            }
            Op::Transfer { quantity } => {
                if let Some(lot) = first_shop_lot(db, seed)? {
                    db.transaction(|tx| {
                        inventory::transfer_stock(
                            tx,
                            TransferStock {
                                inventory_item_id: lot.id,
                                destination_warehouse_id: seed.backroom,
                                quantity,
                                performed_by: 1,
                            },
                        )
                    })?;
                }
            }
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_random_operations_preserve_invariants(ops in prop::collection::vec(op_strategy(), 1..25)) {
            let db = setup_test_db();
            let seed = seed_test_data(&db);
            let mut last_order = None;

            for op in &ops {
                if let Err(err) = apply(&db, seed, op, &mut last_order) {
                    prop_assert!(err.kind().is_user_correctable(), "{:?} failed unexpectedly: {}", op, err);
                }

                let lots = db.read(|conn| inventory::list_items_for_product(conn, seed.beans)).unwrap();
                let mut total = 0;
                for lot in &lots {
                    prop_assert!(lot.quantity_left >= 0);
                    prop_assert_eq!(lot.quantity_left, lot.counted_left());
                    prop_assert_eq!(lot.status, ItemStatus::derive(lot.quantity_left, lot.reorder_point));
                    prop_assert!(db.read(|conn| movements::verify_item(conn, lot.id)).is_ok());
                    total += lot.quantity_left;
                }

                let beans = product(&db, seed.beans);
                prop_assert_eq!(beans.quantity, total);
                prop_assert_eq!(beans.status, ProductStatus::derive(beans.quantity, beans.reorder_point));
                let tracked = db.read(|conn| store::batches::active_total(conn, seed.beans)).unwrap();
                prop_assert!(tracked <= beans.quantity);
            }
        }
    }
}

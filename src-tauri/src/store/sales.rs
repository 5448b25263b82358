use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::LedgerResult;
use crate::models::{Order, Payment, PaymentStatus, Receipt, Sale};

const SALE_COLUMNS: &str = "id, shop_id, sales_person_id, status, gross_amount_cents, discount_cents,
     net_amount_cents, amount_paid_cents, change_given_cents, profit_cents, payment_method,
     receipt_number, created_at";

const ORDER_COLUMNS: &str = "id, sale_id, product_id, inventory_item_id, quantity,
     selling_price_cents, cost_price_cents, payment_status";

fn sale_from_row(row: &Row<'_>) -> rusqlite::Result<Sale> {
    Ok(Sale {
        id: row.get(0)?,
        shop_id: row.get(1)?,
        sales_person_id: row.get(2)?,
        status: row.get(3)?,
        gross_amount_cents: row.get(4)?,
        discount_cents: row.get(5)?,
        net_amount_cents: row.get(6)?,
        amount_paid_cents: row.get(7)?,
        change_given_cents: row.get(8)?,
        profit_cents: row.get(9)?,
        payment_method: row.get(10)?,
        receipt_number: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        sale_id: row.get(1)?,
        product_id: row.get(2)?,
        inventory_item_id: row.get(3)?,
        quantity: row.get(4)?,
        selling_price_cents: row.get(5)?,
        cost_price_cents: row.get(6)?,
        payment_status: row.get(7)?,
    })
}

pub fn insert_sale(conn: &Connection, sale: &Sale) -> LedgerResult<Sale> {
    conn.execute(
        "INSERT INTO sales (shop_id, sales_person_id, status, gross_amount_cents, discount_cents,
                            net_amount_cents, amount_paid_cents, change_given_cents, profit_cents,
                            payment_method, receipt_number, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            sale.shop_id,
            sale.sales_person_id,
            sale.status,
            sale.gross_amount_cents,
            sale.discount_cents,
            sale.net_amount_cents,
            sale.amount_paid_cents,
            sale.change_given_cents,
            sale.profit_cents,
            sale.payment_method,
            sale.receipt_number,
            sale.created_at,
        ],
    )?;

    Ok(Sale {
        id: conn.last_insert_rowid(),
        ..sale.clone()
    })
}

pub fn insert_order(conn: &Connection, order: &Order) -> LedgerResult<Order> {
    conn.execute(
        "INSERT INTO orders (sale_id, product_id, inventory_item_id, quantity, selling_price_cents,
                             cost_price_cents, payment_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            order.sale_id,
            order.product_id,
            order.inventory_item_id,
            order.quantity,
            order.selling_price_cents,
            order.cost_price_cents,
            order.payment_status,
        ],
    )?;

    Ok(Order {
        id: conn.last_insert_rowid(),
        ..order.clone()
    })
}

pub fn insert_payment(conn: &Connection, payment: &Payment) -> LedgerResult<Payment> {
    conn.execute(
        "INSERT INTO payments (sale_id, method, amount_paid_cents, change_given_cents, reference, paid_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            payment.sale_id,
            payment.method,
            payment.amount_paid_cents,
            payment.change_given_cents,
            payment.reference,
            payment.paid_at,
        ],
    )?;

    Ok(Payment {
        id: conn.last_insert_rowid(),
        ..payment.clone()
    })
}

pub fn insert_receipt(conn: &Connection, receipt: &Receipt) -> LedgerResult<Receipt> {
    conn.execute(
        "INSERT INTO receipts (sale_id, receipt_number, total_cents, issued_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            receipt.sale_id,
            receipt.receipt_number,
            receipt.total_cents,
            receipt.issued_at,
        ],
    )?;

    Ok(Receipt {
        id: conn.last_insert_rowid(),
        ..receipt.clone()
    })
}

pub fn get_sale(conn: &Connection, id: i64) -> LedgerResult<Option<Sale>> {
    let sale = conn
        .query_row(
            &format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"),
            [id],
            sale_from_row,
        )
        .optional()?;
    Ok(sale)
}

pub fn get_order(conn: &Connection, id: i64) -> LedgerResult<Option<Order>> {
    let order = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
            [id],
            order_from_row,
        )
        .optional()?;
    Ok(order)
}

pub fn orders_for_sale(conn: &Connection, sale_id: i64) -> LedgerResult<Vec<Order>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE sale_id = ?1 ORDER BY id"
    ))?;

    let orders = stmt
        .query_map([sale_id], order_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(orders)
}

pub fn payment_for_sale(conn: &Connection, sale_id: i64) -> LedgerResult<Option<Payment>> {
    let payment = conn
        .query_row(
            "SELECT id, sale_id, method, amount_paid_cents, change_given_cents, reference, paid_at
             FROM payments WHERE sale_id = ?1",
            [sale_id],
            |row| {
                Ok(Payment {
                    id: row.get(0)?,
                    sale_id: row.get(1)?,
                    method: row.get(2)?,
                    amount_paid_cents: row.get(3)?,
                    change_given_cents: row.get(4)?,
                    reference: row.get(5)?,
                    paid_at: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(payment)
}

pub fn receipt_for_sale(conn: &Connection, sale_id: i64) -> LedgerResult<Option<Receipt>> {
    let receipt = conn
        .query_row(
            "SELECT id, sale_id, receipt_number, total_cents, issued_at
             FROM receipts WHERE sale_id = ?1",
            [sale_id],
            |row| {
                Ok(Receipt {
                    id: row.get(0)?,
                    sale_id: row.get(1)?,
                    receipt_number: row.get(2)?,
                    total_cents: row.get(3)?,
                    issued_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(receipt)
}

pub fn set_order_payment_status(
    conn: &Connection,
    order_id: i64,
    status: PaymentStatus,
) -> LedgerResult<()> {
    conn.execute(
        "UPDATE orders SET payment_status = ?1 WHERE id = ?2",
        params![status, order_id],
    )?;
    Ok(())
}

pub fn receipt_number_exists(conn: &Connection, receipt_number: &str) -> LedgerResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sales WHERE receipt_number = ?1)",
        [receipt_number],
        |row| row.get(0),
    )?;
    Ok(exists)
}

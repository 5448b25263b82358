//! Sale orchestration.
//!
//! A checkout validates the whole basket and the payment, takes the stock,
//! then writes the sale, its orders, the payment and the receipt. It runs on
//! one transaction, so a failure at any stage leaves nothing behind.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::db::Database;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Order, Payment, PaymentMethod, PaymentStatus, Receipt, Sale, SaleStatus, SaleWithDetails,
};
use crate::services::inventory::{self, ConsumeStock, Consumption};
use crate::services::{batches, products};
use crate::store;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: i64,
    pub quantity: i64,
    pub selling_price_cents: i64,
}

impl SaleLine {
    pub fn total_cents(&self) -> LedgerResult<i64> {
        self.selling_price_cents
            .checked_mul(self.quantity)
            .ok_or_else(|| LedgerError::out_of_range("line total"))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentData {
    pub method: PaymentMethod,
    pub amount_paid_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewSale {
    /// Warehouse the stock is drawn from.
    pub shop_id: i64,
    pub line_items: Vec<SaleLine>,
    pub payment_data: PaymentData,
    pub sales_person_id: i64,
}

/// How far a checkout got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Initiated,
    StockReserved,
    PaymentRecorded,
    Committed,
    Failed,
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            CheckoutStage::Initiated => "initiated",
            CheckoutStage::StockReserved => "stock_reserved",
            CheckoutStage::PaymentRecorded => "payment_recorded",
            CheckoutStage::Committed => "committed",
            CheckoutStage::Failed => "failed",
        };
        f.write_str(stage)
    }
}

/// Amounts computed from the basket before any stock moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Totals {
    gross_cents: i64,
    discount_cents: i64,
    net_cents: i64,
}

fn validate(conn: &Connection, config: &LedgerConfig, sale: &NewSale) -> LedgerResult<Totals> {
    if sale.line_items.is_empty() {
        return Err(LedgerError::validation("a sale needs at least one line item"));
    }
    store::warehouses::get(conn, sale.shop_id)?
        .ok_or_else(|| LedgerError::not_found("warehouse", sale.shop_id))?;

    for (index, line) in sale.line_items.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(LedgerError::validation(format!(
                "line {} has a non-positive quantity",
                index + 1
            )));
        }
        if line.selling_price_cents < 0 {
            return Err(LedgerError::validation(format!(
                "line {} has a negative selling price",
                index + 1
            )));
        }
        products::get_product(conn, line.product_id)?;
    }

    let payment = &sale.payment_data;
    if payment.amount_paid_cents < 0 {
        return Err(LedgerError::validation("amount paid cannot be negative"));
    }
    if payment.discount_cents < 0 {
        return Err(LedgerError::validation("discount cannot be negative"));
    }

    let mut gross_cents: i64 = 0;
    for line in &sale.line_items {
        gross_cents = gross_cents
            .checked_add(line.total_cents()?)
            .ok_or_else(|| LedgerError::out_of_range("sale total"))?;
    }
    if payment.discount_cents > gross_cents {
        return Err(LedgerError::validation("discount exceeds the sale total"));
    }
    let net_cents = gross_cents - payment.discount_cents;

    if payment.amount_paid_cents < net_cents && !config.allow_partial_payment {
        tracing::warn!(
            net_amount = net_cents,
            amount_paid = payment.amount_paid_cents,
            "underpayment rejected"
        );
        return Err(LedgerError::Underpayment {
            net_amount: net_cents,
            amount_paid: payment.amount_paid_cents,
        });
    }

    Ok(Totals {
        gross_cents,
        discount_cents: payment.discount_cents,
        net_cents,
    })
}

const RECEIPT_ATTEMPTS: usize = 5;

fn new_receipt_number(conn: &Connection) -> LedgerResult<String> {
    for _ in 0..RECEIPT_ATTEMPTS {
        let receipt_number = products::generate_code("RCP");
        if !store::sales::receipt_number_exists(conn, &receipt_number)? {
            return Ok(receipt_number);
        }
    }
    Err(LedgerError::validation("could not generate a unique receipt number"))
}

/// Record a sale on `conn`. Callers own the transaction; see [`checkout`].
pub fn create_sale(
    conn: &Connection,
    config: &LedgerConfig,
    new: NewSale,
) -> LedgerResult<SaleWithDetails> {
    let totals = validate(conn, config, &new)?;
    let receipt_number = new_receipt_number(conn)?;

    // Take stock line by line; aggregation and batch drawing run once per product.
    let mut consumed: Vec<(&SaleLine, Consumption)> = Vec::with_capacity(new.line_items.len());
    let mut per_product: BTreeMap<i64, i64> = BTreeMap::new();
    for line in &new.line_items {
        let consumption = inventory::draw_stock(
            conn,
            &ConsumeStock {
                product_id: line.product_id,
                warehouse_id: new.shop_id,
                quantity: line.quantity,
                performed_by: new.sales_person_id,
                reference_number: Some(receipt_number.clone()),
            },
        )?;
        let taken = per_product.entry(line.product_id).or_default();
        *taken = taken
            .checked_add(line.quantity)
            .ok_or_else(|| LedgerError::out_of_range("quantity"))?;
        consumed.push((line, consumption));
    }
    for (&product_id, &quantity) in &per_product {
        batches::draw_batches(conn, product_id, quantity)?;
        products::refresh_product(conn, product_id)?;
    }
    tracing::debug!(stage = %CheckoutStage::StockReserved, receipt = %receipt_number);

    let payment = &new.payment_data;
    let fully_paid = payment.amount_paid_cents >= totals.net_cents;
    let (status, order_status, change_cents) = if fully_paid {
        (
            SaleStatus::Completed,
            PaymentStatus::Paid,
            payment.amount_paid_cents - totals.net_cents,
        )
    } else {
        (SaleStatus::Pending, PaymentStatus::Unpaid, 0)
    };

    let profit_cents = consumed
        .iter()
        .flat_map(|(line, consumption)| {
            consumption.draws.iter().map(move |draw| {
                (line.selling_price_cents - draw.cost_per_unit_cents).checked_mul(draw.quantity)
            })
        })
        .try_fold(0i64, |total, margin| total.checked_add(margin?))
        .ok_or_else(|| LedgerError::out_of_range("profit"))?;

    let now = Utc::now();
    let sale = store::sales::insert_sale(
        conn,
        &Sale {
            id: 0,
            shop_id: new.shop_id,
            sales_person_id: new.sales_person_id,
            status,
            gross_amount_cents: totals.gross_cents,
            discount_cents: totals.discount_cents,
            net_amount_cents: totals.net_cents,
            amount_paid_cents: payment.amount_paid_cents,
            change_given_cents: change_cents,
            profit_cents,
            payment_method: payment.method,
            receipt_number: receipt_number.clone(),
            created_at: now,
        },
    )?;

    let mut orders = Vec::new();
    for (line, consumption) in &consumed {
        for draw in &consumption.draws {
            orders.push(store::sales::insert_order(
                conn,
                &Order {
                    id: 0,
                    sale_id: sale.id,
                    product_id: line.product_id,
                    inventory_item_id: Some(draw.item.id),
                    quantity: draw.quantity,
                    selling_price_cents: line.selling_price_cents,
                    cost_price_cents: draw.cost_per_unit_cents,
                    payment_status: order_status,
                },
            )?);
        }
    }

    let payment = store::sales::insert_payment(
        conn,
        &Payment {
            id: 0,
            sale_id: sale.id,
            method: payment.method,
            amount_paid_cents: payment.amount_paid_cents,
            change_given_cents: change_cents,
            reference: payment.reference.clone(),
            paid_at: now,
        },
    )?;
    let receipt = store::sales::insert_receipt(
        conn,
        &Receipt {
            id: 0,
            sale_id: sale.id,
            receipt_number,
            total_cents: totals.net_cents,
            issued_at: now,
        },
    )?;
    tracing::debug!(stage = %CheckoutStage::PaymentRecorded, sale_id = sale.id);

    Ok(SaleWithDetails {
        sale,
        orders,
        payment,
        receipt,
        returns: Vec::new(),
    })
}

/// Run [`create_sale`] in its own transaction and log how it ended.
#[tracing::instrument(skip_all, fields(shop_id = new.shop_id, lines = new.line_items.len()))]
pub fn checkout(db: &Database, new: NewSale) -> LedgerResult<SaleWithDetails> {
    tracing::debug!(stage = %CheckoutStage::Initiated);
    match db.transaction(|tx| create_sale(tx, db.config(), new)) {
        Ok(details) => {
            tracing::info!(
                stage = %CheckoutStage::Committed,
                sale_id = details.sale.id,
                receipt = %details.receipt.receipt_number,
                net_amount = details.sale.net_amount_cents,
                "sale committed"
            );
            Ok(details)
        }
        Err(err) => {
            if err.kind().is_user_correctable() {
                tracing::warn!(stage = %CheckoutStage::Failed, error = %err, "sale rejected");
            } else {
                tracing::error!(stage = %CheckoutStage::Failed, error = %err, "sale failed");
            }
            Err(err)
        }
    }
}

/// A sale with its orders, payment, receipt and any returns.
pub fn get_sale(conn: &Connection, sale_id: i64) -> LedgerResult<SaleWithDetails> {
    let sale = store::sales::get_sale(conn, sale_id)?
        .ok_or_else(|| LedgerError::not_found("sale", sale_id))?;
    let orders = store::sales::orders_for_sale(conn, sale_id)?;
    let payment = store::sales::payment_for_sale(conn, sale_id)?
        .ok_or_else(|| LedgerError::not_found("payment", sale_id))?;
    let receipt = store::sales::receipt_for_sale(conn, sale_id)?
        .ok_or_else(|| LedgerError::not_found("receipt", sale_id))?;
    let returns = store::returns::for_sale(conn, sale_id)?;

    Ok(SaleWithDetails {
        sale,
        orders,
        payment,
        receipt,
        returns,
    })
}

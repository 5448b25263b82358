use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stores an enum as its snake_case name in a TEXT column.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    HighStock,
    MediumStock,
    LowStock,
    OutOfStock,
}

text_enum!(ProductStatus {
    HighStock => "high_stock",
    MediumStock => "medium_stock",
    LowStock => "low_stock",
    OutOfStock => "out_of_stock",
});

impl ProductStatus {
    /// Classify an aggregate quantity against its reorder point.
    pub fn derive(quantity: i64, reorder_point: i64) -> Self {
        if quantity <= 0 {
            ProductStatus::OutOfStock
        } else if quantity <= reorder_point {
            ProductStatus::LowStock
        } else if quantity <= reorder_point.saturating_mul(2) {
            ProductStatus::MediumStock
        } else {
            ProductStatus::HighStock
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InStock,
    LowStock,
    OutOfStock,
}

text_enum!(ItemStatus {
    InStock => "in_stock",
    LowStock => "low_stock",
    OutOfStock => "out_of_stock",
});

impl ItemStatus {
    pub fn derive(quantity_left: i64, reorder_point: i64) -> Self {
        if quantity_left <= 0 {
            ItemStatus::OutOfStock
        } else if quantity_left <= reorder_point {
            ItemStatus::LowStock
        } else {
            ItemStatus::InStock
        }
    }
}

/// Which lot's cost is consumed first when stock is sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    Fifo,
    Lifo,
    AverageCost,
}

text_enum!(ValuationMethod {
    Fifo => "fifo",
    Lifo => "lifo",
    AverageCost => "average_cost",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Added,
    Sold,
    Returned,
    Adjustment,
    Transfer,
}

text_enum!(MovementType {
    Added => "added",
    Sold => "sold",
    Returned => "returned",
    Adjustment => "adjustment",
    Transfer => "transfer",
});

impl MovementType {
    /// Receipts only ever bring stock in and sales only ever take it out.
    pub fn allows(self, direction: Direction) -> bool {
        match self {
            MovementType::Added => direction == Direction::Inbound,
            MovementType::Sold => direction == Direction::Outbound,
            MovementType::Returned | MovementType::Adjustment | MovementType::Transfer => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

text_enum!(Direction {
    Inbound => "inbound",
    Outbound => "outbound",
});

impl Direction {
    pub fn sign(self) -> i64 {
        match self {
            Direction::Inbound => 1,
            Direction::Outbound => -1,
        }
    }

    /// Direction of a stock change of `delta` units; `None` for no change.
    pub fn of_delta(delta: i64) -> Option<Self> {
        match delta.signum() {
            1 => Some(Direction::Inbound),
            -1 => Some(Direction::Outbound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementStatus {
    Pending,
    Completed,
    Cancelled,
}

text_enum!(MovementStatus {
    Pending => "pending",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Expired,
    Depleted,
}

text_enum!(BatchStatus {
    Active => "active",
    Expired => "expired",
    Depleted => "depleted",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    Completed,
    Cancelled,
}

text_enum!(SaleStatus {
    Pending => "pending",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

text_enum!(PaymentStatus {
    Unpaid => "unpaid",
    Paid => "paid",
    Refunded => "refunded",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    BankTransfer,
    Credit,
}

text_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    MobileMoney => "mobile_money",
    BankTransfer => "bank_transfer",
    Credit => "credit",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

text_enum!(ReturnStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Completed => "completed",
});

/// A stock location ("inventory"). Shops are warehouses that sell.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Warehouse {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub selling_price_cents: i64,
    pub purchase_price_cents: i64,
    /// Sum of `quantity_left` over the product's inventory items.
    pub quantity: i64,
    pub reorder_point: i64,
    pub status: ProductStatus,
    pub valuation_method: ValuationMethod,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub selling_price_cents: i64,
    pub purchase_price_cents: i64,
    pub reorder_point: Option<i64>,
    pub valuation_method: Option<ValuationMethod>,
}

/// One lot of a product held at one warehouse.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InventoryItem {
    pub id: i64,
    pub product_id: i64,
    pub warehouse_id: i64,
    pub supplier_id: Option<i64>,
    pub quantity_supplied: i64,
    pub quantity_sold: i64,
    pub returned_to_shop: i64,
    pub returned_to_supplier: i64,
    pub quantity_left: i64,
    pub cost_price_cents: i64,
    pub selling_price_cents: i64,
    pub reorder_point: i64,
    pub status: ItemStatus,
    pub received_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// `quantity_left` as implied by the lot's counters.
    pub fn counted_left(&self) -> i64 {
        self.quantity_supplied - self.quantity_sold - self.returned_to_supplier
            + self.returned_to_shop
    }

    /// Re-derive `status` from the stored quantity.
    pub fn refresh_status(&mut self) {
        self.status = ItemStatus::derive(self.quantity_left, self.reorder_point);
    }
}

/// Immutable ledger row.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StockMovement {
    pub id: i64,
    pub inventory_item_id: i64,
    pub product_id: i64,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub direction: Direction,
    pub source_inventory_id: i64,
    pub destination_inventory_id: Option<i64>,
    pub cost_per_unit_cents: i64,
    pub total_cost_cents: i64,
    pub performed_by: i64,
    pub status: MovementStatus,
    pub reference_number: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn signed_quantity(&self) -> i64 {
        self.direction.sign() * self.quantity
    }
}

/// Input to the movement recorder.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub inventory_item_id: i64,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub direction: Direction,
    pub cost_per_unit_cents: i64,
    pub performed_by: i64,
    /// Other end of a transfer.
    pub transfer_warehouse_id: Option<i64>,
    pub reference_number: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BatchTracking {
    pub id: i64,
    pub product_id: i64,
    pub batch_number: String,
    pub quantity: i64,
    pub expiry_date: Option<NaiveDate>,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Sale {
    pub id: i64,
    pub shop_id: i64,
    pub sales_person_id: i64,
    pub status: SaleStatus,
    pub gross_amount_cents: i64,
    pub discount_cents: i64,
    pub net_amount_cents: i64,
    pub amount_paid_cents: i64,
    pub change_given_cents: i64,
    pub profit_cents: i64,
    pub payment_method: PaymentMethod,
    pub receipt_number: String,
    pub created_at: DateTime<Utc>,
}

/// Sale line item, one per lot drawn.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub inventory_item_id: Option<i64>,
    pub quantity: i64,
    pub selling_price_cents: i64,
    pub cost_price_cents: i64,
    pub payment_status: PaymentStatus,
}

impl Order {
    pub fn line_total_cents(&self) -> i64 {
        self.selling_price_cents * self.quantity
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub sale_id: i64,
    pub method: PaymentMethod,
    pub amount_paid_cents: i64,
    pub change_given_cents: i64,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Receipt {
    pub id: i64,
    pub sale_id: i64,
    pub receipt_number: String,
    pub total_cents: i64,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SaleWithDetails {
    pub sale: Sale,
    pub orders: Vec<Order>,
    pub payment: Payment,
    pub receipt: Receipt,
    pub returns: Vec<Return>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Return {
    pub id: i64,
    pub order_id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub inventory_item_id: Option<i64>,
    pub quantity: i64,
    pub amount_cents: i64,
    pub reason: String,
    pub status: ReturnStatus,
    pub performed_by: i64,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Filters for listing movements of one warehouse.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MovementFilter {
    pub warehouse_id: i64,
    pub inventory_item_id: Option<i64>,
    pub movement_type: Option<MovementType>,
    pub direction: Option<Direction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MovementPage {
    pub movements: Vec<StockMovement>,
    pub total: i64,
    pub pages: i64,
    pub page: i64,
}

/// Dashboard rollup row.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProductValuation {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub status: ProductStatus,
    pub value_at_cost_cents: i64,
}

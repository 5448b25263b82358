use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::config::LedgerConfig;
use crate::error::LedgerResult;

/// The embedded ledger store.
///
/// One process owns one `Database`; every mutating operation runs inside
/// [`Database::transaction`], which takes SQLite's write lock up front so two
/// writers (threads or processes) never interleave.
pub struct Database {
    conn: Mutex<Connection>,
    config: LedgerConfig,
}

impl Database {
    pub fn open(path: impl AsRef<Path>, config: &LedgerConfig) -> LedgerResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        tracing::info!(path = %path.display(), "opened ledger database");
        Self::with_connection(conn, config)
    }

    /// Fresh private database, used by tests and throwaway sessions.
    pub fn open_in_memory(config: &LedgerConfig) -> LedgerResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    fn with_connection(conn: Connection, config: &LedgerConfig) -> LedgerResult<Self> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Database {
            conn: Mutex::new(conn),
            config: config.clone(),
        };
        db.initialize()?;
        Ok(db)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction drops the `Transaction`, which rolls back,
        // so the connection is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back on `Err`. A failed commit is
    /// reported as [`crate::LedgerError::Transaction`] and nothing is applied.
    pub fn transaction<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> LedgerResult<T>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Read-only access outside a transaction; sees the last committed write.
    pub fn read<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Connection) -> LedgerResult<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    pub fn initialize(&self) -> LedgerResult<()> {
        let conn = self.lock();

        conn.execute_batch(
            "
            -- Stock locations (shops and warehouses)
            CREATE TABLE IF NOT EXISTS warehouses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            -- Catalog with denormalized stock totals
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                sku TEXT NOT NULL UNIQUE,
                selling_price_cents INTEGER NOT NULL CHECK (selling_price_cents >= 0),
                purchase_price_cents INTEGER NOT NULL CHECK (purchase_price_cents >= 0),
                quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
                reorder_point INTEGER NOT NULL DEFAULT 10,
                status TEXT NOT NULL DEFAULT 'out_of_stock',
                created_at TEXT NOT NULL
            );

            -- Stock lots
            CREATE TABLE IF NOT EXISTS inventory_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id INTEGER NOT NULL,
                warehouse_id INTEGER NOT NULL,
                supplier_id INTEGER,
                quantity_supplied INTEGER NOT NULL DEFAULT 0,
                quantity_sold INTEGER NOT NULL DEFAULT 0,
                returned_to_shop INTEGER NOT NULL DEFAULT 0,
                returned_to_supplier INTEGER NOT NULL DEFAULT 0,
                quantity_left INTEGER NOT NULL DEFAULT 0 CHECK (quantity_left >= 0),
                cost_price_cents INTEGER NOT NULL CHECK (cost_price_cents >= 0),
                selling_price_cents INTEGER NOT NULL CHECK (selling_price_cents >= 0),
                reorder_point INTEGER NOT NULL DEFAULT 10,
                status TEXT NOT NULL DEFAULT 'out_of_stock',
                received_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (product_id) REFERENCES products(id),
                FOREIGN KEY (warehouse_id) REFERENCES warehouses(id)
            );
            CREATE INDEX IF NOT EXISTS idx_inventory_items_product
                ON inventory_items(product_id, warehouse_id);

            -- Append-only movement ledger
            CREATE TABLE IF NOT EXISTS stock_movements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                inventory_item_id INTEGER NOT NULL,
                product_id INTEGER NOT NULL,
                movement_type TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                direction TEXT NOT NULL,
                source_inventory_id INTEGER NOT NULL,
                destination_inventory_id INTEGER,
                cost_per_unit_cents INTEGER NOT NULL,
                total_cost_cents INTEGER NOT NULL,
                performed_by INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'completed',
                reference_number TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (inventory_item_id) REFERENCES inventory_items(id),
                FOREIGN KEY (product_id) REFERENCES products(id),
                FOREIGN KEY (source_inventory_id) REFERENCES warehouses(id),
                FOREIGN KEY (destination_inventory_id) REFERENCES warehouses(id)
            );
            CREATE INDEX IF NOT EXISTS idx_stock_movements_item
                ON stock_movements(inventory_item_id);
            CREATE INDEX IF NOT EXISTS idx_stock_movements_warehouse
                ON stock_movements(source_inventory_id, created_at);

            CREATE TRIGGER IF NOT EXISTS stock_movements_no_update
                BEFORE UPDATE ON stock_movements
                BEGIN SELECT RAISE(ABORT, 'stock movements are append-only'); END;
            CREATE TRIGGER IF NOT EXISTS stock_movements_no_delete
                BEFORE DELETE ON stock_movements
                BEGIN SELECT RAISE(ABORT, 'stock movements are append-only'); END;

            -- Per-batch quantities and expiry
            CREATE TABLE IF NOT EXISTS batch_tracking (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id INTEGER NOT NULL,
                batch_number TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity >= 0),
                expiry_date TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                UNIQUE (product_id, batch_number),
                FOREIGN KEY (product_id) REFERENCES products(id)
            );

            -- Checkouts
            CREATE TABLE IF NOT EXISTS sales (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shop_id INTEGER NOT NULL,
                sales_person_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                gross_amount_cents INTEGER NOT NULL,
                discount_cents INTEGER NOT NULL DEFAULT 0,
                net_amount_cents INTEGER NOT NULL,
                amount_paid_cents INTEGER NOT NULL,
                change_given_cents INTEGER NOT NULL DEFAULT 0,
                profit_cents INTEGER NOT NULL,
                payment_method TEXT NOT NULL,
                receipt_number TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                FOREIGN KEY (shop_id) REFERENCES warehouses(id)
            );

            -- Sale lines, one per lot drawn
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sale_id INTEGER NOT NULL,
                product_id INTEGER NOT NULL,
                inventory_item_id INTEGER,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                selling_price_cents INTEGER NOT NULL,
                cost_price_cents INTEGER NOT NULL,
                payment_status TEXT NOT NULL DEFAULT 'unpaid',
                FOREIGN KEY (sale_id) REFERENCES sales(id),
                FOREIGN KEY (product_id) REFERENCES products(id),
                FOREIGN KEY (inventory_item_id) REFERENCES inventory_items(id)
            );

            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sale_id INTEGER NOT NULL UNIQUE,
                method TEXT NOT NULL,
                amount_paid_cents INTEGER NOT NULL,
                change_given_cents INTEGER NOT NULL,
                reference TEXT,
                paid_at TEXT NOT NULL,
                FOREIGN KEY (sale_id) REFERENCES sales(id)
            );

            CREATE TABLE IF NOT EXISTS receipts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sale_id INTEGER NOT NULL UNIQUE,
                receipt_number TEXT NOT NULL UNIQUE,
                total_cents INTEGER NOT NULL,
                issued_at TEXT NOT NULL,
                FOREIGN KEY (sale_id) REFERENCES sales(id)
            );

            CREATE TABLE IF NOT EXISTS returns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                sale_id INTEGER NOT NULL,
                product_id INTEGER NOT NULL,
                inventory_item_id INTEGER,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                amount_cents INTEGER NOT NULL,
                reason TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                performed_by INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                FOREIGN KEY (order_id) REFERENCES orders(id),
                FOREIGN KEY (sale_id) REFERENCES sales(id)
            );
            ",
        )?;

        // Columns added after the first release
        Self::migrate_conn(&conn)?;

        Ok(())
    }

    fn migrate_conn(conn: &Connection) -> LedgerResult<()> {
        ensure_column(
            conn,
            "products",
            "valuation_method",
            "TEXT NOT NULL DEFAULT 'fifo'",
        )?;
        ensure_column(conn, "stock_movements", "reason", "TEXT")?;
        Ok(())
    }
}

fn ensure_column(conn: &Connection, table: &str, column: &str, definition: &str) -> LedgerResult<()> {
    let columns: Vec<String> = conn
        .prepare(&format!("PRAGMA table_info({table})"))?
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    if !columns.iter().any(|c| c == column) {
        tracing::info!(table, column, "adding missing column");
        conn.execute(
            &format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"),
            [],
        )?;
    }
    Ok(())
}

#[cfg(feature = "desktop")]
mod app {
    use tauri::{AppHandle, Manager};

    use super::Database;

    pub trait DatabaseExt {
        fn db(&self) -> &Database;
    }

    impl DatabaseExt for AppHandle {
        fn db(&self) -> &Database {
            self.state::<Database>().inner()
        }
    }
}

#[cfg(feature = "desktop")]
pub use app::DatabaseExt;

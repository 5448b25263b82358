//! Row access for every ledger table.
//!
//! Functions here take `&Connection` so callers can pass either a plain
//! connection (reads) or a `Transaction` (writes). They do no validation and
//! no business rules; that lives in `services`.

pub mod batches;
pub mod inventory;
pub mod movements;
pub mod products;
pub mod returns;
pub mod sales;
pub mod warehouses;

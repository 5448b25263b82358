//! Business operations. Each takes the connection it runs on; mutating
//! operations expect to be called inside [`crate::Database::transaction`].

pub mod batches;
pub mod inventory;
pub mod movements;
pub mod products;
pub mod returns;
pub mod sales;
pub mod valuation;

//! Inventory stock ledger and atomic sale processing for a point-of-sale
//! back office.
//!
//! Every stock change is an append-only movement tied to one inventory lot,
//! and every multi-entity operation runs inside a single SQLite transaction.

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
mod store;

#[cfg(feature = "desktop")]
mod desktop;

#[cfg(test)]
mod tests;

pub use config::LedgerConfig;
pub use db::Database;
pub use error::{ErrorKind, LedgerError, LedgerResult};

#[cfg(feature = "desktop")]
pub use desktop::run;

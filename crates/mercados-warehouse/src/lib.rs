//! # Mercados Warehouse
//!
//! DuckDB sink for the mercados market-data job, built around a safe
//! incremental loader.
//!
//! ## Overview
//!
//! A run opens one [`ConnectionHandle`] with [`connect`], writes each table
//! through [`loader::write`], checks the result with [`audit::audit`] and
//! finally closes the handle.
//!
//! - **Connection manager**: bounded retry with a fixed pause, a recycling
//!   pool that pings connections before handing them out, and idempotent
//!   schema bootstrap.
//! - **Existing-key index**: one `SELECT DISTINCT` over a table's key
//!   columns; failures degrade to "fresh table".
//! - **Delta filter**: hash-set difference that keeps input order.
//! - **Safe table writer**: one transaction per table, chunked inserts,
//!   clean no-ops for empty input or an empty delta.
//! - **Duplicate auditor**: advisory `(ticker, date)` uniqueness check.
//!
//! The store declares no uniqueness constraints; the loader is the only
//! guarantor that a natural key appears once per table.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mercados_warehouse::{audit, connect, loader, tables, WarehouseConfig};
//! use mercados_warehouse::records::DividendRecord;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = connect(WarehouseConfig::from_env())?;
//!
//!     let rows: Vec<DividendRecord> = Vec::new();
//!     let outcome = loader::write(&handle, &tables::DIVIDENDOS, &rows)?;
//!     assert!(outcome.is_noop());
//!
//!     let report = audit::audit(&handle, &tables::DATE_KEYED_TABLES);
//!     println!("duplicate groups: {}", report.violation_count());
//!
//!     handle.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Natural key |
//! |-------|-------------|
//! | `activos` | none (snapshot) |
//! | `mercado_diario` | `ticker, date` |
//! | `rendimiento_financiero` | none (snapshot) |
//! | `estados_financieros` | none (snapshot) |
//! | `dividendos` | `ticker, Date` |
//! | `splits` | `ticker, Date` |
//! | `recomendaciones` | `ticker, Date` |
//! | `consenso_analistas` | none (snapshot) |

pub mod audit;
pub mod config;
pub mod duckdb;
mod error;
pub mod inventory;
pub mod loader;
pub mod migrations;
pub mod records;
pub mod retry;
pub mod tables;

pub use audit::{AuditFinding, AuditReport};
pub use config::{WarehouseConfig, DEFAULT_SCHEMA};
pub use duckdb::{connect, ConnectionHandle, DuckDbConnectionManager, PooledConnection};
pub use error::WarehouseError;
pub use inventory::{inventory, Inventory};
pub use loader::WriteOutcome;
pub use tables::{KeyTuple, TableRow, TableSpec};

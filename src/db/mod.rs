//! SQLite persistence.
//!
//! - Database initialization, pragmas and the embedded schema
//! - [`Repository`], which implements the ledger, settlement and audit stores

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;

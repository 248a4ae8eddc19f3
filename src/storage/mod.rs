//! Relational LedgerStorage backends built on sqlx.
//!
//! Both backends express the recalculation as one correlated-subquery
//! `UPDATE`, so the store applies it atomically and in a single round trip.

pub mod mysql;
pub mod sqlite;

pub use mysql::MySqlStorage;
pub use sqlite::SqliteStorage;

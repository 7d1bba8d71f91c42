//! Trade journal stores
//!
//! Persistent (SQLite through sqlx's `Any` driver) and in-memory
//! implementations of [`analysis_core::TradeHistory`]. The closed-trade table
//! is the training set for the win-probability model and the activity feed
//! for the behavioural trap rules.

pub mod memory;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use memory::InMemoryTradeJournal;
pub use sqlite::SqliteTradeJournal;

//! Repository tests running against in-memory SQLite with real migrations.

mod cost_records;
pub mod harness;

//! Record store layer.
//!
//! # Responsibility
//! - Define the storage contract the command executor depends on.
//! - Isolate SQLite query and transaction details from dispatch logic.
//!
//! # Invariants
//! - Storage errors are always propagated, never swallowed here.

pub mod record_store;

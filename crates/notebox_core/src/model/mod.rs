//! Domain model for persisted notes.
//!
//! # Invariants
//! - Every stored record is identified by a store-assigned `RecordId`.
//! - Records not yet created carry no id.

pub mod record;

//! Utility functions shared across the order status crates.

pub mod formatting;

pub use formatting::truncate_id;

/// Generates a fresh identifier for records, catalog entries and history entries.
pub fn new_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

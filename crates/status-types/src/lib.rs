//! Common types module for the order status system.
//!
//! This module defines the core data types shared by the storage, identity,
//! configuration and engine crates, so that every component agrees on the
//! shape of catalog entries, status records and the actors that change them.

/// Actor identities and roles resolved by the identity collaborator.
pub mod actor;
/// Status catalog entries and references into the catalog.
pub mod catalog;
/// Bearer credentials handed to the identity collaborator.
pub mod credential;
/// Order status records, history entries and record filters.
pub mod record;
/// Base trait for self-registering backend implementations.
pub mod registry;
/// Built-in semantics attached to specific status names.
pub mod rules;
/// Storage namespaces for persisted documents.
pub mod storage;
/// Utility functions for formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use actor::*;
pub use catalog::*;
pub use credential::Credential;
pub use record::*;
pub use registry::ImplementationRegistry;
pub use rules::*;
pub use storage::*;
pub use utils::{new_id, truncate_id};
pub use validation::*;

//! Status catalog types.
//!
//! The catalog is the reference list of valid status names. Records store
//! both the catalog id and a denormalized copy of the name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One valid status in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCatalogEntry {
	/// Stable unique identifier.
	pub id: String,
	/// Unique human-readable name, e.g. "Pending".
	pub name: String,
	/// Zero-based insertion ordinal; listing order of the catalog.
	pub position: u32,
	pub created_at: DateTime<Utc>,
}

/// A reference to a catalog entry, either by id or by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "lowercase")]
pub enum StatusRef {
	Id(String),
	Name(String),
}

impl StatusRef {
	pub fn id(id: impl Into<String>) -> Self {
		StatusRef::Id(id.into())
	}

	pub fn name(name: impl Into<String>) -> Self {
		StatusRef::Name(name.into())
	}

	/// Interprets free-form input: catalog ids are UUIDs, anything else is a name.
	pub fn from_input(input: &str) -> Self {
		let input = input.trim();
		match uuid::Uuid::parse_str(input) {
			Ok(_) => StatusRef::Id(input.to_string()),
			Err(_) => StatusRef::Name(input.to_string()),
		}
	}
}

impl From<&StatusCatalogEntry> for StatusRef {
	fn from(entry: &StatusCatalogEntry) -> Self {
		StatusRef::Id(entry.id.clone())
	}
}

impl fmt::Display for StatusRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StatusRef::Id(id) => write!(f, "id '{}'", id),
			StatusRef::Name(name) => write!(f, "'{}'", name),
		}
	}
}

//! Storage-related types for the order status system.

use std::str::FromStr;

/// Storage namespaces for the persisted documents.
///
/// Primary documents are keyed by their natural unique key (order id,
/// status name) so that uniqueness is enforced by create-if-absent; the
/// `*ById` namespaces are secondary indexes from the stable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order status records keyed by order id.
	Records,
	/// Record id to order id.
	RecordsById,
	/// Catalog entries keyed by status name.
	Catalog,
	/// Catalog id to status name.
	CatalogById,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Records => "records",
			StorageKey::RecordsById => "records_by_id",
			StorageKey::Catalog => "catalog",
			StorageKey::CatalogById => "catalog_by_id",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Records,
			Self::RecordsById,
			Self::Catalog,
			Self::CatalogById,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"records" => Ok(Self::Records),
			"records_by_id" => Ok(Self::RecordsById),
			"catalog" => Ok(Self::Catalog),
			"catalog_by_id" => Ok(Self::CatalogById),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

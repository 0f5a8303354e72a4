//! Status catalog.
//!
//! Entries are stored under their name, which makes name uniqueness a
//! create-if-absent on the storage layer. A second namespace maps catalog
//! ids back to names so references by id resolve without a scan.

use crate::EngineError;
use async_trait::async_trait;
use chrono::Utc;
use status_storage::{StorageError, StorageService};
use status_types::{new_id, StatusCatalogEntry, StatusRef, StorageKey};
use std::sync::Arc;

/// Read contract and administrative operations of the status catalog.
#[async_trait]
pub trait StatusCatalog: Send + Sync {
	/// Resolves a catalog entry by id; `NotFound` if absent.
	async fn resolve_by_id(&self, id: &str) -> Result<StatusCatalogEntry, EngineError>;

	/// Resolves a catalog entry by name; `NotFound` if absent.
	async fn resolve_by_name(&self, name: &str) -> Result<StatusCatalogEntry, EngineError>;

	async fn exists_by_id(&self, id: &str) -> Result<bool, EngineError>;

	async fn exists_by_name(&self, name: &str) -> Result<bool, EngineError>;

	/// Inserts `defaults` in order if the catalog is empty, returning how many
	/// entries were added. A no-op on a populated catalog.
	async fn seed_defaults(&self, defaults: &[String]) -> Result<usize, EngineError>;

	/// Adds a status; `Conflict` if the name already exists.
	async fn add(&self, name: &str) -> Result<StatusCatalogEntry, EngineError>;

	/// All entries in catalog order.
	async fn list(&self) -> Result<Vec<StatusCatalogEntry>, EngineError>;

	async fn resolve(&self, status: &StatusRef) -> Result<StatusCatalogEntry, EngineError> {
		match status {
			StatusRef::Id(id) => self.resolve_by_id(id).await,
			StatusRef::Name(name) => self.resolve_by_name(name).await,
		}
	}

	async fn exists(&self, status: &StatusRef) -> Result<bool, EngineError> {
		match status {
			StatusRef::Id(id) => self.exists_by_id(id).await,
			StatusRef::Name(name) => self.exists_by_name(name).await,
		}
	}
}

/// Catalog persisted through the storage service.
pub struct StoredCatalog {
	storage: Arc<StorageService>,
}

impl StoredCatalog {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	async fn insert(&self, name: &str, position: u32) -> Result<StatusCatalogEntry, EngineError> {
		let entry = StatusCatalogEntry {
			id: new_id(),
			name: name.to_string(),
			position,
			created_at: Utc::now(),
		};

		match self
			.storage
			.create(StorageKey::Catalog.as_str(), name, &entry)
			.await
		{
			Ok(()) => {},
			Err(StorageError::Conflict(_)) => {
				return Err(EngineError::Conflict(format!(
					"status '{}' already exists",
					name
				)))
			},
			Err(e) => return Err(e.into()),
		}

		self.storage
			.store(StorageKey::CatalogById.as_str(), &entry.id, &entry.name)
			.await?;
		Ok(entry)
	}

	/// Finds an entry by id by scanning the catalog and restores its index.
	///
	/// Only reached when the id index is missing, which happens when a
	/// writer stopped between storing an entry and indexing it.
	async fn find_unindexed(&self, id: &str) -> Result<StatusCatalogEntry, EngineError> {
		let entries: Vec<StatusCatalogEntry> = self
			.storage
			.retrieve_all(StorageKey::Catalog.as_str())
			.await?;
		let entry = entries
			.into_iter()
			.find(|entry| entry.id == id)
			.ok_or_else(|| EngineError::NotFound(format!("status id '{}'", id)))?;

		tracing::debug!(status = %entry.name, "Restoring catalog id index");
		self.storage
			.store(StorageKey::CatalogById.as_str(), &entry.id, &entry.name)
			.await?;
		Ok(entry)
	}
}

#[async_trait]
impl StatusCatalog for StoredCatalog {
	async fn resolve_by_id(&self, id: &str) -> Result<StatusCatalogEntry, EngineError> {
		let name: String = match self
			.storage
			.retrieve(StorageKey::CatalogById.as_str(), id)
			.await
		{
			Ok(name) => name,
			Err(StorageError::NotFound) => return self.find_unindexed(id).await,
			Err(e) => return Err(e.into()),
		};

		match self.resolve_by_name(&name).await {
			Ok(entry) if entry.id == id => Ok(entry),
			Ok(_) | Err(EngineError::NotFound(_)) => {
				Err(EngineError::NotFound(format!("status id '{}'", id)))
			},
			Err(e) => Err(e),
		}
	}

	async fn resolve_by_name(&self, name: &str) -> Result<StatusCatalogEntry, EngineError> {
		match self
			.storage
			.retrieve(StorageKey::Catalog.as_str(), name)
			.await
		{
			Ok(entry) => Ok(entry),
			Err(StorageError::NotFound) => Err(EngineError::NotFound(format!("status '{}'", name))),
			Err(e) => Err(e.into()),
		}
	}

	async fn exists_by_id(&self, id: &str) -> Result<bool, EngineError> {
		match self.resolve_by_id(id).await {
			Ok(_) => Ok(true),
			Err(EngineError::NotFound(_)) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn exists_by_name(&self, name: &str) -> Result<bool, EngineError> {
		Ok(self
			.storage
			.exists(StorageKey::Catalog.as_str(), name)
			.await?)
	}

	async fn seed_defaults(&self, defaults: &[String]) -> Result<usize, EngineError> {
		let existing: Vec<StatusCatalogEntry> = self.list().await?;
		if !existing.is_empty() {
			tracing::debug!(entries = existing.len(), "Catalog already populated, not seeding");
			return Ok(0);
		}

		let mut inserted = 0;
		for (position, name) in defaults.iter().enumerate() {
			match self.insert(name, position as u32).await {
				Ok(_) => inserted += 1,
				// A concurrent seeder got there first
				Err(EngineError::Conflict(_)) => {},
				Err(e) => return Err(e),
			}
		}

		tracing::info!(inserted, "Seeded status catalog");
		Ok(inserted)
	}

	async fn add(&self, name: &str) -> Result<StatusCatalogEntry, EngineError> {
		let name = name.trim();
		if name.is_empty() {
			return Err(EngineError::InvalidStatus(
				"status name cannot be empty".into(),
			));
		}

		let position = self.list().await?.len() as u32;
		let entry = self.insert(name, position).await?;
		tracing::info!(status = %entry.name, position, "Added catalog status");
		Ok(entry)
	}

	async fn list(&self) -> Result<Vec<StatusCatalogEntry>, EngineError> {
		let mut entries: Vec<StatusCatalogEntry> = self
			.storage
			.retrieve_all(StorageKey::Catalog.as_str())
			.await?;
		entries.sort_by(|a, b| {
			a.position
				.cmp(&b.position)
				.then(a.created_at.cmp(&b.created_at))
				.then_with(|| a.name.cmp(&b.name))
		});
		Ok(entries)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use status_storage::implementations::memory::MemoryStorage;
	use status_types::DEFAULT_STATUSES;

	fn catalog() -> StoredCatalog {
		StoredCatalog::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn defaults() -> Vec<String> {
		DEFAULT_STATUSES.iter().map(|s| s.to_string()).collect()
	}

	#[tokio::test]
	async fn test_seed_is_idempotent() {
		let catalog = catalog();
		assert_eq!(catalog.seed_defaults(&defaults()).await.unwrap(), 6);
		assert_eq!(catalog.seed_defaults(&defaults()).await.unwrap(), 0);

		let names: Vec<String> = catalog
			.list()
			.await
			.unwrap()
			.into_iter()
			.map(|e| e.name)
			.collect();
		assert_eq!(names, defaults());
	}

	#[tokio::test]
	async fn test_seed_skips_populated_catalog() {
		let catalog = catalog();
		catalog.add("Custom").await.unwrap();
		assert_eq!(catalog.seed_defaults(&defaults()).await.unwrap(), 0);
		assert_eq!(catalog.list().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_concurrent_seeding_never_duplicates() {
		let catalog = Arc::new(catalog());
		let tasks: Vec<_> = (0..8)
			.map(|_| {
				let catalog = catalog.clone();
				tokio::spawn(async move { catalog.seed_defaults(&defaults()).await })
			})
			.collect();
		for result in futures::future::join_all(tasks).await {
			result.unwrap().unwrap();
		}

		let entries = catalog.list().await.unwrap();
		assert_eq!(entries.len(), DEFAULT_STATUSES.len());
		for entry in &entries {
			assert_eq!(catalog.resolve_by_id(&entry.id).await.unwrap(), *entry);
		}
	}

	#[tokio::test]
	async fn test_resolve_by_id_and_name() {
		let catalog = catalog();
		let added = catalog.add("Returned").await.unwrap();

		let by_name = catalog.resolve(&StatusRef::name("Returned")).await.unwrap();
		let by_id = catalog.resolve(&StatusRef::id(&added.id)).await.unwrap();
		assert_eq!(by_name, added);
		assert_eq!(by_id, added);

		assert!(catalog.exists(&StatusRef::name("Returned")).await.unwrap());
		assert!(catalog.exists(&StatusRef::id(&added.id)).await.unwrap());
		assert!(!catalog.exists(&StatusRef::name("Lost")).await.unwrap());
		assert!(!catalog.exists_by_id(&new_id()).await.unwrap());

		assert!(matches!(
			catalog.resolve_by_name("Lost").await,
			Err(EngineError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_add_duplicate_name_conflicts() {
		let catalog = catalog();
		catalog.add("Returned").await.unwrap();
		assert!(matches!(
			catalog.add("Returned").await,
			Err(EngineError::Conflict(_))
		));
		assert!(matches!(
			catalog.add("   ").await,
			Err(EngineError::InvalidStatus(_))
		));
	}

	#[tokio::test]
	async fn test_add_appends_in_order() {
		let catalog = catalog();
		catalog.seed_defaults(&defaults()).await.unwrap();
		let added = catalog.add("Returned").await.unwrap();
		assert_eq!(added.position, DEFAULT_STATUSES.len() as u32);
		assert_eq!(catalog.list().await.unwrap().last().unwrap().name, "Returned");
	}

	#[tokio::test]
	async fn test_missing_id_index_is_restored() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let catalog = StoredCatalog::new(storage.clone());
		let entry = catalog.add("Pending").await.unwrap();

		storage
			.remove(StorageKey::CatalogById.as_str(), &entry.id)
			.await
			.unwrap();
		assert_eq!(catalog.resolve_by_id(&entry.id).await.unwrap(), entry);
		assert!(storage
			.exists(StorageKey::CatalogById.as_str(), &entry.id)
			.await
			.unwrap());
	}
}

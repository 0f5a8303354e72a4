//! Storage module for the order status system.
//!
//! This module provides a low-level byte storage abstraction with an atomic
//! conditional write, backend implementations (in-memory and file-based),
//! and a typed [`StorageService`] that the engine builds its repositories on.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use status_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Upper bound on optimistic retries in [`StorageService::update_with`].
const MAX_CAS_ATTEMPTS: usize = 64;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs when creating an item whose key is already taken.
	#[error("Already exists: {0}")]
	Conflict(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Keys have the form `namespace:id`. Besides plain reads and writes every
/// backend must provide [`compare_and_swap`](StorageInterface::compare_and_swap),
/// which is the only primitive the higher layers rely on for atomicity.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, overwriting any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Atomically replaces the value at `key` with `value` if the current
	/// value equals `expected`.
	///
	/// `expected = None` means the key must be absent (create-if-absent).
	/// Returns `Ok(false)` without writing when the precondition fails.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<Vec<u8>>,
		value: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists the ids (the part after `namespace:`) stored in a namespace.
	async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Outcome of [`StorageService::update_with`].
#[derive(Debug, Clone, PartialEq)]
pub enum Updated<T> {
	/// The updated value was written.
	Written(T),
	/// The updater declined; this is the value as stored.
	Unchanged(T),
}

impl<T> Updated<T> {
	pub fn is_written(&self) -> bool {
		matches!(self, Updated::Written(_))
	}

	pub fn into_inner(self) -> T {
		match self {
			Updated::Written(value) | Updated::Unchanged(value) => value,
		}
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Splits a `namespace:id` key. Keys without a namespace use `default`.
pub(crate) fn split_key(key: &str) -> (&str, &str) {
	key.split_once(':').unwrap_or(("default", key))
}

/// High-level storage service that provides typed operations.
///
/// Values are stored as JSON under `namespace:id` keys.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
		serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Stores a serializable value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes = Self::encode(data)?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes)
			.await
	}

	/// Stores a value only if nothing is stored under the key yet.
	///
	/// Returns [`StorageError::Conflict`] if the key is already taken. This is
	/// atomic with respect to concurrent `create` calls for the same key.
	pub async fn create<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);
		let bytes = Self::encode(data)?;
		if self.backend.compare_and_swap(&key, None, bytes).await? {
			Ok(())
		} else {
			Err(StorageError::Conflict(key))
		}
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		Self::decode(&bytes)
	}

	/// Retrieves every value stored in a namespace.
	///
	/// Entries removed between listing and reading are skipped.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		let mut values = Vec::new();
		for id in self.backend.keys(namespace).await? {
			match self.retrieve(namespace, &id).await {
				Ok(value) => values.push(value),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(values)
	}

	/// Overwrites an existing value; fails with `NotFound` if absent.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}
		self.backend.set_bytes(&key, Self::encode(data)?).await
	}

	/// Atomically applies `updater` to the stored value.
	///
	/// Reads the current value, applies `updater` to it and writes it back
	/// with a compare-and-swap against the bytes that were read. When another
	/// writer got in between, the freshly stored value is re-read and the
	/// updater runs again, so it always decides on the value it overwrites.
	///
	/// The updater returns `Ok(true)` to write, `Ok(false)` to leave the
	/// stored value untouched (it must not have modified it then), or an
	/// error that aborts the update without writing.
	pub async fn update_with<T, F, E>(
		&self,
		namespace: &str,
		id: &str,
		mut updater: F,
	) -> Result<Updated<T>, E>
	where
		T: Serialize + DeserializeOwned,
		F: FnMut(&mut T) -> Result<bool, E>,
		E: From<StorageError>,
	{
		let key = Self::key(namespace, id);
		for attempt in 1..=MAX_CAS_ATTEMPTS {
			let current = self.backend.get_bytes(&key).await?;
			let mut value: T = Self::decode(&current)?;
			if !updater(&mut value)? {
				return Ok(Updated::Unchanged(value));
			}
			let bytes = Self::encode(&value)?;

			if self
				.backend
				.compare_and_swap(&key, Some(current), bytes)
				.await?
			{
				return Ok(Updated::Written(value));
			}

			tracing::warn!(key = %key, attempt, "Concurrent update detected, retrying");
			tokio::task::yield_now().await;
		}

		tracing::warn!(key = %key, "Giving up after {} contended updates", MAX_CAS_ATTEMPTS);
		Err(StorageError::Backend(format!("Too much contention updating {}", key)).into())
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use serde::Deserialize;
	use std::sync::Arc;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Counter {
		hits: Vec<u32>,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[test]
	fn test_split_key() {
		assert_eq!(split_key("records:O-1"), ("records", "O-1"));
		assert_eq!(split_key("records:a:b"), ("records", "a:b"));
		assert_eq!(split_key("bare"), ("default", "bare"));
	}

	#[tokio::test]
	async fn test_create_is_exclusive() {
		let storage = service();
		let first = Counter { hits: vec![1] };
		let second = Counter { hits: vec![2] };

		storage.create("counters", "c1", &first).await.unwrap();
		let result = storage.create("counters", "c1", &second).await;
		assert!(matches!(result, Err(StorageError::Conflict(_))));

		let stored: Counter = storage.retrieve("counters", "c1").await.unwrap();
		assert_eq!(stored, first);
	}

	#[tokio::test]
	async fn test_update_requires_existing() {
		let storage = service();
		let result = storage
			.update("counters", "missing", &Counter { hits: vec![] })
			.await;
		assert!(matches!(result, Err(StorageError::NotFound)));

		let result = storage
			.update_with("counters", "missing", |c: &mut Counter| {
				c.hits.push(1);
				Ok::<_, StorageError>(true)
			})
			.await;
		assert!(matches!(result, Err(StorageError::NotFound)));
	}

	#[tokio::test]
	async fn test_concurrent_update_with_loses_nothing() {
		let storage = Arc::new(service());
		storage
			.create("counters", "c1", &Counter { hits: vec![] })
			.await
			.unwrap();

		let tasks = (0..25u32).map(|n| {
			let storage = Arc::clone(&storage);
			tokio::spawn(async move {
				storage
					.update_with("counters", "c1", |c: &mut Counter| {
						c.hits.push(n);
						Ok::<_, StorageError>(true)
					})
					.await
			})
		});
		for result in futures::future::join_all(tasks).await {
			result.unwrap().unwrap();
		}

		let mut stored: Counter = storage.retrieve("counters", "c1").await.unwrap();
		stored.hits.sort_unstable();
		assert_eq!(stored.hits, (0..25).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn test_update_with_can_decline_or_abort() {
		let storage = service();
		let original = Counter { hits: vec![1] };
		storage.create("counters", "c1", &original).await.unwrap();

		let declined = storage
			.update_with("counters", "c1", |c: &mut Counter| {
				Ok::<_, StorageError>(!c.hits.contains(&1))
			})
			.await
			.unwrap();
		assert_eq!(declined, Updated::Unchanged(original.clone()));

		let aborted = storage
			.update_with("counters", "c1", |_: &mut Counter| {
				Err::<bool, _>(StorageError::Conflict("c1".into()))
			})
			.await;
		assert!(matches!(aborted, Err(StorageError::Conflict(_))));

		let written = storage
			.update_with("counters", "c1", |c: &mut Counter| {
				c.hits.push(2);
				Ok::<_, StorageError>(true)
			})
			.await
			.unwrap();
		assert!(written.is_written());
		assert_eq!(written.into_inner().hits, vec![1, 2]);

		let stored: Counter = storage.retrieve("counters", "c1").await.unwrap();
		assert_eq!(stored.hits, vec![1, 2]);
	}

	#[tokio::test]
	async fn test_retrieve_all_scoped_to_namespace() {
		let storage = service();
		storage
			.store("a", "1", &Counter { hits: vec![1] })
			.await
			.unwrap();
		storage
			.store("a", "2", &Counter { hits: vec![2] })
			.await
			.unwrap();
		storage
			.store("b", "1", &Counter { hits: vec![3] })
			.await
			.unwrap();

		let mut all: Vec<Counter> = storage.retrieve_all("a").await.unwrap();
		all.sort_by_key(|c| c.hits[0]);
		assert_eq!(all.len(), 2);
		assert_eq!(all[1].hits, vec![2]);

		storage.remove("a", "1").await.unwrap();
		assert!(!storage.exists("a", "1").await.unwrap());
	}
}

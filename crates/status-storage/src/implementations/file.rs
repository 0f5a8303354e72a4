//! File-based storage backend implementation.
//!
//! Each key is stored as one JSON file at `<storage_path>/<namespace>/<id>.json`.
//! Ids are percent-encoded so that any order id maps to exactly one file name
//! and can be recovered when listing. Writes go through a temp file and an
//! atomic rename while holding an exclusive advisory lock on the namespace's
//! lock file, which is what makes compare-and-swap safe across processes.

use crate::{split_key, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use fs2::FileExt;
use status_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use std::fs::{self as stdfs, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const EXTENSION: &str = "json";
const LOCK_FILE: &str = ".lock";
const DEFAULT_STORAGE_PATH: &str = "./data/storage";

/// Encodes an id into a file-name-safe form.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes `%XX`.
fn encode_id(id: &str) -> String {
	let mut encoded = String::with_capacity(id.len());
	for byte in id.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
			encoded.push(byte as char);
		} else {
			encoded.push_str(&format!("%{:02X}", byte));
		}
	}
	encoded
}

/// Reverses [`encode_id`]. Returns `None` for names this backend did not write.
fn decode_id(encoded: &str) -> Option<String> {
	let bytes = encoded.as_bytes();
	let mut decoded = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let hex = encoded.get(i + 1..i + 3)?;
			decoded.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else {
			decoded.push(bytes[i]);
			i += 1;
		}
	}
	String::from_utf8(decoded).ok()
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
}

impl FileStorage {
	/// Creates a new FileStorage instance rooted at `base_path`.
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn namespace_dir(&self, namespace: &str) -> PathBuf {
		self.base_path.join(encode_id(namespace))
	}

	/// Converts a storage key to its file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let (namespace, id) = split_key(key);
		self.namespace_dir(namespace)
			.join(format!("{}.{}", encode_id(id), EXTENSION))
	}

	/// Runs `op` on the blocking pool while holding the namespace lock.
	async fn with_namespace_lock<T, F>(&self, key: &str, op: F) -> Result<T, StorageError>
	where
		T: Send + 'static,
		F: FnOnce(&Path) -> Result<T, StorageError> + Send + 'static,
	{
		let (namespace, _) = split_key(key);
		let dir = self.namespace_dir(namespace);
		let path = self.get_file_path(key);

		tokio::task::spawn_blocking(move || {
			stdfs::create_dir_all(&dir).map_err(backend_error)?;
			let lock = OpenOptions::new()
				.create(true)
				.truncate(false)
				.write(true)
				.open(dir.join(LOCK_FILE))
				.map_err(backend_error)?;
			FileExt::lock_exclusive(&lock).map_err(backend_error)?;

			let result = op(&path);

			if let Err(e) = FileExt::unlock(&lock) {
				tracing::warn!("Failed to release lock in {:?}: {}", dir, e);
			}
			result
		})
		.await
		.map_err(|e| StorageError::Backend(format!("Storage task failed: {}", e)))?
	}
}

fn backend_error(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

fn read_current(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
	match stdfs::read(path) {
		Ok(data) => Ok(Some(data)),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(backend_error(e)),
	}
}

/// Writes atomically by writing to a temp file then renaming over the target.
fn write_atomic(path: &Path, value: &[u8]) -> Result<(), StorageError> {
	let temp_path = path.with_extension("tmp");
	stdfs::write(&temp_path, value).map_err(backend_error)?;
	stdfs::rename(&temp_path, path).map_err(backend_error)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);
		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(backend_error(e)),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.with_namespace_lock(key, move |path| write_atomic(path, &value))
			.await
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<Vec<u8>>,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		self.with_namespace_lock(key, move |path| {
			if read_current(path)? != expected {
				return Ok(false);
			}
			write_atomic(path, &value)?;
			Ok(true)
		})
		.await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.with_namespace_lock(key, |path| match stdfs::remove_file(path) {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_error(e)),
		})
		.await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(backend_error)
	}

	async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let dir = self.namespace_dir(namespace);
		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend_error(e)),
		};

		let mut ids = Vec::new();
		while let Some(entry) = entries.next_entry().await.map_err(backend_error)? {
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new(EXTENSION)) {
				continue;
			}
			let decoded = path
				.file_stem()
				.and_then(|stem| stem.to_str())
				.and_then(decode_id);
			match decoded {
				Some(id) => ids.push(id),
				None => tracing::debug!("Skipping unrecognised file {:?}", path),
			}
		}
		ids.sort();
		Ok(ids)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if !path.trim().is_empty() => Ok(()),
						_ => Err("storage_path cannot be empty".to_string()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use tempfile::TempDir;

	#[test]
	fn test_id_encoding_is_reversible() {
		for id in ["O-1", "a/b", "a_b", "a%2Fb", "pedido 7", "preparación", "x:y"] {
			let encoded = encode_id(id);
			assert!(!encoded.contains('/'));
			assert!(!encoded.contains(':'));
			assert_eq!(decode_id(&encoded).as_deref(), Some(id));
		}
		assert_ne!(encode_id("a/b"), encode_id("a_b"));
		assert_eq!(decode_id("%G1"), None);
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());

		let key = "records:order/42";
		storage.set_bytes(key, b"{}".to_vec()).await.unwrap();
		assert!(storage.exists(key).await.unwrap());
		assert_eq!(storage.get_bytes(key).await.unwrap(), b"{}".to_vec());
		assert_eq!(storage.keys("records").await.unwrap(), vec!["order/42"]);

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
		// Deleting twice is fine
		storage.delete(key).await.unwrap();
	}

	#[tokio::test]
	async fn test_compare_and_swap() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());
		let key = "catalog:Pending";

		assert!(storage
			.compare_and_swap(key, None, b"v1".to_vec())
			.await
			.unwrap());
		assert!(!storage
			.compare_and_swap(key, None, b"v2".to_vec())
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap(key, Some(b"v1".to_vec()), b"v2".to_vec())
			.await
			.unwrap());
		assert_eq!(storage.get_bytes(key).await.unwrap(), b"v2".to_vec());
	}

	#[tokio::test]
	async fn test_concurrent_create_single_winner() {
		let temp_dir = TempDir::new().unwrap();
		let storage = Arc::new(FileStorage::new(temp_dir.path().to_path_buf()));

		let tasks = (0..8u8).map(|n| {
			let storage = Arc::clone(&storage);
			tokio::spawn(async move {
				storage
					.compare_and_swap("records:O-1", None, vec![n])
					.await
			})
		});
		let winners = futures::future::join_all(tasks)
			.await
			.into_iter()
			.filter(|r| matches!(r, Ok(Ok(true))))
			.count();
		assert_eq!(winners, 1);
	}

	#[tokio::test]
	async fn test_persists_across_instances() {
		let temp_dir = TempDir::new().unwrap();
		{
			let storage = FileStorage::new(temp_dir.path().to_path_buf());
			storage.set_bytes("catalog:Shipped", vec![7]).await.unwrap();
		}
		let storage = FileStorage::new(temp_dir.path().to_path_buf());
		assert_eq!(storage.get_bytes("catalog:Shipped").await.unwrap(), vec![7]);
		assert!(storage.keys("missing").await.unwrap().is_empty());
	}

	#[test]
	fn test_factory_validates_config() {
		let config: toml::Value = toml::from_str(r#"storage_path = """#).unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));

		let config: toml::Value = toml::from_str(r#"storage_path = "/tmp/x""#).unwrap();
		assert!(create_storage(&config).is_ok());
	}
}

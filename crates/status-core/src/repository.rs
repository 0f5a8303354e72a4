//! Order-status repository.
//!
//! Records are stored under their order id, so `create` is a
//! create-if-absent keyed on the order and two records can never exist for
//! the same order. The record id is a secondary index pointing back at the
//! order id.

use crate::EngineError;
use async_trait::async_trait;
use status_storage::{StorageError, StorageService, Updated};
use status_types::{OrderStatusRecord, RecordFilter, StatusEntry, StorageKey};
use std::sync::Arc;

/// Decides, on the record about to be overwritten, whether a transition
/// still applies: `Ok(true)` to write, `Ok(false)` to leave the record as
/// is, an error to refuse.
pub type TransitionGuard<'a> =
	dyn Fn(&OrderStatusRecord) -> Result<bool, EngineError> + Send + Sync + 'a;

/// Persistence contract the engine is written against.
#[async_trait]
pub trait OrderStatusRepository: Send + Sync {
	/// Loads a record by its id; `NotFound` if absent.
	async fn get(&self, id: &str) -> Result<OrderStatusRecord, EngineError>;

	/// Loads the record of an order; `NotFound` if absent.
	async fn get_by_order_id(&self, order_id: &str) -> Result<OrderStatusRecord, EngineError>;

	/// Persists a new record; `Conflict` if the order already has one.
	async fn create(&self, record: &OrderStatusRecord) -> Result<(), EngineError>;

	/// Makes sure the record is reachable by its id.
	async fn ensure_indexed(&self, record: &OrderStatusRecord) -> Result<(), EngineError>;

	/// Sets the current status and appends `entry` to the history in one
	/// atomic update; `NotFound` if the record does not exist.
	///
	/// `guard` sees the stored record right before every write attempt, so
	/// no concurrent change slips in between the decision and the write.
	async fn atomic_set_status_and_append_history(
		&self,
		id: &str,
		status_id: &str,
		status: &str,
		entry: StatusEntry,
		guard: &TransitionGuard<'_>,
	) -> Result<Updated<OrderStatusRecord>, EngineError>;

	/// Records matching `filter`, oldest first.
	async fn list_by(&self, filter: &RecordFilter) -> Result<Vec<OrderStatusRecord>, EngineError>;
}

/// Repository persisted through the storage service.
pub struct StoredRepository {
	storage: Arc<StorageService>,
}

impl StoredRepository {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	async fn order_id_for(&self, id: &str) -> Result<String, EngineError> {
		match self
			.storage
			.retrieve(StorageKey::RecordsById.as_str(), id)
			.await
		{
			Ok(order_id) => Ok(order_id),
			Err(StorageError::NotFound) => Err(EngineError::NotFound(format!("record '{}'", id))),
			Err(e) => Err(e.into()),
		}
	}
}

#[async_trait]
impl OrderStatusRepository for StoredRepository {
	async fn get(&self, id: &str) -> Result<OrderStatusRecord, EngineError> {
		let order_id = self.order_id_for(id).await?;
		match self.get_by_order_id(&order_id).await {
			Ok(record) if record.id == id => Ok(record),
			Ok(_) | Err(EngineError::NotFound(_)) => {
				Err(EngineError::NotFound(format!("record '{}'", id)))
			},
			Err(e) => Err(e),
		}
	}

	async fn get_by_order_id(&self, order_id: &str) -> Result<OrderStatusRecord, EngineError> {
		match self
			.storage
			.retrieve(StorageKey::Records.as_str(), order_id)
			.await
		{
			Ok(record) => Ok(record),
			Err(StorageError::NotFound) => Err(EngineError::NotFound(format!(
				"record for order '{}'",
				order_id
			))),
			Err(e) => Err(e.into()),
		}
	}

	async fn create(&self, record: &OrderStatusRecord) -> Result<(), EngineError> {
		match self
			.storage
			.create(StorageKey::Records.as_str(), &record.order_id, record)
			.await
		{
			Ok(()) => {},
			Err(StorageError::Conflict(_)) => {
				return Err(EngineError::Conflict(format!(
					"order '{}' already has a status record",
					record.order_id
				)))
			},
			Err(e) => return Err(e.into()),
		}
		self.ensure_indexed(record).await
	}

	async fn ensure_indexed(&self, record: &OrderStatusRecord) -> Result<(), EngineError> {
		self.storage
			.store(
				StorageKey::RecordsById.as_str(),
				&record.id,
				&record.order_id,
			)
			.await?;
		Ok(())
	}

	async fn atomic_set_status_and_append_history(
		&self,
		id: &str,
		status_id: &str,
		status: &str,
		entry: StatusEntry,
		guard: &TransitionGuard<'_>,
	) -> Result<Updated<OrderStatusRecord>, EngineError> {
		let order_id = self.order_id_for(id).await?;
		let result = self
			.storage
			.update_with(
				StorageKey::Records.as_str(),
				&order_id,
				|record: &mut OrderStatusRecord| -> Result<bool, EngineError> {
					if !guard(record)? {
						return Ok(false);
					}
					record.apply_transition(status_id, status, entry.clone());
					Ok(true)
				},
			)
			.await;

		match result {
			Err(EngineError::NotFound(_)) => Err(EngineError::NotFound(format!("record '{}'", id))),
			other => other,
		}
	}

	async fn list_by(&self, filter: &RecordFilter) -> Result<Vec<OrderStatusRecord>, EngineError> {
		let mut records: Vec<OrderStatusRecord> = self
			.storage
			.retrieve_all(StorageKey::Records.as_str())
			.await?;
		records.retain(|record| filter.matches(record));
		records.sort_by(|a, b| {
			a.created_at
				.cmp(&b.created_at)
				.then_with(|| a.order_id.cmp(&b.order_id))
		});
		Ok(records)
	}
}

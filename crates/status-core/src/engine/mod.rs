//! The status engine facade.
//!
//! [`StatusEngine`] is what outer layers call: initialization, status
//! changes, queries and catalog administration. It holds no state of its
//! own between calls; everything lives behind the catalog and repository.

use crate::{EngineError, OrderStateMachine, OrderStatusRepository, StatusCatalog};
use status_config::CatalogConfig;
use status_identity::IdentityService;
use status_types::{
	truncate_id, Actor, ActorRole, Credential, OrderStatusRecord, RecordFilter, ShippingInfo,
	StatusCatalogEntry, StatusRef, TransitionRules,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// Entry point for every order status operation.
pub struct StatusEngine {
	catalog: Arc<dyn StatusCatalog>,
	repository: Arc<dyn OrderStatusRepository>,
	identity: Arc<IdentityService>,
	state_machine: OrderStateMachine,
	catalog_config: CatalogConfig,
}

impl StatusEngine {
	pub fn new(
		catalog: Arc<dyn StatusCatalog>,
		repository: Arc<dyn OrderStatusRepository>,
		identity: Arc<IdentityService>,
		catalog_config: CatalogConfig,
		rules: TransitionRules,
	) -> Self {
		Self {
			catalog,
			state_machine: OrderStateMachine::new(repository.clone(), rules),
			repository,
			identity,
			catalog_config,
		}
	}

	pub fn catalog(&self) -> &Arc<dyn StatusCatalog> {
		&self.catalog
	}

	pub fn rules(&self) -> &TransitionRules {
		self.state_machine.rules()
	}

	pub fn catalog_config(&self) -> &CatalogConfig {
		&self.catalog_config
	}

	/// Resolves a bearer credential through the identity collaborator.
	pub async fn authenticate(&self, credential: &Credential) -> Result<Actor, EngineError> {
		Ok(self.identity.resolve_actor(credential).await?)
	}

	/// Seeds the configured default statuses into an empty catalog.
	pub async fn seed_catalog(&self) -> Result<usize, EngineError> {
		self.catalog
			.seed_defaults(&self.catalog_config.defaults)
			.await
	}

	/// Resolves a status reference, reporting unknown statuses as `InvalidStatus`.
	async fn resolve_status(&self, status: &StatusRef) -> Result<StatusCatalogEntry, EngineError> {
		match self.catalog.resolve(status).await {
			Ok(entry) => Ok(entry),
			Err(EngineError::NotFound(_)) => Err(EngineError::InvalidStatus(format!(
				"unknown status {}",
				status
			))),
			Err(e) => Err(e),
		}
	}

	/// Creates the status record of an order, or returns the existing one.
	///
	/// Without `status` the configured initial status is used. Calling this
	/// again for the same order returns the first record unchanged, whatever
	/// shipping details are passed.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn initialize(
		&self,
		order_id: &str,
		user_id: &str,
		shipping: ShippingInfo,
		status: Option<StatusRef>,
	) -> Result<OrderStatusRecord, EngineError> {
		let status =
			status.unwrap_or_else(|| StatusRef::name(&self.catalog_config.initial_status));
		let initial = self.resolve_status(&status).await?;

		match self.repository.get_by_order_id(order_id).await {
			Ok(existing) => return self.existing_record(existing).await,
			Err(EngineError::NotFound(_)) => {},
			Err(e) => return Err(e),
		}

		let record =
			OrderStatusRecord::initial(order_id, user_id, shipping, &initial.id, &initial.name);
		match self.repository.create(&record).await {
			Ok(()) => {
				tracing::info!(
					record_id = %truncate_id(&record.id),
					user_id = %user_id,
					status = %record.status,
					"Initialized order status"
				);
				Ok(record)
			},
			Err(EngineError::Conflict(_)) => {
				// Lost the race against a concurrent initialization
				let existing = self.repository.get_by_order_id(order_id).await?;
				self.existing_record(existing).await
			},
			Err(e) => Err(e),
		}
	}

	async fn existing_record(
		&self,
		existing: OrderStatusRecord,
	) -> Result<OrderStatusRecord, EngineError> {
		self.repository.ensure_indexed(&existing).await?;
		tracing::debug!(
			record_id = %truncate_id(&existing.id),
			"Order already initialized, returning existing record"
		);
		Ok(existing)
	}

	/// Moves a record to `target` on behalf of `actor`.
	#[instrument(skip_all, fields(record_id = %truncate_id(record_id), target = %target))]
	pub async fn change_status(
		&self,
		record_id: &str,
		target: &StatusRef,
		actor: &Actor,
		reason: Option<String>,
	) -> Result<OrderStatusRecord, EngineError> {
		let target = self.resolve_status(target).await?;
		let record = self.repository.get(record_id).await?;
		self.state_machine
			.transition(record, &target, actor, normalize_reason(reason))
			.await
	}

	/// Moves the record of an order to `target` on behalf of `actor`.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), target = %target))]
	pub async fn change_status_by_order(
		&self,
		order_id: &str,
		target: &StatusRef,
		actor: &Actor,
		reason: Option<String>,
	) -> Result<OrderStatusRecord, EngineError> {
		let target = self.resolve_status(target).await?;
		let record = self.repository.get_by_order_id(order_id).await?;
		self.state_machine
			.transition(record, &target, actor, normalize_reason(reason))
			.await
	}

	pub async fn get_record(&self, record_id: &str) -> Result<OrderStatusRecord, EngineError> {
		self.repository.get(record_id).await
	}

	pub async fn get_by_order(&self, order_id: &str) -> Result<OrderStatusRecord, EngineError> {
		self.repository.get_by_order_id(order_id).await
	}

	pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<OrderStatusRecord>, EngineError> {
		self.repository.list_by(&RecordFilter::by_user(user_id)).await
	}

	pub async fn list_by_status(&self, status: &str) -> Result<Vec<OrderStatusRecord>, EngineError> {
		self.repository.list_by(&RecordFilter::by_status(status)).await
	}

	pub async fn list_by_status_id(
		&self,
		status_id: &str,
	) -> Result<Vec<OrderStatusRecord>, EngineError> {
		self.repository
			.list_by(&RecordFilter::by_status_id(status_id))
			.await
	}

	pub async fn list(&self, filter: &RecordFilter) -> Result<Vec<OrderStatusRecord>, EngineError> {
		self.repository.list_by(filter).await
	}

	pub async fn list_all(&self) -> Result<Vec<OrderStatusRecord>, EngineError> {
		self.repository.list_by(&RecordFilter::all()).await
	}

	/// Distinct status names currently held by at least one record.
	pub async fn statuses_in_use(&self) -> Result<Vec<String>, EngineError> {
		let statuses: BTreeSet<String> = self
			.list_all()
			.await?
			.into_iter()
			.map(|record| record.status)
			.collect();
		Ok(statuses.into_iter().collect())
	}

	/// Whether a catalog status is terminal under the configured rules.
	pub async fn is_terminal_status(&self, status: &StatusRef) -> Result<bool, EngineError> {
		let entry = self.resolve_status(status).await?;
		Ok(self.rules().is_terminal(&entry.name))
	}

	pub async fn list_statuses(&self) -> Result<Vec<StatusCatalogEntry>, EngineError> {
		self.catalog.list().await
	}

	pub async fn resolve(&self, status: &StatusRef) -> Result<StatusCatalogEntry, EngineError> {
		self.catalog.resolve(status).await
	}

	/// Adds a catalog status. Only administrators may extend the catalog.
	#[instrument(skip_all, fields(actor_id = %actor.id))]
	pub async fn add_status(
		&self,
		actor: &Actor,
		name: &str,
	) -> Result<StatusCatalogEntry, EngineError> {
		if actor.role != ActorRole::Admin {
			tracing::warn!(role = %actor.role, status = %name, "Refused catalog change");
			return Err(EngineError::Forbidden(
				"only administrators may add statuses".into(),
			));
		}
		self.catalog.add(name).await
	}
}

fn normalize_reason(reason: Option<String>) -> Option<String> {
	reason
		.map(|r| r.trim().to_string())
		.filter(|r| !r.is_empty())
}

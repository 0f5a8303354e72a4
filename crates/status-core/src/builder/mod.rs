//! Builder pattern for constructing status engines.
//!
//! Composes a StatusEngine from configuration and factory functions for the
//! pluggable storage and identity backends.

use crate::{StatusEngine, StoredCatalog, StoredRepository};
use status_config::Config;
use status_identity::{IdentityError, IdentityInterface, IdentityService};
use status_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for each pluggable backend, keyed by implementation name.
pub struct StatusFactories<SF, IF> {
	pub storage_factories: HashMap<String, SF>,
	pub identity_factories: HashMap<String, IF>,
}

/// Builder for constructing a StatusEngine with pluggable implementations.
pub struct StatusBuilder {
	config: Config,
}

impl StatusBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the StatusEngine using the factories for each component type.
	pub fn build<SF, IF>(self, factories: StatusFactories<SF, IF>) -> Result<StatusEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		IF: Fn(&toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let identity_backend = load_primary(
			"identity",
			&self.config.identity.primary,
			&self.config.identity.implementations,
			&factories.identity_factories,
		)?;
		let identity = Arc::new(IdentityService::new(identity_backend));

		tracing::info!(
			service_id = %self.config.service.id,
			governed_statuses = self.config.transitions.statuses.len(),
			"Status engine assembled"
		);

		Ok(StatusEngine::new(
			Arc::new(StoredCatalog::new(storage.clone())),
			Arc::new(StoredRepository::new(storage)),
			identity,
			self.config.catalog,
			self.config.transitions,
		))
	}
}

/// Creates every configured implementation that has a factory and returns
/// the primary one.
fn load_primary<T, E, F>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	E: Display,
	F: Fn(&toml::Value) -> Result<T, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				// Validation already happened in the factory
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"no valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use status_config::builders::config::ConfigBuilder;
	use status_types::{ActorRole, Credential, ShippingInfo, StatusRef, PENDING};
	use tempfile::TempDir;

	fn factories() -> StatusFactories<
		status_storage::StorageFactory,
		status_identity::IdentityFactory,
	> {
		StatusFactories {
			storage_factories: status_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			identity_factories: status_identity::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_build_from_config() {
		let config = ConfigBuilder::new()
			.token("t-client", "U1", ActorRole::Client)
			.build();
		let engine = StatusBuilder::new(config).build(factories()).unwrap();

		assert_eq!(engine.seed_catalog().await.unwrap(), 6);
		let actor = engine
			.authenticate(&Credential::from("t-client"))
			.await
			.unwrap();
		assert_eq!(actor.role, ActorRole::Client);

		let record = engine
			.initialize("O1", &actor.id, ShippingInfo::default(), None)
			.await
			.unwrap();
		assert_eq!(record.status, PENDING);
	}

	#[tokio::test]
	async fn test_file_storage_survives_rebuild() {
		let temp_dir = TempDir::new().unwrap();
		let path = temp_dir.path().to_string_lossy().to_string();

		let engine = StatusBuilder::new(ConfigBuilder::new().file_storage(&path).build())
			.build(factories())
			.unwrap();
		engine.seed_catalog().await.unwrap();
		let record = engine
			.initialize("O1", "U1", ShippingInfo::default(), None)
			.await
			.unwrap();
		drop(engine);

		let engine = StatusBuilder::new(ConfigBuilder::new().file_storage(&path).build())
			.build(factories())
			.unwrap();
		assert_eq!(engine.seed_catalog().await.unwrap(), 0);
		assert_eq!(engine.get_record(&record.id).await.unwrap(), record);
		assert!(engine
			.resolve(&StatusRef::name(PENDING))
			.await
			.is_ok());
	}

	#[test]
	fn test_missing_factory_is_reported() {
		let config = ConfigBuilder::new().build();
		let result = StatusBuilder::new(config).build(StatusFactories {
			storage_factories: HashMap::<String, status_storage::StorageFactory>::new(),
			identity_factories: HashMap::<String, status_identity::IdentityFactory>::new(),
		});
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}

	#[test]
	fn test_invalid_backend_config_is_reported() {
		let mut config = ConfigBuilder::new().build();
		config.storage.implementations.insert(
			"file".into(),
			toml::from_str("storage_path = \"\"").unwrap(),
		);
		let result = StatusBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}
}

//! Configuration builder for tests and local development.
//!
//! Produces a `Config` backed by in-memory storage and a static token table,
//! so an engine can be assembled without files or external services.

use crate::{CatalogConfig, Config, IdentityConfig, ServiceConfig, StorageConfig};
use status_types::{ActorRole, TransitionRules};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
	tokens: Vec<(String, String, ActorRole)>,
	catalog: CatalogConfig,
	transitions: TransitionRules,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			service_id: "test-order-status".to_string(),
			storage_primary: "memory".to_string(),
			storage_implementations: HashMap::from([(
				"memory".to_string(),
				toml::Value::Table(toml::Table::new()),
			)]),
			tokens: Vec::new(),
			catalog: CatalogConfig::default(),
			transitions: TransitionRules::builtin(),
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Uses the file backend rooted at `path` instead of memory.
	pub fn file_storage(mut self, path: impl Into<String>) -> Self {
		let mut table = toml::Table::new();
		table.insert("storage_path".into(), toml::Value::String(path.into()));
		self.storage_implementations
			.insert("file".to_string(), toml::Value::Table(table));
		self.storage_primary = "file".to_string();
		self
	}

	/// Adds a static token for the given actor.
	pub fn token(
		mut self,
		token: impl Into<String>,
		actor_id: impl Into<String>,
		role: ActorRole,
	) -> Self {
		self.tokens.push((token.into(), actor_id.into(), role));
		self
	}

	pub fn catalog(mut self, catalog: CatalogConfig) -> Self {
		self.catalog = catalog;
		self
	}

	pub fn transitions(mut self, transitions: TransitionRules) -> Self {
		self.transitions = transitions;
		self
	}

	pub fn build(self) -> Config {
		let tokens = self
			.tokens
			.into_iter()
			.map(|(token, actor_id, role)| {
				let mut entry = toml::Table::new();
				entry.insert("token".into(), toml::Value::String(token));
				entry.insert("actor_id".into(), toml::Value::String(actor_id));
				entry.insert("role".into(), toml::Value::String(role.to_string()));
				toml::Value::Table(entry)
			})
			.collect();
		let mut static_identity = toml::Table::new();
		static_identity.insert("tokens".into(), toml::Value::Array(tokens));

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: self.storage_implementations,
			},
			identity: IdentityConfig {
				primary: "static".to_string(),
				implementations: HashMap::from([(
					"static".to_string(),
					toml::Value::Table(static_identity),
				)]),
			},
			catalog: self.catalog,
			transitions: self.transitions,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_round_trips_through_toml() {
		let config = ConfigBuilder::new()
			.token("t-admin", "A1", ActorRole::Admin)
			.build();
		let rendered = toml::to_string(&config).unwrap();
		let parsed: Config = rendered.parse().unwrap();

		assert_eq!(parsed.storage.primary, "memory");
		let tokens = parsed.identity.implementations["static"]
			.get("tokens")
			.and_then(|t| t.as_array())
			.unwrap();
		assert_eq!(tokens.len(), 1);
	}
}

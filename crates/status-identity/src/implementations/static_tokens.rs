//! Static token table identity backend.
//!
//! Maps a fixed set of tokens from configuration to actors. Intended for
//! development, tests and single-operator deployments.
//!
//! ```toml
//! [identity.implementations.static]
//! tokens = [
//!     { token = "${CLIENT_TOKEN}", actor_id = "user-1", role = "client" },
//!     { token = "ops", actor_id = "ops-1", role = "admin", enabled = false },
//! ]
//! ```

use crate::{IdentityError, IdentityFactory, IdentityInterface, IdentityRegistry};
use async_trait::async_trait;
use serde::Deserialize;
use status_types::{
	Actor, ActorRole, ConfigSchema, Credential, Field, FieldType, ImplementationRegistry, Schema,
	ValidationError,
};

#[derive(Debug, Deserialize)]
struct TokenEntry {
	token: Credential,
	actor_id: String,
	role: ActorRole,
	#[serde(default = "default_enabled")]
	enabled: bool,
}

fn default_enabled() -> bool {
	true
}

#[derive(Debug, Deserialize)]
struct StaticConfig {
	#[serde(default)]
	tokens: Vec<TokenEntry>,
}

/// Identity backend backed by an in-memory token table.
pub struct StaticTokenIdentity {
	tokens: Vec<(Credential, Actor, bool)>,
}

impl StaticTokenIdentity {
	/// Creates the backend from `(token, actor, enabled)` triples.
	pub fn new(tokens: Vec<(Credential, Actor, bool)>) -> Self {
		Self { tokens }
	}
}

#[async_trait]
impl IdentityInterface for StaticTokenIdentity {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticTokenSchema)
	}

	async fn resolve_actor(&self, credential: &Credential) -> Result<Actor, IdentityError> {
		let (_, actor, enabled) = self
			.tokens
			.iter()
			.find(|(token, _, _)| token == credential)
			.ok_or_else(|| IdentityError::Unauthenticated("invalid token".into()))?;

		if !enabled {
			return Err(IdentityError::Forbidden("user disabled".into()));
		}
		Ok(actor.clone())
	}
}

/// Configuration schema for StaticTokenIdentity.
pub struct StaticTokenSchema;

impl ConfigSchema for StaticTokenSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let entry = Schema::new(
			vec![
				Field::new("token", FieldType::String).with_validator(|v| {
					match v.as_str() {
						Some(s) if !s.is_empty() => Ok(()),
						_ => Err("token cannot be empty".to_string()),
					}
				}),
				Field::new("actor_id", FieldType::String),
				Field::new("role", FieldType::String).with_validator(|v| {
					v.as_str()
						.unwrap_or_default()
						.parse::<ActorRole>()
						.map(|_| ())
						.map_err(|e| e.to_string())
				}),
			],
			vec![Field::new("enabled", FieldType::Boolean)],
		);
		Schema::new(
			vec![],
			vec![Field::new("tokens", FieldType::Array(Box::new(FieldType::Table(entry))))],
		)
		.validate(config)
	}
}

/// Factory function to create a static token identity backend.
pub fn create_identity(config: &toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError> {
	StaticTokenSchema
		.validate(config)
		.map_err(|e| IdentityError::Configuration(e.to_string()))?;

	let parsed: StaticConfig = config
		.clone()
		.try_into()
		.map_err(|e: toml::de::Error| IdentityError::Configuration(e.message().to_string()))?;

	let tokens = parsed
		.tokens
		.into_iter()
		.map(|entry| {
			(
				entry.token,
				Actor::new(entry.actor_id, entry.role),
				entry.enabled,
			)
		})
		.collect();
	Ok(Box::new(StaticTokenIdentity::new(tokens)))
}

/// Registry for the static token identity implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "static";
	type Factory = IdentityFactory;

	fn factory() -> Self::Factory {
		create_identity
	}
}

impl IdentityRegistry for Registry {}

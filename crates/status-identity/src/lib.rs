//! Identity module for the order status system.
//!
//! The engine never inspects credentials. It consumes an already resolved
//! [`Actor`]; this crate is where a bearer credential is turned into one,
//! by delegating to a pluggable identity backend.

use async_trait::async_trait;
use status_types::{Actor, ActorRole, ConfigSchema, Credential, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod static_tokens;
}

/// Errors that can occur while resolving an actor.
#[derive(Debug, Error)]
pub enum IdentityError {
	/// The credential is missing, unknown or rejected by the identity service.
	#[error("Unauthenticated: {0}")]
	Unauthenticated(String),
	/// The credential is valid but the actor may not act.
	#[error("Forbidden: {0}")]
	Forbidden(String),
	/// The identity backend could not be reached or answered nonsense.
	#[error("Identity backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for identity backends.
#[async_trait]
pub trait IdentityInterface: Send + Sync {
	/// Returns the configuration schema for this identity backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves a credential into the actor it belongs to.
	async fn resolve_actor(&self, credential: &Credential) -> Result<Actor, IdentityError>;
}

/// Type alias for identity factory functions.
pub type IdentityFactory = fn(&toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError>;

/// Registry trait for identity implementations.
pub trait IdentityRegistry: ImplementationRegistry<Factory = IdentityFactory> {}

/// Get all registered identity implementations.
pub fn get_all_implementations() -> Vec<(&'static str, IdentityFactory)> {
	use implementations::{http, static_tokens};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(static_tokens::Registry::NAME, static_tokens::Registry::factory()),
	]
}

/// Maps identity-service permissions onto an actor role.
///
/// `admin` outranks `seller`; anyone else acts as a client.
pub fn role_from_permissions<S: AsRef<str>>(permissions: &[S]) -> ActorRole {
	let has = |wanted: &str| {
		permissions
			.iter()
			.any(|p| p.as_ref().eq_ignore_ascii_case(wanted))
	};
	if has("admin") {
		ActorRole::Admin
	} else if has("seller") {
		ActorRole::Seller
	} else {
		ActorRole::Client
	}
}

/// Service that resolves credentials through the configured backend.
pub struct IdentityService {
	implementation: Box<dyn IdentityInterface>,
}

impl IdentityService {
	pub fn new(implementation: Box<dyn IdentityInterface>) -> Self {
		Self { implementation }
	}

	/// Resolves a credential into an actor.
	///
	/// Empty credentials are rejected without consulting the backend.
	pub async fn resolve_actor(&self, credential: &Credential) -> Result<Actor, IdentityError> {
		if credential.is_empty() {
			return Err(IdentityError::Unauthenticated("missing token".into()));
		}
		let actor = self.implementation.resolve_actor(credential).await?;
		tracing::debug!(actor_id = %actor.id, role = %actor.role, "Resolved actor");
		Ok(actor)
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::static_tokens::StaticTokenIdentity;

	fn service() -> IdentityService {
		IdentityService::new(Box::new(StaticTokenIdentity::new(vec![
			(Credential::from("admin-token"), Actor::new("A1", ActorRole::Admin), true),
			(Credential::from("client-token"), Actor::new("C1", ActorRole::Client), true),
		])))
	}

	#[test]
	fn test_role_from_permissions() {
		assert_eq!(role_from_permissions(&["read", "ADMIN"]), ActorRole::Admin);
		assert_eq!(role_from_permissions(&["seller", "admin"]), ActorRole::Admin);
		assert_eq!(role_from_permissions(&["seller"]), ActorRole::Seller);
		assert_eq!(role_from_permissions::<&str>(&[]), ActorRole::Client);
	}

	#[tokio::test]
	async fn test_empty_credential_is_unauthenticated() {
		let result = service().resolve_actor(&Credential::from("")).await;
		assert!(matches!(result, Err(IdentityError::Unauthenticated(_))));
	}

	#[tokio::test]
	async fn test_resolve_actor_through_backend() {
		let identity = service();
		let admin = identity
			.resolve_actor(&Credential::from("admin-token"))
			.await
			.unwrap();
		assert_eq!(admin, Actor::new("A1", ActorRole::Admin));

		let result = identity.resolve_actor(&Credential::from("unknown")).await;
		assert!(matches!(result, Err(IdentityError::Unauthenticated(_))));
	}
}

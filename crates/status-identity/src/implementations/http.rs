//! HTTP identity backend.
//!
//! Delegates credential validation to an external identity service by
//! calling `GET {auth_url}{current_user_path}` with the bearer credential.
//! The service answers with the current user:
//!
//! ```json
//! { "id": "u-1", "login": "ana", "permissions": ["user", "seller"], "enabled": true }
//! ```

use crate::{
	role_from_permissions, IdentityError, IdentityFactory, IdentityInterface, IdentityRegistry,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use status_types::{
	Actor, ConfigSchema, Credential, Field, FieldType, ImplementationRegistry, Schema,
	ValidationError,
};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_CURRENT_USER_PATH: &str = "/users/current";

/// The identity service's view of the current user.
#[derive(Debug, Deserialize)]
struct CurrentUser {
	id: String,
	#[serde(default)]
	login: Option<String>,
	#[serde(default)]
	permissions: Vec<String>,
	#[serde(default)]
	enabled: bool,
}

/// Identity backend that calls an external identity service.
pub struct HttpIdentity {
	client: reqwest::Client,
	current_user_url: String,
}

impl HttpIdentity {
	pub fn new(
		auth_url: &str,
		current_user_path: &str,
		timeout: Duration,
	) -> Result<Self, IdentityError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| IdentityError::Configuration(e.to_string()))?;
		Ok(Self {
			client,
			current_user_url: format!(
				"{}/{}",
				auth_url.trim_end_matches('/'),
				current_user_path.trim_start_matches('/')
			),
		})
	}
}

#[async_trait]
impl IdentityInterface for HttpIdentity {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpIdentitySchema)
	}

	async fn resolve_actor(&self, credential: &Credential) -> Result<Actor, IdentityError> {
		let response = self
			.client
			.get(&self.current_user_url)
			.bearer_auth(credential.expose_secret())
			.send()
			.await
			.map_err(|e| IdentityError::Backend(e.to_string()))?;

		match response.status() {
			status if status.is_success() => {},
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
				return Err(IdentityError::Unauthenticated("invalid token".into()))
			},
			status => {
				tracing::warn!(url = %self.current_user_url, %status, "Identity service failed");
				return Err(IdentityError::Backend(format!(
					"identity service answered {}",
					status
				)));
			},
		}

		let user: CurrentUser = response
			.json()
			.await
			.map_err(|e| IdentityError::Backend(format!("invalid identity response: {}", e)))?;

		if !user.enabled {
			return Err(IdentityError::Forbidden("user disabled".into()));
		}

		tracing::debug!(
			actor_id = %user.id,
			login = user.login.as_deref().unwrap_or("-"),
			"Identity service accepted credential"
		);
		Ok(Actor::new(user.id, role_from_permissions(&user.permissions)))
	}
}

/// Configuration schema for HttpIdentity.
pub struct HttpIdentitySchema;

impl ConfigSchema for HttpIdentitySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("auth_url", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
						Ok(())
					},
					_ => Err("auth_url must be an http(s) URL".to_string()),
				}
			})],
			vec![
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
				Field::new("current_user_path", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create an HTTP identity backend.
///
/// Configuration parameters:
/// - `auth_url`: Base URL of the identity service (required)
/// - `timeout_seconds`: Request timeout (default: 5)
/// - `current_user_path`: Path of the current-user endpoint (default: "/users/current")
pub fn create_identity(config: &toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError> {
	HttpIdentitySchema
		.validate(config)
		.map_err(|e| IdentityError::Configuration(e.to_string()))?;

	let auth_url = config
		.get("auth_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| IdentityError::Configuration("auth_url is required".into()))?;
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
	let path = config
		.get("current_user_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_CURRENT_USER_PATH);

	Ok(Box::new(HttpIdentity::new(
		auth_url,
		path,
		Duration::from_secs(timeout),
	)?))
}

/// Registry for the HTTP identity implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = IdentityFactory;

	fn factory() -> Self::Factory {
		create_identity
	}
}

impl IdentityRegistry for Registry {}

//! Configuration module for the order status system.
//!
//! This module provides structures and utilities for managing service configuration.
//! It supports loading configuration from TOML files and validates the result so
//! that storage, identity and catalog settings are consistent before the engine
//! is built.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

#[cfg(feature = "testing")]
pub mod builders {
	pub mod config;
}

use regex::Regex;
use serde::{Deserialize, Serialize};
use status_types::{TransitionRules, DEFAULT_INITIAL_STATUS, DEFAULT_STATUSES};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Only the message, not the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the order status service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to the service instance.
	pub service: ServiceConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the identity collaborator.
	pub identity: IdentityConfig,
	/// Status catalog seeding and the initial status.
	#[serde(default)]
	pub catalog: CatalogConfig,
	/// Terminal and role-gated statuses. Replaces the built-in rules when present.
	#[serde(default)]
	pub transitions: TransitionRules,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier for this service instance, used in logs.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the identity collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of identity implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Status catalog configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
	/// Status name used when initialization names no status.
	#[serde(default = "default_initial_status")]
	pub initial_status: String,
	/// Statuses seeded into an empty catalog, in catalog order.
	#[serde(default = "default_statuses")]
	pub defaults: Vec<String>,
	/// Whether the service seeds the catalog on every start.
	#[serde(default = "default_seed_on_start")]
	pub seed_on_start: bool,
}

impl Default for CatalogConfig {
	fn default() -> Self {
		Self {
			initial_status: default_initial_status(),
			defaults: default_statuses(),
			seed_on_start: default_seed_on_start(),
		}
	}
}

fn default_initial_status() -> String {
	DEFAULT_INITIAL_STATUS.to_string()
}

fn default_statuses() -> Vec<String> {
	DEFAULT_STATUSES.iter().map(|s| s.to_string()).collect()
}

fn default_seed_on_start() -> bool {
	true
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, resolving environment variables and includes.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf
			.parent()
			.filter(|p| !p.as_os_str().is_empty())
			.unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Service ID is not empty
	/// - Storage and identity primaries name a configured implementation
	/// - The initial status is one of the seeded defaults, which are unique
	/// - No transition rule makes its status unreachable
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		validate_primary(
			"storage",
			&self.storage.primary,
			&self.storage.implementations,
		)?;
		validate_primary(
			"identity",
			&self.identity.primary,
			&self.identity.implementations,
		)?;

		self.validate_catalog()?;
		self.validate_transitions()
	}

	fn validate_catalog(&self) -> Result<(), ConfigError> {
		let catalog = &self.catalog;
		if catalog.initial_status.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Catalog initial_status cannot be empty".into(),
			));
		}
		if catalog.defaults.is_empty() {
			return Err(ConfigError::Validation(
				"Catalog defaults must list at least one status".into(),
			));
		}

		let mut seen = HashSet::new();
		for name in &catalog.defaults {
			if name.trim().is_empty() {
				return Err(ConfigError::Validation(
					"Catalog defaults cannot contain empty names".into(),
				));
			}
			if !seen.insert(name.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate catalog default '{}'",
					name
				)));
			}
		}

		if !seen.contains(catalog.initial_status.as_str()) {
			return Err(ConfigError::Validation(format!(
				"Catalog initial_status '{}' is not among the catalog defaults",
				catalog.initial_status
			)));
		}
		Ok(())
	}

	fn validate_transitions(&self) -> Result<(), ConfigError> {
		for (name, rule) in &self.transitions.statuses {
			if rule
				.allowed_roles
				.as_ref()
				.is_some_and(|roles| roles.is_empty())
			{
				return Err(ConfigError::Validation(format!(
					"Transition rule for '{}' allows no roles; omit allowed_roles to allow all",
					name
				)));
			}
			if rule.forbidden_from.contains(name) {
				return Err(ConfigError::Validation(format!(
					"Transition rule for '{}' cannot forbid entering from itself",
					name
				)));
			}
		}
		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses TOML, resolving environment variables and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use status_types::{ActorRole, CANCELLED, DELIVERED};

	const MINIMAL: &str = r#"
[service]
id = "order-status-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[identity]
primary = "static"
[identity.implementations.static]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("STATUS_CFG_TEST_HOST", "localhost");
		std::env::set_var("STATUS_CFG_TEST_PORT", "5432");

		let input = "host = \"${STATUS_CFG_TEST_HOST}:${STATUS_CFG_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("STATUS_CFG_TEST_HOST");
		std::env::remove_var("STATUS_CFG_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "path = \"${STATUS_CFG_SURELY_MISSING:-./data/storage}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "path = \"./data/storage\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let result = resolve_env_vars("value = \"${STATUS_CFG_SURELY_MISSING}\"");
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("STATUS_CFG_SURELY_MISSING"));
	}

	#[test]
	fn test_minimal_config_uses_defaults() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.service.id, "order-status-test");
		assert_eq!(config.catalog.initial_status, "Pending");
		assert_eq!(config.catalog.defaults.len(), DEFAULT_STATUSES.len());
		assert!(config.catalog.seed_on_start);
		assert!(config.transitions.is_terminal(DELIVERED));
		assert!(config.transitions.is_terminal(CANCELLED));
	}

	#[test]
	fn test_transitions_section_replaces_builtin_rules() {
		let input = format!(
			"{}\n{}",
			MINIMAL,
			r#"
[transitions.statuses.Returned]
terminal = true
allowed_roles = ["admin"]
forbidden_from = ["Pending"]
"#
		);
		let config: Config = input.parse().unwrap();
		assert!(config.transitions.is_terminal("Returned"));
		assert!(!config.transitions.is_terminal(DELIVERED));

		let rule = config.transitions.rule("Returned").unwrap();
		assert!(rule.permits_role(ActorRole::Admin));
		assert!(!rule.permits_role(ActorRole::Client));
		assert!(rule.forbids_from("Pending"));
	}

	#[test]
	fn test_empty_allowed_roles_rejected() {
		let input = format!(
			"{}\n{}",
			MINIMAL,
			r#"
[transitions.statuses.Cancelled]
allowed_roles = []
"#
		);
		let result = input.parse::<Config>();
		assert!(result.unwrap_err().to_string().contains("allows no roles"));
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let input = MINIMAL.replace("primary = \"memory\"", "primary = \"file\"");
		let result = input.parse::<Config>();
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Primary storage 'file' not found"));
	}

	#[test]
	fn test_initial_status_must_be_seeded() {
		let input = format!(
			"{}\n{}",
			MINIMAL,
			r#"
[catalog]
initial_status = "Nuevo"
defaults = ["Pending", "Shipped"]
"#
		);
		let result = input.parse::<Config>();
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("not among the catalog defaults"));
	}

	#[test]
	fn test_duplicate_catalog_defaults_rejected() {
		let input = format!(
			"{}\n{}",
			MINIMAL,
			r#"
[catalog]
defaults = ["Pending", "Shipped", "Pending"]
"#
		);
		let result = input.parse::<Config>();
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Duplicate catalog default 'Pending'"));
	}

	#[test]
	fn test_parse_error_is_reported_without_input_dump() {
		let result = "[service\nid = 1".parse::<Config>();
		assert!(matches!(result, Err(ConfigError::Parse(_))));
	}
}

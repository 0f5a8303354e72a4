//! Actors that perform status transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The capacity in which an actor performs a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
	/// The customer who owns the order.
	Client,
	/// The merchant fulfilling the order.
	Seller,
	/// An operator with administrative permissions.
	Admin,
	/// The service itself, used for the initializing history entry.
	System,
}

impl ActorRole {
	pub fn as_str(&self) -> &'static str {
		match self {
			ActorRole::Client => "client",
			ActorRole::Seller => "seller",
			ActorRole::Admin => "admin",
			ActorRole::System => "system",
		}
	}
}

impl fmt::Display for ActorRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a role name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown actor role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for ActorRole {
	type Err = UnknownRole;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"client" => Ok(Self::Client),
			"seller" => Ok(Self::Seller),
			"admin" => Ok(Self::Admin),
			"system" => Ok(Self::System),
			_ => Err(UnknownRole(s.to_string())),
		}
	}
}

/// A resolved identity: who is acting and in what role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
	pub id: String,
	pub role: ActorRole,
}

impl Actor {
	pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
		Self {
			id: id.into(),
			role,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_role_parse_and_display() {
		assert_eq!("Admin".parse::<ActorRole>().unwrap(), ActorRole::Admin);
		assert_eq!(" seller ".parse::<ActorRole>().unwrap(), ActorRole::Seller);
		assert_eq!(ActorRole::Client.to_string(), "client");
		assert!("courier".parse::<ActorRole>().is_err());
	}

	#[test]
	fn test_role_serde_is_lowercase() {
		let json = serde_json::to_string(&ActorRole::System).unwrap();
		assert_eq!(json, "\"system\"");
		let role: ActorRole = serde_json::from_str("\"client\"").unwrap();
		assert_eq!(role, ActorRole::Client);
	}
}

//! Order status transition engine.
//!
//! This crate holds the only real logic of the system: the status catalog,
//! the order-status repository, the transition state machine that decides
//! whether a status change is legal, the idempotent initialization flow and
//! the read-only query layer. [`StatusEngine`] ties them together and is the
//! surface every outer layer calls.

use status_identity::IdentityError;
use status_storage::StorageError;
use status_types::TransitionViolation;
use thiserror::Error;

pub mod builder;
pub mod catalog;
pub mod engine;
pub mod repository;
pub mod state;

pub use builder::{BuilderError, StatusBuilder, StatusFactories};
pub use catalog::{StatusCatalog, StoredCatalog};
pub use engine::StatusEngine;
pub use repository::{OrderStatusRepository, StoredRepository, TransitionGuard};
pub use state::order::{OrderStateMachine, Transition};

/// Errors returned by engine operations.
///
/// Every failure surfaces as exactly one of these kinds so the boundary
/// layer can map it to a transport-specific response.
#[derive(Debug, Error)]
pub enum EngineError {
	/// A catalog reference could not be resolved.
	#[error("Invalid status: {0}")]
	InvalidStatus(String),
	/// No such record or catalog entry.
	#[error("Not found: {0}")]
	NotFound(String),
	/// Duplicate order on create, duplicate name on catalog add.
	#[error("Conflict: {0}")]
	Conflict(String),
	/// The transition is refused by the state machine.
	#[error("Illegal transition: {0}")]
	IllegalTransition(TransitionViolation),
	#[error("Unauthenticated: {0}")]
	Unauthenticated(String),
	#[error("Forbidden: {0}")]
	Forbidden(String),
	/// Repository or backend failure.
	#[error("Storage error: {0}")]
	Store(String),
}

impl From<StorageError> for EngineError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::NotFound => EngineError::NotFound("entry not found".into()),
			StorageError::Conflict(key) => EngineError::Conflict(key),
			other => EngineError::Store(other.to_string()),
		}
	}
}

impl From<IdentityError> for EngineError {
	fn from(err: IdentityError) -> Self {
		match err {
			IdentityError::Unauthenticated(msg) => EngineError::Unauthenticated(msg),
			IdentityError::Forbidden(msg) => EngineError::Forbidden(msg),
			other => EngineError::Store(other.to_string()),
		}
	}
}

impl From<TransitionViolation> for EngineError {
	fn from(violation: TransitionViolation) -> Self {
		EngineError::IllegalTransition(violation)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_storage_error_mapping() {
		assert!(matches!(
			EngineError::from(StorageError::NotFound),
			EngineError::NotFound(_)
		));
		assert!(matches!(
			EngineError::from(StorageError::Conflict("records:O1".into())),
			EngineError::Conflict(key) if key == "records:O1"
		));
		assert!(matches!(
			EngineError::from(StorageError::Backend("disk full".into())),
			EngineError::Store(_)
		));
	}

	#[test]
	fn test_identity_error_mapping() {
		assert!(matches!(
			EngineError::from(IdentityError::Unauthenticated("invalid token".into())),
			EngineError::Unauthenticated(_)
		));
		assert!(matches!(
			EngineError::from(IdentityError::Forbidden("user disabled".into())),
			EngineError::Forbidden(_)
		));
		assert!(matches!(
			EngineError::from(IdentityError::Backend("timeout".into())),
			EngineError::Store(_)
		));
	}
}

//! Order status state machine.
//!
//! Status names come from the open catalog; the transition rules attach
//! fixed semantics to a few of them. A proposed change is evaluated in a
//! fixed order:
//!
//! 1. Moving to the status already held is a no-op that always succeeds.
//! 2. Nothing may leave a terminal status.
//! 3. Governed destinations may only be entered by the roles they allow.
//! 4. Governed destinations may not be entered from their forbidden statuses.
//!
//! Every other change between catalog statuses is allowed for any role.

use crate::{EngineError, OrderStatusRepository};
use status_storage::Updated;
use status_types::{
	truncate_id, Actor, OrderStatusRecord, StatusCatalogEntry, StatusEntry, TransitionRules,
	TransitionViolation,
};
use std::sync::Arc;

/// Outcome of evaluating a legal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
	/// The record already holds the target status.
	Unchanged,
	/// The record moves to the target status.
	Allowed,
}

/// Evaluates transitions against the rules and applies accepted ones.
pub struct OrderStateMachine {
	repository: Arc<dyn OrderStatusRepository>,
	rules: TransitionRules,
}

impl OrderStateMachine {
	pub fn new(repository: Arc<dyn OrderStatusRepository>, rules: TransitionRules) -> Self {
		Self { repository, rules }
	}

	pub fn rules(&self) -> &TransitionRules {
		&self.rules
	}

	/// Decides whether `actor` may move `record` to `target`.
	pub fn check(
		&self,
		record: &OrderStatusRecord,
		target: &StatusCatalogEntry,
		actor: &Actor,
	) -> Result<Transition, TransitionViolation> {
		if record.status_id == target.id {
			return Ok(Transition::Unchanged);
		}

		if self.rules.is_terminal(&record.status) {
			return Err(TransitionViolation::TerminalState {
				current: record.status.clone(),
			});
		}

		let Some(rule) = self.rules.rule(&target.name) else {
			return Ok(Transition::Allowed);
		};
		if !rule.permits_role(actor.role) {
			return Err(TransitionViolation::RoleNotPermitted {
				target: target.name.clone(),
				role: actor.role,
			});
		}
		if rule.forbids_from(&record.status) {
			return Err(TransitionViolation::ForbiddenFrom {
				target: target.name.clone(),
				current: record.status.clone(),
			});
		}

		Ok(Transition::Allowed)
	}

	/// Moves `record` to `target` if the rules allow it.
	///
	/// The rules are checked on `record` first and then again on the stored
	/// record right before it is overwritten, so a concurrent change is
	/// never bypassed. Returns the record unchanged for a no-op, otherwise
	/// the persisted record re-read after the atomic update.
	pub async fn transition(
		&self,
		record: OrderStatusRecord,
		target: &StatusCatalogEntry,
		actor: &Actor,
		reason: Option<String>,
	) -> Result<OrderStatusRecord, EngineError> {
		match self.check(&record, target, actor) {
			Ok(Transition::Unchanged) => {
				tracing::debug!(
					record_id = %truncate_id(&record.id),
					status = %record.status,
					"Record already in requested status"
				);
				return Ok(record);
			},
			Ok(Transition::Allowed) => {},
			Err(violation) => {
				self.log_rejected(&record, target, actor, &violation);
				return Err(violation.into());
			},
		}

		let guard = |stored: &OrderStatusRecord| -> Result<bool, EngineError> {
			match self.check(stored, target, actor)? {
				Transition::Unchanged => Ok(false),
				Transition::Allowed => Ok(true),
			}
		};
		let entry = StatusEntry::new(&target.name, actor, reason);
		let outcome = self
			.repository
			.atomic_set_status_and_append_history(
				&record.id,
				&target.id,
				&target.name,
				entry,
				&guard,
			)
			.await;

		match outcome {
			Ok(Updated::Written(_)) => {},
			Ok(Updated::Unchanged(current)) => {
				tracing::debug!(
					record_id = %truncate_id(&current.id),
					status = %current.status,
					"Record reached requested status concurrently"
				);
				return Ok(current);
			},
			Err(EngineError::IllegalTransition(violation)) => {
				// The record moved on since it was read
				self.log_rejected(&record, target, actor, &violation);
				return Err(violation.into());
			},
			Err(e) => return Err(e),
		}

		let updated = self.repository.get(&record.id).await?;
		tracing::info!(
			record_id = %truncate_id(&updated.id),
			order_id = %truncate_id(&updated.order_id),
			from = %record.status,
			to = %target.name,
			actor_id = %actor.id,
			role = %actor.role,
			"Status changed"
		);
		Ok(updated)
	}

	fn log_rejected(
		&self,
		record: &OrderStatusRecord,
		target: &StatusCatalogEntry,
		actor: &Actor,
		violation: &TransitionViolation,
	) {
		tracing::warn!(
			record_id = %truncate_id(&record.id),
			from = %record.status,
			to = %target.name,
			actor_id = %actor.id,
			role = %actor.role,
			reason = %violation,
			"Rejected status transition"
		);
	}
}

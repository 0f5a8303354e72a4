//! Built-in semantics attached to specific status names.
//!
//! The catalog is open-ended, but a few names behave specially: some are
//! terminal, and entering some of them is restricted by actor role and by
//! the status the order is currently in. Those rules live here as data so
//! they can be audited and replaced from configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::ActorRole;

pub const PENDING: &str = "Pending";
pub const PREPARING: &str = "Preparing";
pub const SHIPPED: &str = "Shipped";
pub const DELIVERED: &str = "Delivered";
pub const CANCELLED: &str = "Cancelled";
pub const REJECTED: &str = "Rejected";

/// Status every new record starts in unless told otherwise.
pub const DEFAULT_INITIAL_STATUS: &str = PENDING;

/// Catalog contents seeded into an empty catalog, in catalog order.
pub const DEFAULT_STATUSES: [&str; 6] = [PENDING, PREPARING, SHIPPED, DELIVERED, CANCELLED, REJECTED];

/// Rules for entering (and leaving) one status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusRule {
	/// No transition may leave this status.
	pub terminal: bool,
	/// Roles allowed to enter this status; `None` allows every role.
	pub allowed_roles: Option<BTreeSet<ActorRole>>,
	/// Current statuses from which this status may not be entered.
	pub forbidden_from: BTreeSet<String>,
}

impl StatusRule {
	pub fn terminal() -> Self {
		Self {
			terminal: true,
			..Self::default()
		}
	}

	pub fn allow_roles(mut self, roles: impl IntoIterator<Item = ActorRole>) -> Self {
		self.allowed_roles = Some(roles.into_iter().collect());
		self
	}

	pub fn forbid_from<I, S>(mut self, statuses: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.forbidden_from = statuses.into_iter().map(Into::into).collect();
		self
	}

	pub fn permits_role(&self, role: ActorRole) -> bool {
		self.allowed_roles
			.as_ref()
			.is_none_or(|roles| roles.contains(&role))
	}

	pub fn forbids_from(&self, current: &str) -> bool {
		self.forbidden_from.contains(current)
	}
}

/// Status name to rule mapping. Names without a rule are non-terminal and
/// may be entered by any role from any non-terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRules {
	#[serde(default)]
	pub statuses: BTreeMap<String, StatusRule>,
}

impl TransitionRules {
	/// Rules with no governed statuses at all.
	pub fn empty() -> Self {
		Self {
			statuses: BTreeMap::new(),
		}
	}

	/// The built-in rule set:
	/// - `Delivered` is terminal.
	/// - `Cancelled` is terminal, clients only, not after shipping.
	/// - `Rejected` is terminal, admins and sellers only, not after
	///   shipping or cancellation.
	pub fn builtin() -> Self {
		Self::empty()
			.with_rule(DELIVERED, StatusRule::terminal())
			.with_rule(
				CANCELLED,
				StatusRule::terminal()
					.allow_roles([ActorRole::Client])
					.forbid_from([SHIPPED, DELIVERED, REJECTED]),
			)
			.with_rule(
				REJECTED,
				StatusRule::terminal()
					.allow_roles([ActorRole::Admin, ActorRole::Seller])
					.forbid_from([SHIPPED, CANCELLED]),
			)
	}

	pub fn with_rule(mut self, status: impl Into<String>, rule: StatusRule) -> Self {
		self.statuses.insert(status.into(), rule);
		self
	}

	pub fn rule(&self, status: &str) -> Option<&StatusRule> {
		self.statuses.get(status)
	}

	pub fn is_terminal(&self, status: &str) -> bool {
		self.rule(status).is_some_and(|rule| rule.terminal)
	}

	pub fn terminal_statuses(&self) -> impl Iterator<Item = &str> {
		self.statuses
			.iter()
			.filter(|(_, rule)| rule.terminal)
			.map(|(name, _)| name.as_str())
	}
}

impl Default for TransitionRules {
	fn default() -> Self {
		Self::builtin()
	}
}

/// Why a proposed transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionViolation {
	/// The record is in a terminal status.
	TerminalState { current: String },
	/// The actor's role may not enter the target status.
	RoleNotPermitted { target: String, role: ActorRole },
	/// The target status may not be entered from the current one.
	ForbiddenFrom { target: String, current: String },
}

impl fmt::Display for TransitionViolation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransitionViolation::TerminalState { current } => {
				write!(f, "cannot change status from terminal state '{}'", current)
			},
			TransitionViolation::RoleNotPermitted { target, role } => {
				write!(f, "role '{}' may not change status to '{}'", role, target)
			},
			TransitionViolation::ForbiddenFrom { target, current } => {
				write!(
					f,
					"cannot change status to '{}' when current status is '{}'",
					target, current
				)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builtin_terminal_statuses() {
		let rules = TransitionRules::builtin();
		let terminal: Vec<&str> = rules.terminal_statuses().collect();
		assert_eq!(terminal, vec![CANCELLED, DELIVERED, REJECTED]);
		assert!(!rules.is_terminal(PENDING));
		assert!(!rules.is_terminal("Returned"));
	}

	#[test]
	fn test_builtin_role_gates() {
		let rules = TransitionRules::builtin();
		let cancelled = rules.rule(CANCELLED).unwrap();
		assert!(cancelled.permits_role(ActorRole::Client));
		assert!(!cancelled.permits_role(ActorRole::Admin));
		assert!(cancelled.forbids_from(SHIPPED));
		assert!(!cancelled.forbids_from(PREPARING));

		let rejected = rules.rule(REJECTED).unwrap();
		assert!(rejected.permits_role(ActorRole::Seller));
		assert!(rejected.permits_role(ActorRole::Admin));
		assert!(!rejected.permits_role(ActorRole::Client));
		assert!(rejected.forbids_from(CANCELLED));

		assert!(rules.rule(DELIVERED).unwrap().permits_role(ActorRole::System));
	}

	#[test]
	fn test_rules_from_toml() {
		let rules: TransitionRules = toml::from_str(
			r#"
[statuses.Archived]
terminal = true

[statuses.Refunded]
allowed_roles = ["admin"]
forbidden_from = ["Pending"]
"#,
		)
		.unwrap();

		assert!(rules.is_terminal("Archived"));
		assert!(!rules.is_terminal(CANCELLED));
		let refunded = rules.rule("Refunded").unwrap();
		assert!(!refunded.terminal);
		assert!(refunded.permits_role(ActorRole::Admin));
		assert!(!refunded.permits_role(ActorRole::Client));
		assert!(refunded.forbids_from(PENDING));
	}

	#[test]
	fn test_violation_messages() {
		let violation = TransitionViolation::TerminalState {
			current: DELIVERED.to_string(),
		};
		assert_eq!(
			violation.to_string(),
			"cannot change status from terminal state 'Delivered'"
		);
	}
}

//! Order status records and their history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Actor, ActorRole};

/// Reason recorded on the history entry created by initialization.
pub const INITIAL_REASON: &str = "initial";

/// Address and contact snapshot captured when the record is initialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingInfo {
	pub address_line1: Option<String>,
	pub address_line2: Option<String>,
	pub city: Option<String>,
	pub province: Option<String>,
	pub country: Option<String>,
	pub zipcode: Option<String>,
	pub comments: Option<String>,
}

/// One immutable line of a record's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
	pub id: String,
	/// Name of the status entered.
	pub status: String,
	pub actor_id: String,
	pub actor_role: ActorRole,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	pub at: DateTime<Utc>,
}

impl StatusEntry {
	/// Creates an entry stamped with the current time.
	pub fn new(status: impl Into<String>, actor: &Actor, reason: Option<String>) -> Self {
		Self {
			id: crate::new_id(),
			status: status.into(),
			actor_id: actor.id.clone(),
			actor_role: actor.role,
			reason,
			at: Utc::now(),
		}
	}
}

/// The current status and full history of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusRecord {
	pub id: String,
	/// External order reference; at most one record exists per order.
	pub order_id: String,
	/// The order's owner.
	pub user_id: String,
	pub status_id: String,
	/// Denormalized name of `status_id`, written together with it.
	pub status: String,
	#[serde(default)]
	pub shipping: ShippingInfo,
	/// Append-only; never empty once the record exists.
	pub history: Vec<StatusEntry>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl OrderStatusRecord {
	/// Builds a new record whose history holds the initializing entry.
	pub fn initial(
		order_id: impl Into<String>,
		user_id: impl Into<String>,
		shipping: ShippingInfo,
		status_id: impl Into<String>,
		status: impl Into<String>,
	) -> Self {
		let user_id = user_id.into();
		let status = status.into();
		let system = Actor::new(user_id.clone(), ActorRole::System);
		let entry = StatusEntry::new(status.clone(), &system, Some(INITIAL_REASON.to_string()));
		let now = entry.at;
		Self {
			id: crate::new_id(),
			order_id: order_id.into(),
			user_id,
			status_id: status_id.into(),
			status,
			shipping,
			history: vec![entry],
			created_at: now,
			updated_at: now,
		}
	}

	/// Moves the record to a new status and appends the matching history entry.
	///
	/// The status fields, the history and `updated_at` change together.
	pub fn apply_transition(&mut self, status_id: &str, status: &str, entry: StatusEntry) {
		self.status_id = status_id.to_string();
		self.status = status.to_string();
		self.updated_at = entry.at;
		self.history.push(entry);
	}

	pub fn last_entry(&self) -> Option<&StatusEntry> {
		self.history.last()
	}
}

/// Conjunctive filter over records; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
	pub user_id: Option<String>,
	pub status: Option<String>,
	pub status_id: Option<String>,
}

impl RecordFilter {
	pub fn all() -> Self {
		Self::default()
	}

	pub fn by_user(user_id: impl Into<String>) -> Self {
		Self {
			user_id: Some(user_id.into()),
			..Self::default()
		}
	}

	pub fn by_status(status: impl Into<String>) -> Self {
		Self {
			status: Some(status.into()),
			..Self::default()
		}
	}

	pub fn by_status_id(status_id: impl Into<String>) -> Self {
		Self {
			status_id: Some(status_id.into()),
			..Self::default()
		}
	}

	pub fn matches(&self, record: &OrderStatusRecord) -> bool {
		self.user_id.as_ref().is_none_or(|u| *u == record.user_id)
			&& self.status.as_ref().is_none_or(|s| *s == record.status)
			&& self
				.status_id
				.as_ref()
				.is_none_or(|id| *id == record.status_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_initial_record_has_one_system_entry() {
		let record = OrderStatusRecord::initial("O1", "U1", ShippingInfo::default(), "s1", "Pending");
		assert_eq!(record.history.len(), 1);
		let entry = record.last_entry().unwrap();
		assert_eq!(entry.status, "Pending");
		assert_eq!(entry.actor_id, "U1");
		assert_eq!(entry.actor_role, ActorRole::System);
		assert_eq!(entry.reason.as_deref(), Some(INITIAL_REASON));
		assert_eq!(record.created_at, record.updated_at);
	}

	#[test]
	fn test_apply_transition_updates_fields_together() {
		let mut record =
			OrderStatusRecord::initial("O1", "U1", ShippingInfo::default(), "s1", "Pending");
		let entry = StatusEntry::new("Shipped", &Actor::new("S1", ActorRole::Seller), None);
		let at = entry.at;
		record.apply_transition("s2", "Shipped", entry);

		assert_eq!(record.status_id, "s2");
		assert_eq!(record.status, "Shipped");
		assert_eq!(record.updated_at, at);
		assert_eq!(record.history.len(), 2);
	}

	#[test]
	fn test_filter_matches() {
		let record = OrderStatusRecord::initial("O1", "U1", ShippingInfo::default(), "s1", "Pending");
		assert!(RecordFilter::all().matches(&record));
		assert!(RecordFilter::by_user("U1").matches(&record));
		assert!(!RecordFilter::by_user("U2").matches(&record));
		assert!(RecordFilter::by_status("Pending").matches(&record));
		assert!(!RecordFilter::by_status_id("s2").matches(&record));

		let filter = RecordFilter {
			user_id: Some("U1".into()),
			status: Some("Shipped".into()),
			status_id: None,
		};
		assert!(!filter.matches(&record));
	}

	#[test]
	fn test_shipping_defaults_when_missing() {
		let shipping: ShippingInfo = serde_json::from_str(r#"{"city":"Quito"}"#).unwrap();
		assert_eq!(shipping.city.as_deref(), Some("Quito"));
		assert!(shipping.country.is_none());
	}
}

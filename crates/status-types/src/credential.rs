//! Bearer credential wrapper.
//!
//! Credentials are opaque to this system: they are only ever handed to the
//! identity collaborator. The wrapper zeroes its memory on drop and never
//! shows the raw value in logs or debug output.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

const REDACTED: &str = "***REDACTED***";

/// An opaque bearer credential, such as an API token.
#[derive(Clone)]
pub struct Credential(Zeroizing<String>);

impl Credential {
	pub fn new(s: String) -> Self {
		Self(Zeroizing::new(s))
	}

	/// Parses an `Authorization` header value, stripping a `Bearer ` prefix.
	pub fn from_authorization_header(header: &str) -> Self {
		let header = header.trim();
		let token = match header.get(..6) {
			Some(scheme)
				if scheme.eq_ignore_ascii_case("bearer")
					&& header[6..].chars().next().is_none_or(char::is_whitespace) =>
			{
				&header[6..]
			},
			_ => header,
		};
		Self::new(token.trim().to_string())
	}

	/// Exposes the raw credential.
	///
	/// Only identity backends should call this, and never to log the value.
	pub fn expose_secret(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Debug for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Credential({})", REDACTED)
	}
}

impl fmt::Display for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<String> for Credential {
	fn from(s: String) -> Self {
		Self::new(s)
	}
}

impl From<&str> for Credential {
	fn from(s: &str) -> Self {
		Self::new(s.to_string())
	}
}

impl PartialEq for Credential {
	fn eq(&self, other: &Self) -> bool {
		self.0.as_str() == other.0.as_str()
	}
}

impl Eq for Credential {}

// Serialization always redacts; credentials are only ever read from config.
impl Serialize for Credential {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(REDACTED)
	}
}

impl<'de> Deserialize<'de> for Credential {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(Credential::new(s))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_credential_is_redacted() {
		let credential = Credential::from("tok-123");
		assert_eq!(format!("{:?}", credential), "Credential(***REDACTED***)");
		assert_eq!(format!("{}", credential), "***REDACTED***");
		assert_eq!(
			serde_json::to_string(&credential).unwrap(),
			"\"***REDACTED***\""
		);
		assert_eq!(credential.expose_secret(), "tok-123");
	}

	#[test]
	fn test_from_authorization_header() {
		assert_eq!(
			Credential::from_authorization_header("Bearer abc ").expose_secret(),
			"abc"
		);
		assert_eq!(
			Credential::from_authorization_header("abc").expose_secret(),
			"abc"
		);
		assert!(Credential::from_authorization_header("Bearer ").is_empty());
	}
}

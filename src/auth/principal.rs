//! Roles and the principal produced by a successful login.

// std
use std::borrow::Borrow;
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, TokenSecret},
};

/// Raw JSON claims (ID token body, access token body, or user-info document).
pub type Claims = JsonMap<String, JsonValue>;

/// Deduplicated, ordered set of resolved roles.
pub type RoleSet = BTreeSet<Role>;

/// Single role granted to a principal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);
impl Role {
	/// Wraps a role name; surrounding whitespace is trimmed.
	pub fn new(name: impl AsRef<str>) -> Self {
		Self(name.as_ref().trim().to_owned())
	}

	/// Role name.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl From<&str> for Role {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl Borrow<str> for Role {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl Debug for Role {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Role({})", self.0)
	}
}
impl Display for Role {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Decoded and validated OpenID Connect ID token.
#[derive(Clone, Debug)]
pub struct IdToken {
	/// Compact serialization, kept for `id_token_hint` on logout.
	pub raw: TokenSecret,
	/// Verified body claims.
	pub claims: Claims,
}
impl IdToken {
	/// Subject (`sub`) claim, when present.
	pub fn subject(&self) -> Option<&str> {
		self.claims.get("sub").and_then(JsonValue::as_str)
	}
}

/// Identity handed to the hosting security layer after a successful login.
///
/// A fresh value is built for every login and never cached by the broker.
#[derive(Clone, Debug)]
pub struct AuthenticatedPrincipal {
	/// Provider the user authenticated against.
	pub provider: ProviderId,
	/// User name read from the provider's user-name attribute.
	pub username: String,
	/// Merged user attributes (ID token claims overlaid with user-info for OIDC).
	pub attributes: Claims,
	/// Roles resolved for this login.
	pub roles: RoleSet,
	/// ID token for OIDC logins.
	pub id_token: Option<IdToken>,
	/// User-info claims, when the endpoint was called.
	pub user_info: Option<Claims>,
}
impl AuthenticatedPrincipal {
	/// Returns true when the principal carries the named role.
	pub fn has_role(&self, role: &str) -> bool {
		self.roles.contains(role)
	}

	/// Looks up a string attribute.
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.get(name).and_then(JsonValue::as_str)
	}
}

/// Renders an attribute value as the user name.
///
/// Strings are used as-is; numbers (GitHub's numeric `id`) and booleans are stringified.
pub fn attribute_as_username(value: &JsonValue) -> Option<String> {
	match value {
		JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
		JsonValue::Number(n) => Some(n.to_string()),
		JsonValue::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

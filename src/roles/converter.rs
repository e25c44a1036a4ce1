//! Raw claim and header values to roles.

// self
use crate::{
	_prelude::*,
	auth::{Role, RoleSet},
};

/// Converts a raw header value into roles.
pub trait RoleConverter
where
	Self: Send + Sync,
{
	/// Roles carried by `raw`.
	fn convert(&self, raw: &str) -> RoleSet;
}

/// Splits on a delimiter (`;` by default) and renames mapped entries.
///
/// Entries without a mapping pass through unchanged.
#[derive(Clone, Debug)]
pub struct DelimitedRoleConverter {
	delimiter: char,
	mappings: BTreeMap<String, String>,
}
impl DelimitedRoleConverter {
	/// Converter splitting on `delimiter`.
	pub fn with_delimiter(delimiter: char) -> Self {
		Self { delimiter, mappings: BTreeMap::new() }
	}

	/// Maps the external name `external` to `role`.
	pub fn with_mapping(mut self, external: impl Into<String>, role: impl Into<String>) -> Self {
		self.mappings.insert(external.into(), role.into());

		self
	}
}
impl Default for DelimitedRoleConverter {
	fn default() -> Self {
		Self::with_delimiter(';')
	}
}
impl RoleConverter for DelimitedRoleConverter {
	fn convert(&self, raw: &str) -> RoleSet {
		raw.split(self.delimiter)
			.map(str::trim)
			.filter(|name| !name.is_empty())
			.map(|name| Role::new(self.mappings.get(name).map(String::as_str).unwrap_or(name)))
			.collect()
	}
}

/// Roles carried by a claim value.
///
/// Strings split on whitespace and commas; arrays are flattened, including nested ones.
/// Numbers and booleans are stringified. `None` and `null` give an empty set.
pub fn claim_roles(value: Option<&JsonValue>) -> RoleSet {
	let mut roles = RoleSet::new();

	if let Some(value) = value {
		collect_claim_roles(value, &mut roles);
	}

	roles
}

fn collect_claim_roles(value: &JsonValue, roles: &mut RoleSet) {
	match value {
		JsonValue::String(s) => roles.extend(
			s.split(|c: char| c.is_whitespace() || c == ',')
				.filter(|name| !name.is_empty())
				.map(Role::new),
		),
		JsonValue::Array(values) =>
			values.iter().for_each(|value| collect_claim_roles(value, roles)),
		JsonValue::Number(n) => {
			roles.insert(Role::new(n.to_string()));
		},
		JsonValue::Bool(b) => {
			roles.insert(Role::new(b.to_string()));
		},
		JsonValue::Null | JsonValue::Object(_) => {},
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn names(roles: &RoleSet) -> Vec<&str> {
		roles.iter().map(Role::as_str).collect()
	}

	#[test]
	fn list_claims_are_flattened() {
		assert_eq!(names(&claim_roles(Some(&json!(["admin", "user"])))), ["admin", "user"]);
		assert_eq!(names(&claim_roles(Some(&json!([["a"], "b", 7])))), ["7", "a", "b"]);
		assert!(claim_roles(None).is_empty());
		assert!(claim_roles(Some(&json!(null))).is_empty());
	}

	#[test]
	fn string_claims_are_split() {
		assert_eq!(
			names(&claim_roles(Some(&json!(" admin, user  editor")))),
			["admin", "editor", "user"]
		);
	}

	#[test]
	fn delimited_converter_maps_and_passes_through() {
		let converter = DelimitedRoleConverter::default().with_mapping("geo-admins", "ADMIN");

		assert_eq!(names(&converter.convert(" geo-admins ; viewer;;")), ["ADMIN", "viewer"]);
		assert_eq!(names(&DelimitedRoleConverter::with_delimiter(',').convert("a,b")), ["a", "b"]);
	}
}

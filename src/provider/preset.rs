//! Fixed endpoint metadata for the built-in provider integrations.

// self
use crate::auth::ProviderId;

/// Endpoint constants and defaults for one built-in integration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderPreset {
	/// Provider identifier the preset belongs to.
	pub id: &'static str,
	/// Authorization endpoint.
	pub authorization_uri: &'static str,
	/// Token endpoint.
	pub token_uri: &'static str,
	/// User-info endpoint.
	pub user_info_uri: &'static str,
	/// JSON Web Key set endpoint; GitHub has none.
	pub jwk_set_uri: Option<&'static str>,
	/// Issuer asserted in ID tokens, when fixed.
	pub issuer: Option<&'static str>,
	/// Scopes requested when the operator configures none.
	pub default_scope: &'static str,
	/// Attribute used as the principal's user name by default.
	pub user_name_attribute: &'static str,
}

/// Google OpenID Connect endpoints.
pub const GOOGLE: ProviderPreset = ProviderPreset {
	id: ProviderId::GOOGLE,
	authorization_uri: "https://accounts.google.com/o/oauth2/v2/auth",
	token_uri: "https://www.googleapis.com/oauth2/v4/token",
	user_info_uri: "https://www.googleapis.com/oauth2/v3/userinfo",
	jwk_set_uri: Some("https://www.googleapis.com/oauth2/v3/certs"),
	issuer: Some("https://accounts.google.com"),
	default_scope: "openid profile email",
	user_name_attribute: "email",
};

/// GitHub OAuth 2.0 endpoints (no ID tokens).
pub const GITHUB: ProviderPreset = ProviderPreset {
	id: ProviderId::GITHUB,
	authorization_uri: "https://github.com/login/oauth/authorize",
	token_uri: "https://github.com/login/oauth/access_token",
	user_info_uri: "https://api.github.com/user",
	jwk_set_uri: None,
	issuer: None,
	default_scope: "read:user",
	user_name_attribute: "id",
};

/// Microsoft identity platform v2 endpoints for the `common` tenant.
///
/// The issuer embeds the tenant ID, so it is not pinned.
pub const MICROSOFT: ProviderPreset = ProviderPreset {
	id: ProviderId::MICROSOFT,
	authorization_uri: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
	token_uri: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
	user_info_uri: "https://graph.microsoft.com/oidc/userinfo",
	jwk_set_uri: Some("https://login.microsoftonline.com/common/discovery/v2.0/keys"),
	issuer: None,
	default_scope: "openid profile email",
	user_name_attribute: "sub",
};

/// Default user-name attribute of the generic OIDC provider.
pub const OIDC_USER_NAME_ATTRIBUTE: &str = "email";
/// Default scopes of the generic OIDC provider.
pub const OIDC_DEFAULT_SCOPE: &str = "openid profile email";

/// Returns the fixed preset for `id`, if the provider is a built-in integration.
pub fn preset(id: &ProviderId) -> Option<&'static ProviderPreset> {
	match id.as_ref() {
		ProviderId::GOOGLE => Some(&GOOGLE),
		ProviderId::GITHUB => Some(&GITHUB),
		ProviderId::MICROSOFT => Some(&MICROSOFT),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn fixed_integrations_have_presets() {
		assert_eq!(preset(&ProviderId::google()), Some(&GOOGLE));
		assert_eq!(preset(&ProviderId::github()).map(|p| p.user_name_attribute), Some("id"));
		assert!(preset(&ProviderId::oidc()).is_none());
	}

	#[test]
	fn preset_endpoints_are_https() {
		for preset in [GOOGLE, GITHUB, MICROSOFT] {
			assert!(preset.authorization_uri.starts_with("https://"));
			assert!(preset.token_uri.starts_with("https://"));
			assert!(preset.user_info_uri.starts_with("https://"));
		}
	}
}

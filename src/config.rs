//! Broker configuration: one common section plus a per-provider map.
//!
//! Every type here is `serde` (de)serializable with defaults so the hosting layer can load
//! it from whatever persistence format it owns. Preset constructors such as
//! [`ProviderConfig::google`] carry each integration's defaults.

pub mod validate;

pub use validate::*;

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, TokenSecret},
	provider::preset::{self, OIDC_DEFAULT_SCOPE, OIDC_USER_NAME_ATTRIBUTE},
	roles::RoleSource,
};

/// Path segment appended to the base redirect URI for callbacks.
pub const CALLBACK_PATH: &str = "login/oauth2/code/";
/// Path prefix that starts an authorization redirect.
pub const AUTHORIZATION_PATH: &str = "/oauth2/authorization/";
/// Login page path.
pub const LOGIN_PATH: &str = "/login";

const DEFAULT_BASE_REDIRECT_URI: &str = "http://localhost:8080/";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Common configuration section plus one [`ProviderConfig`] per provider id.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
	/// Externally reachable base URI; callbacks live under `<base>login/oauth2/code/<id>`.
	pub base_redirect_uri: String,
	/// Where the provider sends the browser after RP-initiated logout.
	pub post_logout_redirect_uri: Option<String>,
	/// Redirect unauthenticated requests straight into the login flow.
	pub enable_redirect_authentication_entry_point: bool,
	/// Enables the confidential token dump for the generic OIDC provider.
	pub confidential_logging: bool,
	/// Upper bound for every outbound HTTP call, in seconds.
	pub http_timeout_secs: u64,
	/// Role resolution settings shared by every provider.
	pub roles: RoleSettings,
	/// Per-provider settings keyed by provider id.
	pub providers: BTreeMap<ProviderId, ProviderConfig>,
}
impl BrokerConfig {
	/// Overrides the base redirect URI.
	pub fn with_base_redirect_uri(mut self, base: impl Into<String>) -> Self {
		self.base_redirect_uri = base.into();

		self
	}

	/// Sets the post-logout redirect URI.
	pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
		self.post_logout_redirect_uri = Some(uri.into());

		self
	}

	/// Toggles the redirect authentication entry point.
	pub fn with_redirect_entry_point(mut self, enabled: bool) -> Self {
		self.enable_redirect_authentication_entry_point = enabled;

		self
	}

	/// Toggles confidential token logging.
	pub fn with_confidential_logging(mut self, enabled: bool) -> Self {
		self.confidential_logging = enabled;

		self
	}

	/// Overrides the outbound HTTP timeout.
	pub fn with_http_timeout_secs(mut self, secs: u64) -> Self {
		self.http_timeout_secs = secs;

		self
	}

	/// Replaces the role settings.
	pub fn with_roles(mut self, roles: RoleSettings) -> Self {
		self.roles = roles;

		self
	}

	/// Inserts or replaces the configuration for `id`.
	pub fn with_provider(mut self, id: ProviderId, config: ProviderConfig) -> Self {
		self.providers.insert(id, config);

		self
	}

	/// Configuration for `id`, if present.
	pub fn provider(&self, id: &ProviderId) -> Option<&ProviderConfig> {
		self.providers.get(id)
	}

	/// Outbound HTTP timeout.
	pub fn http_timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.http_timeout_secs.max(1))
	}

	/// Base redirect URI with a guaranteed trailing `/`.
	pub fn normalized_base(&self) -> String {
		let base = self.base_redirect_uri.trim();

		if base.ends_with('/') { base.to_owned() } else { format!("{base}/") }
	}

	/// Callback URI for `id`: the provider override when set, otherwise
	/// `<base>login/oauth2/code/<id>`.
	///
	/// Derived on every call, so it follows base changes and ignores unrelated edits.
	pub fn redirect_uri(&self, id: &ProviderId) -> String {
		self.provider(id)
			.and_then(|config| non_blank(&config.redirect_uri))
			.map(str::to_owned)
			.unwrap_or_else(|| format!("{}{CALLBACK_PATH}{id}", self.normalized_base()))
	}
}
impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			base_redirect_uri: DEFAULT_BASE_REDIRECT_URI.into(),
			post_logout_redirect_uri: None,
			enable_redirect_authentication_entry_point: false,
			confidential_logging: false,
			http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
			roles: RoleSettings::default(),
			providers: BTreeMap::new(),
		}
	}
}

/// Role resolution settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleSettings {
	/// Where roles come from; `None` grants no roles.
	pub source: Option<RoleSource>,
	/// Role service consulted by pre-authenticated sources.
	pub role_service_name: Option<String>,
	/// User/group service consulted by the user-group source.
	pub user_group_service_name: Option<String>,
	/// Registered claim-to-role converter name.
	pub role_converter_name: Option<String>,
}
impl RoleSettings {
	/// Settings resolving roles from `source`.
	pub fn from_source(source: RoleSource) -> Self {
		Self { source: Some(source), ..Default::default() }
	}

	/// Sets the role service name.
	pub fn with_role_service(mut self, name: impl Into<String>) -> Self {
		self.role_service_name = Some(name.into());

		self
	}

	/// Sets the user/group service name.
	pub fn with_user_group_service(mut self, name: impl Into<String>) -> Self {
		self.user_group_service_name = Some(name.into());

		self
	}

	/// Sets the claim-to-role converter name.
	pub fn with_role_converter(mut self, name: impl Into<String>) -> Self {
		self.role_converter_name = Some(name.into());

		self
	}
}

/// Settings for a single provider.
///
/// Endpoint, discovery, response-mode, PKCE, and validation toggles only matter for the
/// generic `oidc` provider; the built-in integrations use fixed endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
	/// Whether the provider is offered for login.
	pub enabled: bool,
	/// OAuth client identifier.
	pub client_id: Option<String>,
	/// OAuth client secret; optional when PKCE is enabled.
	pub client_secret: Option<TokenSecret>,
	/// Attribute used as the principal's user name.
	pub user_name_attribute: Option<String>,
	/// Callback URI override.
	pub redirect_uri: Option<String>,
	/// Raw scope list (whitespace or comma separated).
	pub scope: Option<String>,
	/// Authorization endpoint.
	pub authorization_uri: Option<String>,
	/// Token endpoint.
	pub token_uri: Option<String>,
	/// User-info endpoint.
	pub user_info_uri: Option<String>,
	/// JSON Web Key set endpoint.
	pub jwk_set_uri: Option<String>,
	/// Discovery document location.
	pub discovery_uri: Option<String>,
	/// End-session endpoint used for RP-initiated logout.
	pub logout_uri: Option<String>,
	/// Expected ID token issuer.
	pub issuer: Option<String>,
	/// Value sent as the non-standard `response_mode` parameter.
	pub response_mode: Option<String>,
	/// Adds an S256 PKCE challenge to authorization requests.
	pub use_pkce: bool,
	/// Rejects tokens that fail validation; when off, failures are only logged.
	pub enforce_token_validation: bool,
	/// Requires an `https` authorization endpoint.
	pub force_https_on_authorization_uri: bool,
	/// Requires an `https` token endpoint.
	pub force_https_on_token_uri: bool,
}
impl ProviderConfig {
	/// Google preset.
	pub fn google() -> Self {
		Self::from_preset(&preset::GOOGLE)
	}

	/// GitHub preset.
	pub fn github() -> Self {
		Self::from_preset(&preset::GITHUB)
	}

	/// Microsoft preset.
	pub fn microsoft() -> Self {
		Self::from_preset(&preset::MICROSOFT)
	}

	/// Generic OIDC provider with no endpoints configured.
	pub fn oidc() -> Self {
		Self {
			user_name_attribute: Some(OIDC_USER_NAME_ATTRIBUTE.into()),
			scope: Some(OIDC_DEFAULT_SCOPE.into()),
			..Default::default()
		}
	}

	/// Preset configuration for `id`; unknown ids start from the generic defaults.
	pub fn for_provider(id: &ProviderId) -> Self {
		preset::preset(id).map(Self::from_preset).unwrap_or_else(Self::oidc)
	}

	fn from_preset(preset: &preset::ProviderPreset) -> Self {
		Self {
			user_name_attribute: Some(preset.user_name_attribute.into()),
			scope: Some(preset.default_scope.into()),
			authorization_uri: Some(preset.authorization_uri.into()),
			token_uri: Some(preset.token_uri.into()),
			user_info_uri: Some(preset.user_info_uri.into()),
			jwk_set_uri: preset.jwk_set_uri.map(Into::into),
			issuer: preset.issuer.map(Into::into),
			..Default::default()
		}
	}

	/// Configuration as the registry sees it: built-in integrations get their fixed
	/// endpoints, and blank user-name attribute or scope fall back to the preset.
	pub fn effective(&self, id: &ProviderId) -> Self {
		let mut config = self.clone();

		if let Some(preset) = preset::preset(id) {
			config.authorization_uri = Some(preset.authorization_uri.into());
			config.token_uri = Some(preset.token_uri.into());
			config.user_info_uri = Some(preset.user_info_uri.into());
			config.jwk_set_uri = preset.jwk_set_uri.map(Into::into);
			config.issuer = preset.issuer.map(Into::into);

			if non_blank(&config.user_name_attribute).is_none() {
				config.user_name_attribute = Some(preset.user_name_attribute.into());
			}
			if non_blank(&config.scope).is_none() {
				config.scope = Some(preset.default_scope.into());
			}
		} else if non_blank(&config.user_name_attribute).is_none() {
			config.user_name_attribute = Some(OIDC_USER_NAME_ATTRIBUTE.into());
		}

		config
	}

	/// Parsed scope set.
	pub fn scopes(&self) -> ScopeSet {
		ScopeSet::parse_lenient(self.scope.as_deref())
	}

	/// Response mode trimmed, or `None` when absent or blank.
	pub fn trimmed_response_mode(&self) -> Option<&str> {
		non_blank(&self.response_mode)
	}

	/// Sets the enabled flag.
	pub fn with_enabled(mut self, enabled: bool) -> Self {
		self.enabled = enabled;

		self
	}

	/// Sets the client identifier.
	pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Clears the client secret.
	pub fn without_client_secret(mut self) -> Self {
		self.client_secret = None;

		self
	}

	/// Sets the raw scope list.
	pub fn with_scopes(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Sets the user-name attribute.
	pub fn with_user_name_attribute(mut self, attribute: impl Into<String>) -> Self {
		self.user_name_attribute = Some(attribute.into());

		self
	}

	/// Overrides the callback URI.
	pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
		self.redirect_uri = Some(uri.into());

		self
	}

	/// Sets the authorization endpoint.
	pub fn with_authorization_uri(mut self, uri: impl Into<String>) -> Self {
		self.authorization_uri = Some(uri.into());

		self
	}

	/// Sets the token endpoint.
	pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
		self.token_uri = Some(uri.into());

		self
	}

	/// Sets the user-info endpoint.
	pub fn with_user_info_uri(mut self, uri: impl Into<String>) -> Self {
		self.user_info_uri = Some(uri.into());

		self
	}

	/// Clears the user-info endpoint.
	pub fn without_user_info_uri(mut self) -> Self {
		self.user_info_uri = None;

		self
	}

	/// Sets the JWK set endpoint.
	pub fn with_jwk_set_uri(mut self, uri: impl Into<String>) -> Self {
		self.jwk_set_uri = Some(uri.into());

		self
	}

	/// Clears the JWK set endpoint.
	pub fn without_jwk_set_uri(mut self) -> Self {
		self.jwk_set_uri = None;

		self
	}

	/// Sets the discovery document location.
	pub fn with_discovery_uri(mut self, uri: impl Into<String>) -> Self {
		self.discovery_uri = Some(uri.into());

		self
	}

	/// Sets the end-session endpoint.
	pub fn with_logout_uri(mut self, uri: impl Into<String>) -> Self {
		self.logout_uri = Some(uri.into());

		self
	}

	/// Sets the expected issuer.
	pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
		self.issuer = Some(issuer.into());

		self
	}

	/// Sets the `response_mode` value.
	pub fn with_response_mode(mut self, mode: impl Into<String>) -> Self {
		self.response_mode = Some(mode.into());

		self
	}

	/// Toggles PKCE.
	pub fn with_pkce(mut self, use_pkce: bool) -> Self {
		self.use_pkce = use_pkce;

		self
	}

	/// Toggles strict token validation.
	pub fn with_enforce_token_validation(mut self, enforce: bool) -> Self {
		self.enforce_token_validation = enforce;

		self
	}

	/// Sets both force-HTTPS flags.
	pub fn with_force_https(mut self, force: bool) -> Self {
		self.force_https_on_authorization_uri = force;
		self.force_https_on_token_uri = force;

		self
	}
}
impl Default for ProviderConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			client_id: None,
			client_secret: None,
			user_name_attribute: None,
			redirect_uri: None,
			scope: None,
			authorization_uri: None,
			token_uri: None,
			user_info_uri: None,
			jwk_set_uri: None,
			discovery_uri: None,
			logout_uri: None,
			issuer: None,
			response_mode: None,
			use_pkce: false,
			enforce_token_validation: true,
			force_https_on_authorization_uri: true,
			force_https_on_token_uri: true,
		}
	}
}

/// Trimmed view of an optional string, `None` when absent or blank.
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
	value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn redirect_uri_derives_from_base_and_follows_base_changes() {
		let config = BrokerConfig::default()
			.with_base_redirect_uri("https://maps.example.com/geo")
			.with_provider(ProviderId::google(), ProviderConfig::google());

		assert_eq!(
			config.redirect_uri(&ProviderId::google()),
			"https://maps.example.com/geo/login/oauth2/code/google"
		);

		let unrelated = config
			.clone()
			.with_provider(
				ProviderId::google(),
				ProviderConfig::google().with_client_id("changed"),
			);

		assert_eq!(
			unrelated.redirect_uri(&ProviderId::google()),
			config.redirect_uri(&ProviderId::google())
		);

		let moved = config.with_base_redirect_uri("https://other.example.com/");

		assert_eq!(
			moved.redirect_uri(&ProviderId::google()),
			"https://other.example.com/login/oauth2/code/google"
		);
	}

	#[test]
	fn redirect_uri_override_wins() {
		let config = BrokerConfig::default().with_provider(
			ProviderId::oidc(),
			ProviderConfig::oidc().with_redirect_uri("https://custom.example.com/cb"),
		);

		assert_eq!(config.redirect_uri(&ProviderId::oidc()), "https://custom.example.com/cb");
	}

	#[test]
	fn effective_config_pins_builtin_endpoints() {
		let tampered = ProviderConfig::github()
			.with_token_uri("https://evil.example.com/token")
			.with_user_name_attribute(" ");
		let effective = tampered.effective(&ProviderId::github());

		assert_eq!(effective.token_uri.as_deref(), Some(preset::GITHUB.token_uri));
		assert_eq!(effective.user_name_attribute.as_deref(), Some("id"));
		assert!(effective.jwk_set_uri.is_none());
	}

	#[test]
	fn response_mode_is_trimmed_and_blank_is_absent() {
		let config = ProviderConfig::oidc().with_response_mode(" form_post ");

		assert_eq!(config.trimmed_response_mode(), Some("form_post"));
		assert_eq!(ProviderConfig::oidc().with_response_mode("  ").trimmed_response_mode(), None);
		assert_eq!(ProviderConfig::oidc().trimmed_response_mode(), None);
	}

	#[test]
	fn deserializes_with_defaults() {
		let config: BrokerConfig = serde_json::from_str(
			r#"{
				"base_redirect_uri": "https://app.example.com",
				"providers": { "oidc": { "enabled": true, "client_id": "abc" } }
			}"#,
		)
		.expect("Minimal broker configuration should deserialize.");
		let oidc = config.provider(&ProviderId::oidc()).expect("OIDC entry should be present.");

		assert!(oidc.enabled);
		assert!(oidc.enforce_token_validation);
		assert!(oidc.force_https_on_token_uri);
		assert_eq!(config.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
	}
}

//! Provider configuration validation run before activation.

// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	config::{ProviderConfig, non_blank},
	error::{ConfigError, UrlField},
};

/// Provider-specific validation hook appended after the common checks.
pub trait ConfigCheck
where
	Self: Send + Sync,
{
	/// Returns true when this check runs for `provider`.
	fn applies_to(&self, provider: &ProviderId) -> bool;

	/// Appends findings for `config` (already resolved through
	/// [`ProviderConfig::effective`]).
	fn check(&self, config: &ProviderConfig, errors: &mut Vec<ConfigError>);
}

/// Re-checks JWK set URI well-formedness for the generic OIDC provider.
#[derive(Clone, Copy, Debug, Default)]
pub struct OidcJwkSetCheck;
impl ConfigCheck for OidcJwkSetCheck {
	fn applies_to(&self, provider: &ProviderId) -> bool {
		provider.is_oidc()
	}

	fn check(&self, config: &ProviderConfig, errors: &mut Vec<ConfigError>) {
		if let Some(uri) = non_blank(&config.jwk_set_uri)
			&& parse_absolute(uri).is_none()
		{
			errors.push(ConfigError::MalformedUrl(UrlField::JwkSetUri));
		}
	}
}

/// Accumulating validator for [`ProviderConfig`] values.
///
/// Findings are reported in a fixed order: malformed URLs, insecure schemes, missing
/// client ID, missing client secret, missing scope, missing verification endpoint,
/// then plugin findings. Duplicate findings are reported once.
pub struct ConfigValidator {
	checks: Vec<Box<dyn ConfigCheck>>,
}
impl ConfigValidator {
	/// Validator with only the common checks.
	pub fn empty() -> Self {
		Self { checks: Vec::new() }
	}

	/// Appends a provider-specific check.
	pub fn with_check(mut self, check: impl 'static + ConfigCheck) -> Self {
		self.checks.push(Box::new(check));

		self
	}

	/// Validates `config` for `provider`, returning every finding.
	pub fn validate(&self, provider: &ProviderId, config: &ProviderConfig) -> Vec<ConfigError> {
		let config = config.effective(provider);
		let mut errors = Vec::new();

		for (field, value) in url_fields(&config) {
			if let Some(value) = value
				&& parse_absolute(value).is_none()
			{
				errors.push(ConfigError::MalformedUrl(field));
			}
		}

		for (field, value, forced) in [
			(UrlField::TokenUri, non_blank(&config.token_uri), config.force_https_on_token_uri),
			(
				UrlField::AuthorizationUri,
				non_blank(&config.authorization_uri),
				config.force_https_on_authorization_uri,
			),
		] {
			if forced
				&& let Some(url) = value.and_then(parse_absolute)
				&& url.scheme() != "https"
			{
				errors.push(ConfigError::InsecureScheme(field));
			}
		}

		if non_blank(&config.client_id).is_none() {
			errors.push(ConfigError::MissingClientId);
		}
		if !config.use_pkce && config.client_secret.as_ref().is_none_or(|secret| secret.is_blank())
		{
			errors.push(ConfigError::MissingClientSecret);
		}
		if config.scopes().is_empty() {
			errors.push(ConfigError::MissingScope);
		}
		if non_blank(&config.user_info_uri).is_none() && non_blank(&config.jwk_set_uri).is_none() {
			errors.push(ConfigError::MissingVerificationEndpoint);
		}

		let mut extra = Vec::new();

		for check in self.checks.iter().filter(|check| check.applies_to(provider)) {
			check.check(&config, &mut extra);
		}
		for finding in extra {
			if !errors.contains(&finding) {
				errors.push(finding);
			}
		}

		errors
	}
}
impl Default for ConfigValidator {
	fn default() -> Self {
		Self::empty().with_check(OidcJwkSetCheck)
	}
}
impl Debug for ConfigValidator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConfigValidator").field("checks", &self.checks.len()).finish()
	}
}

fn url_fields(config: &ProviderConfig) -> [(UrlField, Option<&str>); 6] {
	[
		(UrlField::AuthorizationUri, non_blank(&config.authorization_uri)),
		(UrlField::TokenUri, non_blank(&config.token_uri)),
		(UrlField::UserInfoUri, non_blank(&config.user_info_uri)),
		(UrlField::JwkSetUri, non_blank(&config.jwk_set_uri)),
		(UrlField::LogoutUri, non_blank(&config.logout_uri)),
		(UrlField::RedirectUri, non_blank(&config.redirect_uri)),
	]
}

/// Parses `value` as an absolute, hierarchical URL.
pub(crate) fn parse_absolute(value: &str) -> Option<Url> {
	Url::parse(value.trim()).ok().filter(|url| !url.cannot_be_a_base() && url.has_host())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn oidc() -> ProviderConfig {
		ProviderConfig::oidc()
			.with_enabled(true)
			.with_client_id("client")
			.with_client_secret("secret")
			.with_authorization_uri("https://idp.example.com/authorize")
			.with_token_uri("https://idp.example.com/token")
			.with_jwk_set_uri("https://idp.example.com/jwks")
	}

	fn validate(config: &ProviderConfig) -> Vec<ConfigError> {
		ConfigValidator::default().validate(&ProviderId::oidc(), config)
	}

	#[test]
	fn valid_configuration_has_no_findings() {
		assert!(validate(&oidc()).is_empty());
	}

	#[test]
	fn missing_secret_depends_on_pkce() {
		let without_secret = oidc().without_client_secret();

		assert_eq!(validate(&without_secret), vec![ConfigError::MissingClientSecret]);
		assert!(validate(&without_secret.clone().with_pkce(true)).is_empty());
		assert!(validate(&oidc().with_pkce(true)).is_empty());
	}

	#[test]
	fn exactly_one_verification_endpoint_is_enough() {
		let jwks_only = oidc();
		let user_info_only =
			oidc().without_jwk_set_uri().with_user_info_uri("https://idp.example.com/userinfo");
		let neither = oidc().without_jwk_set_uri();

		assert!(validate(&jwks_only).is_empty());
		assert!(validate(&user_info_only).is_empty());
		assert_eq!(validate(&neither), vec![ConfigError::MissingVerificationEndpoint]);
	}

	#[test]
	fn findings_accumulate_in_order() {
		let config = ProviderConfig::default()
			.with_token_uri("http://idp.example.com/token")
			.with_authorization_uri("not a url")
			.with_scopes(" ");

		assert_eq!(
			validate(&config),
			vec![
				ConfigError::MalformedUrl(UrlField::AuthorizationUri),
				ConfigError::InsecureScheme(UrlField::TokenUri),
				ConfigError::MissingClientId,
				ConfigError::MissingClientSecret,
				ConfigError::MissingScope,
				ConfigError::MissingVerificationEndpoint,
			]
		);
	}

	#[test]
	fn insecure_schemes_respect_force_flags() {
		let config = oidc()
			.with_authorization_uri("http://idp.example.com/authorize")
			.with_token_uri("http://idp.example.com/token");

		assert_eq!(
			validate(&config),
			vec![
				ConfigError::InsecureScheme(UrlField::TokenUri),
				ConfigError::InsecureScheme(UrlField::AuthorizationUri),
			]
		);
		assert!(validate(&config.with_force_https(false)).is_empty());
	}

	#[test]
	fn malformed_jwk_set_uri_is_reported_once() {
		let config = oidc().with_jwk_set_uri("relative/jwks");

		assert_eq!(validate(&config), vec![ConfigError::MalformedUrl(UrlField::JwkSetUri)]);

		let mut plugin_only = Vec::new();

		OidcJwkSetCheck.check(&config, &mut plugin_only);

		assert_eq!(plugin_only, vec![ConfigError::MalformedUrl(UrlField::JwkSetUri)]);
	}

	#[test]
	fn builtin_presets_only_need_credentials() {
		let google = ProviderConfig::google().with_enabled(true);
		let findings = ConfigValidator::default().validate(&ProviderId::google(), &google);

		assert_eq!(findings, vec![ConfigError::MissingClientId, ConfigError::MissingClientSecret]);
	}
}

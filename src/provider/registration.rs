//! Immutable client registrations derived from enabled provider configurations.

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet, TokenSecret},
	config::{ProviderConfig, non_blank},
	error::{SetupError, UrlField},
};

/// Client authentication used at the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Public client proving possession via PKCE; `client_id` travels in the form body.
	NoneWithPkce,
}

/// Endpoint set of a registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint.
	pub authorization: Url,
	/// Token endpoint.
	pub token: Url,
	/// User-info endpoint.
	pub user_info: Option<Url>,
	/// JSON Web Key set endpoint.
	pub jwk_set: Option<Url>,
	/// End-session endpoint.
	pub logout: Option<Url>,
}

/// Immutable registration built once per activation and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
	/// Registration id, also used in login and callback paths.
	pub id: ProviderId,
	/// OAuth client identifier.
	pub client_id: String,
	/// Client secret for confidential clients.
	pub client_secret: Option<TokenSecret>,
	/// Token endpoint authentication.
	pub client_auth_method: ClientAuthMethod,
	/// Requested scopes.
	pub scopes: ScopeSet,
	/// Callback URI.
	pub redirect_uri: Url,
	/// Provider endpoints.
	pub endpoints: ProviderEndpoints,
	/// Expected ID token issuer, when known.
	pub issuer: Option<String>,
	/// Attribute used as the principal's user name.
	pub user_name_attribute: String,
	/// Trimmed `response_mode` value (generic OIDC provider only).
	pub response_mode: Option<String>,
	/// Whether authorization requests carry a PKCE challenge.
	pub use_pkce: bool,
	/// Whether token validation failures reject the login.
	pub enforce_token_validation: bool,
}
impl ClientRegistration {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ClientRegistrationBuilder {
		ClientRegistrationBuilder::new(id)
	}

	/// Derives a registration from an enabled configuration.
	///
	/// `config` is resolved through [`ProviderConfig::effective`] first, so built-in
	/// integrations always use their fixed endpoints. Provider-specific options
	/// (`response_mode`, PKCE, relaxed validation) are only honored for `oidc`.
	pub fn from_config(
		id: &ProviderId,
		config: &ProviderConfig,
		redirect_uri: &str,
	) -> Result<Self, SetupError> {
		let config = config.effective(id);
		let oidc = id.is_oidc();
		let mut builder = Self::builder(id.clone())
			.client_id(non_blank(&config.client_id).unwrap_or_default())
			.scopes(config.scopes())
			.redirect_uri(parse_endpoint(UrlField::RedirectUri, redirect_uri)?)
			.user_name_attribute(non_blank(&config.user_name_attribute).unwrap_or("sub"))
			.use_pkce(oidc && config.use_pkce)
			.enforce_token_validation(!oidc || config.enforce_token_validation);

		if let Some(secret) = config.client_secret.as_ref().filter(|secret| !secret.is_blank()) {
			builder = builder.client_secret(secret.clone());
		}
		if let Some(uri) = non_blank(&config.authorization_uri) {
			builder =
				builder.authorization_endpoint(parse_endpoint(UrlField::AuthorizationUri, uri)?);
		}
		if let Some(uri) = non_blank(&config.token_uri) {
			builder = builder.token_endpoint(parse_endpoint(UrlField::TokenUri, uri)?);
		}
		if let Some(uri) = non_blank(&config.user_info_uri) {
			builder = builder.user_info_endpoint(parse_endpoint(UrlField::UserInfoUri, uri)?);
		}
		if let Some(uri) = non_blank(&config.jwk_set_uri) {
			builder = builder.jwk_set_endpoint(parse_endpoint(UrlField::JwkSetUri, uri)?);
		}
		if let Some(uri) = non_blank(&config.logout_uri) {
			builder = builder.logout_endpoint(parse_endpoint(UrlField::LogoutUri, uri)?);
		}
		if let Some(issuer) = non_blank(&config.issuer) {
			builder = builder.issuer(issuer);
		}
		if oidc && let Some(mode) = config.trimmed_response_mode() {
			builder = builder.response_mode(mode);
		}

		builder.build()
	}

	/// Returns true when the registration requests the `openid` scope.
	pub fn is_openid(&self) -> bool {
		self.scopes.contains("openid")
	}

	/// Path that starts the authorization redirect for this registration.
	pub fn authorization_path(&self) -> String {
		format!("{}{}", crate::config::AUTHORIZATION_PATH, self.id)
	}
}

/// Builder for [`ClientRegistration`] values.
#[derive(Debug)]
pub struct ClientRegistrationBuilder {
	id: ProviderId,
	client_id: String,
	client_secret: Option<TokenSecret>,
	scopes: ScopeSet,
	redirect_uri: Option<Url>,
	authorization: Option<Url>,
	token: Option<Url>,
	user_info: Option<Url>,
	jwk_set: Option<Url>,
	logout: Option<Url>,
	issuer: Option<String>,
	user_name_attribute: String,
	response_mode: Option<String>,
	use_pkce: bool,
	enforce_token_validation: bool,
}
impl ClientRegistrationBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			client_id: String::new(),
			client_secret: None,
			scopes: ScopeSet::default(),
			redirect_uri: None,
			authorization: None,
			token: None,
			user_info: None,
			jwk_set: None,
			logout: None,
			issuer: None,
			user_name_attribute: "sub".into(),
			response_mode: None,
			use_pkce: false,
			enforce_token_validation: true,
		}
	}

	/// Sets the client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = client_id.into();

		self
	}

	/// Sets the client secret.
	pub fn client_secret(mut self, secret: TokenSecret) -> Self {
		self.client_secret = Some(secret);

		self
	}

	/// Sets the requested scopes.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Sets the callback URI.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token = Some(url);

		self
	}

	/// Sets the user-info endpoint.
	pub fn user_info_endpoint(mut self, url: Url) -> Self {
		self.user_info = Some(url);

		self
	}

	/// Sets the JWK set endpoint.
	pub fn jwk_set_endpoint(mut self, url: Url) -> Self {
		self.jwk_set = Some(url);

		self
	}

	/// Sets the end-session endpoint.
	pub fn logout_endpoint(mut self, url: Url) -> Self {
		self.logout = Some(url);

		self
	}

	/// Sets the expected issuer.
	pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
		self.issuer = Some(issuer.into());

		self
	}

	/// Sets the user-name attribute.
	pub fn user_name_attribute(mut self, attribute: impl Into<String>) -> Self {
		self.user_name_attribute = attribute.into();

		self
	}

	/// Sets the `response_mode` value.
	pub fn response_mode(mut self, mode: impl Into<String>) -> Self {
		self.response_mode = Some(mode.into());

		self
	}

	/// Toggles PKCE.
	pub fn use_pkce(mut self, use_pkce: bool) -> Self {
		self.use_pkce = use_pkce;

		self
	}

	/// Toggles strict token validation.
	pub fn enforce_token_validation(mut self, enforce: bool) -> Self {
		self.enforce_token_validation = enforce;

		self
	}

	/// Consumes the builder, requiring the endpoints the authorization-code flow needs.
	pub fn build(self) -> Result<ClientRegistration, SetupError> {
		let authorization = self
			.authorization
			.ok_or(SetupError::MissingEndpoint { field: UrlField::AuthorizationUri })?;
		let token = self.token.ok_or(SetupError::MissingEndpoint { field: UrlField::TokenUri })?;
		let redirect_uri =
			self.redirect_uri.ok_or(SetupError::MissingEndpoint { field: UrlField::RedirectUri })?;
		let client_auth_method = if self.client_secret.is_none() && self.use_pkce {
			ClientAuthMethod::NoneWithPkce
		} else {
			ClientAuthMethod::ClientSecretBasic
		};

		Ok(ClientRegistration {
			id: self.id,
			client_id: self.client_id,
			client_secret: self.client_secret,
			client_auth_method,
			scopes: self.scopes,
			redirect_uri,
			endpoints: ProviderEndpoints {
				authorization,
				token,
				user_info: self.user_info,
				jwk_set: self.jwk_set,
				logout: self.logout,
			},
			issuer: self.issuer,
			user_name_attribute: self.user_name_attribute,
			response_mode: self.response_mode,
			use_pkce: self.use_pkce,
			enforce_token_validation: self.enforce_token_validation,
		})
	}
}

fn parse_endpoint(field: UrlField, value: &str) -> Result<Url, SetupError> {
	Url::parse(value.trim()).map_err(|source| SetupError::InvalidEndpoint { field, source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::provider::preset;

	const REDIRECT: &str = "https://app.example.com/login/oauth2/code/oidc";

	#[test]
	fn builtin_registration_uses_fixed_endpoints() {
		let config = ProviderConfig::google()
			.with_enabled(true)
			.with_client_id("google-client")
			.with_client_secret("google-secret")
			.with_response_mode("form_post")
			.with_pkce(true);
		let registration =
			ClientRegistration::from_config(&ProviderId::google(), &config, REDIRECT)
				.expect("Google registration should build.");

		assert_eq!(registration.endpoints.token.as_str(), preset::GOOGLE.token_uri);
		assert_eq!(registration.user_name_attribute, "email");
		assert!(registration.response_mode.is_none(), "Only oidc honors response_mode.");
		assert!(!registration.use_pkce, "Only oidc honors PKCE.");
		assert!(registration.is_openid());
		assert_eq!(registration.authorization_path(), "/oauth2/authorization/google");
	}

	#[test]
	fn pkce_without_secret_is_a_public_client() {
		let config = ProviderConfig::oidc()
			.with_enabled(true)
			.with_client_id("public")
			.with_pkce(true)
			.with_response_mode(" query ")
			.with_authorization_uri("https://idp.example.com/authorize")
			.with_token_uri("https://idp.example.com/token")
			.with_jwk_set_uri("https://idp.example.com/jwks");
		let registration = ClientRegistration::from_config(&ProviderId::oidc(), &config, REDIRECT)
			.expect("PKCE registration should build.");

		assert_eq!(registration.client_auth_method, ClientAuthMethod::NoneWithPkce);
		assert_eq!(registration.response_mode.as_deref(), Some("query"));
		assert!(registration.endpoints.user_info.is_none());
	}

	#[test]
	fn missing_oidc_endpoints_fail_the_build() {
		let config = ProviderConfig::oidc().with_client_id("client").with_client_secret("secret");
		let err = ClientRegistration::from_config(&ProviderId::oidc(), &config, REDIRECT)
			.expect_err("Registration without endpoints must fail.");

		assert!(matches!(
			err,
			SetupError::MissingEndpoint { field: UrlField::AuthorizationUri }
		));
	}
}

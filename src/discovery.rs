//! OpenID Connect discovery: fetch a provider's metadata and autofill endpoint fields.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	config::ProviderConfig,
	error::DiscoveryError,
	http::ReqwestHttpClient,
	obs::{self, LoginOutcome, LoginSpan, LoginStage},
};

/// Subset of the provider metadata document the broker consumes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
	/// Issuer identifier.
	#[serde(default)]
	pub issuer: Option<String>,
	/// Authorization endpoint.
	#[serde(default)]
	pub authorization_endpoint: Option<String>,
	/// Token endpoint.
	#[serde(default)]
	pub token_endpoint: Option<String>,
	/// User-info endpoint.
	#[serde(default)]
	pub userinfo_endpoint: Option<String>,
	/// JSON Web Key set endpoint.
	#[serde(default)]
	pub jwks_uri: Option<String>,
	/// RP-initiated logout endpoint.
	#[serde(default)]
	pub end_session_endpoint: Option<String>,
}
impl DiscoveryDocument {
	/// Copy of `config` with every field the document supplies overwritten.
	///
	/// Fields the document omits keep their configured value.
	pub fn apply(&self, config: &ProviderConfig) -> ProviderConfig {
		let mut config = config.clone();

		for (target, value) in [
			(&mut config.authorization_uri, &self.authorization_endpoint),
			(&mut config.token_uri, &self.token_endpoint),
			(&mut config.user_info_uri, &self.userinfo_endpoint),
			(&mut config.jwk_set_uri, &self.jwks_uri),
			(&mut config.logout_uri, &self.end_session_endpoint),
			(&mut config.issuer, &self.issuer),
		] {
			if let Some(value) = value.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
				*target = Some(value.to_owned());
			}
		}

		config
	}
}

/// Loads discovery documents with a bounded timeout.
#[derive(Clone, Debug)]
pub struct DiscoveryResolver {
	http_client: ReqwestHttpClient,
	timeout: StdDuration,
}
impl DiscoveryResolver {
	/// Resolver fetching through `http_client`.
	pub fn new(http_client: ReqwestHttpClient, timeout: StdDuration) -> Self {
		Self { http_client, timeout }
	}

	/// Fetches and parses the document at `url`.
	pub async fn fetch(&self, url: &str) -> Result<DiscoveryDocument, DiscoveryError> {
		let url = Url::parse(url.trim()).map_err(|source| DiscoveryError::InvalidUrl { source })?;

		self.http_client
			.get_json(&url, None, self.timeout)
			.await
			.map_err(|source| DiscoveryError::Fetch { source })
	}

	/// Returns `config` autofilled from the document at `url`.
	///
	/// On failure nothing is applied; the caller's configuration is never modified.
	pub async fn autofill(
		&self,
		url: &str,
		config: &ProviderConfig,
	) -> Result<ProviderConfig, DiscoveryError> {
		let span = LoginSpan::new(LoginStage::Discovery, "oidc");

		obs::record_login_outcome(LoginStage::Discovery, LoginOutcome::Attempt);

		let document = obs::observe(LoginStage::Discovery, span.instrument(self.fetch(url)).await)?;

		#[cfg(feature = "tracing")]
		tracing::debug!(url, issuer = ?document.issuer, "Discovery document applied.");

		Ok(document.apply(config).with_discovery_uri(url.trim()))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	use serde_json::json;
	// self
	use super::*;
	use crate::_preludet::test_reqwest_http_client;

	fn resolver() -> DiscoveryResolver {
		DiscoveryResolver::new(test_reqwest_http_client(), StdDuration::from_secs(5))
	}

	#[test]
	fn apply_overwrites_only_supplied_fields() {
		let document = DiscoveryDocument {
			token_endpoint: Some("https://idp.example.com/token".into()),
			jwks_uri: Some(" ".into()),
			..Default::default()
		};
		let config = ProviderConfig::oidc()
			.with_token_uri("https://old.example.com/token")
			.with_jwk_set_uri("https://old.example.com/jwks")
			.with_user_info_uri("https://old.example.com/userinfo");
		let applied = document.apply(&config);

		assert_eq!(applied.token_uri.as_deref(), Some("https://idp.example.com/token"));
		assert_eq!(applied.jwk_set_uri.as_deref(), Some("https://old.example.com/jwks"));
		assert_eq!(applied.user_info_uri, config.user_info_uri);
	}

	#[tokio::test]
	async fn autofill_fills_endpoints_issuer_and_logout() {
		let server = MockServer::start_async().await;
		let base = server.base_url();

		server
			.mock_async(|when, then| {
				when.method(GET).path("/.well-known/openid-configuration");
				then.status(200).header("content-type", "application/json").body(
					json!({
						"issuer": base,
						"authorization_endpoint": format!("{base}/authorize"),
						"token_endpoint": format!("{base}/token"),
						"userinfo_endpoint": format!("{base}/userinfo"),
						"jwks_uri": format!("{base}/jwks"),
						"end_session_endpoint": format!("{base}/logout"),
						"response_types_supported": ["code"],
					})
					.to_string(),
				);
			})
			.await;

		let url = server.url("/.well-known/openid-configuration");
		let config = resolver()
			.autofill(&url, &ProviderConfig::oidc().with_client_id("client"))
			.await
			.expect("Discovery should succeed.");

		assert_eq!(config.token_uri, Some(format!("{base}/token")));
		assert_eq!(config.logout_uri, Some(format!("{base}/logout")));
		assert_eq!(config.issuer.as_deref(), Some(base.as_str()));
		assert_eq!(config.discovery_uri.as_deref(), Some(url.as_str()));
		assert_eq!(config.client_id.as_deref(), Some("client"));
	}

	#[tokio::test]
	async fn failures_leave_nothing_applied() {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.method(GET).path("/broken");
				then.status(200)
					.header("content-type", "application/json")
					.body(r#"{"token_endpoint":7}"#);
			})
			.await;

		let err = resolver()
			.autofill(&server.url("/broken"), &ProviderConfig::oidc())
			.await
			.expect_err("Malformed document must fail.");

		assert!(matches!(err, DiscoveryError::Fetch { .. }));
		assert!(matches!(
			resolver().autofill("not a url", &ProviderConfig::oidc()).await,
			Err(DiscoveryError::InvalidUrl { .. })
		));
	}
}

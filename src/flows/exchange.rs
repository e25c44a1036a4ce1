//! Authorization code exchange with stage instrumentation and the confidential audit.

// self
use crate::{
	_prelude::*,
	error::ExchangeError,
	flows::ConfidentialLogger,
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::{
		AccessTokenResponse, CodeExchange, OAuthFacade, ReqwestTransportErrorMapper,
		TransportErrorMapper,
	},
	obs::{self, LoginOutcome, LoginSpan, LoginStage},
	provider::{ClientRegistration, ProviderErrorContext, strategy_for},
};

/// Exchange client specialized for the crate's reqwest transport.
pub type ReqwestTokenExchangeClient =
	TokenExchangeClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Trades authorization codes for tokens at a registration's token endpoint.
///
/// Failures are typed and never retried. After a successful exchange for the generic
/// OIDC provider the [`ConfidentialLogger`] may render an audit record; that step
/// cannot change the result.
pub struct TokenExchangeClient<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	confidential: ConfidentialLogger,
}
impl<C, M> TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchange client reusing the caller-provided transport and mapper.
	pub fn new(http_client: impl Into<Arc<C>>, error_mapper: impl Into<Arc<M>>) -> Self {
		Self {
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			confidential: ConfidentialLogger::default(),
		}
	}

	/// Replaces the confidential logger.
	pub fn with_confidential_logger(mut self, logger: ConfidentialLogger) -> Self {
		self.confidential = logger;

		self
	}

	/// Confidential logger in use.
	pub fn confidential_logger(&self) -> ConfidentialLogger {
		self.confidential
	}

	/// Exchanges `exchange.code` at the token endpoint of `registration`.
	pub async fn exchange(
		&self,
		registration: &ClientRegistration,
		exchange: CodeExchange,
	) -> Result<AccessTokenResponse, ExchangeError> {
		let span = LoginSpan::new(LoginStage::Exchange, registration.id.as_ref());

		obs::record_login_outcome(LoginStage::Exchange, LoginOutcome::Attempt);

		let facade = <OAuthFacade<C, M>>::from_registration(
			registration,
			self.http_client.clone(),
			self.error_mapper.clone(),
		)?;
		let strategy = strategy_for(&registration.id);
		let ctx = ProviderErrorContext::new(registration.id.clone());
		let result = span
			.instrument(facade.exchange_authorization_code(strategy.as_ref(), ctx, &exchange))
			.await;
		let response = obs::observe(LoginStage::Exchange, result)?;

		self.confidential.log_exchange(&registration.id, &exchange, &response);

		Ok(response)
	}
}
impl<C, M> Clone for TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			error_mapper: self.error_mapper.clone(),
			confidential: self.confidential,
		}
	}
}
impl<C, M> Debug for TokenExchangeClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchangeClient")
			.field("confidential_logging", &self.confidential.is_enabled())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		_preludet::test_reqwest_http_client,
		auth::{ProviderId, ScopeSet, TokenSecret},
		config::ProviderConfig,
	};

	fn registration(server: &MockServer) -> ClientRegistration {
		let config = ProviderConfig::oidc()
			.with_client_id("client")
			.with_client_secret("secret")
			.with_authorization_uri(server.url("/authorize"))
			.with_token_uri(server.url("/token"))
			.with_jwk_set_uri(server.url("/jwks"));

		ClientRegistration::from_config(
			&ProviderId::oidc(),
			&config,
			"https://app.example.com/login/oauth2/code/oidc",
		)
		.expect("Registration fixture should build.")
	}

	fn code_exchange(registration: &ClientRegistration) -> CodeExchange {
		CodeExchange {
			code: TokenSecret::new("the-code"),
			pkce_verifier: None,
			redirect_uri: registration.redirect_uri.clone(),
			requested_scope: registration.scopes.clone(),
		}
	}

	fn client() -> ReqwestTokenExchangeClient {
		TokenExchangeClient::new(test_reqwest_http_client(), ReqwestTransportErrorMapper)
			.with_confidential_logger(ConfidentialLogger::new(true))
	}

	#[tokio::test]
	async fn successful_exchange_defaults_scopes_to_the_request() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/token")
					.header("content-type", "application/x-www-form-urlencoded");
				then.status(200).header("content-type", "application/json").body(
					json!({
						"access_token": "at-1",
						"token_type": "Bearer",
						"expires_in": 300,
						"id_token": "h.p.s",
					})
					.to_string(),
				);
			})
			.await;
		let registration = registration(&server);
		let response = client()
			.exchange(&registration, code_exchange(&registration))
			.await
			.expect("Exchange should succeed.");

		mock.assert_async().await;

		assert_eq!(response.access_token.expose(), "at-1");
		assert_eq!(response.scopes, ScopeSet::parse_lenient(Some("openid profile email")));
		assert_eq!(response.expires_in, Some(Duration::seconds(300)));
		assert_eq!(response.id_token.as_ref().map(TokenSecret::expose), Some("h.p.s"));
	}

	#[tokio::test]
	async fn oauth_errors_are_classified() {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.method(POST).path("/token");
				then.status(400)
					.header("content-type", "application/json")
					.body(r#"{"error":"invalid_grant","error_description":"Code expired."}"#);
			})
			.await;

		let registration = registration(&server);
		let err = client()
			.exchange(&registration, code_exchange(&registration))
			.await
			.expect_err("Rejected code should fail.");

		assert!(matches!(err, ExchangeError::InvalidGrant { .. }));
	}
}
